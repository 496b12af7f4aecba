// Copyright (c) The Nearside Project Authors.
// Licensed under the MIT License.

//! Decoded server-pushed near cache updates.

use crate::{Partition, TopologyVersion};

/// A server-pushed near cache update, already decoded from the wire.
///
/// The cluster pushes one of these whenever a server-side value changes or a
/// key's invalidation subscription breaks. Wire decoding belongs to the
/// client's marshalling layer; the near cache consumes only this record.
///
/// # Examples
///
/// ```
/// use nearside_topology::{CacheUpdate, TopologyVersion, UpdateBody};
///
/// let put = CacheUpdate::put("user:7".to_string(), 42_i64, 13, TopologyVersion::new(3, 0));
/// assert!(matches!(put.body, UpdateBody::Put { .. }));
///
/// let gone = CacheUpdate::<String, i64>::remove("user:7".to_string());
/// assert!(matches!(gone.body, UpdateBody::Remove));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheUpdate<K, V> {
    /// The affected key.
    pub key: K,
    /// What happened to the key.
    pub body: UpdateBody<V>,
}

/// The payload of a [`CacheUpdate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpdateBody<V> {
    /// A fresh value for the key, stamped with the partition it lives in and
    /// the topology version the server observed when producing it.
    Put {
        /// The new value.
        value: V,
        /// The key's partition.
        partition: Partition,
        /// Topology version at which the value was produced.
        version: TopologyVersion,
    },
    /// The key must be dropped: the value was deleted, is no longer
    /// cacheable, or its invalidation subscription broke.
    Remove,
}

impl<K, V> CacheUpdate<K, V> {
    /// Builds an update that installs a fresh value.
    pub fn put(key: K, value: V, partition: Partition, version: TopologyVersion) -> Self {
        Self {
            key,
            body: UpdateBody::Put {
                value,
                partition,
                version,
            },
        }
    }

    /// Builds an update that drops the key.
    pub fn remove(key: K) -> Self {
        Self {
            key,
            body: UpdateBody::Remove,
        }
    }
}
