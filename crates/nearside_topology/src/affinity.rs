// Copyright (c) The Nearside Project Authors.
// Licensed under the MIT License.

//! The partition affinity oracle consumed by the near cache.

use std::any::Any;

use crate::TopologyVersion;

/// Identifier of a keyspace partition.
///
/// Every key maps to exactly one partition for a given partitioning scheme,
/// and that mapping never changes for the lifetime of the scheme.
pub type Partition = u32;

/// Answers partition-affinity questions on behalf of the cluster.
///
/// The near cache treats this as a read-only oracle; it is owned and kept
/// current by the surrounding cluster-membership component. Both methods may
/// be called concurrently from any thread and must not block on I/O.
pub trait Affinity: Send + Sync {
    /// Maps a key to its partition.
    ///
    /// `key_hash` is the caller-computed hash of the key, so that hash-based
    /// affinity functions need no knowledge of the concrete key type; `key`
    /// is available for implementations that partition on key structure.
    /// The result for a given key is permanently fixed under the live
    /// partitioning scheme.
    fn resolve_partition(&self, key: &(dyn Any + Send + Sync), key_hash: u64) -> Partition;

    /// Reports whether the client's ownership view of `partition`, recorded
    /// at `recorded` (an older topology version), is still correct as of the
    /// current version.
    ///
    /// When the primary node for a partition changes, entries recorded before
    /// the change stop receiving invalidation updates, so the near cache must
    /// drop them; when ownership survived the topology change, the recorded
    /// view can be revalidated instead.
    fn is_assignment_valid(&self, recorded: TopologyVersion, partition: Partition) -> bool;
}
