// Copyright (c) The Nearside Project Authors.
// Licensed under the MIT License.

#![cfg_attr(docsrs, feature(doc_cfg))]

//! Client-side near cache with topology-aware invalidation.
//!
//! A near cache is a client-local mirror of a subset of a partitioned
//! distributed cache, used to avoid network round-trips when that is safe.
//! Safety is the hard part: the cluster's partition-to-node assignment
//! changes over time, and a client that missed an invalidation must not keep
//! serving the affected entries. [`NearCache`] answers that with a cheap
//! validity test: on a stable topology a read costs one pointer comparison
//! against the interned current [`TopologyVersion`]; after a topology change
//! the partition [`Affinity`] oracle is consulted once per entry and its
//! verdict cached until the next change.
//!
//! The cluster feeds the cache through two channels:
//!
//! - server-pushed updates ([`CacheUpdate`]) applied via
//!   [`NearCache::apply_update`], and
//! - the current version advanced on the [`VersionSource`] by the membership
//!   component.
//!
//! Reads go through [`NearCache::try_get`] and [`NearCache::get_or_insert`];
//! a miss is the caller's cue to fetch remotely.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use nearside::NearCache;
//! use nearside_topology::{CacheUpdate, TopologyVersion};
//! use nearside_topology::testing::ScriptedTopology;
//!
//! let topology = Arc::new(ScriptedTopology::new(16));
//! let cache = NearCache::builder::<String, i64>(topology.clone(), topology.clone())
//!     .name("products")
//!     .build();
//!
//! // The cluster pushes a value...
//! cache.apply_update(CacheUpdate::put("p1".to_string(), 250_i64, 4, TopologyVersion::new(1, 0)));
//! assert_eq!(cache.try_get::<String, i64>(&"p1".to_string()), Some(250));
//!
//! // ...topology changes and the entry's partition moves to a new primary.
//! topology.advance_to(TopologyVersion::new(2, 0));
//! topology.break_partition(4);
//! assert_eq!(cache.try_get::<String, i64>(&"p1".to_string()), None);
//! ```
//!
//! # Storage strategies
//!
//! The cache serves a homogeneous typed map for the declared `(K, V)` pair.
//! The first access under a different type pair permanently switches it to a
//! type-erased fallback map; entries held by the typed map at that moment are
//! dropped, which only costs cache effectiveness, never correctness.

pub mod builder;
pub mod cache;
mod entry;
mod storage;

#[doc(inline)]
pub use builder::NearCacheBuilder;
#[doc(inline)]
pub use cache::NearCache;
#[doc(inline)]
pub use nearside_topology::{Affinity, CacheUpdate, Partition, TopologyVersion, UpdateBody, VersionCell, VersionSource};
pub use storage::key_hash;
