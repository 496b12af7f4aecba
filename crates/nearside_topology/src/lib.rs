// Copyright (c) The Nearside Project Authors.
// Licensed under the MIT License.

#![cfg_attr(docsrs, feature(doc_cfg))]

//! Topology version and partition affinity contracts for the nearside near cache.
//!
//! A partitioned cluster assigns every partition to a primary node, and revises
//! that assignment whenever membership changes. Each revision is stamped with a
//! monotonically increasing [`TopologyVersion`]. A client-side near cache needs
//! two things from the surrounding cluster machinery to decide whether a locally
//! held entry is still trustworthy:
//!
//! - the *current* topology version, obtained through [`VersionSource`], and
//! - the partition [`Affinity`] oracle, which maps keys to partitions and
//!   answers whether a partition-ownership view recorded at an older version is
//!   still correct today.
//!
//! [`VersionCell`] is the standard [`VersionSource`] implementation: it interns
//! the current version behind a shared handle so that repeated reads on a stable
//! topology return the *same* [`Arc`](std::sync::Arc), letting consumers use
//! pointer identity as a fast path before falling back to structural comparison.
//!
//! [`CacheUpdate`] is the decoded form of a server-pushed near cache update;
//! wire decoding itself belongs to the client's marshalling layer, not here.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use nearside_topology::{TopologyVersion, VersionCell, VersionSource};
//!
//! let cell = VersionCell::new(TopologyVersion::new(1, 0));
//!
//! let a = cell.current_version();
//! let b = cell.current_version();
//! assert!(Arc::ptr_eq(&a, &b)); // stable topology: same shared handle
//!
//! cell.advance(TopologyVersion::new(2, 0));
//! let c = cell.current_version();
//! assert!(!Arc::ptr_eq(&a, &c));
//! assert!(*c > *a);
//! ```

mod affinity;
#[cfg(any(feature = "test-util", test))]
pub mod testing;
mod update;
mod version;

pub use affinity::{Affinity, Partition};
pub use update::{CacheUpdate, UpdateBody};
pub use version::{TopologyVersion, VersionCell, VersionSource};
