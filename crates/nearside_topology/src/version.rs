// Copyright (c) The Nearside Project Authors.
// Licensed under the MIT License.

//! Topology versions and the interned current-version source.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;

/// A marker of the cluster's partition-to-node assignment state.
///
/// Versions are totally ordered: the `major` component advances when nodes
/// join or leave, the `minor` component when the assignment is rebalanced
/// within the same membership.
///
/// # Examples
///
/// ```
/// use nearside_topology::TopologyVersion;
///
/// let before = TopologyVersion::new(4, 0);
/// let after = TopologyVersion::new(4, 1);
/// assert!(after > before);
/// assert_eq!(after.to_string(), "4.1");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TopologyVersion {
    major: i64,
    minor: i32,
}

impl TopologyVersion {
    /// Creates a version from its major and minor components.
    #[must_use]
    pub const fn new(major: i64, minor: i32) -> Self {
        Self { major, minor }
    }

    /// Returns the major component (membership revision).
    #[must_use]
    pub const fn major(self) -> i64 {
        self.major
    }

    /// Returns the minor component (rebalance revision within a membership).
    #[must_use]
    pub const fn minor(self) -> i32 {
        self.minor
    }
}

impl fmt::Display for TopologyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Source of the current topology version.
///
/// Implementations must be wait-free and must hand out the *same*
/// [`Arc`] for repeated calls while the topology is stable. Consumers rely on
/// this interning to compare versions by pointer identity first and only fall
/// back to structural comparison when identity fails.
pub trait VersionSource: Send + Sync {
    /// Returns the shared handle to the current topology version.
    fn current_version(&self) -> Arc<TopologyVersion>;
}

/// The standard [`VersionSource`]: an atomically swapped, interned version handle.
///
/// The cluster membership component owns a `VersionCell` and calls
/// [`advance`](Self::advance) as topology change events arrive; any number of
/// readers load the current handle without locking.
///
/// # Examples
///
/// ```
/// use nearside_topology::{TopologyVersion, VersionCell, VersionSource};
///
/// let cell = VersionCell::new(TopologyVersion::new(1, 0));
/// assert!(cell.advance(TopologyVersion::new(2, 0)));
///
/// // Regressions are ignored: versions only move forward.
/// assert!(!cell.advance(TopologyVersion::new(1, 5)));
/// assert_eq!(*cell.current_version(), TopologyVersion::new(2, 0));
/// ```
#[derive(Debug)]
pub struct VersionCell {
    current: ArcSwap<TopologyVersion>,
}

impl VersionCell {
    /// Creates a cell holding the given initial version.
    #[must_use]
    pub fn new(initial: TopologyVersion) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
        }
    }

    /// Moves the cell forward to `next`, interning a fresh shared handle.
    ///
    /// Out-of-order notifications are tolerated: a `next` that is not strictly
    /// newer than the current version leaves the cell (and its interned
    /// handle) untouched. Returns `true` if the cell advanced.
    pub fn advance(&self, next: TopologyVersion) -> bool {
        let prev = self.current.rcu(|cur| {
            if next > **cur {
                Arc::new(next)
            } else {
                Arc::clone(cur)
            }
        });
        next > *prev
    }
}

impl VersionSource for VersionCell {
    fn current_version(&self) -> Arc<TopologyVersion> {
        self.current.load_full()
    }
}
