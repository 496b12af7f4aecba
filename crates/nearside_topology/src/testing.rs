// Copyright (c) The Nearside Project Authors.
// Licensed under the MIT License.

//! Scripted topology fakes for testing near cache consumers.
//!
//! [`ScriptedTopology`] plays both the [`VersionSource`] and [`Affinity`]
//! roles and lets a test drive topology changes by hand: advance the version,
//! mark partition assignments as broken, and observe how often the cache
//! consulted the oracle.

use std::any::Any;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::{Affinity, Partition, TopologyVersion, VersionCell, VersionSource};

/// A hand-driven topology for tests.
///
/// Keys map to partitions by `key_hash % partitions`. All assignments start
/// out valid; [`break_partition`](Self::break_partition) marks a partition's
/// recorded ownership views as stale, which is what a primary-node change
/// looks like to the near cache.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use nearside_topology::TopologyVersion;
/// use nearside_topology::testing::ScriptedTopology;
///
/// let topology = Arc::new(ScriptedTopology::new(16));
/// topology.advance_to(TopologyVersion::new(2, 0));
/// topology.break_partition(3);
/// ```
#[derive(Debug)]
pub struct ScriptedTopology {
    cell: VersionCell,
    partitions: u32,
    broken: Mutex<HashSet<Partition>>,
    resolutions: AtomicUsize,
    assignment_checks: AtomicUsize,
}

impl ScriptedTopology {
    /// Creates a topology with the given partition count, at version `1.0`.
    #[must_use]
    pub fn new(partitions: u32) -> Self {
        assert!(partitions > 0, "partition count must be non-zero");
        Self {
            cell: VersionCell::new(TopologyVersion::new(1, 0)),
            partitions,
            broken: Mutex::new(HashSet::new()),
            resolutions: AtomicUsize::new(0),
            assignment_checks: AtomicUsize::new(0),
        }
    }

    /// Advances the current version, as a membership event would.
    pub fn advance_to(&self, version: TopologyVersion) {
        self.cell.advance(version);
    }

    /// Marks ownership views of `partition` recorded at older versions as stale.
    pub fn break_partition(&self, partition: Partition) {
        self.broken.lock().insert(partition);
    }

    /// Undoes [`break_partition`](Self::break_partition).
    pub fn repair_partition(&self, partition: Partition) {
        self.broken.lock().remove(&partition);
    }

    /// The partition a given key hash maps to.
    #[must_use]
    pub fn partition_for_hash(&self, key_hash: u64) -> Partition {
        u32::try_from(key_hash % u64::from(self.partitions)).unwrap_or_default()
    }

    /// Number of `resolve_partition` calls observed.
    #[must_use]
    pub fn resolution_count(&self) -> usize {
        self.resolutions.load(Ordering::Relaxed)
    }

    /// Number of `is_assignment_valid` calls observed.
    #[must_use]
    pub fn assignment_check_count(&self) -> usize {
        self.assignment_checks.load(Ordering::Relaxed)
    }
}

impl VersionSource for ScriptedTopology {
    fn current_version(&self) -> Arc<TopologyVersion> {
        self.cell.current_version()
    }
}

impl Affinity for ScriptedTopology {
    fn resolve_partition(&self, key: &(dyn Any + Send + Sync), key_hash: u64) -> Partition {
        let _ = key;
        self.resolutions.fetch_add(1, Ordering::Relaxed);
        self.partition_for_hash(key_hash)
    }

    fn is_assignment_valid(&self, recorded: TopologyVersion, partition: Partition) -> bool {
        let _ = recorded;
        self.assignment_checks.fetch_add(1, Ordering::Relaxed);
        !self.broken.lock().contains(&partition)
    }
}
