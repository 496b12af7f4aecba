// Copyright (c) The Nearside Project Authors.
// Licensed under the MIT License.

//! The near cache entry: a value plus its validity bookkeeping.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use arc_swap::{ArcSwapOption, Guard};
use nearside_topology::{Partition, TopologyVersion};

/// Sentinel for a partition that has not been resolved yet.
const UNKNOWN_PARTITION: i64 = -1;

/// The version token last confirmed for an entry, as observed by one load.
pub(crate) type VersionGuard = Guard<Option<Arc<TopologyVersion>>>;

/// A locally mirrored value together with the topology version it was last
/// confirmed at and the partition its key belongs to.
///
/// The value is immutable for the lifetime of the entry instance; updates
/// replace the whole entry in the map. The version field is the mutable part:
/// `None` means the entry was confirmed invalid, and all transitions go
/// through a pointer-guarded compare-and-swap so concurrent validators
/// converge on one final state instead of flip-flopping.
pub(crate) struct NearCacheEntry<V> {
    value: V,
    version: ArcSwapOption<TopologyVersion>,
    partition: AtomicI64,
}

impl<V> NearCacheEntry<V> {
    pub(crate) fn new(value: V, version: Arc<TopologyVersion>, partition: Option<Partition>) -> Self {
        Self {
            value,
            version: ArcSwapOption::from(Some(version)),
            partition: AtomicI64::new(partition.map_or(UNKNOWN_PARTITION, i64::from)),
        }
    }

    pub(crate) fn value(&self) -> &V {
        &self.value
    }

    /// Loads the entry's current version token.
    ///
    /// The returned guard doubles as the witness for
    /// [`compare_exchange_version`](Self::compare_exchange_version).
    pub(crate) fn load_version(&self) -> VersionGuard {
        self.version.load()
    }

    /// Replaces the version token with `next`, but only if the entry still
    /// holds the exact token `seen` was loaded from.
    ///
    /// Losing the race is silent: whichever transition landed first stands,
    /// and the entry is simply re-evaluated on the next access.
    pub(crate) fn compare_exchange_version(&self, seen: &VersionGuard, next: Option<Arc<TopologyVersion>>) {
        let _previous = self.version.compare_and_swap(seen, next);
    }

    /// The key's partition, if already resolved.
    pub(crate) fn partition(&self) -> Option<Partition> {
        let raw = self.partition.load(Ordering::Acquire);
        u32::try_from(raw).ok()
    }

    /// Records the key's partition, first resolution wins.
    ///
    /// Returns the partition actually stored on the entry, which may differ
    /// from `partition` if a concurrent resolver got there first.
    pub(crate) fn resolve_partition(&self, partition: Partition) -> Partition {
        match self.partition.compare_exchange(
            UNKNOWN_PARTITION,
            i64::from(partition),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => partition,
            Err(existing) => u32::try_from(existing).unwrap_or(partition),
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for NearCacheEntry<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NearCacheEntry")
            .field("value", &self.value)
            .field("version", &self.version.load().as_deref())
            .field("partition", &self.partition())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(major: i64) -> Arc<TopologyVersion> {
        Arc::new(TopologyVersion::new(major, 0))
    }

    #[test]
    fn new_entry_holds_its_token() {
        let ver = token(1);
        let entry = NearCacheEntry::new("v", Arc::clone(&ver), None);

        let seen = entry.load_version();
        assert!(Arc::ptr_eq(seen.as_ref().unwrap(), &ver));
        assert_eq!(entry.partition(), None);
    }

    #[test]
    fn guarded_promotion_succeeds_against_the_witnessed_token() {
        let entry = NearCacheEntry::new(7, token(1), Some(3));
        let seen = entry.load_version();
        let newer = token(2);

        entry.compare_exchange_version(&seen, Some(Arc::clone(&newer)));

        let after = entry.load_version();
        assert!(Arc::ptr_eq(after.as_ref().unwrap(), &newer));
    }

    #[test]
    fn stale_witness_loses_the_race() {
        let entry = NearCacheEntry::new(7, token(1), None);
        let stale = entry.load_version();

        // Another validator demotes the entry first.
        let other = entry.load_version();
        entry.compare_exchange_version(&other, None);

        // The stale witness must not resurrect the entry.
        entry.compare_exchange_version(&stale, Some(token(3)));
        assert!(entry.load_version().is_none());
    }

    #[test]
    fn demotion_sticks() {
        let entry = NearCacheEntry::new(7, token(1), None);
        let seen = entry.load_version();
        entry.compare_exchange_version(&seen, None);
        assert!(entry.load_version().is_none());
    }

    #[test]
    fn first_partition_resolution_wins() {
        let entry = NearCacheEntry::new((), token(1), None);

        assert_eq!(entry.resolve_partition(5), 5);
        assert_eq!(entry.resolve_partition(9), 5);
        assert_eq!(entry.partition(), Some(5));
    }

    #[test]
    fn pushed_partition_is_kept() {
        let entry = NearCacheEntry::new((), token(1), Some(12));
        assert_eq!(entry.partition(), Some(12));
        assert_eq!(entry.resolve_partition(4), 12);
    }
}
