// Copyright (c) The Nearside Project Authors.
// Licensed under the MIT License.

//! The near cache: a local mirror of remote entries with a cheap validity test.

use std::any::Any;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::mapref::entry::Entry;
use nearside_topology::{Affinity, CacheUpdate, TopologyVersion, UpdateBody, VersionSource};
use tracing::{debug, trace};

use crate::builder::NearCacheBuilder;
use crate::entry::NearCacheEntry;
use crate::storage::{ActiveMap, ErasedKey, ErasedValue, Storage, key_hash};

/// A client-local mirror of a subset of a partitioned distributed cache.
///
/// The cache holds key/value pairs pushed by the cluster and answers reads
/// without a network round-trip for as long as the entries can still be
/// trusted. Trust hinges on cluster topology: when the primary node for a
/// partition changes, entries in that partition stop receiving invalidation
/// updates and must not be served. Every read therefore runs a validity test
/// against the current [`TopologyVersion`] and the partition [`Affinity`]
/// oracle, lazily evicting entries that fail it.
///
/// On a stable topology the test is a single pointer comparison between the
/// entry's interned version handle and the current one; the oracle is only
/// consulted after a topology change, and its verdict is cached on the entry
/// until the next change.
///
/// All operations are safe to call from any number of threads; nothing here
/// blocks on I/O.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use nearside::NearCache;
/// use nearside_topology::{CacheUpdate, TopologyVersion};
/// use nearside_topology::testing::ScriptedTopology;
///
/// let topology = Arc::new(ScriptedTopology::new(16));
/// let cache = NearCache::builder::<String, i64>(topology.clone(), topology).build();
///
/// cache.apply_update(CacheUpdate::put("answer".to_string(), 42_i64, 3, TopologyVersion::new(1, 0)));
/// assert_eq!(cache.try_get::<String, i64>(&"answer".to_string()), Some(42));
///
/// cache.apply_update(CacheUpdate::<String, i64>::remove("answer".to_string()));
/// assert_eq!(cache.try_get::<String, i64>(&"answer".to_string()), None);
/// ```
pub struct NearCache<K, V> {
    name: &'static str,
    versions: Arc<dyn VersionSource>,
    affinity: Arc<dyn Affinity>,
    storage: Storage<K, V>,
    stopped: AtomicBool,
}

impl NearCache<(), ()> {
    /// Creates a new near cache builder bound to a version source and an
    /// affinity oracle.
    ///
    /// `K` and `V` declare the expected key/value type pair; accesses made
    /// under a different pair permanently switch the cache to type-erased
    /// fallback storage.
    #[must_use]
    pub fn builder<K, V>(versions: Arc<dyn VersionSource>, affinity: Arc<dyn Affinity>) -> NearCacheBuilder<K, V>
    where
        K: Any + Clone + Eq + Hash + Send + Sync,
        V: Any + Clone + Send + Sync,
    {
        NearCacheBuilder::new(versions, affinity)
    }
}

impl<K, V> NearCache<K, V>
where
    K: Any + Clone + Eq + Hash + Send + Sync,
    V: Any + Clone + Send + Sync,
{
    pub(crate) fn new(name: &'static str, versions: Arc<dyn VersionSource>, affinity: Arc<dyn Affinity>) -> Self {
        Self {
            name,
            versions,
            affinity,
            storage: Storage::new(name),
            stopped: AtomicBool::new(false),
        }
    }

    /// Returns the cache name used in log events.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether [`stop`](Self::stop) has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Looks up a key, returning its value only if the entry is still valid
    /// under the current topology.
    ///
    /// Invalid entries are evicted on the way out (best effort: racing with a
    /// concurrent re-insert can at worst cause a spurious miss, never a wrong
    /// hit). A stopped cache always misses.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use nearside::NearCache;
    /// use nearside_topology::testing::ScriptedTopology;
    ///
    /// let topology = Arc::new(ScriptedTopology::new(16));
    /// let cache = NearCache::builder::<String, i64>(topology.clone(), topology).build();
    ///
    /// assert_eq!(cache.try_get::<String, i64>(&"missing".to_string()), None);
    /// ```
    pub fn try_get<TK, TV>(&self, key: &TK) -> Option<TV>
    where
        TK: Any + Clone + Eq + Hash + Send + Sync,
        TV: Any + Clone + Send + Sync,
    {
        if self.is_stopped() {
            return None;
        }

        let hash = key_hash(key);
        let key_any = key as &(dyn Any + Send + Sync);

        match self.storage.active::<TK, TV>() {
            ActiveMap::Typed(map) => {
                let typed_key: &K = routed(key);
                let entry = map.get(typed_key).map(|r| Arc::clone(r.value()))?;
                if self.entry_is_valid(&entry, key_any, hash) {
                    Some(routed::<V, TV>(entry.value()).clone())
                } else {
                    trace!(cache = self.name, "evicting invalidated near cache entry");
                    map.remove(typed_key);
                    None
                }
            }
            ActiveMap::Fallback(fallback) => {
                let erased_key = ErasedKey::from_ref(key, hash);
                let entry = fallback.get(&erased_key).map(|r| Arc::clone(r.value()))?;
                if self.entry_is_valid(&entry, key_any, hash) {
                    // A valid entry viewed under the wrong value type is a miss.
                    entry.value().downcast_ref::<TV>().cloned()
                } else {
                    trace!(cache = self.name, "evicting invalidated near cache entry");
                    fallback.remove(&erased_key);
                    None
                }
            }
        }
    }

    /// Returns the cached value for a key, or computes, caches, and returns
    /// a fresh one.
    ///
    /// The current topology version is captured *before* `compute` runs, so
    /// an invalidation racing with a slow computation cannot make the new
    /// entry look newer than it is. Concurrent callers for the same absent
    /// key may each compute independently; whichever entry is installed
    /// first wins and later callers observe it. A stopped cache computes
    /// without caching.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use nearside::NearCache;
    /// use nearside_topology::testing::ScriptedTopology;
    ///
    /// let topology = Arc::new(ScriptedTopology::new(16));
    /// let cache = NearCache::builder::<String, i64>(topology.clone(), topology).build();
    ///
    /// let value = cache.get_or_insert(&"k".to_string(), || 7_i64);
    /// assert_eq!(value, 7);
    /// // Second call is served locally.
    /// let value = cache.get_or_insert::<String, i64>(&"k".to_string(), || unreachable!());
    /// assert_eq!(value, 7);
    /// ```
    pub fn get_or_insert<TK, TV>(&self, key: &TK, compute: impl FnOnce() -> TV) -> TV
    where
        TK: Any + Clone + Eq + Hash + Send + Sync,
        TV: Any + Clone + Send + Sync,
    {
        if self.is_stopped() {
            return compute();
        }

        let hash = key_hash(key);
        let key_any = key as &(dyn Any + Send + Sync);

        match self.storage.active::<TK, TV>() {
            ActiveMap::Typed(map) => {
                let typed_key: &K = routed(key);
                if let Some(entry) = map.get(typed_key).map(|r| Arc::clone(r.value())) {
                    if self.entry_is_valid(&entry, key_any, hash) {
                        return routed::<V, TV>(entry.value()).clone();
                    }
                }

                // Capture the version before computing: see the method docs.
                let version = self.versions.current_version();
                let value = compute();
                let entry = Arc::new(NearCacheEntry::new(coerce::<TV, V>(value.clone()), version, None));

                match map.entry(typed_key.clone()) {
                    Entry::Occupied(mut occupied) => {
                        if self.entry_is_valid(occupied.get(), key_any, hash) {
                            return routed::<V, TV>(occupied.get().value()).clone();
                        }
                        occupied.insert(entry);
                        value
                    }
                    Entry::Vacant(vacant) => {
                        vacant.insert(entry);
                        value
                    }
                }
            }
            ActiveMap::Fallback(fallback) => {
                let erased_key = ErasedKey::from_ref(key, hash);
                if let Some(entry) = fallback.get(&erased_key).map(|r| Arc::clone(r.value())) {
                    if self.entry_is_valid(&entry, key_any, hash) {
                        if let Some(existing) = entry.value().downcast_ref::<TV>() {
                            return existing.clone();
                        }
                    }
                }

                let version = self.versions.current_version();
                let value = compute();
                let erased: ErasedValue = Arc::new(value.clone());
                let entry = Arc::new(NearCacheEntry::new(erased, version, None));

                match fallback.entry(erased_key) {
                    Entry::Occupied(mut occupied) => {
                        if self.entry_is_valid(occupied.get(), key_any, hash) {
                            if let Some(existing) = occupied.get().value().downcast_ref::<TV>() {
                                return existing.clone();
                            }
                        }
                        occupied.insert(entry);
                        value
                    }
                    Entry::Vacant(vacant) => {
                        vacant.insert(entry);
                        value
                    }
                }
            }
        }
    }

    /// Whether a still-valid entry exists for the key.
    ///
    /// Unlike [`try_get`](Self::try_get) this neither clones the value nor
    /// evicts invalid entries.
    pub fn contains_key<TK>(&self, key: &TK) -> bool
    where
        TK: Any + Clone + Eq + Hash + Send + Sync,
    {
        if self.is_stopped() {
            return false;
        }

        let hash = key_hash(key);
        let key_any = key as &(dyn Any + Send + Sync);

        match self.storage.active::<TK, V>() {
            ActiveMap::Typed(map) => map
                .get(routed::<TK, K>(key))
                .map(|r| Arc::clone(r.value()))
                .is_some_and(|entry| self.entry_is_valid(&entry, key_any, hash)),
            ActiveMap::Fallback(fallback) => fallback
                .get(&ErasedKey::from_ref(key, hash))
                .map(|r| Arc::clone(r.value()))
                .is_some_and(|entry| self.entry_is_valid(&entry, key_any, hash)),
        }
    }

    /// Number of entries currently valid under the topology.
    ///
    /// This is a diagnostic operation and scans the whole map; it is not a
    /// hot path. A stopped cache reports zero.
    #[must_use]
    pub fn len(&self) -> usize {
        if self.is_stopped() {
            return 0;
        }

        match self.storage.active::<K, V>() {
            ActiveMap::Typed(map) => map
                .iter()
                .filter(|r| self.entry_is_valid(r.value(), r.key() as &(dyn Any + Send + Sync), key_hash(r.key())))
                .count(),
            ActiveMap::Fallback(fallback) => fallback
                .iter()
                .filter(|r| self.entry_is_valid(r.value(), r.key().any(), r.key().precomputed_hash()))
                .count(),
        }
    }

    /// Whether the cache currently holds no valid entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Applies a server-pushed update: installs a fresh value or drops a key.
    ///
    /// Entries are replaced wholesale, never mutated in place. When the
    /// pushed version equals the current one, the entry reuses the shared
    /// current version handle so subsequent reads take the pointer-identity
    /// fast path. Ingest is fire and forget; a lost update leaves the key to
    /// be corrected by the next validity check or push. A stopped cache
    /// ignores updates.
    pub fn apply_update<TK, TV>(&self, update: CacheUpdate<TK, TV>)
    where
        TK: Any + Clone + Eq + Hash + Send + Sync,
        TV: Any + Clone + Send + Sync,
    {
        if self.is_stopped() {
            return;
        }

        let CacheUpdate { key, body } = update;
        let hash = key_hash(&key);

        match self.storage.active::<TK, TV>() {
            ActiveMap::Typed(map) => match body {
                UpdateBody::Put {
                    value,
                    partition,
                    version,
                } => {
                    let entry = NearCacheEntry::new(coerce::<TV, V>(value), self.intern(version), Some(partition));
                    map.insert(coerce::<TK, K>(key), Arc::new(entry));
                }
                UpdateBody::Remove => {
                    map.remove(&coerce::<TK, K>(key));
                }
            },
            ActiveMap::Fallback(fallback) => match body {
                UpdateBody::Put {
                    value,
                    partition,
                    version,
                } => {
                    let erased: ErasedValue = Arc::new(value);
                    let entry = NearCacheEntry::new(erased, self.intern(version), Some(partition));
                    fallback.insert(ErasedKey::from_owned(key, hash), Arc::new(entry));
                }
                UpdateBody::Remove => {
                    fallback.remove(&ErasedKey::from_owned(key, hash));
                }
            },
        }
    }

    /// Evicts every entry while leaving the cache usable.
    pub fn clear(&self) {
        debug!(cache = self.name, "clearing near cache");
        self.storage.clear();
    }

    /// Permanently stops the cache and releases its storage.
    ///
    /// Afterwards all reads miss, [`get_or_insert`](Self::get_or_insert)
    /// always computes, and pushed updates are ignored. The instance is not
    /// reusable.
    pub fn stop(&self) {
        debug!(cache = self.name, "stopping near cache");
        self.stopped.store(true, Ordering::Release);
        self.storage.clear();
    }

    /// Reuses the shared current version handle when the pushed version
    /// matches it by value, preserving the identity fast path.
    fn intern(&self, version: TopologyVersion) -> Arc<TopologyVersion> {
        let current = self.versions.current_version();
        if *current == version { current } else { Arc::new(version) }
    }

    /// Decides whether an entry may be served without consulting the cluster,
    /// updating the entry's bookkeeping so future checks are cheaper.
    ///
    /// When the primary node for a key's partition changes, the entry stops
    /// receiving updates because the invalidation subscription on the new
    /// primary is not yet established; the affinity oracle is the authority
    /// on whether that happened. Its verdict is recorded on the entry via a
    /// guarded compare-and-swap so racing validators converge on one state.
    fn entry_is_valid<EV>(&self, entry: &Arc<NearCacheEntry<EV>>, key: &(dyn Any + Send + Sync), hash: u64) -> bool {
        let current = self.versions.current_version();
        let seen = entry.load_version();

        let Some(entry_version) = seen.as_ref() else {
            // Previously confirmed invalid.
            return false;
        };

        if Arc::ptr_eq(entry_version, &current) {
            // Happy path on a stable topology.
            return true;
        }

        if **entry_version >= *current {
            return true;
        }

        let partition = match entry.partition() {
            Some(partition) => partition,
            None => entry.resolve_partition(self.affinity.resolve_partition(key, hash)),
        };

        let valid = self.affinity.is_assignment_valid(**entry_version, partition);
        entry.compare_exchange_version(&seen, valid.then(|| Arc::clone(&current)));
        valid
    }
}

/// Borrows a value under the type the storage routing already proved it has.
fn routed<Src: Any, Dst: Any>(value: &Src) -> &Dst {
    match (value as &dyn Any).downcast_ref::<Dst>() {
        Some(value) => value,
        None => unreachable!("storage routing guarantees matching types"),
    }
}

/// Moves a value into the type the storage routing already proved it has.
fn coerce<Src: Any, Dst: Any>(value: Src) -> Dst {
    match (Box::new(value) as Box<dyn Any>).downcast::<Dst>() {
        Ok(value) => *value,
        Err(_) => unreachable!("storage routing guarantees matching types"),
    }
}

impl<K, V> fmt::Debug for NearCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NearCache")
            .field("name", &self.name)
            .field("stopped", &self.stopped)
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}
