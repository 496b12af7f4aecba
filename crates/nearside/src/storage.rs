// Copyright (c) The Nearside Project Authors.
// Licensed under the MIT License.

//! The storage-strategy switch: a typed map with a one-way, type-erased fallback.
//!
//! A near cache is normally accessed under one consistent key/value type pair
//! and serves entries from a homogeneous, box-free map. The same underlying
//! cache can however be reached through differently parameterized views (for
//! example a binary view next to the typed one). The first access whose type
//! pair does not match the typed map permanently retires it and routes all
//! traffic to a type-erased fallback map. Supporting oscillation between the
//! two would reintroduce the races the one-way switch exists to prevent, so
//! the transition is irreversible for the lifetime of the cache.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use tracing::debug;

use crate::entry::NearCacheEntry;

/// A value held by the fallback map, erased to its `Any` form.
pub(crate) type ErasedValue = Arc<dyn Any + Send + Sync>;

pub(crate) type TypedMap<K, V> = DashMap<K, Arc<NearCacheEntry<V>>>;
pub(crate) type FallbackMap = DashMap<ErasedKey, Arc<NearCacheEntry<ErasedValue>>>;

/// Computes the hash a key contributes to partition resolution and to the
/// fallback map.
///
/// A fixed hasher, so the value is stable across typed and erased accesses
/// to the same key and can be handed to [`Affinity`](nearside_topology::Affinity)
/// implementations.
pub fn key_hash<K: Hash + ?Sized>(key: &K) -> u64 {
    let mut hasher = rustc_hash::FxHasher::default();
    key.hash(&mut hasher);
    hasher.finish()
}

/// A key in the fallback map: the erased key value plus enough monomorphic
/// machinery to hash and compare it.
pub(crate) struct ErasedKey {
    hash: u64,
    type_id: TypeId,
    key: Arc<dyn Any + Send + Sync>,
    eq: fn(&(dyn Any + Send + Sync), &(dyn Any + Send + Sync)) -> bool,
}

impl ErasedKey {
    pub(crate) fn from_owned<K>(key: K, hash: u64) -> Self
    where
        K: Any + Eq + Send + Sync,
    {
        Self {
            hash,
            type_id: TypeId::of::<K>(),
            key: Arc::new(key),
            eq: erased_eq::<K>,
        }
    }

    pub(crate) fn from_ref<K>(key: &K, hash: u64) -> Self
    where
        K: Any + Clone + Eq + Send + Sync,
    {
        Self::from_owned(key.clone(), hash)
    }

    /// The erased key value, for partition resolution.
    pub(crate) fn any(&self) -> &(dyn Any + Send + Sync) {
        &*self.key
    }

    /// The precomputed key hash.
    pub(crate) fn precomputed_hash(&self) -> u64 {
        self.hash
    }
}

fn erased_eq<K: Any + Eq>(a: &(dyn Any + Send + Sync), b: &(dyn Any + Send + Sync)) -> bool {
    match (a.downcast_ref::<K>(), b.downcast_ref::<K>()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

impl PartialEq for ErasedKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && (self.eq)(&*self.key, &*other.key)
    }
}

impl Eq for ErasedKey {}

impl Hash for ErasedKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl Clone for ErasedKey {
    fn clone(&self) -> Self {
        Self {
            hash: self.hash,
            type_id: self.type_id,
            key: Arc::clone(&self.key),
            eq: self.eq,
        }
    }
}

impl fmt::Debug for ErasedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedKey")
            .field("hash", &self.hash)
            .field("type_id", &self.type_id)
            .finish_non_exhaustive()
    }
}

/// The map currently serving a given access.
pub(crate) enum ActiveMap<'a, K, V> {
    /// The homogeneous typed map.
    Typed(Arc<TypedMap<K, V>>),
    /// The type-erased fallback map.
    Fallback(&'a FallbackMap),
}

/// Two-state storage with a single irreversible edge from typed to fallback.
pub(crate) struct Storage<K, V> {
    name: &'static str,
    typed: ArcSwapOption<TypedMap<K, V>>,
    fallback: OnceCell<FallbackMap>,
}

impl<K, V> Storage<K, V>
where
    K: Any + Eq + Hash + Send + Sync,
    V: Any + Send + Sync,
{
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            typed: ArcSwapOption::from_pointee(TypedMap::new()),
            fallback: OnceCell::new(),
        }
    }

    /// Routes an access made under the type pair `(TK, TV)` to the map that
    /// must serve it, switching to the fallback when the pair does not match
    /// the declared `(K, V)`.
    pub(crate) fn active<TK: Any, TV: Any>(&self) -> ActiveMap<'_, K, V> {
        loop {
            if let Some(fallback) = self.fallback.get() {
                return ActiveMap::Fallback(fallback);
            }

            if TypeId::of::<TK>() == TypeId::of::<K>() && TypeId::of::<TV>() == TypeId::of::<V>() {
                if let Some(map) = self.typed.load_full() {
                    return ActiveMap::Typed(map);
                }
                // Lost a race with a concurrent transition: the typed map is
                // already retired, so the fallback is observable on retry.
                continue;
            }

            return ActiveMap::Fallback(self.activate_fallback());
        }
    }

    /// Ensures the fallback map exists and retires the typed map.
    ///
    /// Construction happens exactly once even under contention; the typed
    /// map's entries are dropped, not migrated. A cold fallback map is safe
    /// because a near cache miss only triggers a remote fetch.
    fn activate_fallback(&self) -> &FallbackMap {
        let mut constructed = false;
        let fallback = self.fallback.get_or_init(|| {
            constructed = true;
            FallbackMap::new()
        });

        if self.typed.load().is_some() {
            self.typed.store(None);
        }

        if constructed {
            debug!(cache = self.name, "near cache switched to type-erased fallback storage");
        }

        fallback
    }

    /// Whether the one-way switch has happened.
    #[cfg(test)]
    pub(crate) fn fallback_active(&self) -> bool {
        self.fallback.get().is_some()
    }

    /// Evicts all entries from whichever maps exist.
    pub(crate) fn clear(&self) {
        if let Some(typed) = self.typed.load_full() {
            typed.clear();
        }
        if let Some(fallback) = self.fallback.get() {
            fallback.clear();
        }
    }
}

impl<K, V> fmt::Debug for Storage<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("name", &self.name)
            .field("fallback_active", &self.fallback.get().is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_hash_is_stable() {
        assert_eq!(key_hash(&"alpha"), key_hash(&"alpha"));
    }

    #[test]
    fn erased_keys_compare_by_value_within_a_type() {
        let a = ErasedKey::from_owned("k1".to_string(), key_hash(&"k1".to_string()));
        let b = ErasedKey::from_owned("k1".to_string(), key_hash(&"k1".to_string()));
        let c = ErasedKey::from_owned("k2".to_string(), key_hash(&"k2".to_string()));

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn erased_keys_of_different_types_never_compare_equal() {
        let s = ErasedKey::from_owned("1".to_string(), 99);
        let n = ErasedKey::from_owned(1_i64, 99);
        assert_ne!(s, n);
    }

    #[test]
    fn matching_types_use_the_typed_map() {
        let storage: Storage<String, i64> = Storage::new("test");
        assert!(matches!(storage.active::<String, i64>(), ActiveMap::Typed(_)));
        assert!(!storage.fallback_active());
    }

    #[test]
    fn mismatched_types_switch_once_and_for_all() {
        let storage: Storage<String, i64> = Storage::new("test");

        assert!(matches!(storage.active::<String, String>(), ActiveMap::Fallback(_)));
        assert!(storage.fallback_active());

        // Even a matching pair now routes to the fallback.
        assert!(matches!(storage.active::<String, i64>(), ActiveMap::Fallback(_)));
    }

    #[test]
    fn clear_empties_both_maps() {
        let storage: Storage<String, i64> = Storage::new("test");
        if let ActiveMap::Typed(map) = storage.active::<String, i64>() {
            map.insert(
                "k".to_string(),
                Arc::new(NearCacheEntry::new(
                    1_i64,
                    Arc::new(nearside_topology::TopologyVersion::new(1, 0)),
                    None,
                )),
            );
        }
        storage.clear();
        if let ActiveMap::Typed(map) = storage.active::<String, i64>() {
            assert!(map.is_empty());
        }
    }
}
