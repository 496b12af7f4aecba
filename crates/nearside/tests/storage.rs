// Copyright (c) The Nearside Project Authors.
// Licensed under the MIT License.

//! Integration tests for the one-way switch to type-erased fallback storage.

use std::sync::Arc;

use nearside::NearCache;
use nearside_topology::testing::ScriptedTopology;
use nearside_topology::{CacheUpdate, TopologyVersion};

fn cache() -> (Arc<ScriptedTopology>, NearCache<String, i64>) {
    let topology = Arc::new(ScriptedTopology::new(16));
    let cache = NearCache::builder::<String, i64>(topology.clone(), topology.clone()).build();
    (topology, cache)
}

#[test]
fn mismatched_access_drops_typed_entries() {
    let (_topology, cache) = cache();
    cache.apply_update(CacheUpdate::put("k".to_string(), 1_i64, 0, TopologyVersion::new(1, 0)));
    assert_eq!(cache.try_get::<String, i64>(&"k".to_string()), Some(1));

    // A read under a different value type forces the fallback transition.
    assert_eq!(cache.try_get::<String, String>(&"k".to_string()), None);

    // Entries held by the retired typed map are no longer reachable.
    assert_eq!(cache.try_get::<String, i64>(&"k".to_string()), None);
    assert_eq!(cache.len(), 0);
}

#[test]
fn fallback_serves_multiple_type_pairings() {
    let (_topology, cache) = cache();

    // Different key type: switches to fallback storage.
    cache.apply_update(CacheUpdate::put(7_u32, "seven".to_string(), 1, TopologyVersion::new(1, 0)));
    assert_eq!(cache.try_get::<u32, String>(&7), Some("seven".to_string()));

    // The declared pairing keeps working through the fallback map.
    cache.apply_update(CacheUpdate::put("k".to_string(), 1_i64, 0, TopologyVersion::new(1, 0)));
    assert_eq!(cache.try_get::<String, i64>(&"k".to_string()), Some(1));

    assert_eq!(cache.len(), 2);
}

#[test]
fn transition_happens_only_once() {
    let (_topology, cache) = cache();

    // First mismatch transitions; an entry installed afterwards...
    cache.apply_update(CacheUpdate::put(7_u32, 70_i64, 1, TopologyVersion::new(1, 0)));
    assert_eq!(cache.try_get::<u32, i64>(&7), Some(70));

    // ...survives further accesses under yet another pairing, proving no
    // second transition dropped the fallback map.
    assert_eq!(cache.try_get::<bool, bool>(&true), None);
    assert_eq!(cache.try_get::<u32, i64>(&7), Some(70));
}

#[test]
fn get_or_insert_works_through_the_fallback() {
    let (_topology, cache) = cache();

    let value = cache.get_or_insert(&42_u64, || "computed".to_string());
    assert_eq!(value, "computed");
    assert_eq!(cache.try_get::<u64, String>(&42), Some("computed".to_string()));

    let again = cache.get_or_insert::<u64, String>(&42, || unreachable!());
    assert_eq!(again, "computed");
}

#[test]
fn same_key_value_under_wrong_value_type_misses_without_evicting() {
    let (_topology, cache) = cache();
    cache.apply_update(CacheUpdate::put(7_u32, 70_i64, 1, TopologyVersion::new(1, 0)));

    // Valid entry, but viewed under the wrong value type: a miss.
    assert_eq!(cache.try_get::<u32, String>(&7), None);
    // The entry itself is untouched.
    assert_eq!(cache.try_get::<u32, i64>(&7), Some(70));
}

#[test]
fn contains_key_with_foreign_key_type_switches_storage() {
    let (_topology, cache) = cache();
    cache.apply_update(CacheUpdate::put("k".to_string(), 1_i64, 0, TopologyVersion::new(1, 0)));

    assert!(!cache.contains_key(&3_u8));

    // The typed map was retired by the probe above.
    assert_eq!(cache.try_get::<String, i64>(&"k".to_string()), None);
}

#[test]
fn removal_updates_apply_to_the_fallback_map() {
    let (_topology, cache) = cache();
    cache.apply_update(CacheUpdate::put(7_u32, 70_i64, 1, TopologyVersion::new(1, 0)));
    assert_eq!(cache.len(), 1);

    cache.apply_update(CacheUpdate::<u32, i64>::remove(7));
    assert_eq!(cache.try_get::<u32, i64>(&7), None);
    assert_eq!(cache.len(), 0);
}

#[test]
fn stop_clears_fallback_storage_too() {
    let (_topology, cache) = cache();
    cache.apply_update(CacheUpdate::put(7_u32, 70_i64, 1, TopologyVersion::new(1, 0)));

    cache.stop();
    assert_eq!(cache.try_get::<u32, i64>(&7), None);
    assert_eq!(cache.len(), 0);
}
