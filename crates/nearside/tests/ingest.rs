// Copyright (c) The Nearside Project Authors.
// Licensed under the MIT License.

//! Integration tests for applying server-pushed updates.

use std::sync::Arc;

use nearside::{NearCache, key_hash};
use nearside_topology::testing::ScriptedTopology;
use nearside_topology::{CacheUpdate, TopologyVersion};

fn cache() -> (Arc<ScriptedTopology>, NearCache<String, i64>) {
    let topology = Arc::new(ScriptedTopology::new(16));
    let cache = NearCache::builder::<String, i64>(topology.clone(), topology.clone()).build();
    (topology, cache)
}

#[test]
fn pushed_value_is_served() {
    let (_topology, cache) = cache();
    cache.apply_update(CacheUpdate::put("k".to_string(), 10_i64, 2, TopologyVersion::new(1, 0)));
    assert_eq!(cache.try_get::<String, i64>(&"k".to_string()), Some(10));
}

#[test]
fn pushed_value_replaces_wholesale() {
    let (_topology, cache) = cache();
    cache.apply_update(CacheUpdate::put("k".to_string(), 10_i64, 2, TopologyVersion::new(1, 0)));
    cache.apply_update(CacheUpdate::put("k".to_string(), 20_i64, 2, TopologyVersion::new(1, 0)));

    assert_eq!(cache.try_get::<String, i64>(&"k".to_string()), Some(20));
    assert_eq!(cache.len(), 1);
}

#[test]
fn pushed_removal_takes_effect_immediately() {
    let (_topology, cache) = cache();
    cache.apply_update(CacheUpdate::put("k".to_string(), 10_i64, 2, TopologyVersion::new(1, 0)));

    cache.apply_update(CacheUpdate::<String, i64>::remove("k".to_string()));
    assert_eq!(cache.try_get::<String, i64>(&"k".to_string()), None);
}

#[test]
fn removal_of_an_absent_key_is_a_no_op() {
    let (_topology, cache) = cache();
    cache.apply_update(CacheUpdate::<String, i64>::remove("ghost".to_string()));
    assert_eq!(cache.len(), 0);
}

#[test]
fn pushed_partition_skips_lazy_resolution() {
    let (topology, cache) = cache();
    let key = "k".to_string();
    let partition = topology.partition_for_hash(key_hash(&key));
    cache.apply_update(CacheUpdate::put(key.clone(), 10_i64, partition, TopologyVersion::new(1, 0)));

    topology.advance_to(TopologyVersion::new(2, 0));
    assert_eq!(cache.try_get::<String, i64>(&key), Some(10));

    // The partition came with the push; the resolver was never needed.
    assert_eq!(topology.resolution_count(), 0);
    assert_eq!(topology.assignment_check_count(), 1);
}

#[test]
fn push_at_the_current_version_takes_the_identity_fast_path() {
    let (topology, cache) = cache();
    topology.advance_to(TopologyVersion::new(3, 0));

    cache.apply_update(CacheUpdate::put("k".to_string(), 10_i64, 2, TopologyVersion::new(3, 0)));

    for _ in 0..4 {
        assert_eq!(cache.try_get::<String, i64>(&"k".to_string()), Some(10));
    }
    assert_eq!(topology.assignment_check_count(), 0);
}

#[test]
fn push_at_an_older_version_is_revalidated_on_read() {
    let (topology, cache) = cache();
    topology.advance_to(TopologyVersion::new(3, 0));

    // A push produced before the topology advanced.
    cache.apply_update(CacheUpdate::put("k".to_string(), 10_i64, 2, TopologyVersion::new(2, 0)));

    assert_eq!(cache.try_get::<String, i64>(&"k".to_string()), Some(10));
    assert_eq!(topology.assignment_check_count(), 1);
}
