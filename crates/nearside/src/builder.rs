// Copyright (c) The Nearside Project Authors.
// Licensed under the MIT License.

//! Builder for constructing near caches.

use std::any::Any;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

use nearside_topology::{Affinity, VersionSource};

use crate::NearCache;

/// Builder for a [`NearCache`].
///
/// Created by [`NearCache::builder`]. The version source and affinity oracle
/// are mandatory and supplied up front; the name is optional and used for
/// log correlation.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use nearside::NearCache;
/// use nearside_topology::testing::ScriptedTopology;
///
/// let topology = Arc::new(ScriptedTopology::new(16));
/// let cache = NearCache::builder::<String, i64>(topology.clone(), topology)
///     .name("products")
///     .build();
/// assert_eq!(cache.name(), "products");
/// ```
pub struct NearCacheBuilder<K, V> {
    name: &'static str,
    versions: Arc<dyn VersionSource>,
    affinity: Arc<dyn Affinity>,
    _phantom: PhantomData<fn(K, V)>,
}

impl<K, V> NearCacheBuilder<K, V>
where
    K: Any + Clone + Eq + Hash + Send + Sync,
    V: Any + Clone + Send + Sync,
{
    pub(crate) fn new(versions: Arc<dyn VersionSource>, affinity: Arc<dyn Affinity>) -> Self {
        Self {
            name: "near_cache",
            versions,
            affinity,
            _phantom: PhantomData,
        }
    }

    /// Sets the cache name used in log events.
    #[must_use]
    pub fn name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Builds the near cache.
    #[must_use]
    pub fn build(self) -> NearCache<K, V> {
        NearCache::new(self.name, self.versions, self.affinity)
    }
}

impl<K, V> fmt::Debug for NearCacheBuilder<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NearCacheBuilder").field("name", &self.name).finish_non_exhaustive()
    }
}
