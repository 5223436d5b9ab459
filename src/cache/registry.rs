//! Cache registry: every named cache in the process.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::{CacheConfig, TypedCache};

/// Repositories ask the registry for their caches by name, so two
/// components naming the same cache share it.
#[derive(Clone, Default)]
pub struct CacheRegistry {
    caches: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

struct CacheEntry {
    cache: Box<dyn Any + Send + Sync>,
    type_id: TypeId,
    type_name: &'static str,
    entry_count: Box<dyn Fn() -> u64 + Send + Sync>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the cache called `name`, creating it with `config` if missing.
    ///
    /// # Panics
    /// Panics if `name` was registered with different key/value types.
    pub fn get_or_create<K, V>(&self, name: &str, config: CacheConfig) -> TypedCache<K, V>
    where
        K: Hash + Eq + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        let mut caches = self.caches.write();

        if let Some(existing) = caches.get(name) {
            if existing.type_id != TypeId::of::<TypedCache<K, V>>() {
                panic!(
                    "cache '{}' already registered as {}, requested {}",
                    name,
                    existing.type_name,
                    std::any::type_name::<TypedCache<K, V>>()
                );
            }
            if let Some(cache) = existing.cache.downcast_ref::<TypedCache<K, V>>() {
                return cache.clone();
            }
        }

        debug!("Creating cache: {}", name);
        let cache = TypedCache::new(name, config);
        let counted = cache.clone();

        caches.insert(
            name.to_string(),
            CacheEntry {
                cache: Box::new(cache.clone()),
                type_id: TypeId::of::<TypedCache<K, V>>(),
                type_name: std::any::type_name::<TypedCache<K, V>>(),
                entry_count: Box::new(move || counted.entry_count()),
            },
        );

        cache
    }

    /// `(name, entries)` for every registered cache, sorted by name.
    pub fn stats(&self) -> Vec<(String, u64)> {
        let caches = self.caches.read();
        let mut stats: Vec<(String, u64)> = caches
            .iter()
            .map(|(name, entry)| (name.clone(), (entry.entry_count)()))
            .collect();
        stats.sort();
        stats
    }
}

impl std::fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let caches = self.caches.read();
        f.debug_struct("CacheRegistry")
            .field("cache_names", &caches.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_name_shares_cache() {
        let registry = CacheRegistry::new();
        let a: TypedCache<u64, bool> = registry.get_or_create("bans", CacheConfig::gate());
        let b: TypedCache<u64, bool> = registry.get_or_create("bans", CacheConfig::gate());

        a.insert(5, true);
        assert_eq!(b.get(&5), Some(true));
        assert_eq!(registry.stats(), vec![("bans".to_string(), 1)]);
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn test_type_mismatch_panics() {
        let registry = CacheRegistry::new();
        let _: TypedCache<u64, bool> = registry.get_or_create("x", CacheConfig::default());
        let _: TypedCache<String, bool> = registry.get_or_create("x", CacheConfig::default());
    }
}
