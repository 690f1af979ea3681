// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Cache abstraction backing session storage and authorization lookups.
//!
//! The kernel treats caching as a capability: a bounded key/value store
//! with `get`/`put`/`remove`/`clear` plus enumeration, where a miss is an
//! absent value and never an error. [`CacheManager`] owns named cache
//! instances and hands out the same instance for the same name for its
//! whole lifetime.
//!
//! A manager constructed with [`CacheManager::disabled`] returns a no-op
//! cache for every name: puts are discarded and gets always miss. Callers
//! hold a real handle either way and never need to special-case a
//! "caching off" configuration.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::errors::CacheError;
use crate::locks::{resilient_read, resilient_write};

/// A named key/value store.
///
/// Values are cloned out on read; implementations must be safe to share
/// across threads. `get` on a missing key returns `None`.
pub trait Cache<V: Clone>: Send + Sync {
    /// The name this cache was registered under.
    fn name(&self) -> &str;

    /// Look up a value. A miss is `None`, never an error.
    fn get(&self, key: &str) -> Option<V>;

    /// Insert a value, returning the previous one if any.
    fn put(&self, key: &str, value: V) -> Option<V>;

    /// Remove a value, returning it if it was present.
    fn remove(&self, key: &str) -> Option<V>;

    /// Drop every entry.
    fn clear(&self);

    /// Number of live entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the current keys.
    fn keys(&self) -> Vec<String>;

    /// Snapshot of the current values.
    fn values(&self) -> Vec<V>;
}

// =============================================================================
// IN-MEMORY CACHE
// =============================================================================

/// Thread-safe in-memory cache.
///
/// When constructed with a capacity, an insert of a new key at capacity
/// evicts one arbitrary existing entry first. The kernel does not mandate
/// an eviction order; callers that need LRU or TTL semantics plug in
/// their own [`Cache`] implementation.
pub struct MemoryCache<V> {
    name: String,
    entries: RwLock<HashMap<String, V>>,
    capacity: Option<usize>,
}

impl<V: Clone + Send + Sync> MemoryCache<V> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(HashMap::new()),
            capacity: None,
        }
    }

    pub fn with_capacity(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(HashMap::new()),
            capacity: Some(capacity),
        }
    }
}

impl<V: Clone + Send + Sync> Cache<V> for MemoryCache<V> {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<V> {
        resilient_read(&self.entries).get(key).cloned()
    }

    fn put(&self, key: &str, value: V) -> Option<V> {
        let mut entries = resilient_write(&self.entries);
        if let Some(cap) = self.capacity {
            if entries.len() >= cap && !entries.contains_key(key) {
                if let Some(evict) = entries.keys().next().cloned() {
                    entries.remove(&evict);
                    tracing::debug!(
                        cache = %self.name,
                        evicted = %evict,
                        "cache at capacity, evicted entry"
                    );
                }
            }
        }
        entries.insert(key.to_string(), value)
    }

    fn remove(&self, key: &str) -> Option<V> {
        resilient_write(&self.entries).remove(key)
    }

    fn clear(&self) {
        resilient_write(&self.entries).clear();
    }

    fn len(&self) -> usize {
        resilient_read(&self.entries).len()
    }

    fn keys(&self) -> Vec<String> {
        resilient_read(&self.entries).keys().cloned().collect()
    }

    fn values(&self) -> Vec<V> {
        resilient_read(&self.entries).values().cloned().collect()
    }
}

// =============================================================================
// NO-OP CACHE
// =============================================================================

/// Cache that stores nothing.
///
/// Returned by a disabled [`CacheManager`] so callers hold a uniform
/// handle whether caching is on or off.
pub struct NoopCache {
    name: String,
}

impl NoopCache {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl<V: Clone> Cache<V> for NoopCache {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, _key: &str) -> Option<V> {
        None
    }

    fn put(&self, _key: &str, _value: V) -> Option<V> {
        None
    }

    fn remove(&self, _key: &str) -> Option<V> {
        None
    }

    fn clear(&self) {}

    fn len(&self) -> usize {
        0
    }

    fn keys(&self) -> Vec<String> {
        Vec::new()
    }

    fn values(&self) -> Vec<V> {
        Vec::new()
    }
}

// =============================================================================
// CACHE MANAGER
// =============================================================================

/// Type-erased registry entry. Lets the manager purge and enumerate caches
/// holding different value types while `cache::<V>` recovers the concrete
/// type on the way out.
trait ManagedCache: Send + Sync {
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
    fn purge(&self);
    fn entry_count(&self) -> usize;
}

impl<V: Clone + Send + Sync + 'static> ManagedCache for MemoryCache<V> {
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn purge(&self) {
        self.clear();
    }

    fn entry_count(&self) -> usize {
        self.len()
    }
}

/// Owner of named [`MemoryCache`] instances.
///
/// `cache(name)` creates on first request and returns the identical
/// instance for every later request of the same name. Concurrent first
/// requests resolve to a single winning instance: registration is
/// double-checked under the registry write lock, so a losing thread's
/// candidate is never published.
pub struct CacheManager {
    registry: RwLock<HashMap<String, Arc<dyn ManagedCache>>>,
    disabled: bool,
    destroyed: AtomicBool,
}

impl CacheManager {
    /// Manager that hands out live in-memory caches.
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(HashMap::new()),
            disabled: false,
            destroyed: AtomicBool::new(false),
        }
    }

    /// Manager that hands out no-op caches for every name.
    pub fn disabled() -> Self {
        Self {
            registry: RwLock::new(HashMap::new()),
            disabled: true,
            destroyed: AtomicBool::new(false),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Get or create the cache registered under `name`.
    ///
    /// Requesting a name that was first registered with a different value
    /// type is a wiring bug and fails with [`CacheError::TypeMismatch`]
    /// rather than silently handing back a fresh cache.
    pub fn cache<V>(&self, name: &str) -> Result<Arc<dyn Cache<V>>, CacheError>
    where
        V: Clone + Send + Sync + 'static,
    {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(CacheError::Destroyed);
        }
        if self.disabled {
            return Ok(Arc::new(NoopCache::new(name)));
        }

        // Fast path: already registered.
        if let Some(existing) = resilient_read(&self.registry).get(name) {
            return Self::downcast::<V>(name, Arc::clone(existing));
        }

        // Slow path: register under the write lock, re-checking for a
        // winner that beat us to it.
        let mut registry = resilient_write(&self.registry);
        if let Some(existing) = registry.get(name) {
            return Self::downcast::<V>(name, Arc::clone(existing));
        }
        let created: Arc<MemoryCache<V>> = Arc::new(MemoryCache::new(name));
        registry.insert(name.to_string(), Arc::clone(&created) as Arc<dyn ManagedCache>);
        tracing::debug!(cache = %name, "created cache");
        Ok(created)
    }

    fn downcast<V>(
        name: &str,
        managed: Arc<dyn ManagedCache>,
    ) -> Result<Arc<dyn Cache<V>>, CacheError>
    where
        V: Clone + Send + Sync + 'static,
    {
        managed
            .as_any_arc()
            .downcast::<MemoryCache<V>>()
            .map(|c| c as Arc<dyn Cache<V>>)
            .map_err(|_| CacheError::TypeMismatch { name: name.to_string() })
    }

    /// Names of every registered cache.
    pub fn cache_names(&self) -> Vec<String> {
        resilient_read(&self.registry).keys().cloned().collect()
    }

    /// Tear down every managed cache and clear the registry.
    ///
    /// Idempotent: a second call (or a call on an empty manager) is a
    /// no-op. After destruction, `cache()` fails with
    /// [`CacheError::Destroyed`].
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut registry = resilient_write(&self.registry);
        let count = registry.len();
        for (name, cache) in registry.iter() {
            tracing::debug!(cache = %name, entries = cache.entry_count(), "destroying cache");
            cache.purge();
        }
        registry.clear();
        tracing::info!(caches = count, "cache manager destroyed");
    }
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_memory_cache_roundtrip() {
        let cache = MemoryCache::new("test");
        assert!(Cache::<String>::get(&cache, "k").is_none());

        assert!(cache.put("k", "v".to_string()).is_none());
        assert_eq!(cache.get("k").as_deref(), Some("v"));
        assert_eq!(cache.len(), 1);

        let old = cache.put("k", "v2".to_string());
        assert_eq!(old.as_deref(), Some("v"));

        assert_eq!(cache.remove("k").as_deref(), Some("v2"));
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_memory_cache_enumeration() {
        let cache = MemoryCache::new("test");
        cache.put("a", 1u32);
        cache.put("b", 2u32);

        let mut keys = cache.keys();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);

        let mut values = cache.values();
        values.sort();
        assert_eq!(values, vec![1, 2]);
    }

    #[test]
    fn test_memory_cache_capacity_evicts() {
        let cache = MemoryCache::with_capacity("bounded", 2);
        cache.put("a", 1u32);
        cache.put("b", 2u32);
        cache.put("c", 3u32);
        // One arbitrary entry was evicted to make room.
        assert_eq!(cache.len(), 2);
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_memory_cache_capacity_replace_does_not_evict() {
        let cache = MemoryCache::with_capacity("bounded", 2);
        cache.put("a", 1u32);
        cache.put("b", 2u32);
        // Replacing an existing key must not evict anything.
        cache.put("a", 10u32);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), Some(10));
        assert_eq!(cache.get("b"), Some(2));
    }

    #[test]
    fn test_noop_cache_discards_everything() {
        let cache = NoopCache::new("off");
        assert!(cache.put("k", 1u32).is_none());
        assert_eq!(Cache::<u32>::get(&cache, "k"), None);
        assert_eq!(Cache::<u32>::len(&cache), 0);
    }

    #[test]
    fn test_manager_returns_same_instance() {
        let manager = CacheManager::new();
        let a = manager.cache::<String>("sessions").unwrap();
        a.put("k", "v".to_string());

        let b = manager.cache::<String>("sessions").unwrap();
        assert_eq!(b.get("k").as_deref(), Some("v"));
    }

    #[test]
    fn test_manager_type_mismatch_fails() {
        let manager = CacheManager::new();
        let _ = manager.cache::<String>("sessions").unwrap();
        let err = manager.cache::<u32>("sessions").err().unwrap();
        assert!(matches!(err, CacheError::TypeMismatch { .. }));
    }

    #[test]
    fn test_manager_disabled_hands_out_noop() {
        let manager = CacheManager::disabled();
        let cache = manager.cache::<String>("sessions").unwrap();
        cache.put("k", "v".to_string());
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn test_manager_destroy_idempotent() {
        let manager = CacheManager::new();
        let cache = manager.cache::<u32>("numbers").unwrap();
        cache.put("one", 1);

        manager.destroy();
        assert!(cache.is_empty());
        assert!(manager.cache_names().is_empty());

        // Second destroy is a no-op, and later lookups fail fast.
        manager.destroy();
        assert!(matches!(
            manager.cache::<u32>("numbers").err().unwrap(),
            CacheError::Destroyed
        ));
    }

    #[test]
    fn test_concurrent_first_creation_single_winner() {
        let manager = Arc::new(CacheManager::new());
        let mut handles = Vec::new();

        for i in 0..16 {
            let manager = Arc::clone(&manager);
            handles.push(thread::spawn(move || {
                let cache = manager.cache::<u32>("contended").unwrap();
                cache.put(&format!("k{i}"), i);
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        // Every thread's write landed in the one surviving instance.
        let cache = manager.cache::<u32>("contended").unwrap();
        assert_eq!(cache.len(), 16);
        assert_eq!(manager.cache_names(), vec!["contended".to_string()]);
    }
}
