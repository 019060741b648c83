// src/cache/memory.rs
use std::collections::HashMap;
use std::io;
use std::sync::Mutex;
use std::time::Duration;

use super::{system_clock, CacheEntry, CacheStore, Clock};

/// Process-local cache guarded by a mutex. Used by tests and `cache.enabled = false`
/// runs that still want in-run deduplication.
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    clock: Clock,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Number of physically stored entries (expired ones included until pruned).
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        match self.entries.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        }
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str) -> Option<CacheEntry> {
        let now = (self.clock)();
        let mut map = self.lock();
        match map.get(key) {
            Some(e) if !e.is_expired_at(now) => Some(e.clone()),
            Some(_) => {
                map.remove(key);
                None
            }
            None => None,
        }
    }

    fn set(&self, key: &str, payload: serde_json::Value, ttl: Duration) -> io::Result<()> {
        let entry = CacheEntry::new(key, payload, (self.clock)(), ttl);
        self.lock().insert(key.to_string(), entry);
        Ok(())
    }

    fn invalidate(&self, key: &str) {
        self.lock().remove(key);
    }

    fn clear(&self) {
        self.lock().clear();
    }
}

/// Cache that never stores anything (`cache.enabled = false`).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCache;

impl CacheStore for NullCache {
    fn get(&self, _key: &str) -> Option<CacheEntry> {
        None
    }
    fn set(&self, _key: &str, _payload: serde_json::Value, _ttl: Duration) -> io::Result<()> {
        Ok(())
    }
    fn invalidate(&self, _key: &str) {}
    fn clear(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expired_entry_is_pruned_on_get() {
        use chrono::{TimeZone, Utc};
        use std::sync::Arc;

        let now = Arc::new(Mutex::new(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()));
        let n = now.clone();
        let cache = MemoryCache::with_clock(Arc::new(move || *n.lock().unwrap()));

        cache.set("k", json!("v"), Duration::from_secs(10)).unwrap();
        assert!(cache.get("k").is_some());

        *now.lock().unwrap() += chrono::Duration::seconds(11);
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn null_cache_never_hits() {
        let c = NullCache;
        c.set("k", json!(1), Duration::from_secs(60)).unwrap();
        assert!(c.get("k").is_none());
    }
}
