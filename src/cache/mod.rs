//! Time-bound key/value cache shared by the keyword and search stages.
//!
//! Expired entries are reported as misses and pruned lazily; nothing evicts
//! them in the background. Keys are sha256 digests of provider identity plus
//! the normalized keyword terms, so they are stable across process restarts.

pub mod file;
pub mod memory;

pub use file::FileCache;
pub use memory::{MemoryCache, NullCache};

use std::io;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Source of "now" for expiry checks. Swappable in tests.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// Persisted record layout: `{key, payload, created_at, ttl_seconds}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub ttl_seconds: u64,
}

impl CacheEntry {
    pub fn new(key: &str, payload: serde_json::Value, created_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            key: key.to_string(),
            payload,
            created_at,
            ttl_seconds: ttl.as_secs(),
        }
    }

    /// Absent once `now - created_at > ttl`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        let ttl = chrono::Duration::seconds(i64::try_from(self.ttl_seconds).unwrap_or(i64::MAX));
        now.signed_duration_since(self.created_at) > ttl
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_value(self.payload.clone()).ok()
    }
}

/// Cache contract. Implementations must tolerate concurrent use from both
/// search tasks.
pub trait CacheStore: Send + Sync {
    /// Live entry for `key`, or `None` when absent or expired.
    fn get(&self, key: &str) -> Option<CacheEntry>;
    fn set(&self, key: &str, payload: serde_json::Value, ttl: Duration) -> io::Result<()>;
    fn invalidate(&self, key: &str);
    /// Drop every entry, expired or not.
    fn clear(&self);
}

/// Typed read: a live entry whose payload does not decode counts as a miss.
pub fn get_typed<T: DeserializeOwned>(cache: &dyn CacheStore, key: &str) -> Option<T> {
    cache.get(key).and_then(|e| e.decode())
}

/// Typed write.
pub fn set_typed<T: Serialize>(
    cache: &dyn CacheStore,
    key: &str,
    value: &T,
    ttl: Duration,
) -> io::Result<()> {
    let payload =
        serde_json::to_value(value).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    cache.set(key, payload, ttl)
}

/// Deterministic key for (provider identity, normalized terms).
pub fn cache_key<S: AsRef<str>>(provider: &str, terms: &[S]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(provider.as_bytes());
    for t in terms {
        // unit separator keeps ["ab","c"] and ["a","bc"] apart
        hasher.update([0x1f]);
        hasher.update(t.as_ref().as_bytes());
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn key_is_deterministic_and_provider_scoped() {
        let a = cache_key("patents", &["wireless charging", "electric vehicle"]);
        let b = cache_key("patents", &["wireless charging", "electric vehicle"]);
        let c = cache_key("web", &["wireless charging", "electric vehicle"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn key_separates_term_boundaries() {
        assert_ne!(cache_key("p", &["ab", "c"]), cache_key("p", &["a", "bc"]));
    }

    #[test]
    fn expiry_is_strictly_after_ttl() {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let e = CacheEntry::new("k", serde_json::json!(1), t0, Duration::from_secs(60));
        assert!(!e.is_expired_at(t0 + chrono::Duration::seconds(60)));
        assert!(e.is_expired_at(t0 + chrono::Duration::seconds(61)));
    }
}
