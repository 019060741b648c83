// tests/cache_store.rs
//
// Cache round-trip, TTL expiry with a manual clock, durability across
// instances and concurrent access.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;

use novelty_assessor::cache::{self, CacheStore, Clock, FileCache, MemoryCache};

fn manual_clock(start: DateTime<Utc>) -> (Clock, Arc<Mutex<DateTime<Utc>>>) {
    let now = Arc::new(Mutex::new(start));
    let n = now.clone();
    let clock: Clock = Arc::new(move || *n.lock().unwrap());
    (clock, now)
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

const WEEK: Duration = Duration::from_secs(7 * 24 * 3600);

#[test]
fn file_cache_round_trip_and_expiry() {
    let tmp = tempfile::tempdir().unwrap();
    let (clock, now) = manual_clock(t0());
    let cache = FileCache::with_clock(tmp.path(), clock);

    let key = cache::cache_key("patents:serpapi", &["wireless charging", "electric vehicle"]);
    cache.set(&key, json!(["a", "b"]), WEEK).unwrap();

    let entry = cache.get(&key).expect("fresh entry");
    assert_eq!(entry.payload, json!(["a", "b"]));
    assert_eq!(entry.ttl_seconds, WEEK.as_secs());
    assert_eq!(entry.created_at, t0());

    // exactly at the ttl boundary the entry is still live
    *now.lock().unwrap() = t0() + chrono::Duration::days(7);
    assert!(cache.get(&key).is_some());

    *now.lock().unwrap() = t0() + chrono::Duration::days(7) + chrono::Duration::seconds(1);
    assert!(cache.get(&key).is_none(), "expired entry reads as absent");
    assert!(
        !tmp.path().join(format!("{key}.json")).exists(),
        "expired file pruned on access"
    );
}

#[test]
fn file_cache_survives_a_new_instance() {
    let tmp = tempfile::tempdir().unwrap();
    let key = cache::cache_key("web:brave", &["solar backpack"]);
    {
        let cache = FileCache::new(tmp.path());
        cache::set_typed(&cache, &key, &vec![1u32, 2, 3], WEEK).unwrap();
    }
    let reopened = FileCache::new(tmp.path());
    let got: Vec<u32> = cache::get_typed(&reopened, &key).expect("persisted");
    assert_eq!(got, vec![1, 2, 3]);

    reopened.invalidate(&key);
    assert!(reopened.get(&key).is_none());
}

#[test]
fn persisted_layout_has_documented_fields() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = FileCache::with_clock(tmp.path(), manual_clock(t0()).0);
    cache.set("k1", json!({"x": 1}), Duration::from_secs(60)).unwrap();

    let raw = std::fs::read_to_string(tmp.path().join("k1.json")).unwrap();
    let v: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(v["key"], "k1");
    assert_eq!(v["payload"], json!({"x": 1}));
    assert_eq!(v["ttl_seconds"], 60);
    assert!(v["created_at"].as_str().unwrap().starts_with("2026-03-01T12:00:00"));
}

#[test]
fn prune_removes_only_expired_entries() {
    let tmp = tempfile::tempdir().unwrap();
    let (clock, now) = manual_clock(t0());
    let cache = FileCache::with_clock(tmp.path(), clock);
    cache.set("short", json!(1), Duration::from_secs(10)).unwrap();
    cache.set("long", json!(2), Duration::from_secs(1_000)).unwrap();

    *now.lock().unwrap() = t0() + chrono::Duration::seconds(60);
    assert_eq!(cache.prune_expired(), 1);
    assert!(cache.get("long").is_some());
}

#[test]
fn overwrite_replaces_entry() {
    let (clock, now) = manual_clock(t0());
    let cache = MemoryCache::with_clock(clock);
    cache.set("k", json!(1), Duration::from_secs(10)).unwrap();
    *now.lock().unwrap() = t0() + chrono::Duration::seconds(30);
    assert!(cache.get("k").is_none());
    cache.set("k", json!(2), Duration::from_secs(10)).unwrap();
    assert_eq!(cache.get("k").unwrap().payload, json!(2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_never_see_torn_entries() {
    let tmp = tempfile::tempdir().unwrap();
    let cache: Arc<dyn CacheStore> = Arc::new(FileCache::new(tmp.path()));

    let mut handles = Vec::new();
    for i in 0..16u32 {
        let c = cache.clone();
        handles.push(tokio::spawn(async move {
            let payload: Vec<u32> = (0..100).map(|x| x + i).collect();
            c.set("shared", json!(payload), WEEK).unwrap();
            let got: Vec<u32> = cache::get_typed(c.as_ref(), "shared").expect("readable");
            assert_eq!(got.len(), 100);
        }));
    }
    for h in handles {
        h.await.unwrap();
    }
    assert!(cache.get("shared").is_some());
    cache.clear();
    assert!(cache.get("shared").is_none());
}
