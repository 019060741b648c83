// src/cache/file.rs
//! Durable cache: one JSON file per key under a directory.
//! Writes go through a temp file + rename; a mutex serializes file access so
//! the two search tasks never observe a half-written entry.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, warn};

use super::{system_clock, CacheEntry, CacheStore, Clock};

pub struct FileCache {
    dir: PathBuf,
    clock: Clock,
    lock: Mutex<()>,
}

impl FileCache {
    /// Create (best-effort) the directory and open the cache.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_clock(dir, system_clock())
    }

    pub fn with_clock(dir: impl Into<PathBuf>, clock: Clock) -> Self {
        let dir = dir.into();
        if let Err(e) = fs::create_dir_all(&dir) {
            warn!(target: "cache", dir = %dir.display(), error = %e, "cannot create cache dir");
        }
        Self {
            dir,
            clock,
            lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Remove every expired entry. Returns how many files were deleted.
    pub fn prune_expired(&self) -> usize {
        let _g = self.guard();
        let now = (self.clock)();
        let mut removed = 0;
        for path in json_files(&self.dir) {
            let expired = read_entry(&path).map(|e| e.is_expired_at(now)).unwrap_or(true);
            if expired && fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        removed
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, ()> {
        match self.lock.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl CacheStore for FileCache {
    fn get(&self, key: &str) -> Option<CacheEntry> {
        let _g = self.guard();
        let path = self.path_for(key);
        if !path.exists() {
            return None;
        }
        match read_entry(&path) {
            Some(entry) if entry.key == key && !entry.is_expired_at((self.clock)()) => Some(entry),
            _ => {
                // expired or unreadable: prune on access
                debug!(target: "cache", key, "pruning stale cache file");
                let _ = fs::remove_file(&path);
                None
            }
        }
    }

    fn set(&self, key: &str, payload: serde_json::Value, ttl: Duration) -> io::Result<()> {
        let entry = CacheEntry::new(key, payload, (self.clock)(), ttl);
        let json = serde_json::to_string(&entry)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let _g = self.guard();
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        let written = write_file(&tmp, json.as_bytes()).and_then(|()| fs::rename(&tmp, &path));
        if written.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        written
    }

    fn invalidate(&self, key: &str) {
        let _g = self.guard();
        let _ = fs::remove_file(self.path_for(key));
    }

    fn clear(&self) {
        let _g = self.guard();
        for path in json_files(&self.dir).into_iter().chain(temp_files(&self.dir)) {
            let _ = fs::remove_file(path);
        }
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut f = fs::File::create(path)?;
    f.write_all(bytes)?;
    f.sync_all()
}

/// Leftovers of writes interrupted before the rename.
fn temp_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.to_str().is_some_and(|s| s.ends_with(".json.tmp")))
        .collect()
}

fn json_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("json"))
        .collect()
}

fn read_entry(path: &Path) -> Option<CacheEntry> {
    let s = fs::read_to_string(path).ok()?;
    serde_json::from_str(&s).ok()
}
