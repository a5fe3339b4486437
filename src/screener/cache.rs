// =============================================================================
// Screener disk cache — TTL-gated JSON files with atomic writes
// =============================================================================
//
// One file per key under the cache directory. Writes go to a `.tmp` sibling
// and rename over the target so a crash mid-write never leaves a torn file.
// Reads are TTL-gated but the raw entry stays readable past its TTL: the
// screener deliberately serves stale results when the venue is throttling.
// =============================================================================

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Serialize, Deserialize)]
struct CacheEnvelope<T> {
    saved_at_unix: i64,
    data: T,
}

pub struct ScreenerCache {
    dir: PathBuf,
}

impl ScreenerCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Store `value` under `key` atomically.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create cache dir {}", self.dir.display()))?;

        let envelope = CacheEnvelope {
            saved_at_unix: Utc::now().timestamp(),
            data: value,
        };
        let body = serde_json::to_string_pretty(&envelope).context("cache serialization failed")?;

        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &body)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("failed to rename into {}", path.display()))?;

        debug!(key, path = %path.display(), "cache entry written");
        Ok(())
    }

    /// Fetch `key` if its entry is younger than `max_age_secs`.
    pub fn get<T: DeserializeOwned>(&self, key: &str, max_age_secs: i64) -> Option<T> {
        let envelope = self.read_envelope::<T>(key)?;
        let age = Utc::now().timestamp() - envelope.saved_at_unix;
        if age > max_age_secs {
            debug!(key, age, max_age_secs, "cache entry expired");
            return None;
        }
        Some(envelope.data)
    }

    /// Fetch `key` regardless of age — the degraded-mode read used when a
    /// fresh screening cannot be produced.
    pub fn get_stale<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.read_envelope::<T>(key).map(|e| e.data)
    }

    fn read_envelope<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEnvelope<T>> {
        let path = self.path_for(key);
        let body = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&body) {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                warn!(key, error = %e, "cache entry unreadable — ignoring");
                None
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn temp_cache(tag: &str) -> ScreenerCache {
        let dir = std::env::temp_dir().join(format!("meridian-cache-test-{tag}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        ScreenerCache::new(dir)
    }

    #[test]
    fn roundtrip_within_ttl() {
        let cache = temp_cache("roundtrip");
        cache.set("numbers", &vec![1, 2, 3]).unwrap();
        let back: Vec<i32> = cache.get("numbers", 3600).unwrap();
        assert_eq!(back, vec![1, 2, 3]);
    }

    #[test]
    fn expired_entry_still_readable_stale() {
        let cache = temp_cache("stale");
        cache.set("value", &"hello".to_string()).unwrap();
        // TTL of -1 guarantees expiry.
        assert!(cache.get::<String>("value", -1).is_none());
        assert_eq!(cache.get_stale::<String>("value").unwrap(), "hello");
    }

    #[test]
    fn missing_and_corrupt_entries() {
        let cache = temp_cache("corrupt");
        assert!(cache.get::<String>("nope", 60).is_none());

        cache.set("broken", &1).unwrap();
        std::fs::write(cache.path_for("broken"), "{not json").unwrap();
        assert!(cache.get::<i32>("broken", 60).is_none());
        assert!(cache.get_stale::<i32>("broken").is_none());
    }

    #[test]
    fn overwrite_replaces_value() {
        let cache = temp_cache("overwrite");
        cache.set("k", &"old".to_string()).unwrap();
        cache.set("k", &"new".to_string()).unwrap();
        assert_eq!(cache.get_stale::<String>("k").unwrap(), "new");
    }
}
