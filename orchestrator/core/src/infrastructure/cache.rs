// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Key-value cache with per-entry TTL.
//!
//! Values are opaque strings (callers store JSON). Entries only leave the
//! cache by expiry, capacity eviction or an explicit `invalidate`.

use moka::sync::Cache;
use moka::Expiry;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub trait KeyValueCache: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: String, ttl: Duration);

    fn invalidate(&self, key: &str);
}

#[derive(Clone)]
struct CachedValue {
    value: Arc<str>,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, CachedValue> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &CachedValue, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

pub struct MokaCache {
    inner: Cache<String, CachedValue>,
}

impl MokaCache {
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .expire_after(PerEntryTtl)
                .build(),
        }
    }
}

impl KeyValueCache for MokaCache {
    fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).map(|cached| cached.value.to_string())
    }

    fn set(&self, key: &str, value: String, ttl: Duration) {
        self.inner.insert(
            key.to_string(),
            CachedValue {
                value: Arc::from(value),
                ttl,
            },
        );
    }

    fn invalidate(&self, key: &str) {
        self.inner.invalidate(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_invalidate() {
        let cache = MokaCache::new(100);
        cache.set("lifeos:context:a", "{\"x\":1}".into(), Duration::from_secs(60));
        assert_eq!(cache.get("lifeos:context:a").as_deref(), Some("{\"x\":1}"));

        cache.invalidate("lifeos:context:a");
        assert!(cache.get("lifeos:context:a").is_none());
    }

    #[test]
    fn test_entries_expire_independently() {
        let cache = MokaCache::new(100);
        cache.set("short", "1".into(), Duration::from_millis(50));
        cache.set("long", "2".into(), Duration::from_secs(60));

        std::thread::sleep(Duration::from_millis(120));

        assert!(cache.get("short").is_none());
        assert_eq!(cache.get("long").as_deref(), Some("2"));
    }

    #[test]
    fn test_overwrite_resets_ttl() {
        let cache = MokaCache::new(100);
        cache.set("k", "old".into(), Duration::from_millis(50));
        cache.set("k", "new".into(), Duration::from_secs(60));

        std::thread::sleep(Duration::from_millis(120));
        assert_eq!(cache.get("k").as_deref(), Some("new"));
    }
}
