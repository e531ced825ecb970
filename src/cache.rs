//! Generic TTL cache backing the read endpoints.
//!
//! Each endpoint owns an independent [`TtlCache`] instance with its own TTL
//! and key space (a resource id, or `()` for global resources). A value is
//! served unmodified for the life of its entry; expiry depends only on its
//! age, never on external invalidation.
//!
//! The lock is held to look up or store entries, never across the fetch
//! itself, so two callers racing past an expired entry may both invoke the
//! fetch and both store a result. Last write wins; the duplicate origin
//! call is accepted (no single-flight).

use anyhow::Result;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct CacheEntry<V> {
    value: V,
    cached_at: Instant,
}

/// A named key→value cache with one fixed TTL for every entry.
pub struct TtlCache<K, V> {
    name: &'static str,
    ttl: Duration,
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached value for `key`, or run `fetch` and cache its
    /// result. A failed fetch stores nothing, so the next caller retries
    /// immediately instead of seeing a cached failure.
    pub async fn get_or_fetch<F, Fut>(&self, key: K, fetch: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        {
            let entries = self.entries.lock().await;
            if let Some(entry) = entries.get(&key) {
                if entry.cached_at.elapsed() < self.ttl {
                    return Ok(entry.value.clone());
                }
            }
        }

        log::debug!("[cache:{}] miss, fetching from origin", self.name);
        let value = fetch().await?;

        let mut entries = self.entries.lock().await;
        entries.insert(
            key,
            CacheEntry {
                value: value.clone(),
                cached_at: Instant::now(),
            },
        );
        Ok(value)
    }
}
