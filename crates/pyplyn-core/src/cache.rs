//! Time-bounded keyed cache for extracted samples.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;

use crate::shutdown::ShutdownSignal;

/// Values that provide their own opaque cache key, unique within one
/// endpoint.
pub trait Cacheable {
    fn cache_key(&self) -> String;
}

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    expires_at: Instant,
}

/// Thread-safe keyed cache with per-entry TTL.
///
/// Expired entries are evicted lazily on access; [`run_sweeper`] removes the
/// remainder periodically. Last write wins on identical keys. There is no
/// size cap: the key space is bounded per endpoint in this domain.
#[derive(Debug, Default)]
pub struct Cache<T> {
    entries: RwLock<HashMap<String, CacheEntry<T>>>,
}

impl<T: Cacheable + Clone> Cache<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Stores `value` under its own cache key, expiring `ttl_millis` from
    /// now. A non-positive TTL is a no-op.
    pub async fn put(&self, value: T, ttl_millis: i64) {
        if ttl_millis <= 0 {
            return;
        }

        let entry = CacheEntry {
            expires_at: Instant::now() + Duration::from_millis(ttl_millis as u64),
            value,
        };

        let mut entries = self.entries.write().await;
        entries.insert(entry.value.cache_key(), entry);
    }

    /// Returns the live value for `key`, or `None` on miss or expiry.
    pub async fn get(&self, key: &str) -> Option<T> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if Instant::now() < entry.expires_at => {
                    return Some(entry.value.clone())
                }
                Some(_) => {} // expired: fall through and evict
                None => return None,
            }
        }

        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(key) {
            if Instant::now() < entry.expires_at {
                return Some(entry.value.clone());
            }
            entries.remove(key);
        }
        None
    }

    /// Removes every expired entry; returns how many were dropped.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    /// Number of entries, including any not yet swept.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// Periodic sweep loop for one cache; runs until shutdown.
pub async fn run_sweeper<T>(cache: Arc<Cache<T>>, interval: Duration, shutdown: ShutdownSignal)
where
    T: Cacheable + Clone + Send + Sync + 'static,
{
    let mut ticker = tokio::time::interval(interval);
    // skip the first immediate tick
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;

            _ = shutdown.draining() => break,

            _ = ticker.tick() => {
                let removed = cache.sweep().await;
                if removed > 0 {
                    debug!(removed, "cache sweep evicted expired entries");
                }
            }
        }
    }
}
