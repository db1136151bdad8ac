//! Keyed TTL cache with stale fallback.
//!
//! An entry is fresh while `now - stored_at <= ttl` and it has not been
//! force-invalidated. Reading a stale or missing entry runs the caller's
//! refresh function; the lock is never held while it runs.

use std::collections::HashMap;
use std::fmt::{Debug, Display};
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default entry lifetime (15 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(15 * 60);

/// A value read from the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRead<V> {
    pub value: V,
    /// The refresh failed and this is the last good value.
    pub stale: bool,
}

struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
    invalidated: bool,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, ttl: Duration) -> bool {
        !self.invalidated && self.stored_at.elapsed() <= ttl
    }
}

pub struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        debug!(ttl_secs = ttl.as_secs(), "Initializing TTL cache");
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Read `key`, refreshing it if it is missing, expired or invalidated.
    ///
    /// A failed refresh returns the previous value with `stale: true`, or
    /// the refresh error when there is no previous value.
    pub async fn get<F, Fut, E>(&self, key: &K, refresh: F) -> Result<CacheRead<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Display,
    {
        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(key) {
                if entry.is_fresh(self.ttl) {
                    debug!(key = ?key, "TTL cache hit");
                    return Ok(CacheRead {
                        value: entry.value.clone(),
                        stale: false,
                    });
                }
            }
        }

        match refresh().await {
            Ok(value) => {
                self.insert(key.clone(), value.clone()).await;
                debug!(key = ?key, "TTL cache refreshed");
                Ok(CacheRead {
                    value,
                    stale: false,
                })
            }
            Err(e) => {
                let entries = self.entries.read().await;
                match entries.get(key) {
                    Some(entry) => {
                        warn!(key = ?key, error = %e, "Refresh failed, serving stale value");
                        Ok(CacheRead {
                            value: entry.value.clone(),
                            stale: true,
                        })
                    }
                    None => {
                        warn!(key = ?key, error = %e, "Refresh failed with nothing cached");
                        Err(e)
                    }
                }
            }
        }
    }

    /// Store a value as fresh.
    pub async fn insert(&self, key: K, value: V) {
        self.entries.write().await.insert(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
                invalidated: false,
            },
        );
    }

    /// Force the next `get` for `key` to refresh. The current value is kept
    /// as the stale fallback.
    pub async fn force_invalidate(&self, key: &K) {
        if let Some(entry) = self.entries.write().await.get_mut(key) {
            entry.invalidated = true;
            debug!(key = ?key, "TTL cache entry invalidated");
        }
    }

    /// Current value regardless of age, without refreshing.
    pub async fn peek(&self, key: &K) -> Option<V> {
        self.entries.read().await.get(key).map(|e| e.value.clone())
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const MINUTE: Duration = Duration::from_secs(60);

    async fn get_counting(
        cache: &TtlCache<&'static str, u32>,
        calls: &AtomicUsize,
        outcome: Result<u32, String>,
    ) -> Result<CacheRead<u32>, String> {
        cache
            .get(&"devices", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                outcome
            })
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_within_ttl() {
        let cache = TtlCache::new(15 * MINUTE);
        let calls = AtomicUsize::new(0);

        let first = get_counting(&cache, &calls, Ok(1)).await.unwrap();
        assert_eq!(first, CacheRead { value: 1, stale: false });

        tokio::time::advance(10 * MINUTE).await;
        let second = get_counting(&cache, &calls, Ok(2)).await.unwrap();
        assert_eq!(second, CacheRead { value: 1, stale: false });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_refreshes_once() {
        let cache = TtlCache::new(15 * MINUTE);
        let calls = AtomicUsize::new(0);
        get_counting(&cache, &calls, Ok(1)).await.unwrap();

        tokio::time::advance(20 * MINUTE).await;
        let read = get_counting(&cache, &calls, Ok(2)).await.unwrap();
        assert_eq!(read, CacheRead { value: 2, stale: false });
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // Fresh again after the refresh.
        get_counting(&cache, &calls, Ok(3)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_serves_stale() {
        let cache = TtlCache::new(15 * MINUTE);
        let calls = AtomicUsize::new(0);
        get_counting(&cache, &calls, Ok(1)).await.unwrap();

        tokio::time::advance(20 * MINUTE).await;
        let read = get_counting(&cache, &calls, Err("HTTP 503".into()))
            .await
            .unwrap();
        assert_eq!(read, CacheRead { value: 1, stale: true });
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_without_prior_value_propagates() {
        let cache = TtlCache::new(15 * MINUTE);
        let calls = AtomicUsize::new(0);
        let err = get_counting(&cache, &calls, Err("down".into()))
            .await
            .unwrap_err();
        assert_eq!(err, "down");
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_force_invalidate_refreshes_next_get() {
        let cache = TtlCache::new(15 * MINUTE);
        let calls = AtomicUsize::new(0);
        get_counting(&cache, &calls, Ok(1)).await.unwrap();

        cache.force_invalidate(&"devices").await;
        assert_eq!(cache.peek(&"devices").await, Some(1));

        let read = get_counting(&cache, &calls, Ok(2)).await.unwrap();
        assert_eq!(read.value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidated_entry_is_still_stale_fallback() {
        let cache = TtlCache::new(15 * MINUTE);
        let calls = AtomicUsize::new(0);
        get_counting(&cache, &calls, Ok(1)).await.unwrap();
        cache.force_invalidate(&"devices").await;

        let read = get_counting(&cache, &calls, Err("timeout".into()))
            .await
            .unwrap();
        assert_eq!(read, CacheRead { value: 1, stale: true });
    }

    #[test]
    fn test_default_ttl() {
        let cache: TtlCache<String, u32> = TtlCache::default();
        assert_eq!(cache.ttl(), DEFAULT_TTL);
    }
}
