//! Generic size- and time-bounded cache.
//!
//! Every component that fetches provider data goes through a [`TtlCache`]
//! to avoid redundant calls. Entries expire after a fixed TTL and a
//! background sweep keeps the total size under budget by evicting the
//! oldest entries first (age-based, not LRU; access recency is not
//! tracked).

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
}

/// Concurrent key-value cache with per-entry TTL and a maximum entry count.
///
/// An entry is valid iff `now - stored_at < ttl`; expired entries are
/// logically absent even before the sweeper physically removes them.
pub struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    ttl: Duration,
    max_entries: usize,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            max_entries,
        }
    }

    /// Look up a value. Expired entries are removed and reported as absent.
    pub fn get(&self, key: &K) -> Option<V> {
        {
            let entries = self.entries.read().unwrap();
            match entries.get(key) {
                Some(entry) if entry.stored_at.elapsed() < self.ttl => {
                    return Some(entry.value.clone());
                }
                Some(_) => {} // expired, fall through to remove
                None => return None,
            }
        }

        // Entry exists but is expired; drop it under the write lock. Another
        // writer may have refreshed it in between, so re-check the timestamp.
        let mut entries = self.entries.write().unwrap();
        if let Some(entry) = entries.get(key) {
            if entry.stored_at.elapsed() < self.ttl {
                return Some(entry.value.clone());
            }
            entries.remove(key);
        }
        None
    }

    /// Insert or refresh a value.
    pub fn set(&self, key: K, value: V) {
        let mut entries = self.entries.write().unwrap();
        entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    /// Number of physically present entries, including not-yet-swept
    /// expired ones.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }

    /// Remove expired entries, then evict oldest-first until the size is
    /// back under budget. Returns the number of entries removed.
    pub fn sweep(&self) -> usize {
        let mut entries = self.entries.write().unwrap();
        let before = entries.len();

        entries.retain(|_, entry| entry.stored_at.elapsed() < self.ttl);

        if entries.len() > self.max_entries {
            let mut by_age: Vec<(K, Instant)> = entries
                .iter()
                .map(|(k, e)| (k.clone(), e.stored_at))
                .collect();
            by_age.sort_by_key(|(_, stored_at)| *stored_at);

            let excess = entries.len() - self.max_entries;
            for (key, _) in by_age.into_iter().take(excess) {
                entries.remove(&key);
            }
        }

        before - entries.len()
    }

    /// Spawn a background task that sweeps the cache periodically until the
    /// token is cancelled.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        shutdown_token: CancellationToken,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);

            // Skip the first immediate tick, wait for the first interval
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = cache.sweep();
                        if removed > 0 {
                            debug!("Cache sweep removed {} entries", removed);
                        }
                    }
                    _ = shutdown_token.cancelled() => {
                        debug!("Cache sweeper shutting down");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_then_get_returns_value() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_secs(60), 16);
        cache.set("a".to_string(), 1);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
    }

    #[test]
    fn test_get_missing_returns_none() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_secs(60), 16);
        assert_eq!(cache.get(&"missing".to_string()), None);
    }

    #[test]
    fn test_expired_entry_is_absent() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_millis(20), 16);
        cache.set("a".to_string(), 1);
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(cache.get(&"a".to_string()), None);
        // get() removes the expired entry as a side effect
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_set_refreshes_timestamp() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_millis(60), 16);
        cache.set("a".to_string(), 1);
        std::thread::sleep(Duration::from_millis(35));
        cache.set("a".to_string(), 2);
        std::thread::sleep(Duration::from_millis(35));
        // 70ms after the first insert, but only 35ms after the refresh
        assert_eq!(cache.get(&"a".to_string()), Some(2));
    }

    #[test]
    fn test_sweep_removes_expired_entries() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_millis(20), 16);
        cache.set("a".to_string(), 1);
        cache.set("b".to_string(), 2);
        std::thread::sleep(Duration::from_millis(40));
        cache.set("c".to_string(), 3);

        let removed = cache.sweep();
        assert_eq!(removed, 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"c".to_string()), Some(3));
    }

    #[test]
    fn test_sweep_evicts_oldest_when_over_budget() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_secs(60), 2);
        cache.set("oldest".to_string(), 1);
        std::thread::sleep(Duration::from_millis(5));
        cache.set("middle".to_string(), 2);
        std::thread::sleep(Duration::from_millis(5));
        cache.set("newest".to_string(), 3);

        let removed = cache.sweep();
        assert_eq!(removed, 1);
        assert_eq!(cache.get(&"oldest".to_string()), None);
        assert_eq!(cache.get(&"middle".to_string()), Some(2));
        assert_eq!(cache.get(&"newest".to_string()), Some(3));
    }

    #[test]
    fn test_sweep_noop_under_budget() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_secs(60), 16);
        cache.set("a".to_string(), 1);
        assert_eq!(cache.sweep(), 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_concurrent_access() {
        let cache: Arc<TtlCache<u32, u32>> = Arc::new(TtlCache::new(Duration::from_secs(60), 1024));

        let mut handles = Vec::new();
        for t in 0..4u32 {
            let cache = Arc::clone(&cache);
            handles.push(std::thread::spawn(move || {
                for i in 0..100u32 {
                    let key = t * 100 + i;
                    cache.set(key, key);
                    assert_eq!(cache.get(&key), Some(key));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 400);
    }

    #[tokio::test]
    async fn test_sweeper_task_runs_and_stops() {
        let cache: Arc<TtlCache<String, u32>> =
            Arc::new(TtlCache::new(Duration::from_millis(10), 16));
        cache.set("a".to_string(), 1);

        let token = CancellationToken::new();
        let handle = cache.spawn_sweeper(Duration::from_millis(20), token.clone());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cache.len(), 0, "sweeper should have removed expired entry");

        token.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;
    }
}
