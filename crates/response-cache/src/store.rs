use pulse_core::CacheError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

const STATS_LOG_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL applied when a caller passes zero.
    pub default_ttl: Duration,
    pub max_entries: usize,
    /// Interval between background sweeps of expired entries.
    pub check_period: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(300),
            max_entries: 1000,
            check_period: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub keys: usize,
    pub evictions: u64,
    pub expired: u64,
}

struct CacheEntry {
    value: Value,
    expires_at: Instant,
    /// Insertion sequence, the eviction order.
    seq: u64,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    order: BTreeMap<u64, String>,
    next_seq: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    expired: u64,
}

impl CacheState {
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.seq);
        Some(entry)
    }

    fn purge_expired(&mut self, now: Instant) -> usize {
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| !e.is_live(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &stale {
            self.remove(key);
        }
        self.expired += stale.len() as u64;
        stale.len()
    }

    fn evict_oldest(&mut self) -> Option<String> {
        let (_, key) = self.order.pop_first()?;
        self.entries.remove(&key);
        self.evictions += 1;
        Some(key)
    }
}

/// Bounded TTL cache shared by every request handler.
///
/// Expired entries are never returned, even before the sweeper removes them.
/// When full, expired entries are purged first and then the oldest-inserted
/// entry is evicted.
#[derive(Clone)]
pub struct CacheStore {
    state: Arc<Mutex<CacheState>>,
    config: CacheConfig,
}

impl CacheStore {
    pub fn new(config: CacheConfig) -> Self {
        tracing::info!(
            "Response cache: {} max entries, {}s default TTL, {}s sweep period",
            config.max_entries,
            config.default_ttl.as_secs(),
            config.check_period.as_secs()
        );
        Self {
            state: Arc::new(Mutex::new(CacheState::default())),
            config,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default())
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ttl_for(&self, ttl_seconds: u64) -> Duration {
        if ttl_seconds == 0 {
            self.config.default_ttl
        } else {
            Duration::from_secs(ttl_seconds)
        }
    }

    /// Store a raw payload. Re-setting a key counts as a fresh insertion.
    pub fn set_value(&self, key: &str, value: Value, ttl_seconds: u64) {
        let ttl = self.ttl_for(ttl_seconds);
        let now = Instant::now();
        let mut state = self.lock();

        state.remove(key);
        if state.entries.len() >= self.config.max_entries.max(1) {
            state.purge_expired(now);
        }
        while state.entries.len() >= self.config.max_entries.max(1) {
            match state.evict_oldest() {
                Some(evicted) => tracing::debug!("Cache evict: {}", evicted),
                None => break,
            }
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.order.insert(seq, key.to_string());
        state.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: now + ttl,
                seq,
            },
        );
        tracing::debug!("Cache set: {} (ttl {}s)", key, ttl.as_secs());
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl_seconds: u64) -> Result<(), CacheError> {
        let encoded = serde_json::to_value(value)?;
        self.set_value(key, encoded, ttl_seconds);
        Ok(())
    }

    pub fn get_value(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let mut state = self.lock();

        let live = match state.entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => {
                state.remove(key);
                state.expired += 1;
                None
            }
            None => None,
        };

        if live.is_some() {
            state.hits += 1;
            tracing::debug!("Cache hit: {}", key);
        } else {
            state.misses += 1;
            tracing::debug!("Cache miss: {}", key);
        }
        live
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        match self.get_value(key) {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Remove a key. Returns the number of entries removed (0 or 1).
    pub fn delete(&self, key: &str) -> usize {
        let removed = self.lock().remove(key).is_some() as usize;
        tracing::debug!("Cache delete: {} ({} removed)", key, removed);
        removed
    }

    pub fn flush(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.order.clear();
        tracing::info!("Cache flushed");
    }

    /// Cache-aside: return the cached value or run `producer` and cache its
    /// success. Concurrent misses on one key each run their own producer; the
    /// last write wins. Errors from `producer` are returned and never cached.
    pub async fn get_or_set<T, E, F, Fut>(
        &self,
        key: &str,
        ttl_seconds: u64,
        producer: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.get::<T>(key) {
            Ok(Some(cached)) => return Ok(cached),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Dropping unreadable cache entry {}: {}", key, e);
                self.delete(key);
            }
        }

        let fresh = producer().await?;
        self.set(key, &fresh, ttl_seconds)?;
        Ok(fresh)
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.lock().purge_expired(Instant::now())
    }

    /// Stored entries, including expired ones the sweeper has not reached yet.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            keys: state.entries.len(),
            evictions: state.evictions,
            expired: state.expired,
        }
    }

    /// Start the background sweep. Abort the handle on shutdown.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let store = self.clone();
        let period = self.config.check_period;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick fires immediately
            ticker.tick().await;
            let mut last_report = Instant::now();

            loop {
                ticker.tick().await;
                let removed = store.purge_expired();
                if removed > 0 {
                    tracing::debug!("Cache sweep removed {} expired entries", removed);
                }
                if last_report.elapsed() >= STATS_LOG_INTERVAL {
                    let stats = store.stats();
                    tracing::debug!(
                        hits = stats.hits,
                        misses = stats.misses,
                        keys = stats.keys,
                        evictions = stats.evictions,
                        expired = stats.expired,
                        "Cache statistics"
                    );
                    last_report = Instant::now();
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn small_store(max_entries: usize) -> CacheStore {
        CacheStore::new(CacheConfig {
            default_ttl: Duration::from_secs(300),
            max_entries,
            check_period: Duration::from_secs(120),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_then_get_until_ttl_elapses() {
        let store = CacheStore::with_defaults();
        store.set_value("stock:ticker:AAPL", json!({ "price": 191.5 }), 180);

        assert_eq!(store.get_value("stock:ticker:AAPL"), Some(json!({ "price": 191.5 })));

        tokio::time::advance(Duration::from_secs(179)).await;
        assert!(store.get_value("stock:ticker:AAPL").is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(store.get_value("stock:ticker:AAPL").is_none());
        assert_eq!(store.stats().expired, 1);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_ttl_uses_default() {
        let store = CacheStore::with_defaults();
        store.set_value("k", json!(1), 0);

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(store.get_value("k").is_some());
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.get_value("k").is_none());
    }

    #[test]
    fn test_delete_returns_removed_count() {
        let store = CacheStore::with_defaults();
        store.set_value("a", json!("x"), 60);
        assert_eq!(store.delete("a"), 1);
        assert_eq!(store.delete("a"), 0);
        assert!(store.get_value("a").is_none());
    }

    #[test]
    fn test_oldest_inserted_is_evicted_first() {
        let store = small_store(3);
        store.set_value("a", json!(1), 60);
        store.set_value("b", json!(2), 60);
        store.set_value("c", json!(3), 60);
        // Reading does not change FIFO order
        assert!(store.get_value("a").is_some());

        store.set_value("d", json!(4), 60);
        assert_eq!(store.len(), 3);
        assert!(store.get_value("a").is_none());
        assert!(store.get_value("b").is_some());
        assert!(store.get_value("d").is_some());
        assert_eq!(store.stats().evictions, 1);
    }

    #[test]
    fn test_reinsert_moves_key_to_back() {
        let store = small_store(2);
        store.set_value("a", json!(1), 60);
        store.set_value("b", json!(2), 60);
        store.set_value("a", json!(10), 60);
        store.set_value("c", json!(3), 60);

        assert!(store.get_value("b").is_none());
        assert_eq!(store.get_value("a"), Some(json!(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_store_drops_expired_before_live() {
        let store = small_store(2);
        store.set_value("short", json!(1), 1);
        store.set_value("long", json!(2), 600);
        tokio::time::advance(Duration::from_secs(2)).await;

        store.set_value("new", json!(3), 600);
        assert!(store.get_value("long").is_some());
        assert!(store.get_value("new").is_some());
        assert_eq!(store.stats().evictions, 0);
    }

    #[test]
    fn test_typed_get_reports_decode_failure() {
        let store = CacheStore::with_defaults();
        store.set_value("k", json!("not a number"), 60);
        let result: Result<Option<u32>, CacheError> = store.get("k");
        assert!(matches!(result, Err(CacheError::Serialization(_))));
    }

    #[tokio::test]
    async fn test_get_or_set_runs_producer_once() {
        let store = CacheStore::with_defaults();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value: Result<String, CacheError> = store
                .get_or_set("retirement:age:30", 3600, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("stay consistent".to_string())
                })
                .await;
            assert_eq!(value.unwrap(), "stay consistent");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.stats().hits, 2);
    }

    #[derive(Debug)]
    enum ProduceError {
        Upstream,
        Cache,
    }

    impl From<CacheError> for ProduceError {
        fn from(_: CacheError) -> Self {
            ProduceError::Cache
        }
    }

    #[tokio::test]
    async fn test_get_or_set_does_not_cache_errors() {
        let store = CacheStore::with_defaults();
        let result: Result<u32, ProduceError> = store
            .get_or_set("k", 60, || async { Err(ProduceError::Upstream) })
            .await;
        assert!(matches!(result, Err(ProduceError::Upstream)));
        assert!(store.get_value("k").is_none());

        let result: Result<u32, ProduceError> = store.get_or_set("k", 60, || async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(store.get_value("k"), Some(json!(7)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_removes_expired_entries() {
        let store = CacheStore::with_defaults();
        store.set_value("short", json!(1), 10);
        store.set_value("long", json!(2), 600);
        let sweeper = store.spawn_sweeper();

        tokio::time::sleep(Duration::from_secs(125)).await;
        assert_eq!(store.len(), 1);
        assert_eq!(store.stats().expired, 1);

        sweeper.abort();
    }

    #[test]
    fn test_flush_clears_everything() {
        let store = CacheStore::with_defaults();
        store.set_value("a", json!(1), 60);
        store.set_value("b", json!(2), 60);
        store.flush();
        assert!(store.is_empty());
        assert_eq!(store.stats().keys, 0);
    }
}
