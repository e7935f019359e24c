//! In-memory key/value cache with a cache-wide TTL and a background sweeper.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

type Entries<V> = Arc<RwLock<HashMap<String, Entry<V>>>>;

pub struct ExpiringCache<V> {
    entries: Entries<V>,
    ttl: Duration,
    sweeper: JoinHandle<()>,
}

impl<V> ExpiringCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates the cache and starts sweeping expired entries every `sweep_interval`.
    pub fn new(ttl: Duration, sweep_interval: Duration) -> Self {
        let entries: Entries<V> = Arc::new(RwLock::new(HashMap::new()));
        let sweeper = tokio::spawn(sweep_loop(entries.clone(), sweep_interval));
        Self {
            entries,
            ttl,
            sweeper,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Expired entries read as absent even before the sweeper removes them.
    pub async fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone())
    }

    pub async fn set(&self, key: impl Into<String>, value: V) {
        let entry = Entry {
            value,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.write().await.insert(key.into(), entry);
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl<V> Drop for ExpiringCache<V> {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}

async fn sweep_loop<V>(entries: Entries<V>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    // the first tick completes immediately
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let removed = purge_expired(&entries).await;
        if removed > 0 {
            tracing::debug!(removed, "Expired cache entries swept");
        }
    }
}

async fn purge_expired<V>(entries: &Entries<V>) -> usize {
    let now = Instant::now();
    let mut entries = entries.write().await;
    let before = entries.len();
    entries.retain(|_, entry| entry.expires_at > now);
    before - entries.len()
}
