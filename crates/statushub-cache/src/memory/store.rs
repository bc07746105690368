//! In-memory cache implementation using the moka crate.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use moka::Expiry;
use moka::future::Cache;
use tracing::debug;

use statushub_core::config::cache::MemoryCacheConfig;
use statushub_core::events::InvalidationTopic;
use statushub_core::result::AppResult;
use statushub_core::traits::cache::CacheProvider;

/// A cached value together with its own time-to-live.
#[derive(Debug, Clone)]
struct Entry {
    value: Bytes,
    ttl: Option<Duration>,
}

/// Per-entry expiry policy: every write resets the clock to the TTL it
/// was written with; `None` never expires.
struct EntryExpiry;

impl Expiry<String, Entry> for EntryExpiry {
    fn expire_after_create(&self, _key: &String, value: &Entry, _created_at: Instant) -> Option<Duration> {
        value.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl
    }
}

/// Bounded in-process cache provider using moka.
///
/// One instance serves one logical cache; its entries live only on this
/// node, so peers learn about changes through `invalidate_cluster_event`.
#[derive(Debug, Clone)]
pub struct MemoryCacheProvider {
    /// Logical namespace.
    name: String,
    /// Cluster topic used for remote invalidation.
    topic: InvalidationTopic,
    /// The underlying moka cache.
    cache: Cache<String, Entry>,
    /// Default TTL for entries.
    default_ttl: Duration,
}

impl MemoryCacheProvider {
    /// Create a new in-memory cache from configuration.
    pub fn new(
        name: impl Into<String>,
        topic: InvalidationTopic,
        config: &MemoryCacheConfig,
        default_ttl_seconds: u64,
    ) -> Self {
        let name = name.into();
        let cache = Cache::builder()
            .name(&name)
            .max_capacity(config.max_capacity)
            .expire_after(EntryExpiry)
            .build();

        Self {
            name,
            topic,
            cache,
            default_ttl: Duration::from_secs(default_ttl_seconds),
        }
    }

    async fn insert(&self, key: &str, value: Bytes, ttl: Option<Duration>) {
        self.cache.insert(key.to_string(), Entry { value, ttl }).await;
    }
}

#[async_trait]
impl CacheProvider for MemoryCacheProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn invalidate_cluster_event(&self) -> InvalidationTopic {
        self.topic
    }

    async fn get(&self, key: &str) -> AppResult<Option<Bytes>> {
        Ok(self.cache.get(key).await.map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: Bytes) -> AppResult<()> {
        self.insert(key, value, None).await;
        Ok(())
    }

    async fn set_with_expiry(&self, key: &str, value: Bytes, ttl: Duration) -> AppResult<()> {
        let ttl = (!ttl.is_zero()).then_some(ttl);
        self.insert(key, value, ttl).await;
        Ok(())
    }

    async fn set_with_default_expiry(&self, key: &str, value: Bytes) -> AppResult<()> {
        self.set_with_expiry(key, value, self.default_ttl).await
    }

    async fn remove(&self, key: &str) -> AppResult<()> {
        self.cache.remove(key).await;
        Ok(())
    }

    async fn purge(&self) -> AppResult<()> {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        debug!(cache = %self.name, "Purged in-memory cache");
        Ok(())
    }

    async fn keys(&self) -> AppResult<Vec<String>> {
        Ok(self
            .cache
            .iter()
            .map(|(key, _)| key.as_ref().clone())
            .collect())
    }

    async fn len(&self) -> AppResult<usize> {
        self.cache.run_pending_tasks().await;
        Ok(usize::try_from(self.cache.entry_count()).unwrap_or(usize::MAX))
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }
}
