//! Typed status cache over a [`CacheProvider`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::warn;

use statushub_cache::keys;
use statushub_core::events::InvalidationTopic;
use statushub_core::result::AppResult;
use statushub_core::traits::cache::{CacheProvider, CacheProviderExt};
use statushub_entity::status::StatusRecord;

/// Hit, miss and error counts of a [`StatusCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups for keys the cache did not hold.
    pub misses: u64,
    /// Lookups that failed and had to be treated as unknown.
    pub errors: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
}

/// Status records keyed by user ID.
#[derive(Debug, Clone)]
pub struct StatusCache {
    provider: Arc<dyn CacheProvider>,
    counters: Arc<Counters>,
}

impl StatusCache {
    /// Wrap the provider built for the status cache.
    pub fn new(provider: Arc<dyn CacheProvider>) -> Self {
        Self {
            provider,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Logical cache name.
    pub fn name(&self) -> &str {
        self.provider.name()
    }

    /// Topic peers must be told about changes on, or `None` for a shared cache.
    pub fn topic(&self) -> InvalidationTopic {
        self.provider.invalidate_cluster_event()
    }

    /// Look up a record.
    ///
    /// An `Err` (transport or decoding failure) means "unknown": the caller
    /// falls back to the store.
    pub async fn get(&self, user_id: &str) -> AppResult<Option<StatusRecord>> {
        match self.provider.get_value::<StatusRecord>(&keys::status(user_id)).await {
            Ok(Some(record)) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(record))
            }
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                warn!(cache = self.name(), user_id, error = %e, "Status cache lookup failed");
                Err(e)
            }
        }
    }

    /// Store a record with the cache's default TTL.
    pub async fn put(&self, record: &StatusRecord) -> AppResult<()> {
        self.provider
            .set_value_with_default_expiry(&keys::status(&record.user_id), record)
            .await
    }

    /// Drop one user's record.
    pub async fn remove(&self, user_id: &str) -> AppResult<()> {
        self.provider.remove(&keys::status(user_id)).await
    }

    /// Drop every record.
    pub async fn purge(&self) -> AppResult<()> {
        self.provider.purge().await
    }

    /// Counters since this cache was created.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
        }
    }
}
