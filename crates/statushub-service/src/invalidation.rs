//! Remote cache invalidation.

use async_trait::async_trait;
use tracing::debug;

use statushub_cache::CacheManager;
use statushub_cluster::ClusterHandler;
use statushub_core::result::AppResult;
use statushub_entity::cluster::ClusterEvent;

/// Cluster handler for [`ClusterEvent::InvalidateCache`].
///
/// Removes the key from, or purges, every cache registered for the topic.
/// Both are idempotent, so repeated delivery is harmless.
#[derive(Debug, Clone)]
pub struct CacheInvalidationHandler {
    caches: CacheManager,
}

impl CacheInvalidationHandler {
    /// Creates a handler over the caches of `manager`.
    pub fn new(caches: CacheManager) -> Self {
        Self { caches }
    }
}

#[async_trait]
impl ClusterHandler for CacheInvalidationHandler {
    async fn handle(&self, event: ClusterEvent) -> AppResult<()> {
        let ClusterEvent::InvalidateCache { topic, key } = event else {
            return Ok(());
        };

        let mut first_err = None;
        for cache in self.caches.caches_for_topic(topic) {
            let result = match &key {
                Some(key) => cache.remove(key).await,
                None => cache.purge().await,
            };
            if let Err(e) = result {
                first_err.get_or_insert(e);
            }
        }
        debug!(%topic, key = ?key, "Remote cache invalidation applied");
        first_err.map_or(Ok(()), Err)
    }
}
