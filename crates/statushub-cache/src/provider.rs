//! Cache manager that builds logical caches on the configured provider.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{info, warn};

use statushub_core::config::cache::CacheConfig;
use statushub_core::error::AppError;
use statushub_core::events::InvalidationTopic;
use statushub_core::result::AppResult;
use statushub_core::traits::cache::CacheProvider;

/// Backend every logical cache of this process is built on.
#[derive(Debug, Clone)]
enum Backend {
    #[cfg(feature = "memory")]
    Memory {
        config: statushub_core::config::cache::MemoryCacheConfig,
        default_ttl_seconds: u64,
    },
    #[cfg(feature = "redis-backend")]
    Redis {
        client: crate::redis::RedisClient,
        default_ttl_seconds: u64,
        operation_timeout_ms: u64,
    },
    /// Caches handed in from outside; [`CacheManager::build_cache`] is not
    /// available.
    External,
}

/// Factory and registry of named caches.
///
/// The backend is selected at construction time based on configuration;
/// each call to [`build_cache`](Self::build_cache) creates one logical
/// cache on it and remembers it so remote invalidations can find it.
#[derive(Debug, Clone)]
pub struct CacheManager {
    backend: Backend,
    caches: Arc<DashMap<String, Arc<dyn CacheProvider>>>,
}

impl CacheManager {
    /// Create a new cache manager from configuration.
    pub async fn new(config: &CacheConfig) -> AppResult<Self> {
        let backend = match config.provider.as_str() {
            #[cfg(feature = "redis-backend")]
            "redis" => {
                info!("Initializing Redis cache provider");
                let client = crate::redis::RedisClient::connect(&config.redis).await?;
                Backend::Redis {
                    client,
                    default_ttl_seconds: config.default_ttl_seconds,
                    operation_timeout_ms: config.redis.operation_timeout_ms,
                }
            }
            #[cfg(feature = "memory")]
            "memory" => {
                info!("Initializing in-memory cache provider");
                Backend::Memory {
                    config: config.memory.clone(),
                    default_ttl_seconds: config.default_ttl_seconds,
                }
            }
            other => {
                return Err(AppError::configuration(format!(
                    "Unknown cache provider: '{other}'. Supported: memory, redis"
                )));
            }
        };

        Ok(Self {
            backend,
            caches: Arc::new(DashMap::new()),
        })
    }

    /// Create a cache manager around an existing provider (for testing).
    pub fn from_provider(provider: Arc<dyn CacheProvider>) -> Self {
        let caches = DashMap::new();
        caches.insert(provider.name().to_string(), provider);
        Self {
            backend: Backend::External,
            caches: Arc::new(caches),
        }
    }

    /// Create and register the logical cache `name`.
    ///
    /// `topic` is the cluster topic its remote invalidations use; backends
    /// shared by all nodes ignore it. Names are unique per process.
    pub fn build_cache(
        &self,
        name: &str,
        topic: InvalidationTopic,
    ) -> AppResult<Arc<dyn CacheProvider>> {
        let cache: Arc<dyn CacheProvider> = match &self.backend {
            #[cfg(feature = "memory")]
            Backend::Memory {
                config,
                default_ttl_seconds,
            } => Arc::new(crate::memory::MemoryCacheProvider::new(
                name,
                topic,
                config,
                *default_ttl_seconds,
            )),
            #[cfg(feature = "redis-backend")]
            Backend::Redis {
                client,
                default_ttl_seconds,
                operation_timeout_ms,
            } => Arc::new(crate::redis::RedisCacheProvider::new(
                client.clone(),
                name,
                *default_ttl_seconds,
                *operation_timeout_ms,
            )),
            Backend::External => {
                return Err(AppError::configuration(
                    "Cache manager was built from a fixed provider and cannot create caches",
                ));
            }
        };

        match self.caches.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(AppError::conflict(format!(
                "Cache '{name}' is already registered"
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&cache));
                info!(cache = name, topic = %cache.invalidate_cluster_event(), "Cache created");
                Ok(cache)
            }
        }
    }

    /// Look up a registered cache by name.
    pub fn cache(&self, name: &str) -> Option<Arc<dyn CacheProvider>> {
        self.caches.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Every registered cache whose remote invalidations use `topic`.
    pub fn caches_for_topic(&self, topic: InvalidationTopic) -> Vec<Arc<dyn CacheProvider>> {
        if !topic.needs_peer_sync() {
            return Vec::new();
        }
        self.caches
            .iter()
            .filter(|entry| entry.value().invalidate_cluster_event() == topic)
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Purge every registered cache. Failures are logged and the first
    /// one is returned after all caches were attempted.
    pub async fn purge_all(&self) -> AppResult<()> {
        let caches: Vec<_> = self
            .caches
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut first_err = None;
        for cache in caches {
            if let Err(e) = cache.purge().await {
                warn!(cache = cache.name(), error = %e, "Failed to purge cache");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Whether every registered cache backend is reachable.
    pub async fn health_check(&self) -> AppResult<bool> {
        let caches: Vec<_> = self
            .caches
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for cache in caches {
            if !cache.health_check().await? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
