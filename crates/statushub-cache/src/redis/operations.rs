//! Redis cache provider implementation.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::AsyncCommands;
use tracing::debug;

use statushub_core::error::{AppError, ErrorKind};
use statushub_core::events::InvalidationTopic;
use statushub_core::result::AppResult;
use statushub_core::traits::cache::CacheProvider;

use super::client::RedisClient;
use crate::keys;

/// Redis-backed cache provider for one logical cache.
///
/// Keys are stored as `name:key`. Redis is shared by every node, so this
/// provider never asks for cluster invalidation.
#[derive(Debug, Clone)]
pub struct RedisCacheProvider {
    client: RedisClient,
    name: String,
    default_ttl: Duration,
    /// Upper bound for one round trip.
    op_timeout: Duration,
}

impl RedisCacheProvider {
    /// Create a new Redis cache provider.
    pub fn new(
        client: RedisClient,
        name: impl Into<String>,
        default_ttl_seconds: u64,
        operation_timeout_ms: u64,
    ) -> Self {
        Self {
            client,
            name: name.into(),
            default_ttl: Duration::from_secs(default_ttl_seconds),
            op_timeout: Duration::from_millis(operation_timeout_ms),
        }
    }

    fn full_key(&self, key: &str) -> String {
        keys::namespaced(&self.name, key)
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> AppResult<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        bounded(self.op_timeout, &self.name, op, fut).await
    }

    async fn namespace_keys(&self) -> AppResult<Vec<String>> {
        let mut conn = self.client.conn();
        let pattern = keys::namespace_pattern(&self.name);
        self.bounded("KEYS", async move {
            redis::cmd("KEYS").arg(&pattern).query_async(&mut conn).await
        })
        .await
    }
}

#[async_trait]
impl CacheProvider for RedisCacheProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn invalidate_cluster_event(&self) -> InvalidationTopic {
        InvalidationTopic::None
    }

    async fn get(&self, key: &str) -> AppResult<Option<Bytes>> {
        let full_key = self.full_key(key);
        let mut conn = self.client.conn();
        let raw: Option<Vec<u8>> = self
            .bounded("GET", async move { conn.get(&full_key).await })
            .await?;
        Ok(raw.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes) -> AppResult<()> {
        let full_key = self.full_key(key);
        let mut conn = self.client.conn();
        self.bounded("SET", async move {
            conn.set::<_, _, ()>(&full_key, value.as_ref()).await
        })
        .await
    }

    async fn set_with_expiry(&self, key: &str, value: Bytes, ttl: Duration) -> AppResult<()> {
        if ttl.is_zero() {
            return self.set(key, value).await;
        }
        let full_key = self.full_key(key);
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        let mut conn = self.client.conn();
        self.bounded("PSETEX", async move {
            conn.pset_ex::<_, _, ()>(&full_key, value.as_ref(), millis)
                .await
        })
        .await
    }

    async fn set_with_default_expiry(&self, key: &str, value: Bytes) -> AppResult<()> {
        self.set_with_expiry(key, value, self.default_ttl).await
    }

    async fn remove(&self, key: &str) -> AppResult<()> {
        let full_key = self.full_key(key);
        let mut conn = self.client.conn();
        self.bounded("DEL", async move { conn.del::<_, ()>(&full_key).await })
            .await
    }

    async fn purge(&self) -> AppResult<()> {
        let full_keys = self.namespace_keys().await?;
        if full_keys.is_empty() {
            return Ok(());
        }
        let count = full_keys.len();
        let mut conn = self.client.conn();
        self.bounded("DEL", async move { conn.del::<_, ()>(&full_keys).await })
            .await?;
        debug!(cache = %self.name, count, "Purged Redis cache namespace");
        Ok(())
    }

    async fn keys(&self) -> AppResult<Vec<String>> {
        let prefix = keys::namespaced(&self.name, "");
        Ok(self
            .namespace_keys()
            .await?
            .into_iter()
            .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }

    async fn len(&self) -> AppResult<usize> {
        Ok(self.namespace_keys().await?.len())
    }

    async fn health_check(&self) -> AppResult<bool> {
        let mut conn = self.client.conn();
        let pong: String = self
            .bounded("PING", async move {
                redis::cmd("PING").query_async(&mut conn).await
            })
            .await?;
        Ok(pong == "PONG")
    }
}

/// Run one Redis call for cache `name`. A call still pending after `limit`
/// fails with `ErrorKind::Timeout`; the caller treats both that and a Redis
/// error as an unknown key.
async fn bounded<T, F>(limit: Duration, name: &str, op: &'static str, fut: F) -> AppResult<T>
where
    F: Future<Output = redis::RedisResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(map_err),
        Err(elapsed) => Err(AppError {
            message: format!("Redis {op} on cache '{name}' timed out after {limit:?}"),
            ..AppError::from(elapsed)
        }),
    }
}

/// Map a Redis error to an AppError.
fn map_err(e: redis::RedisError) -> AppError {
    AppError::with_source(ErrorKind::Cache, format!("Redis error: {e}"), e)
}
