//! Redis connection management.

use redis::Client;
use redis::aio::ConnectionManager;
use tracing::info;

use statushub_core::config::cache::RedisCacheConfig;
use statushub_core::error::{AppError, ErrorKind};
use statushub_core::result::AppResult;

/// Shared Redis connection.
///
/// The connection manager reconnects on its own and is cheap to clone, so
/// every logical cache built on one client shares a single connection.
#[derive(Clone)]
pub struct RedisClient {
    conn: ConnectionManager,
    url: String,
}

impl std::fmt::Debug for RedisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisClient")
            .field("url", &mask_redis_url(&self.url))
            .finish_non_exhaustive()
    }
}

impl RedisClient {
    /// Connect using the cache configuration.
    pub async fn connect(config: &RedisCacheConfig) -> AppResult<Self> {
        Self::connect_url(&config.url).await
    }

    /// Connect to the given Redis URL.
    pub async fn connect_url(url: &str) -> AppResult<Self> {
        info!(url = %mask_redis_url(url), "Connecting to Redis");

        let client = Client::open(url).map_err(|e| {
            AppError::with_source(ErrorKind::Cache, "Failed to create Redis client", e)
        })?;

        let conn = ConnectionManager::new(client).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::ServiceUnavailable,
                "Failed to connect to Redis",
                e,
            )
        })?;

        info!("Successfully connected to Redis");
        Ok(Self {
            conn,
            url: url.to_string(),
        })
    }

    /// A connection handle for one command sequence.
    pub fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

/// Mask the password in a Redis URL for safe logging.
pub fn mask_redis_url(url: &str) -> String {
    let Some(at_pos) = url.rfind('@') else {
        return url.to_string();
    };
    let scheme_end = url.find("://").map(|p| p + 3).unwrap_or(0);
    match url[..at_pos].rfind(':') {
        Some(colon_pos) if colon_pos >= scheme_end => {
            format!("{}:****@{}", &url[..colon_pos], &url[at_pos + 1..])
        }
        _ => url.to_string(),
    }
}
