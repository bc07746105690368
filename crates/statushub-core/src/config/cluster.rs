//! Cluster messaging configuration.

use serde::{Deserialize, Serialize};

/// Intra-cluster broadcast configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Cluster bus type: `"memory"` (single node) or `"redis"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Redis URL used for pub/sub when `provider = "redis"`.
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    /// Pub/sub channel carrying cluster messages.
    #[serde(default = "default_channel")]
    pub channel: String,
    /// Buffer size of the local presence broadcast channel.
    #[serde(default = "default_buffer")]
    pub presence_buffer_size: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            redis_url: default_redis_url(),
            channel: default_channel(),
            presence_buffer_size: default_buffer(),
        }
    }
}

fn default_provider() -> String {
    "memory".to_string()
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_channel() -> String {
    "statushub:cluster".to_string()
}

fn default_buffer() -> usize {
    256
}
