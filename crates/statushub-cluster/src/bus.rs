//! Cluster bus contract and handler dispatch.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use statushub_core::config::cluster::ClusterConfig;
use statushub_core::error::AppError;
use statushub_core::result::AppResult;
use statushub_entity::cluster::{ClusterEvent, ClusterEventKind, ClusterMessage};

/// Receives cluster events of the kinds it subscribed to.
///
/// Delivery is at-least-once across the cluster, so handlers must be
/// idempotent.
#[async_trait]
pub trait ClusterHandler: Send + Sync {
    /// Apply one event received from another node.
    async fn handle(&self, event: ClusterEvent) -> AppResult<()>;
}

/// Publish/subscribe channel between the nodes of a cluster.
#[async_trait]
pub trait ClusterBus: Send + Sync + std::fmt::Debug {
    /// Identifier of this node; its own messages are never delivered back.
    fn node_id(&self) -> Uuid;

    /// Send an event to every other node.
    ///
    /// Fire-and-forget: transport failures are logged, never returned, and
    /// publishing without subscribers is a no-op.
    async fn publish(&self, event: ClusterEvent);

    /// Register a handler for one event kind.
    fn subscribe(&self, kind: ClusterEventKind, handler: Arc<dyn ClusterHandler>);
}

/// Handlers registered on one node, grouped by event kind.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<ClusterEventKind, Vec<Arc<dyn ClusterHandler>>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("kinds", &self.handlers.len())
            .finish()
    }
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler for `kind`.
    pub fn register(&self, kind: ClusterEventKind, handler: Arc<dyn ClusterHandler>) {
        self.handlers.entry(kind).or_default().push(handler);
    }

    /// Deliver a received message to the handlers of its kind.
    ///
    /// Messages published by `local` are dropped. Handler failures are
    /// logged and do not stop delivery to the remaining handlers.
    pub async fn dispatch(&self, local: Uuid, message: ClusterMessage) {
        if message.origin == local {
            return;
        }
        let kind = message.event.kind();
        // Clone the handler list so no shard lock is held while handlers run.
        let handlers: Vec<_> = match self.handlers.get(&kind) {
            Some(entry) => entry.value().clone(),
            None => {
                debug!(?kind, "No handler for cluster event");
                return;
            }
        };
        for handler in handlers {
            if let Err(e) = handler.handle(message.event.clone()).await {
                warn!(?kind, origin = %message.origin, error = %e, "Cluster handler failed");
            }
        }
    }
}

/// Build the cluster bus selected by configuration.
pub async fn connect(config: &ClusterConfig) -> AppResult<Arc<dyn ClusterBus>> {
    match config.provider.as_str() {
        "memory" => {
            info!("Initializing in-memory cluster bus (single node)");
            let hub = crate::memory::MemoryClusterHub::new(config.presence_buffer_size);
            Ok(Arc::new(hub.join()))
        }
        #[cfg(feature = "redis-pubsub")]
        "redis" => {
            info!(channel = %config.channel, "Initializing Redis cluster bus");
            let bus =
                crate::redis_pubsub::RedisClusterBus::connect(&config.redis_url, &config.channel)
                    .await?;
            Ok(Arc::new(bus))
        }
        other => Err(AppError::configuration(format!(
            "Unknown cluster provider: '{other}'. Supported: memory{}",
            if cfg!(feature = "redis-pubsub") { ", redis" } else { "" }
        ))),
    }
}
