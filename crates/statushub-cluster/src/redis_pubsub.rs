//! Redis pub/sub cluster bus for multi-node deployments.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use statushub_core::error::{AppError, ErrorKind};
use statushub_core::result::AppResult;
use statushub_entity::cluster::{ClusterEvent, ClusterEventKind, ClusterMessage};

use crate::bus::{ClusterBus, ClusterHandler, HandlerRegistry};

/// Delay before the listener reconnects after losing its subscription.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Cluster bus relaying JSON-encoded [`ClusterMessage`]s over one Redis
/// pub/sub channel.
pub struct RedisClusterBus {
    node_id: Uuid,
    channel: String,
    conn: ConnectionManager,
    registry: Arc<HandlerRegistry>,
    shutdown: watch::Sender<bool>,
}

impl std::fmt::Debug for RedisClusterBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisClusterBus")
            .field("node_id", &self.node_id)
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

impl RedisClusterBus {
    /// Connect, subscribe to `channel` and start the listener task.
    pub async fn connect(url: &str, channel: &str) -> AppResult<Self> {
        let client = redis::Client::open(url).map_err(|e| {
            AppError::with_source(ErrorKind::Cluster, "Failed to create Redis client", e)
        })?;
        let conn = ConnectionManager::new(client.clone()).await.map_err(|e| {
            AppError::with_source(ErrorKind::Cluster, "Failed to connect to Redis", e)
        })?;

        let node_id = Uuid::new_v4();
        let registry = Arc::new(HandlerRegistry::new());
        let (shutdown, shutdown_rx) = watch::channel(false);

        tokio::spawn(listen(
            client,
            channel.to_string(),
            node_id,
            Arc::clone(&registry),
            shutdown_rx,
        ));

        info!(node = %node_id, channel, "Joined Redis cluster bus");
        Ok(Self {
            node_id,
            channel: channel.to_string(),
            conn,
            registry,
            shutdown,
        })
    }
}

impl Drop for RedisClusterBus {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

#[async_trait]
impl ClusterBus for RedisClusterBus {
    fn node_id(&self) -> Uuid {
        self.node_id
    }

    async fn publish(&self, event: ClusterEvent) {
        let kind = event.kind();
        let payload = match serde_json::to_string(&ClusterMessage::new(self.node_id, event)) {
            Ok(payload) => payload,
            Err(e) => {
                error!(?kind, error = %e, "Failed to encode cluster event");
                return;
            }
        };
        let mut conn = self.conn.clone();
        if let Err(e) = conn.publish::<_, _, i64>(&self.channel, payload).await {
            warn!(?kind, error = %e, "Redis PUBLISH failed");
        }
    }

    fn subscribe(&self, kind: ClusterEventKind, handler: Arc<dyn ClusterHandler>) {
        self.registry.register(kind, handler);
    }
}

/// Listener loop: (re)subscribes and dispatches until shutdown.
async fn listen(
    client: redis::Client,
    channel: String,
    node_id: Uuid,
    registry: Arc<HandlerRegistry>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            result = relay(&client, &channel, node_id, &registry) => {
                if let Err(e) = result {
                    warn!(channel = %channel, error = %e, "Cluster subscription lost; reconnecting");
                }
            }
        }
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
        }
    }
    info!(node = %node_id, "Redis cluster listener stopped");
}

async fn relay(
    client: &redis::Client,
    channel: &str,
    node_id: Uuid,
    registry: &HandlerRegistry,
) -> AppResult<()> {
    let map_err = |e: redis::RedisError| {
        AppError::with_source(ErrorKind::Cluster, format!("Redis pub/sub error: {e}"), e)
    };
    let mut pubsub = client.get_async_pubsub().await.map_err(map_err)?;
    pubsub.subscribe(channel).await.map_err(map_err)?;

    let mut messages = pubsub.on_message();
    while let Some(msg) = messages.next().await {
        let payload: String = match msg.get_payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Unreadable cluster message payload");
                continue;
            }
        };
        match serde_json::from_str::<ClusterMessage>(&payload) {
            Ok(message) => registry.dispatch(node_id, message).await,
            Err(e) => warn!(error = %e, "Malformed cluster message"),
        }
    }
    Err(AppError::cluster("Redis pub/sub stream ended"))
}
