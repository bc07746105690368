//! In-memory cluster bus.
//!
//! Every node joined to the same [`MemoryClusterHub`] sees the others'
//! messages. A production single-node deployment joins one node; tests
//! join several to simulate a cluster inside one process.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use statushub_entity::cluster::{ClusterEvent, ClusterEventKind, ClusterMessage};

use crate::bus::{ClusterBus, ClusterHandler, HandlerRegistry};

/// Shared in-process transport.
#[derive(Debug, Clone)]
pub struct MemoryClusterHub {
    tx: broadcast::Sender<ClusterMessage>,
}

impl MemoryClusterHub {
    /// Create a hub whose per-node backlog holds `buffer_size` messages.
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer_size.max(1));
        Self { tx }
    }

    /// Attach a new node with a fresh identifier.
    ///
    /// Must be called inside a Tokio runtime; the node's listener task runs
    /// until the returned bus is dropped.
    pub fn join(&self) -> MemoryClusterBus {
        let node_id = Uuid::new_v4();
        let registry = Arc::new(HandlerRegistry::new());
        let mut rx = self.tx.subscribe();

        let listener = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                loop {
                    match rx.recv().await {
                        Ok(message) => registry.dispatch(node_id, message).await,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(node = %node_id, skipped, "Cluster listener lagged; messages dropped");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
                debug!(node = %node_id, "Cluster listener stopped");
            })
        };

        MemoryClusterBus {
            node_id,
            tx: self.tx.clone(),
            registry,
            listener,
        }
    }
}

/// One node's view of a [`MemoryClusterHub`].
#[derive(Debug)]
pub struct MemoryClusterBus {
    node_id: Uuid,
    tx: broadcast::Sender<ClusterMessage>,
    registry: Arc<HandlerRegistry>,
    listener: JoinHandle<()>,
}

impl Drop for MemoryClusterBus {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

#[async_trait]
impl ClusterBus for MemoryClusterBus {
    fn node_id(&self) -> Uuid {
        self.node_id
    }

    async fn publish(&self, event: ClusterEvent) {
        let kind = event.kind();
        // Sending only fails when nobody listens, which is the documented no-op.
        if self.tx.send(ClusterMessage::new(self.node_id, event)).is_err() {
            debug!(?kind, "Cluster event published without listeners");
        }
    }

    fn subscribe(&self, kind: ClusterEventKind, handler: Arc<dyn ClusterHandler>) {
        self.registry.register(kind, handler);
    }
}
