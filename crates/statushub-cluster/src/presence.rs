//! Presence fan-out to connected client sessions on this node.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::trace;

use statushub_core::result::AppResult;
use statushub_entity::cluster::{ClusterEvent, PresenceEvent};

use crate::bus::ClusterHandler;

/// Local presence broadcast.
///
/// The session layer subscribes once per connected client. Presence changes
/// made on other nodes arrive through the cluster bus, for which the hub is
/// itself a [`ClusterHandler`].
#[derive(Debug, Clone)]
pub struct PresenceHub {
    tx: broadcast::Sender<PresenceEvent>,
}

impl PresenceHub {
    /// Create a hub buffering `buffer_size` events per slow subscriber.
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer_size.max(1));
        Self { tx }
    }

    /// Deliver an event to every local subscriber. No subscribers is fine.
    pub fn publish(&self, event: PresenceEvent) {
        let user_id = event.user_id.clone();
        let receivers = self.tx.send(event).unwrap_or(0);
        trace!(user_id = %user_id, receivers, "Presence event published");
    }

    /// Subscribe to presence events.
    pub fn subscribe(&self) -> broadcast::Receiver<PresenceEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl ClusterHandler for PresenceHub {
    async fn handle(&self, event: ClusterEvent) -> AppResult<()> {
        if let ClusterEvent::PresenceChanged(presence) = event {
            self.publish(presence);
        }
        Ok(())
    }
}
