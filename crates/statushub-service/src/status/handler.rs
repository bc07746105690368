//! Applies status updates published by other nodes.

use std::sync::Weak;

use async_trait::async_trait;
use tracing::trace;

use statushub_cluster::ClusterHandler;
use statushub_core::result::AppResult;
use statushub_entity::cluster::ClusterEvent;

use super::service::Engine;

/// Cluster handler for [`ClusterEvent::UpdateStatus`].
///
/// Writes the peer's record into this node's status cache without
/// publishing it again. Holds the engine weakly so the bus does not keep a
/// dropped engine alive.
#[derive(Debug)]
pub struct StatusClusterHandler {
    engine: Weak<Engine>,
}

impl StatusClusterHandler {
    pub(super) fn new(engine: Weak<Engine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl ClusterHandler for StatusClusterHandler {
    async fn handle(&self, event: ClusterEvent) -> AppResult<()> {
        let ClusterEvent::UpdateStatus(record) = event else {
            return Ok(());
        };
        let Some(engine) = self.engine.upgrade() else {
            return Ok(());
        };
        trace!(user_id = %record.user_id, status = %record.status, "Remote status update");
        engine.apply_remote_status(record).await
    }
}
