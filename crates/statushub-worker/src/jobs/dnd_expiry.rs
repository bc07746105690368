//! Timed DND expiry: restores users whose DND deadline has passed.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use statushub_core::result::AppResult;
use statushub_service::StatusService;

use super::RecurringJob;

/// Sweeps expired timed DND statuses on every run.
///
/// The store flips each expired row exactly once, so every node may run
/// this job. Runs on one node never overlap; a tick arriving while the
/// previous pass is still going is skipped.
#[derive(Debug)]
pub struct DndExpiryJob {
    service: StatusService,
    running: AtomicBool,
}

/// Clears the running flag when a pass ends, including when it is dropped.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl DndExpiryJob {
    /// Create the job over the status engine.
    pub fn new(service: StatusService) -> Self {
        Self {
            service,
            running: AtomicBool::new(false),
        }
    }

    fn try_start(&self) -> Option<RunGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(&self.running))
    }
}

#[async_trait]
impl RecurringJob for DndExpiryJob {
    fn name(&self) -> &'static str {
        "dnd_expiry"
    }

    async fn run_once(&self) -> AppResult<Value> {
        let Some(_guard) = self.try_start() else {
            debug!("Previous DND expiry pass still running; skipping");
            return Ok(serde_json::json!({
                "task": self.name(),
                "skipped": true,
            }));
        };

        let restored = self.service.expire_dnd_statuses().await?;
        if !restored.is_empty() {
            info!(count = restored.len(), "DND expiry pass restored statuses");
        }

        Ok(serde_json::json!({
            "task": self.name(),
            "restored": restored.len(),
            "users": restored.iter().map(|r| r.user_id.as_str()).collect::<Vec<_>>(),
        }))
    }
}
