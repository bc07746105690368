//! Fixed-interval scheduler for recurring jobs.

use std::sync::Arc;
use std::time::Duration;

use tokio_cron_scheduler::{Job as CronJob, JobScheduler};
use tracing;

use statushub_core::error::AppError;

use crate::jobs::RecurringJob;

/// Runs [`RecurringJob`]s on fixed intervals.
pub struct CronScheduler {
    /// The underlying job scheduler
    scheduler: JobScheduler,
}

impl std::fmt::Debug for CronScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronScheduler").finish()
    }
}

impl CronScheduler {
    /// Create a new scheduler
    pub async fn new() -> Result<Self, AppError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::internal(format!("Failed to create scheduler: {e}")))?;

        Ok(Self { scheduler })
    }

    /// Run `job` every `interval`. A failed pass is logged and the next
    /// tick tries again.
    pub async fn register(
        &self,
        job: Arc<dyn RecurringJob>,
        interval: Duration,
    ) -> Result<(), AppError> {
        if interval.is_zero() {
            return Err(AppError::configuration(format!(
                "Interval for {} must be positive",
                job.name()
            )));
        }

        let name = job.name();
        let cron_job = CronJob::new_repeated_async(interval, move |_uuid, _lock| {
            let job = Arc::clone(&job);
            Box::pin(async move {
                match job.run_once().await {
                    Ok(summary) => tracing::trace!(job = job.name(), %summary, "Recurring job finished"),
                    Err(e) => tracing::error!(job = job.name(), error = %e, "Recurring job failed"),
                }
            })
        })
        .map_err(|e| AppError::internal(format!("Failed to create {name} schedule: {e}")))?;

        self.scheduler
            .add(cron_job)
            .await
            .map_err(|e| AppError::internal(format!("Failed to add {name} schedule: {e}")))?;

        tracing::info!(job = name, interval_secs = interval.as_secs_f64(), "Registered recurring job");
        Ok(())
    }

    /// Start the scheduler
    pub async fn start(&self) -> Result<(), AppError> {
        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::internal(format!("Failed to start scheduler: {e}")))?;

        tracing::info!("Scheduler started");
        Ok(())
    }

    /// Shutdown the scheduler
    pub async fn shutdown(&mut self) -> Result<(), AppError> {
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::internal(format!("Failed to shutdown scheduler: {e}")))?;

        tracing::info!("Scheduler shut down");
        Ok(())
    }
}
