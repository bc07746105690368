//! Live status configuration.

use tokio::sync::watch;
use tracing::info;
use validator::Validate;

use statushub_core::config::status::StatusConfig;
use statushub_core::result::AppResult;

/// Owner side of the status configuration.
///
/// The engine keeps a receiver and reads one snapshot per operation, so an
/// update applies from the next operation on without a restart.
#[derive(Debug, Clone)]
pub struct StatusConfigHandle {
    tx: watch::Sender<StatusConfig>,
}

impl StatusConfigHandle {
    /// Validate and publish the initial configuration.
    pub fn new(initial: StatusConfig) -> AppResult<Self> {
        initial.validate()?;
        let (tx, _) = watch::channel(initial);
        Ok(Self { tx })
    }

    /// A receiver for the engine.
    pub fn subscribe(&self) -> watch::Receiver<StatusConfig> {
        self.tx.subscribe()
    }

    /// The configuration currently in effect.
    pub fn current(&self) -> StatusConfig {
        self.tx.borrow().clone()
    }

    /// Replace the configuration. An invalid one is rejected and the
    /// previous one stays in effect.
    pub fn update(&self, config: StatusConfig) -> AppResult<()> {
        config.validate()?;
        info!(
            enabled = config.enabled,
            away_timeout_seconds = config.away_timeout_seconds,
            min_update_interval_ms = config.min_update_interval_ms,
            "Status configuration updated"
        );
        self.tx.send_replace(config);
        Ok(())
    }

    /// Turn status tracking on or off.
    pub fn set_enabled(&self, enabled: bool) {
        self.tx.send_modify(|config| config.enabled = enabled);
    }
}
