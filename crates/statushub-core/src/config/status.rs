//! User status tracking configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Runtime settings read by the status engine at the start of every
/// operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct StatusConfig {
    /// Whether status tracking is enabled at all.
    ///
    /// When disabled every status operation is a successful no-op.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Idle time after which a non-manual user is considered away.
    #[serde(default = "default_away_timeout")]
    #[validate(range(min = 1))]
    pub away_timeout_seconds: u64,
    /// Minimum interval between two persisted activity-only refreshes.
    #[serde(default = "default_min_update_interval")]
    #[validate(range(max = 3_600_000))]
    pub min_update_interval_ms: u64,
    /// Period of the timed-DND expiry sweep.
    #[serde(default = "default_dnd_expiry_interval")]
    #[validate(range(min = 1, max = 3600))]
    pub dnd_expiry_interval_seconds: u64,
}

impl StatusConfig {
    /// Away timeout in milliseconds.
    pub fn away_timeout_ms(&self) -> i64 {
        i64::try_from(self.away_timeout_seconds.saturating_mul(1000)).unwrap_or(i64::MAX)
    }

    /// Minimum activity update interval in milliseconds.
    pub fn min_update_interval(&self) -> i64 {
        i64::try_from(self.min_update_interval_ms).unwrap_or(i64::MAX)
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            away_timeout_seconds: default_away_timeout(),
            min_update_interval_ms: default_min_update_interval(),
            dnd_expiry_interval_seconds: default_dnd_expiry_interval(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_away_timeout() -> u64 {
    300
}

fn default_min_update_interval() -> u64 {
    60_000
}

fn default_dnd_expiry_interval() -> u64 {
    60
}
