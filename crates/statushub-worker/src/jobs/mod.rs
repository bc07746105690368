//! Built-in recurring jobs.

pub mod dnd_expiry;

pub use dnd_expiry::DndExpiryJob;

use async_trait::async_trait;
use serde_json::Value;

use statushub_core::result::AppResult;

/// Work the scheduler runs on a fixed interval.
#[async_trait]
pub trait RecurringJob: Send + Sync + std::fmt::Debug {
    /// Name used in logs and schedule registration.
    fn name(&self) -> &'static str;

    /// Run one pass and return a summary of what was done.
    async fn run_once(&self) -> AppResult<Value>;
}
