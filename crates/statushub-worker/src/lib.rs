//! Recurring background jobs for StatusHub.
//!
//! This crate provides:
//! - The [`RecurringJob`](jobs::RecurringJob) contract for periodic work
//! - The timed-DND expiry job
//! - A scheduler running registered jobs at fixed intervals

pub mod jobs;
pub mod scheduler;

pub use jobs::{DndExpiryJob, RecurringJob};
pub use scheduler::CronScheduler;
