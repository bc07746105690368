//! User status tracking.

pub mod cache;
pub mod config;
pub mod handler;
pub mod service;
pub mod transition;

pub use cache::{CacheStats, StatusCache};
pub use config::StatusConfigHandle;
pub use handler::StatusClusterHandler;
pub use service::StatusService;
