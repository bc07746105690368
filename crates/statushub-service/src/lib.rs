//! # statushub-service
//!
//! The status engine: decides how each presence event changes a user's
//! record, persists it, keeps the status cache current and broadcasts the
//! result to peers and connected clients.

pub mod invalidation;
pub mod status;

pub use invalidation::CacheInvalidationHandler;
pub use status::{StatusCache, StatusConfigHandle, StatusService};
