//! # statushub-entity
//!
//! Domain entity models for StatusHub. [`status::StatusRecord`] is the
//! database row and cache value for a user's presence; [`cluster`] holds
//! the closed set of messages exchanged between nodes and pushed to
//! connected clients.

pub mod cluster;
pub mod status;
