//! # statushub-core
//!
//! Core crate for StatusHub. Contains the cache provider contract and its
//! serialization capability, configuration schemas, cluster invalidation
//! topics, and the unified error system.
//!
//! This crate has **no** internal dependencies on other StatusHub crates.

pub mod config;
pub mod error;
pub mod events;
pub mod result;
pub mod traits;

pub use error::AppError;
pub use result::AppResult;
