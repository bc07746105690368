//! Repository implementations.

pub mod status;
