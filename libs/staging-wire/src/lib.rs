//! Staging wire models
//!
//! JSON payloads exchanged between the staging orchestrator and remote staging workers.

pub mod models;

pub use models::*;
