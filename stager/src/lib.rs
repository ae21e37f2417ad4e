//! App Stager Library
//!
//! Staging orchestration for application droplets: builds staging requests,
//! bridges the callback-driven message bus exchange into a bounded wait and
//! registers the resulting droplet.

pub mod app;
pub mod artifacts;
pub mod channel;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod server;
pub mod staging;
pub mod storage;
pub mod utils;
