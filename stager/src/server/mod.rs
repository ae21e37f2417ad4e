//! HTTP surface of the stager

pub mod handlers;
pub mod serve;
pub mod state;
