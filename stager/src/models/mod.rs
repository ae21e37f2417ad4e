//! Domain models

pub mod app;
