//! Storage layout, settings and app records

pub mod apps;
pub mod layout;
pub mod settings;
