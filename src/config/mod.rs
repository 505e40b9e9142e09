//! Configuration module for SyncHub
//!
//! Provides the bootstrap CLI surface and runtime agent settings.

mod settings;

pub use settings::*;
