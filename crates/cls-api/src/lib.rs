//! HTTP layer: classification endpoint, retraining job endpoints, configuration.

pub mod active_model;
pub mod config;
pub mod server;
