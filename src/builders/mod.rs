//! Configuration Builders

pub mod config;

pub use config::{engine_config, EngineConfigBuilder};
