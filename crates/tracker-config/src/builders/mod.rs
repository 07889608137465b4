//! Builders for test configurations.

mod config;

pub use config::ConfigBuilder;
