//! Runtime settings for the tile engine, persisted as `config.ron`.
//!
//! Each domain crate owns its settings struct; [`Config`] gathers them into
//! one file with CLI overrides and hot-reload detection.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{CONFIG_FILE, Config, DebugConfig, default_config_dir};
pub use error::ConfigError;
