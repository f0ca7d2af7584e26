//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Core config struct definitions (Config, BotConfig, ServerConfig)
//! - [`defaults`]: serde default helpers
//! - [`validation`]: startup checks that collect every problem at once

mod defaults;
mod types;
mod validation;

pub use types::{BotConfig, Config, ConfigError, RelayConfig, ServerConfig};
pub use validation::{ValidationError, validate};
