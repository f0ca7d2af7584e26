//! Default value functions for configuration.

use crate::telemetry::LogLevel;

/// Returns `true` (for serde defaults).
pub fn default_true() -> bool {
    true
}

pub fn default_plugins_dir() -> String {
    "plugins".to_string()
}

pub fn default_log_level() -> LogLevel {
    LogLevel::Notice
}

pub fn default_port() -> u16 {
    6667
}

pub fn default_address() -> String {
    "irc.chat.twitch.tv".to_string()
}

pub fn default_realname() -> String {
    concat!("tmibot ", env!("CARGO_PKG_VERSION")).to_string()
}
