//! Core configuration types and loading.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use super::defaults::{
    default_address, default_log_level, default_plugins_dir, default_port, default_realname,
    default_true,
};
use crate::telemetry::LogLevel;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Bot configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Runtime settings.
    pub bot: BotConfig,
    /// One entry per chat server to connect to.
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
    /// Event relay settings.
    #[serde(default)]
    pub relay: RelayConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

/// Runtime settings shared by every server.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Root directory holding one sub-directory per plugin.
    #[serde(default = "default_plugins_dir")]
    pub plugins_dir: String,
    /// Plugins loaded manually at boot, in order.
    #[serde(default)]
    pub plugins: Vec<String>,
    /// Minimum level logged when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,
}

/// One chat server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Session name. Routines are gated per name.
    pub name: String,
    /// Host to connect to.
    #[serde(default = "default_address")]
    pub address: String,
    /// TCP port (plaintext).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Login nick.
    pub nick: String,
    /// Sent as PASS before NICK when set (`oauth:...` on Twitch).
    #[serde(default)]
    pub password: Option<String>,
    /// Real name sent with USER.
    #[serde(default = "default_realname")]
    pub realname: String,
    /// Channels joined once the server welcomes us.
    #[serde(default)]
    pub channels: Vec<String>,
    /// Throttle the outbound queue to one line every two seconds.
    #[serde(default = "default_true")]
    pub flood_limit: bool,
    /// Request the `twitch.tv/*` capabilities.
    #[serde(default = "default_true")]
    pub twitch: bool,
}

/// Event relay settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayConfig {
    /// Forward broadcastable events to the relay.
    #[serde(default)]
    pub enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // ServerConfig defaults
    // ========================================================================

    #[test]
    fn server_defaults_target_twitch() {
        let config = Config::parse(
            r#"
[bot]
plugins = ["core"]

[[servers]]
name = "twitch"
nick = "mybot"
"#,
        )
        .unwrap();

        let server = &config.servers[0];
        assert_eq!(server.address, "irc.chat.twitch.tv");
        assert_eq!(server.port, 6667);
        assert!(server.flood_limit);
        assert!(server.twitch);
        assert!(server.password.is_none());
        assert!(server.channels.is_empty());
        assert!(server.realname.starts_with("tmibot "));
    }

    #[test]
    fn bot_defaults() {
        let config = Config::parse("[bot]\n").unwrap();
        assert_eq!(config.bot.plugins_dir, "plugins");
        assert!(config.bot.plugins.is_empty());
        assert_eq!(config.bot.log_level, LogLevel::Notice);
        assert!(config.servers.is_empty());
        assert!(!config.relay.enabled);
    }

    #[test]
    fn log_level_is_lowercase() {
        let config = Config::parse("[bot]\nlog_level = \"warning\"\n").unwrap();
        assert_eq!(config.bot.log_level, LogLevel::Warning);
        assert!(Config::parse("[bot]\nlog_level = \"loud\"\n").is_err());
    }

    #[test]
    fn load_nonexistent_file_is_io_error() {
        let err = Config::load("/nonexistent/path/tmibot.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
