//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use std::collections::HashSet;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("bot.plugins is empty; at least one plugin must be configured")]
    NoPlugins,
    #[error("no [[servers]] configured")]
    NoServers,
    #[error("duplicate server name: {0}")]
    DuplicateServer(String),
    #[error("servers.{0}.nick is required")]
    MissingNick(String),
    #[error("servers.{0}.port must not be 0")]
    InvalidPort(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.bot.plugins.is_empty() {
        errors.push(ValidationError::NoPlugins);
    }
    if config.servers.is_empty() {
        errors.push(ValidationError::NoServers);
    }

    let mut seen = HashSet::new();
    for server in &config.servers {
        if !seen.insert(server.name.as_str()) {
            errors.push(ValidationError::DuplicateServer(server.name.clone()));
        }
        if server.nick.trim().is_empty() {
            errors.push(ValidationError::MissingNick(server.name.clone()));
        }
        if server.port == 0 {
            errors.push(ValidationError::InvalidPort(server.name.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(text: &str) -> Config {
        Config::parse(text).unwrap()
    }

    #[test]
    fn valid_config_passes() {
        let config = config(
            r#"
[bot]
plugins = ["core"]

[[servers]]
name = "a"
nick = "bot"
"#,
        );
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let config = config(
            r#"
[bot]

[[servers]]
name = "a"
nick = ""
port = 0

[[servers]]
name = "a"
nick = "bot"
"#,
        );
        let errors = validate(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::NoPlugins,
                ValidationError::MissingNick("a".into()),
                ValidationError::InvalidPort("a".into()),
                ValidationError::DuplicateServer("a".into()),
            ]
        );
    }

    #[test]
    fn empty_config_reports_plugins_and_servers() {
        let errors = validate(&config("[bot]\n")).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::NoPlugins, ValidationError::NoServers]
        );
    }
}
