//! Plugin manifests.
//!
//! Each plugin directory holds a `plugin.toml`:
//!
//! ```toml
//! [pluginDefinition]
//! mainClass = "Quiz"
//! dependencies = ["currency"]
//!
//! [defaultSettings]
//! rounds = 5
//! ```

use serde::Deserialize;
use std::path::Path;

use crate::error::PluginError;

/// File name of the manifest inside a plugin directory.
pub const MANIFEST_FILE: &str = "plugin.toml";

#[derive(Debug, Deserialize)]
struct RawManifest {
    #[serde(rename = "pluginDefinition")]
    definition: Option<RawDefinition>,
    #[serde(rename = "defaultSettings", default)]
    default_settings: toml::Table,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDefinition {
    main_class: Option<String>,
    #[serde(default)]
    dependencies: Vec<String>,
}

/// A validated manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginManifest {
    /// Factory key and binding identity.
    pub main_class: String,
    /// Plugins that must be loaded first.
    pub dependencies: Vec<String>,
    /// Passed verbatim to the plugin constructor.
    pub default_settings: toml::Table,
}

impl PluginManifest {
    /// Parse manifest text for `plugin`.
    pub fn parse(plugin: &str, content: &str) -> Result<Self, PluginError> {
        let raw: RawManifest =
            toml::from_str(content).map_err(|source| PluginError::ManifestParse {
                plugin: plugin.to_owned(),
                source,
            })?;

        let definition = raw
            .definition
            .ok_or_else(|| PluginError::MissingMainClass(plugin.to_owned()))?;
        let main_class = definition
            .main_class
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| PluginError::MissingMainClass(plugin.to_owned()))?;

        Ok(Self {
            main_class,
            dependencies: definition.dependencies,
            default_settings: raw.default_settings,
        })
    }

    /// Read `<dir>/plugin.toml`.
    pub fn load(plugin: &str, dir: &Path) -> Result<Self, PluginError> {
        let content = std::fs::read_to_string(dir.join(MANIFEST_FILE)).map_err(|source| {
            PluginError::ManifestIo {
                plugin: plugin.to_owned(),
                source,
            }
        })?;
        Self::parse(plugin, &content)
    }
}
