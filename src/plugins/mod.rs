//! Plugins linked into the binary.

mod core_plugin;

pub use core_plugin::CorePlugin;

use crate::plugin::PluginFactories;

/// Factories for every built-in plugin, keyed by manifest main class.
pub fn builtin_factories() -> PluginFactories {
    let mut factories = PluginFactories::new();
    factories.register(CorePlugin::MAIN_CLASS, CorePlugin::from_settings);
    factories
}
