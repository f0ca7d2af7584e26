//! Typed plugin constructors keyed by manifest main class.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::warn;

use super::{BindingTable, Callback, Context, Plugin, RoutineFn};
use crate::event::Event;

/// A freshly constructed plugin with its erased binding table.
pub(crate) struct Instance {
    pub plugin: Rc<RefCell<dyn Plugin>>,
    pub listeners: Vec<(String, String)>,
    pub methods: Vec<(String, Callback)>,
    pub routines: HashMap<String, RoutineFn>,
}

impl Instance {
    /// Wrap a plugin and erase its table into callbacks that hold only a
    /// weak reference, so bindings snapshotted by a dispatch in progress
    /// become no-ops once the plugin is unloaded.
    pub fn new<P: Plugin>(plugin: P) -> Self {
        let mut table = BindingTable::<P>::default();
        P::bindings(&mut table);

        let plugin = Rc::new(RefCell::new(plugin));

        let methods = table
            .methods
            .into_iter()
            .map(|(name, handler)| {
                let weak = Rc::downgrade(&plugin);
                let method = name.clone();
                let callback: Callback = Rc::new(move |event: &mut Event, ctx: &mut Context<'_>| {
                    let Some(plugin) = weak.upgrade() else {
                        return;
                    };
                    let Ok(mut plugin) = plugin.try_borrow_mut() else {
                        warn!(method = %method, event = %event.name(), "Skipping re-entrant handler");
                        return;
                    };
                    handler(&mut *plugin, event, ctx);
                });
                (name, callback)
            })
            .collect();

        let routines = table
            .routines
            .into_iter()
            .map(|(name, routine)| {
                let weak = Rc::downgrade(&plugin);
                let method = name.clone();
                let callback: RoutineFn = Rc::new(move |ctx: &mut Context<'_>| {
                    let Some(plugin) = weak.upgrade() else {
                        return;
                    };
                    let Ok(mut plugin) = plugin.try_borrow_mut() else {
                        warn!(routine = %method, "Skipping re-entrant routine");
                        return;
                    };
                    routine(&mut *plugin, ctx);
                });
                (name, callback)
            })
            .collect();

        Self {
            plugin,
            listeners: table.listeners,
            methods,
            routines,
        }
    }
}

type Constructor = Box<dyn Fn(&toml::Table) -> Instance>;

/// Constructors for every plugin main class linked into the binary.
#[derive(Default)]
pub struct PluginFactories {
    constructors: HashMap<String, Constructor>,
}

impl PluginFactories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `ctor` under `main_class`. A later registration replaces an
    /// earlier one.
    pub fn register<P, F>(&mut self, main_class: &str, ctor: F) -> &mut Self
    where
        P: Plugin,
        F: Fn(&toml::Table) -> P + 'static,
    {
        self.constructors.insert(
            main_class.to_owned(),
            Box::new(move |settings: &toml::Table| Instance::new(ctor(settings))),
        );
        self
    }

    pub fn contains(&self, main_class: &str) -> bool {
        self.constructors.contains_key(main_class)
    }

    pub(crate) fn create(&self, main_class: &str, settings: &toml::Table) -> Option<Instance> {
        self.constructors.get(main_class).map(|ctor| ctor(settings))
    }
}
