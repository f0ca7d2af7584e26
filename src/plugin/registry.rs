//! Plugin lifecycle on top of the event bus.
//!
//! The registry owns the bus, every loaded plugin instance, the routine and
//! timeout tables and the regex matchers. Plugin code only ever runs from
//! here, through a [`Context`] that borrows the registry mutably; while any
//! plugin code is running the registry is *busy* and unload requests are
//! queued until the outermost call returns.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde_json::json;
use tmibot_proto::ChatMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::factory::{Instance, PluginFactories};
use super::matcher::Matchers;
use super::routine::{DEFAULT_ROUTINE_INTERVAL, Routines};
use super::timeout::{Timeout, Timeouts};
use super::{Callback, Context, MatchFn, Plugin, PluginManifest, RoutineFn, ServerContext};
use crate::bus::{EventBus, Relay, RelayLink};
use crate::clock::Clock;
use crate::collab::{AccessControl, Storage};
use crate::error::{BusError, PluginError};
use crate::event::{Event, listeners};
use crate::telemetry::spans;

/// Owner id of the registry's own routines.
pub const REGISTRY_ID: &str = "PluginRegistry";

const TIMEOUT_ROUTINE: &str = "timeout_routine";

/// Fixed listeners and the method prefix each one auto-binds.
pub fn listener_prefixes() -> [(&'static str, &'static str); 4] {
    [
        (listeners::CORE, "on_"),
        (listeners::COMMAND, "cmd_"),
        (listeners::PROTOCOL, "irc_"),
        (listeners::TIMEOUT, "timeout_"),
    ]
}

/// Outcome of a manual batch load.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    pub failed: Vec<(String, PluginError)>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

struct PluginRecord {
    manifest: PluginManifest,
    plugin: Rc<RefCell<dyn Plugin>>,
    /// Custom listeners this plugin created.
    listeners: Vec<String>,
}

impl PluginRecord {
    fn id(&self) -> &str {
        &self.manifest.main_class
    }
}

/// Loads, unloads and drives plugins.
pub struct PluginRegistry {
    bus: EventBus<Callback>,
    clock: Rc<dyn Clock>,
    plugins_dir: PathBuf,
    factories: PluginFactories,
    manifests: HashMap<String, PluginManifest>,
    loaded: HashMap<String, PluginRecord>,
    /// Load order of `loaded`.
    order: Vec<String>,
    manual: HashSet<String>,
    /// Routine methods each plugin declared, by main class.
    routine_methods: HashMap<String, HashMap<String, RoutineFn>>,
    routines: Routines,
    timeouts: Timeouts,
    matchers: Matchers,
    access: Option<Box<dyn AccessControl>>,
    storage: Box<dyn Storage>,
    /// Depth of plugin code currently on the stack.
    busy: usize,
    deferred: VecDeque<String>,
    /// Plugins whose dependencies are being loaded right now.
    loading: HashSet<String>,
    shutdown: CancellationToken,
}

impl PluginRegistry {
    pub fn new(
        plugins_dir: impl Into<PathBuf>,
        factories: PluginFactories,
        clock: Rc<dyn Clock>,
        storage: Box<dyn Storage>,
    ) -> Self {
        let mut bus = EventBus::new();
        for (name, prefix) in listener_prefixes() {
            if let Err(e) = bus.add_listener(name, prefix) {
                warn!(listener = %name, error = %e, "Failed to create fixed listener");
            }
        }

        let mut registry = Self {
            bus,
            clock,
            plugins_dir: plugins_dir.into(),
            factories,
            manifests: HashMap::new(),
            loaded: HashMap::new(),
            order: Vec::new(),
            manual: HashSet::new(),
            routine_methods: HashMap::new(),
            routines: Routines::default(),
            timeouts: Timeouts::default(),
            matchers: Matchers::default(),
            access: None,
            storage,
            busy: 0,
            deferred: VecDeque::new(),
            loading: HashSet::new(),
            shutdown: CancellationToken::new(),
        };

        let fire: RoutineFn = Rc::new(|ctx: &mut Context<'_>| {
            ctx.fire_due_timeouts();
        });
        registry
            .routines
            .add(REGISTRY_ID, TIMEOUT_ROUTINE, DEFAULT_ROUTINE_INTERVAL, fire);
        registry
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    pub fn bus(&self) -> &EventBus<Callback> {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut EventBus<Callback> {
        &mut self.bus
    }

    pub fn set_access_control(&mut self, access: Box<dyn AccessControl>) {
        self.access = Some(access);
    }

    pub fn set_relay(&mut self, relay: Box<dyn Relay>) {
        self.bus.set_relay(relay);
    }

    pub fn relay(&self) -> &RelayLink {
        self.bus.relay()
    }

    pub fn relay_keep_alive(&mut self) {
        let now = self.now();
        self.bus.relay_keep_alive(now);
    }

    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    pub fn storage_mut(&mut self) -> &mut dyn Storage {
        self.storage.as_mut()
    }

    /// Token the scheduler watches; cancelled by [`Self::request_shutdown`].
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn request_shutdown(&self) {
        info!("Shutdown requested");
        self.shutdown.cancel();
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.contains_key(name)
    }

    pub fn is_manual(&self, name: &str) -> bool {
        self.manual.contains(name)
    }

    /// Loaded plugin names in load order.
    pub fn loaded_plugins(&self) -> &[String] {
        &self.order
    }

    pub fn manifest(&self, name: &str) -> Option<&PluginManifest> {
        self.loaded.get(name).map(|r| &r.manifest)
    }

    /// Loaded plugins that list `name` as a dependency.
    pub fn dependents(&self, name: &str) -> Vec<String> {
        self.order
            .iter()
            .filter(|other| {
                self.loaded
                    .get(*other)
                    .is_some_and(|r| r.manifest.dependencies.iter().any(|d| d == name))
            })
            .cloned()
            .collect()
    }

    pub fn pending_timeout(&self, name: &str) -> Option<&Timeout> {
        self.timeouts.get(name)
    }

    pub fn routine_interval(&self, owner: &str, method: &str) -> Option<u64> {
        self.routines.interval(owner, method)
    }

    /// Scheduled routines, including the built-in timeout routine.
    pub fn routine_count(&self) -> usize {
        self.routines.len()
    }

    pub fn pending_timeouts(&self) -> usize {
        self.timeouts.len()
    }

    pub fn matcher_count(&self) -> usize {
        self.matchers.len()
    }

    // ========================================================================
    // Load
    // ========================================================================

    /// Load `name` from `<plugins_dir>/<name>`, pulling in its dependencies
    /// first. `manual` marks a plugin the operator asked for, which is never
    /// unloaded just because its dependents went away.
    pub fn load_plugin(&mut self, name: &str, manual: bool) -> Result<(), PluginError> {
        if self.loaded.contains_key(name) {
            if manual && self.manual.insert(name.to_owned()) {
                debug!(plugin = %name, "Already loaded as a dependency; now marked manual");
            }
            return Err(PluginError::AlreadyLoaded(name.to_owned()));
        }
        if self.loading.contains(name) {
            warn!(plugin = %name, "Dependency cycle detected");
            return Err(PluginError::DependencyCycle(name.to_owned()));
        }

        let dir = self.plugins_dir.join(name);
        if !dir.is_dir() {
            debug!(plugin = %name, dir = %dir.display(), "Plugin directory missing");
            return Err(PluginError::DirectoryMissing(dir));
        }

        let manifest = self.manifest_for(name, &dir)?;
        if !self.factories.contains(&manifest.main_class) {
            return Err(PluginError::UnknownFactory {
                plugin: name.to_owned(),
                main_class: manifest.main_class,
            });
        }
        if self.loaded.values().any(|r| r.id() == manifest.main_class) {
            return Err(PluginError::AlreadyLoaded(name.to_owned()));
        }

        self.loading.insert(name.to_owned());
        let dependencies = self.load_batch(&manifest.dependencies);
        self.loading.remove(name);
        if let Err((dependency, source)) = dependencies {
            return Err(PluginError::Dependency {
                plugin: name.to_owned(),
                dependency,
                source: Box::new(source),
            });
        }

        let Some(instance) = self
            .factories
            .create(&manifest.main_class, &manifest.default_settings)
        else {
            return Err(PluginError::UnknownFactory {
                plugin: name.to_owned(),
                main_class: manifest.main_class,
            });
        };

        let id = manifest.main_class.clone();
        let plugin = self.register(name, manifest, instance);

        self.enter();
        let initialised = match plugin.try_borrow_mut() {
            Ok(mut plugin) => {
                let mut ctx = Context::new(self, None, Some(id.clone()));
                plugin.init(&mut ctx)
            }
            Err(_) => false,
        };
        self.leave();

        if !initialised || !self.loaded.contains_key(name) {
            warn!(plugin = %name, "Plugin init failed; unloading");
            if self.loaded.contains_key(name) {
                if let Err(e) = self.unload_now(name) {
                    warn!(plugin = %name, error = %e, "Cleanup after failed init incomplete");
                }
            }
            return Err(PluginError::InitFailed(name.to_owned()));
        }

        if manual {
            self.manual.insert(name.to_owned());
        }
        info!(plugin = %name, main_class = %id, manual, "Plugin loaded");

        let mut event = Event::core("pluginloaded", json!(name));
        if let Err(e) = self.dispatch(&mut event, None) {
            debug!(error = %e, "pluginloaded dispatch failed");
        }
        Ok(())
    }

    /// Load several plugins in order.
    ///
    /// A manual batch loads what it can and reports the rest. A dependency
    /// batch (`manual == false`) treats plugins that are already loaded as
    /// satisfied and stops at the first failure, unloading what it loaded.
    pub fn load_plugins<S: AsRef<str>>(
        &mut self,
        names: &[S],
        manual: bool,
    ) -> Result<LoadReport, PluginError> {
        let mut report = LoadReport::default();
        if manual {
            for name in names {
                let name = name.as_ref();
                let was_manual = self.manual.contains(name);
                match self.load_plugin(name, true) {
                    Ok(()) => report.loaded.push(name.to_owned()),
                    // Pulled in earlier as a dependency; now it is manual too
                    Err(PluginError::AlreadyLoaded(_)) if !was_manual && self.manual.contains(name) => {
                        report.loaded.push(name.to_owned());
                    }
                    Err(e) => {
                        warn!(plugin = %name, error = %e, code = e.error_code(), "Plugin load failed");
                        report.failed.push((name.to_owned(), e));
                    }
                }
            }
            return Ok(report);
        }

        let names: Vec<String> = names.iter().map(|n| n.as_ref().to_owned()).collect();
        let before: HashSet<String> = self.order.iter().cloned().collect();
        self.load_batch(&names).map_err(|(_, e)| e)?;
        report.loaded = self
            .order
            .iter()
            .filter(|n| !before.contains(*n))
            .cloned()
            .collect();
        Ok(report)
    }

    fn load_batch(&mut self, names: &[String]) -> Result<(), (String, PluginError)> {
        let mut loaded_here: Vec<String> = Vec::new();
        for name in names {
            if self.loaded.contains_key(name) {
                continue;
            }
            if let Err(e) = self.load_plugin(name, false) {
                for done in loaded_here.iter().rev() {
                    self.unload_if_orphaned(done);
                }
                return Err((name.clone(), e));
            }
            loaded_here.push(name.clone());
        }
        Ok(())
    }

    fn manifest_for(&mut self, name: &str, dir: &Path) -> Result<PluginManifest, PluginError> {
        if let Some(manifest) = self.manifests.get(name) {
            return Ok(manifest.clone());
        }
        let manifest = PluginManifest::load(name, dir)?;
        self.manifests.insert(name.to_owned(), manifest.clone());
        Ok(manifest)
    }

    /// Bind an instance and record it as loaded.
    fn register(
        &mut self,
        name: &str,
        manifest: PluginManifest,
        instance: Instance,
    ) -> Rc<RefCell<dyn Plugin>> {
        let id = manifest.main_class.clone();

        let mut created = Vec::new();
        for (listener, prefix) in &instance.listeners {
            match self.bus.add_listener(listener, prefix) {
                Ok(()) => created.push(listener.clone()),
                Err(e) => warn!(plugin = %name, listener = %listener, error = %e, "Custom listener not created"),
            }
        }

        let bound = self.bus.auto_bind(&id, &instance.methods);
        debug!(plugin = %name, bindings = bound.len(), "Auto-bound handlers");
        let rights: Vec<String> = bound
            .iter()
            .filter(|b| b.listener == listeners::COMMAND)
            .map(|b| b.right())
            .collect();
        if let Some(access) = self.access.as_mut()
            && !rights.is_empty()
        {
            access.add_rights(&rights);
        }

        self.routine_methods.insert(id, instance.routines);
        self.loaded.insert(
            name.to_owned(),
            PluginRecord {
                manifest,
                plugin: instance.plugin.clone(),
                listeners: created,
            },
        );
        self.order.push(name.to_owned());
        instance.plugin
    }

    // ========================================================================
    // Unload
    // ========================================================================

    /// Unload `name` and any automatically loaded dependency left without
    /// dependents. While plugin code is running the unload is queued and
    /// performed once the outermost call returns.
    pub fn unload_plugin(&mut self, name: &str) -> Result<(), PluginError> {
        if !self.loaded.contains_key(name) {
            return Err(PluginError::NotLoaded(name.to_owned()));
        }
        let dependents = self.dependents(name);
        if !dependents.is_empty() {
            return Err(PluginError::HasDependents {
                plugin: name.to_owned(),
                dependents,
            });
        }

        if self.busy > 0 {
            debug!(plugin = %name, "Deferring unload until plugin code returns");
            if !self.deferred.iter().any(|n| n == name) {
                self.deferred.push_back(name.to_owned());
            }
            return Ok(());
        }

        self.unload_now(name)?;
        self.drain_deferred();
        Ok(())
    }

    /// Unload everything, dependents before their dependencies.
    pub fn unload_all(&mut self) {
        while !self.order.is_empty() {
            let next = self
                .order
                .iter()
                .rev()
                .find(|name| self.dependents(name).is_empty())
                .cloned();
            let Some(name) = next else {
                warn!(remaining = ?self.order, "Dependency cycle; leaving plugins loaded");
                return;
            };
            if let Err(e) = self.unload_now(&name) {
                warn!(plugin = %name, error = %e, "Unload failed");
                return;
            }
        }
    }

    fn unload_now(&mut self, name: &str) -> Result<(), PluginError> {
        let Some(record) = self.loaded.get(name) else {
            return Err(PluginError::NotLoaded(name.to_owned()));
        };
        let dependents = self.dependents(name);
        if !dependents.is_empty() {
            return Err(PluginError::HasDependents {
                plugin: name.to_owned(),
                dependents,
            });
        }
        let id = record.id().to_owned();
        let plugin = record.plugin.clone();

        self.busy += 1;
        match plugin.try_borrow_mut() {
            Ok(mut plugin) => {
                let mut ctx = Context::new(self, None, Some(id.clone()));
                plugin.destroy(&mut ctx);
            }
            Err(_) => warn!(plugin = %name, "Plugin busy during unload; destroy skipped"),
        }
        self.busy -= 1;
        drop(plugin);

        self.routines.remove_owner(&id);
        self.routine_methods.remove(&id);
        self.matchers.remove_owner(&id);

        let rights: Vec<String> = self
            .bus
            .find_all_by_id(&id)
            .into_iter()
            .filter(|b| b.listener == listeners::COMMAND)
            .map(|b| b.right())
            .collect();
        if let Some(access) = self.access.as_mut()
            && !rights.is_empty()
        {
            access.remove_rights(&rights);
        }
        let removed = self.bus.unbind_all_by_id(&id);

        let Some(record) = self.loaded.remove(name) else {
            return Err(PluginError::NotLoaded(name.to_owned()));
        };
        for listener in &record.listeners {
            if let Err(e) = self.bus.remove_listener(listener) {
                debug!(listener = %listener, error = %e, "Custom listener already gone");
            }
        }
        self.order.retain(|n| n != name);
        self.manual.remove(name);
        self.deferred.retain(|n| n != name);
        info!(plugin = %name, bindings = removed, "Plugin unloaded");

        for dependency in &record.manifest.dependencies {
            self.unload_if_orphaned(dependency);
        }

        let mut event = Event::core("pluginunloaded", json!(name));
        if let Err(e) = self.dispatch(&mut event, None) {
            debug!(error = %e, "pluginunloaded dispatch failed");
        }
        Ok(())
    }

    fn unload_if_orphaned(&mut self, name: &str) {
        if !self.loaded.contains_key(name)
            || self.manual.contains(name)
            || !self.dependents(name).is_empty()
        {
            return;
        }
        debug!(plugin = %name, "Unloading orphaned dependency");
        if let Err(e) = self.unload_now(name) {
            warn!(plugin = %name, error = %e, "Orphaned dependency unload failed");
        }
    }

    fn enter(&mut self) {
        self.busy += 1;
    }

    fn leave(&mut self) {
        self.busy = self.busy.saturating_sub(1);
        if self.busy == 0 {
            self.drain_deferred();
        }
    }

    fn drain_deferred(&mut self) {
        while let Some(name) = self.deferred.pop_front() {
            if !self.loaded.contains_key(&name) {
                continue;
            }
            if let Err(e) = self.unload_now(&name) {
                warn!(plugin = %name, error = %e, code = e.error_code(), "Deferred unload failed");
            }
        }
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Invoke every binding for `event` in registration order until one
    /// stops propagation, then forward it to the relay. Bindings are
    /// snapshotted first, so handlers may bind, unbind or unload freely.
    pub fn dispatch(
        &mut self,
        event: &mut Event,
        mut server: Option<ServerContext<'_>>,
    ) -> Result<usize, PluginError> {
        let _span = spans::dispatch(event.kind(), event.name()).entered();
        let bindings = self.bus.bindings_for(event)?;

        self.enter();
        let mut invoked = 0;
        for binding in &bindings {
            if !event.propagates() {
                break;
            }
            let ctx_server = server.as_mut().map(ServerContext::reborrow);
            let mut ctx = Context::new(self, ctx_server, Some(binding.id.clone()));
            (binding.handler)(event, &mut ctx);
            invoked += 1;
        }
        let now = self.now();
        self.bus.forward(event, now);
        self.leave();
        Ok(invoked)
    }

    /// Bind a handler by hand, outside a plugin's binding table.
    pub fn bind(
        &mut self,
        listener: &str,
        id: &str,
        event: &str,
        handler: Callback,
    ) -> Result<(), BusError> {
        self.bus.bind(listener, id, event, handler)?;
        if listener == listeners::COMMAND
            && let Some(access) = self.access.as_mut()
        {
            access.add_rights(&[format!("{listener}/{}", event.to_lowercase())]);
        }
        Ok(())
    }

    // ========================================================================
    // Routines
    // ========================================================================

    /// Schedule routine `method` of the plugin whose main class is `owner`.
    pub fn add_routine(&mut self, owner: &str, method: &str, interval: u64) -> Result<(), PluginError> {
        let Some(callback) = self
            .routine_methods
            .get(owner)
            .and_then(|methods| methods.get(method))
            .cloned()
        else {
            debug!(owner = %owner, method = %method, "Routine target missing");
            return Err(PluginError::UnknownRoutine {
                owner: owner.to_owned(),
                method: method.to_owned(),
            });
        };
        self.routines.add(owner, method, interval, callback);
        Ok(())
    }

    pub fn remove_routine(&mut self, owner: &str, method: &str) -> Result<(), PluginError> {
        if self.routines.remove(owner, method) {
            Ok(())
        } else {
            Err(PluginError::UnknownRoutine {
                owner: owner.to_owned(),
                method: method.to_owned(),
            })
        }
    }

    pub fn change_routine_interval(
        &mut self,
        owner: &str,
        method: &str,
        interval: u64,
    ) -> Result<(), PluginError> {
        if self.routines.set_interval(owner, method, interval) {
            Ok(())
        } else {
            Err(PluginError::UnknownRoutine {
                owner: owner.to_owned(),
                method: method.to_owned(),
            })
        }
    }

    /// Run every routine that is due for the given server. The server name
    /// is the gating key; without a server the empty name is used.
    pub fn call_all_routines(&mut self, force: bool, mut server: Option<ServerContext<'_>>) -> usize {
        let key = server.as_ref().map(|s| s.name).unwrap_or_default();
        let now = self.now();
        let due = self.routines.take_due(key, now, force);

        self.enter();
        for (owner, callback) in &due {
            let ctx_server = server.as_mut().map(ServerContext::reborrow);
            let mut ctx = Context::new(self, ctx_server, Some(owner.clone()));
            callback(&mut ctx);
        }
        self.leave();
        due.len()
    }

    // ========================================================================
    // Timeouts
    // ========================================================================

    /// Fire `timeout/<name>` once `delay` seconds have passed. Setting a
    /// name that is already pending replaces it.
    pub fn set_timeout(&mut self, delay: i64, name: &str) {
        let now = self.now();
        self.timeouts.set(name, delay, now);
    }

    pub fn reset_timeout(&mut self, name: &str) -> Result<(), PluginError> {
        let now = self.now();
        if self.timeouts.reset(name, now) {
            Ok(())
        } else {
            Err(PluginError::UnknownTimeout(name.to_owned()))
        }
    }

    pub fn clear_timeout(&mut self, name: &str) -> Result<(), PluginError> {
        if self.timeouts.clear(name) {
            Ok(())
        } else {
            Err(PluginError::UnknownTimeout(name.to_owned()))
        }
    }

    pub(crate) fn fire_due_timeouts(&mut self, mut server: Option<ServerContext<'_>>) -> usize {
        let now = self.now();
        let fired = self.timeouts.take_due(now);
        for timeout in &fired {
            let mut event = Event::timeout(&timeout.name, timeout.delay);
            if let Some(server) = server.as_ref() {
                event = event.with_server(server.name);
            }
            let ctx_server = server.as_mut().map(ServerContext::reborrow);
            if let Err(e) = self.dispatch(&mut event, ctx_server) {
                debug!(timeout = %timeout.name, error = %e, "Timeout dispatch failed");
            }
        }
        fired.len()
    }

    // ========================================================================
    // Regex matchers
    // ========================================================================

    pub fn add_regex_matcher(
        &mut self,
        owner: &str,
        pattern: &str,
        callback: MatchFn,
    ) -> Result<(), PluginError> {
        self.matchers.add(owner, pattern, callback)?;
        Ok(())
    }

    /// Run the first matcher whose pattern matches `text`. Returns whether
    /// one did.
    pub fn try_regex_match(
        &mut self,
        text: &str,
        message: Option<&ChatMessage>,
        mut server: Option<ServerContext<'_>>,
    ) -> bool {
        let Some((owner, callback, found)) = self.matchers.first_match(text, message) else {
            return false;
        };
        self.enter();
        let ctx_server = server.as_mut().map(ServerContext::reborrow);
        let mut ctx = Context::new(self, ctx_server, Some(owner));
        callback(&found, &mut ctx);
        self.leave();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::collab::MemoryStorage;
    use crate::plugin::{BindingTable, RegexMatch};
    use std::cell::Cell;
    use std::fs;
    use tempfile::TempDir;

    thread_local! {
        static LOG: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
    }

    fn log(entry: impl Into<String>) {
        LOG.with(|l| l.borrow_mut().push(entry.into()));
    }

    fn take_log() -> Vec<String> {
        LOG.with(|l| std::mem::take(&mut *l.borrow_mut()))
    }

    struct Named(&'static str);

    impl Named {
        fn cmd_hello(&mut self, _event: &mut Event, _ctx: &mut Context<'_>) {
            log(format!("{}:hello", self.0));
        }

        fn on_pluginloaded(&mut self, _event: &mut Event, _ctx: &mut Context<'_>) {}
    }

    impl Plugin for Named {
        fn init(&mut self, _ctx: &mut Context<'_>) -> bool {
            log(format!("{}:init", self.0));
            true
        }

        fn destroy(&mut self, _ctx: &mut Context<'_>) {
            log(format!("{}:destroy", self.0));
        }

        fn bindings(table: &mut BindingTable<Self>) {
            table
                .method("cmd_hello", Self::cmd_hello)
                .method("on_pluginloaded", Self::on_pluginloaded);
        }
    }

    struct Refuses;

    impl Plugin for Refuses {
        fn init(&mut self, _ctx: &mut Context<'_>) -> bool {
            false
        }

        fn bindings(_table: &mut BindingTable<Self>) {}
    }

    struct SelfUnloader;

    impl SelfUnloader {
        fn cmd_bye(&mut self, _event: &mut Event, ctx: &mut Context<'_>) {
            ctx.unload_plugin("bye").unwrap();
            log("bye:handler-done");
        }
    }

    impl Plugin for SelfUnloader {
        fn destroy(&mut self, _ctx: &mut Context<'_>) {
            log("bye:destroy");
        }

        fn bindings(table: &mut BindingTable<Self>) {
            table.method("cmd_bye", Self::cmd_bye);
        }
    }

    struct Ticker {
        ticks: Rc<Cell<u32>>,
    }

    impl Ticker {
        fn tick(&mut self, _ctx: &mut Context<'_>) {
            self.ticks.set(self.ticks.get() + 1);
        }

        fn timeout_ring(&mut self, _event: &mut Event, _ctx: &mut Context<'_>) {
            log("ring");
        }
    }

    impl Plugin for Ticker {
        fn init(&mut self, ctx: &mut Context<'_>) -> bool {
            ctx.add_routine("tick", 5).is_ok() && ctx.add_routine("missing", 5).is_err()
        }

        fn bindings(table: &mut BindingTable<Self>) {
            table
                .routine("tick", Self::tick)
                .method("timeout_ring", Self::timeout_ring);
        }
    }

    #[derive(Default)]
    struct Rights(Rc<RefCell<Vec<String>>>);

    impl AccessControl for Rights {
        fn add_rights(&mut self, rights: &[String]) {
            self.0.borrow_mut().extend(rights.iter().map(|r| format!("+{r}")));
        }

        fn remove_rights(&mut self, rights: &[String]) {
            self.0.borrow_mut().extend(rights.iter().map(|r| format!("-{r}")));
        }
    }

    struct Fixture {
        _dir: TempDir,
        clock: Rc<ManualClock>,
        registry: PluginRegistry,
        ticks: Rc<Cell<u32>>,
    }

    fn manifest(dir: &TempDir, name: &str, main_class: &str, deps: &[&str]) {
        let path = dir.path().join(name);
        fs::create_dir_all(&path).unwrap();
        let deps: Vec<String> = deps.iter().map(|d| format!("\"{d}\"")).collect();
        fs::write(
            path.join("plugin.toml"),
            format!(
                "[pluginDefinition]\nmainClass = \"{main_class}\"\ndependencies = [{}]\n",
                deps.join(", ")
            ),
        )
        .unwrap();
    }

    fn fixture() -> Fixture {
        take_log();
        let dir = TempDir::new().unwrap();
        manifest(&dir, "a", "A", &["b"]);
        manifest(&dir, "b", "B", &[]);
        manifest(&dir, "c", "C", &["b"]);
        manifest(&dir, "broken", "Broken", &["missing"]);
        manifest(&dir, "refuses", "Refuses", &[]);
        manifest(&dir, "bye", "SelfUnloader", &[]);
        manifest(&dir, "ticker", "Ticker", &[]);
        manifest(&dir, "ghost", "NoSuchClass", &[]);
        manifest(&dir, "x", "X", &["y"]);
        manifest(&dir, "y", "Y", &["x"]);
        manifest(&dir, "ouroboros", "Ouroboros", &["ouroboros"]);

        let ticks = Rc::new(Cell::new(0));
        let mut factories = PluginFactories::new();
        factories
            .register("A", |_| Named("a"))
            .register("B", |_| Named("b"))
            .register("C", |_| Named("c"))
            .register("Broken", |_| Named("broken"))
            .register("Refuses", |_| Refuses)
            .register("SelfUnloader", |_| SelfUnloader)
            .register("X", |_| Named("x"))
            .register("Y", |_| Named("y"))
            .register("Ouroboros", |_| Named("ouroboros"));
        let shared = ticks.clone();
        factories.register("Ticker", move |_| Ticker {
            ticks: shared.clone(),
        });

        let clock = Rc::new(ManualClock::new(1_000));
        let registry = PluginRegistry::new(
            dir.path(),
            factories,
            clock.clone(),
            Box::new(MemoryStorage::new()),
        );
        Fixture {
            _dir: dir,
            clock,
            registry,
            ticks,
        }
    }

    fn hello() -> Event {
        Event::new(listeners::COMMAND, "hello", crate::event::Payload::None)
    }

    #[test]
    fn dependency_loads_first_and_unloads_with_dependent() {
        let mut fx = fixture();
        fx.registry.load_plugin("a", true).unwrap();
        assert_eq!(fx.registry.loaded_plugins(), ["b", "a"]);
        assert!(fx.registry.is_manual("a"));
        assert!(!fx.registry.is_manual("b"));

        assert!(matches!(
            fx.registry.unload_plugin("b"),
            Err(PluginError::HasDependents { .. })
        ));

        fx.registry.unload_plugin("a").unwrap();
        assert!(fx.registry.loaded_plugins().is_empty());
        assert_eq!(take_log(), ["b:init", "a:init", "a:destroy", "b:destroy"]);
    }

    #[test]
    fn shared_dependency_survives_while_other_dependent_remains() {
        let mut fx = fixture();
        fx.registry.load_plugin("a", true).unwrap();
        fx.registry.load_plugin("c", true).unwrap();

        fx.registry.unload_plugin("a").unwrap();
        assert!(fx.registry.is_loaded("b"));
        assert!(fx.registry.is_loaded("c"));

        fx.registry.unload_plugin("c").unwrap();
        assert!(!fx.registry.is_loaded("b"));
    }

    #[test]
    fn manually_loaded_dependency_is_kept() {
        let mut fx = fixture();
        fx.registry.load_plugin("b", true).unwrap();
        fx.registry.load_plugin("a", true).unwrap();
        fx.registry.unload_plugin("a").unwrap();
        assert!(fx.registry.is_loaded("b"));
    }

    #[test]
    fn load_failures() {
        let mut fx = fixture();
        assert!(matches!(
            fx.registry.load_plugin("nope", true),
            Err(PluginError::DirectoryMissing(_))
        ));
        assert!(matches!(
            fx.registry.load_plugin("ghost", true),
            Err(PluginError::UnknownFactory { .. })
        ));
        assert!(matches!(
            fx.registry.load_plugin("broken", true),
            Err(PluginError::Dependency { .. })
        ));
        assert!(!fx.registry.is_loaded("broken"));

        assert!(matches!(
            fx.registry.load_plugin("refuses", true),
            Err(PluginError::InitFailed(_))
        ));
        assert!(!fx.registry.is_loaded("refuses"));

        fx.registry.load_plugin("b", true).unwrap();
        assert!(matches!(
            fx.registry.load_plugin("b", true),
            Err(PluginError::AlreadyLoaded(_))
        ));
    }

    #[test]
    fn manual_batch_continues_past_failures() {
        let mut fx = fixture();
        let report = fx
            .registry
            .load_plugins(&["refuses", "b", "nope", "c"], true)
            .unwrap();
        assert_eq!(report.loaded, ["b", "c"]);
        assert_eq!(report.failed.len(), 2);
        assert!(!report.is_clean());
    }

    #[test]
    fn manual_batch_promotes_loaded_dependency() {
        let mut fx = fixture();
        let report = fx.registry.load_plugins(&["a", "b"], true).unwrap();
        assert_eq!(report.loaded, ["a", "b"]);
        assert!(report.is_clean());
        assert!(fx.registry.is_manual("b"));

        // A second manual request is a real duplicate
        let report = fx.registry.load_plugins(&["b"], true).unwrap();
        assert!(matches!(report.failed.as_slice(), [(_, PluginError::AlreadyLoaded(_))]));
    }

    #[test]
    fn dependency_cycles_fail_the_load() {
        let mut fx = fixture();
        assert!(matches!(
            fx.registry.load_plugin("ouroboros", true),
            Err(PluginError::Dependency { source, .. }) if matches!(*source, PluginError::DependencyCycle(_))
        ));

        let err = fx.registry.load_plugin("x", true).unwrap_err();
        assert_eq!(err.error_code(), "dependency_failed");
        assert!(fx.registry.loaded_plugins().is_empty());
        assert!(take_log().is_empty());

        // The registry is still usable afterwards
        fx.registry.load_plugin("b", true).unwrap();
        assert!(fx.registry.is_loaded("b"));
    }

    #[test]
    fn dependency_batch_aborts_and_cleans_up() {
        let mut fx = fixture();
        assert!(fx.registry.load_plugins(&["b", "refuses"], false).is_err());
        assert!(fx.registry.loaded_plugins().is_empty());
    }

    #[test]
    fn command_bindings_register_rights() {
        let mut fx = fixture();
        let rights = Rights::default();
        let seen = rights.0.clone();
        fx.registry.set_access_control(Box::new(rights));

        fx.registry.load_plugin("b", true).unwrap();
        let invoked = fx.registry.dispatch(&mut hello(), None).unwrap();
        assert_eq!(invoked, 1);
        fx.registry.unload_plugin("b").unwrap();

        assert_eq!(*seen.borrow(), ["+command/hello", "-command/hello"]);
    }

    #[test]
    fn unload_from_handler_is_deferred() {
        let mut fx = fixture();
        fx.registry.load_plugin("bye", true).unwrap();
        let mut event = Event::new(listeners::COMMAND, "bye", crate::event::Payload::None);
        fx.registry.dispatch(&mut event, None).unwrap();

        assert!(!fx.registry.is_loaded("bye"));
        assert_eq!(take_log(), ["bye:handler-done", "bye:destroy"]);
    }

    #[test]
    fn routines_added_in_init_run_on_interval() {
        let mut fx = fixture();
        fx.registry.load_plugin("ticker", true).unwrap();
        assert_eq!(fx.registry.routine_interval("Ticker", "tick"), Some(5));

        fx.registry.call_all_routines(false, None);
        fx.registry.call_all_routines(false, None);
        assert_eq!(fx.ticks.get(), 1);

        fx.clock.advance(5);
        fx.registry.call_all_routines(false, None);
        assert_eq!(fx.ticks.get(), 2);

        fx.registry.call_all_routines(true, None);
        assert_eq!(fx.ticks.get(), 3);

        fx.registry.change_routine_interval("Ticker", "tick", 60).unwrap();
        assert!(fx.registry.change_routine_interval("Ticker", "nope", 1).is_err());

        assert_eq!(fx.registry.routine_count(), 2);
        fx.registry.unload_plugin("ticker").unwrap();
        assert_eq!(fx.registry.routine_count(), 1);
        fx.clock.advance(100);
        fx.registry.call_all_routines(false, None);
        assert_eq!(fx.ticks.get(), 3);
    }

    #[test]
    fn timeouts_fire_through_the_builtin_routine() {
        let mut fx = fixture();
        fx.registry.load_plugin("ticker", true).unwrap();
        take_log();

        fx.registry.set_timeout(3, "Ring");
        assert_eq!(fx.registry.pending_timeouts(), 1);
        fx.registry.call_all_routines(false, None);
        assert!(take_log().is_empty());

        fx.clock.advance(3);
        fx.registry.call_all_routines(false, None);
        assert_eq!(take_log(), ["ring"]);
        assert!(fx.registry.pending_timeout("ring").is_none());
        assert!(fx.registry.clear_timeout("ring").is_err());
    }

    #[test]
    fn first_matching_matcher_wins() {
        let mut fx = fixture();
        fx.registry
            .add_regex_matcher("X", "^hi", Rc::new(|_: &RegexMatch, _: &mut Context<'_>| log("x")))
            .unwrap();
        fx.registry
            .add_regex_matcher("Y", "hi", Rc::new(|_: &RegexMatch, _: &mut Context<'_>| log("y")))
            .unwrap();

        assert!(fx.registry.try_regex_match("HI there", None, None));
        assert!(!fx.registry.try_regex_match("bye", None, None));
        assert_eq!(take_log(), ["x"]);

        assert_eq!(fx.registry.matcher_count(), 2);
    }

    #[test]
    fn unload_all_respects_dependencies() {
        let mut fx = fixture();
        fx.registry.load_plugins(&["a", "c", "ticker"], true).unwrap();
        fx.registry.unload_all();
        assert!(fx.registry.loaded_plugins().is_empty());
    }
}
