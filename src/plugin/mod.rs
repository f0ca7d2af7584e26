//! Plugins and the registry that drives them.
//!
//! A plugin is a [`Plugin`] implementation plus a [`BindingTable`] that lists
//! its event handlers and routine methods by name. Handler names follow the
//! listener prefixes (`cmd_hello` handles the `hello` command, `irc_join`
//! handles JOIN lines, `timeout_tick` handles the `tick` timeout) and are
//! bound automatically when the plugin loads.
//!
//! ```rust,ignore
//! struct Greeter;
//!
//! impl Greeter {
//!     fn cmd_hello(&mut self, event: &mut Event, ctx: &mut Context<'_>) {
//!         ctx.reply(event, "hi!");
//!     }
//! }
//!
//! impl Plugin for Greeter {
//!     fn bindings(table: &mut BindingTable<Self>) {
//!         table.method("cmd_hello", Self::cmd_hello);
//!     }
//! }
//! ```

mod context;
mod factory;
mod manifest;
mod matcher;
mod registry;
mod routine;
mod timeout;

pub use context::{Context, ServerContext};
pub use factory::PluginFactories;
pub use manifest::{MANIFEST_FILE, PluginManifest};
pub use matcher::RegexMatch;
pub use registry::{LoadReport, PluginRegistry, REGISTRY_ID, listener_prefixes};
pub use routine::DEFAULT_ROUTINE_INTERVAL;
pub use timeout::Timeout;

use std::rc::Rc;

use crate::event::Event;

/// Erased event handler stored in the bus.
pub type Callback = Rc<dyn Fn(&mut Event, &mut Context<'_>)>;
/// Erased routine body.
pub type RoutineFn = Rc<dyn Fn(&mut Context<'_>)>;
/// Erased regex matcher body.
pub type MatchFn = Rc<dyn Fn(&RegexMatch, &mut Context<'_>)>;

/// Event handler method of a plugin.
pub type Handler<P> = fn(&mut P, &mut Event, &mut Context<'_>);
/// Routine method of a plugin.
pub type RoutineMethod<P> = fn(&mut P, &mut Context<'_>);

/// A loadable bot plugin.
pub trait Plugin: 'static {
    /// Called once after the plugin's handlers are bound. Returning `false`
    /// unloads the plugin again and fails the load.
    fn init(&mut self, _ctx: &mut Context<'_>) -> bool {
        true
    }

    /// Called once before the plugin's bindings and routines are removed.
    fn destroy(&mut self, _ctx: &mut Context<'_>) {}

    /// Declare handlers, routine methods and custom listeners.
    fn bindings(table: &mut BindingTable<Self>)
    where
        Self: Sized;
}

/// Per-plugin registration table, built once per load.
pub struct BindingTable<P> {
    listeners: Vec<(String, String)>,
    methods: Vec<(String, Handler<P>)>,
    routines: Vec<(String, RoutineMethod<P>)>,
}

impl<P> Default for BindingTable<P> {
    fn default() -> Self {
        Self {
            listeners: Vec::new(),
            methods: Vec::new(),
            routines: Vec::new(),
        }
    }
}

impl<P: Plugin> BindingTable<P> {
    /// Request a custom listener namespace with its method prefix. It is
    /// created before binding and removed when the plugin unloads.
    pub fn listener(&mut self, name: &str, prefix: &str) -> &mut Self {
        self.listeners.push((name.to_owned(), prefix.to_owned()));
        self
    }

    /// Register a named handler method.
    pub fn method(&mut self, name: &str, handler: Handler<P>) -> &mut Self {
        self.methods.push((name.to_owned(), handler));
        self
    }

    /// Register a named routine method, addressable by
    /// [`Context::add_routine`].
    pub fn routine(&mut self, name: &str, method: RoutineMethod<P>) -> &mut Self {
        self.routines.push((name.to_owned(), method));
        self
    }
}
