//! The handle passed to every plugin callback.

use serde_json::Value;
use tmibot_proto::{ChatMessage, command};
use tracing::debug;

use super::{MatchFn, PluginRegistry, RegexMatch};
use crate::collab::Storage;
use crate::error::{ConnectionError, PluginError};
use crate::event::Event;
use crate::network::Connection;

/// The chat server a callback runs on behalf of.
pub struct ServerContext<'a> {
    /// Session name from the config; routine gating key.
    pub name: &'a str,
    /// The bot's own nick on this server.
    pub nick: &'a str,
    pub connection: &'a mut Connection,
}

impl ServerContext<'_> {
    /// Shorter-lived copy for a nested call.
    pub fn reborrow(&mut self) -> ServerContext<'_> {
        ServerContext {
            name: self.name,
            nick: self.nick,
            connection: &mut *self.connection,
        }
    }
}

/// Registry access for the plugin that is currently running, plus the
/// server its event came from when there is one.
pub struct Context<'a> {
    registry: &'a mut PluginRegistry,
    server: Option<ServerContext<'a>>,
    owner: Option<String>,
}

impl<'a> Context<'a> {
    pub fn new(
        registry: &'a mut PluginRegistry,
        server: Option<ServerContext<'a>>,
        owner: Option<String>,
    ) -> Self {
        Self {
            registry,
            server,
            owner,
        }
    }

    pub fn registry(&mut self) -> &mut PluginRegistry {
        &mut *self.registry
    }

    /// Main class of the running plugin.
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn server_name(&self) -> Option<&str> {
        self.server.as_ref().map(|s| s.name)
    }

    pub fn nick(&self) -> Option<&str> {
        self.server.as_ref().map(|s| s.nick)
    }

    pub fn connection(&mut self) -> Option<&mut Connection> {
        self.server.as_mut().map(|s| &mut *s.connection)
    }

    pub fn now(&self) -> i64 {
        self.registry.now()
    }

    fn owner_or_err(&self) -> Result<String, PluginError> {
        self.owner.clone().ok_or(PluginError::NoOwner)
    }

    // ------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------

    /// Queue a raw protocol line on the current server.
    pub fn send_raw(&mut self, line: impl Into<String>) -> Result<(), ConnectionError> {
        self.send_at(line, None)
    }

    /// Queue a line for delivery at a unix second, or FIFO when `at` is
    /// `None`.
    pub fn send_at(&mut self, line: impl Into<String>, at: Option<i64>) -> Result<(), ConnectionError> {
        let connection = self.connection().ok_or(ConnectionError::NotConnected)?;
        connection.send(line, at);
        Ok(())
    }

    /// PRIVMSG `target` (a `#channel` or a nick).
    pub fn say(&mut self, target: &str, text: &str) -> Result<(), ConnectionError> {
        self.send_raw(command::privmsg(target, text))
    }

    /// Answer where the chat line behind `event` came from.
    pub fn reply(&mut self, event: &Event, text: &str) -> Result<(), ConnectionError> {
        match event.message() {
            Some(message) => self.reply_to(message, text),
            None => {
                debug!(event = %event.name(), "Event has no chat line to reply to");
                Ok(())
            }
        }
    }

    pub fn reply_to(&mut self, message: &ChatMessage, text: &str) -> Result<(), ConnectionError> {
        match message.reply_target() {
            Some(target) => self.say(&target, text),
            None => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Dispatch a nested event on the current server.
    pub fn dispatch(&mut self, event: &mut Event) -> Result<usize, PluginError> {
        let server = self.server.as_mut().map(ServerContext::reborrow);
        self.registry.dispatch(event, server)
    }

    /// Dispatch a lifecycle event carrying `data`.
    pub fn emit(&mut self, name: &str, data: Value) -> Result<usize, PluginError> {
        let mut event = Event::core(name, data);
        if let Some(server) = self.server_name() {
            event = event.with_server(server);
        }
        self.dispatch(&mut event)
    }

    pub(crate) fn fire_due_timeouts(&mut self) -> usize {
        let server = self.server.as_mut().map(ServerContext::reborrow);
        self.registry.fire_due_timeouts(server)
    }

    // ------------------------------------------------------------------
    // Timers and routines
    // ------------------------------------------------------------------

    /// Fire a `timeout/<name>` event `delay` seconds from now.
    pub fn set_timeout(&mut self, delay: i64, name: &str) {
        self.registry.set_timeout(delay, name);
    }

    pub fn reset_timeout(&mut self, name: &str) -> Result<(), PluginError> {
        self.registry.reset_timeout(name)
    }

    pub fn clear_timeout(&mut self, name: &str) -> Result<(), PluginError> {
        self.registry.clear_timeout(name)
    }

    /// Schedule one of the running plugin's routine methods.
    pub fn add_routine(&mut self, method: &str, interval: u64) -> Result<(), PluginError> {
        let owner = self.owner_or_err()?;
        self.registry.add_routine(&owner, method, interval)
    }

    pub fn remove_routine(&mut self, method: &str) -> Result<(), PluginError> {
        let owner = self.owner_or_err()?;
        self.registry.remove_routine(&owner, method)
    }

    pub fn change_routine_interval(&mut self, method: &str, interval: u64) -> Result<(), PluginError> {
        let owner = self.owner_or_err()?;
        self.registry.change_routine_interval(&owner, method, interval)
    }

    /// Call `callback` when text addressed to the bot matches `pattern`.
    pub fn add_regex_matcher(&mut self, pattern: &str, callback: MatchFn) -> Result<(), PluginError> {
        let owner = self.owner_or_err()?;
        self.registry.add_regex_matcher(&owner, pattern, callback)
    }

    /// Convenience wrapper around [`Context::add_regex_matcher`].
    pub fn on_match<F>(&mut self, pattern: &str, callback: F) -> Result<(), PluginError>
    where
        F: Fn(&RegexMatch, &mut Context<'_>) + 'static,
    {
        self.add_regex_matcher(pattern, std::rc::Rc::new(callback))
    }

    // ------------------------------------------------------------------
    // Plugins and services
    // ------------------------------------------------------------------

    pub fn load_plugin(&mut self, name: &str) -> Result<(), PluginError> {
        self.registry.load_plugin(name, true)
    }

    /// Unload a plugin. Runs after the current dispatch finishes.
    pub fn unload_plugin(&mut self, name: &str) -> Result<(), PluginError> {
        self.registry.unload_plugin(name)
    }

    pub fn storage(&mut self) -> &mut dyn Storage {
        self.registry.storage_mut()
    }

    /// Ask the scheduler to stop after the current tick.
    pub fn request_shutdown(&self) {
        self.registry.request_shutdown();
    }
}
