//! One configured chat server: its connection plus line decoding.
//!
//! A session turns protocol lines into events. Every line becomes a
//! `protocol/<command>` event. Chat lines are also inspected for bot
//! commands (`!hello world` → `command/hello` with args `["world"]`), CTCP
//! requests (`\x01VERSION\x01` → `command/ctcpversion`) and text addressed
//! to the bot by nick, which goes to the regex matchers.

use std::rc::Rc;

use serde_json::json;
use tmibot_proto::{ChatMessage, Ctcp, TWITCH_CAPS, command, irc_eq};
use tracing::{Instrument, debug, info, warn};

use crate::clock::Clock;
use crate::config::ServerConfig;
use crate::error::ConnectionError;
use crate::event::Event;
use crate::network::{Connection, Connector};
use crate::plugin::{PluginRegistry, ServerContext};
use crate::telemetry::spans;

/// Welcome numeric; marks the login handshake complete.
const RPL_WELCOME: &str = "001";
/// NAMES reply.
const RPL_NAMREPLY: &str = "353";

pub struct ServerSession {
    config: ServerConfig,
    connection: Connection,
    handshake: bool,
    /// Connect attempt the handshake belongs to.
    welcomed_on: u64,
}

impl ServerSession {
    pub fn new(config: ServerConfig, connector: Rc<dyn Connector>, clock: Rc<dyn Clock>) -> Self {
        let connection = Connection::new(
            config.name.clone(),
            config.address.clone(),
            config.port,
            connector,
            clock,
        );
        Self {
            config,
            connection,
            handshake: false,
            welcomed_on: 0,
        }
    }

    /// Connect and log in. A failure here only skips this server.
    pub async fn load(&mut self) -> Result<(), ConnectionError> {
        let mut greeting = Vec::new();
        if self.config.twitch {
            greeting.push(command::cap_req(&TWITCH_CAPS));
        }
        if let Some(password) = &self.config.password {
            greeting.push(command::pass(password));
        }
        greeting.push(command::nick(&self.config.nick));
        greeting.push(command::user(&self.config.nick, &self.config.realname));

        self.connection.set_greeting(greeting);
        self.connection.set_flood_limit(self.config.flood_limit);
        self.connection
            .connect()
            .instrument(spans::session(&self.config.name))
            .await
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn nick(&self) -> &str {
        &self.config.nick
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Whether the server has welcomed us since the last connect.
    pub fn handshake_complete(&self) -> bool {
        self.handshake
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }

    /// Context handed to plugin code running on behalf of this server.
    pub fn server_context(&mut self) -> ServerContext<'_> {
        ServerContext {
            name: &self.config.name,
            nick: &self.config.nick,
            connection: &mut self.connection,
        }
    }

    /// Retry the connection if it has dropped.
    pub async fn maintain(&mut self) {
        if !self.connection.is_connected() {
            self.handshake = false;
            self.connection.maintain().await;
        }
    }

    /// Process one tick: read available lines (or take `lines` as given),
    /// dispatch their events, then flush the outbound queue. Returns the
    /// number of lines handled.
    pub async fn step(&mut self, registry: &mut PluginRegistry, lines: Option<Vec<String>>) -> usize {
        let lines = match lines {
            Some(lines) => lines,
            None => match self.connection.read() {
                Ok(lines) => lines,
                Err(e) => {
                    warn!(server = %self.config.name, error = %e, code = e.error_code(), "Read failed");
                    self.handshake = false;
                    self.connection.reconnect().await;
                    Vec::new()
                }
            },
        };

        for line in &lines {
            self.handle_line(registry, line);
        }

        self.connection.process_buffer().await;
        self.forget_stale_handshake();
        lines.len()
    }

    /// A reconnect anywhere below (read error, failed write) means the new
    /// socket has not been welcomed yet.
    fn forget_stale_handshake(&mut self) {
        if self.handshake && self.connection.connect_attempts() != self.welcomed_on {
            debug!(server = %self.config.name, "Connection was reopened; waiting for a new welcome");
            self.handshake = false;
        }
    }

    fn handle_line(&mut self, registry: &mut PluginRegistry, line: &str) {
        let message = match ChatMessage::parse(line) {
            Ok(message) => message,
            Err(e) => {
                debug!(server = %self.config.name, error = %e, code = e.error_code(), "Unparseable line");
                return;
            }
        };

        let welcome = self.track(&message);

        let mut event = Event::protocol(message.clone()).with_server(self.config.name.clone());
        if let Err(e) = registry.dispatch(&mut event, Some(self.server_context())) {
            debug!(server = %self.config.name, error = %e, "Protocol dispatch failed");
        }

        if message.is_chat() {
            self.inspect_chat(registry, &message);
        }

        if welcome {
            let mut event = Event::core("connected", json!({ "server": self.config.name }))
                .with_server(self.config.name.clone());
            if let Err(e) = registry.dispatch(&mut event, Some(self.server_context())) {
                debug!(server = %self.config.name, error = %e, "connected dispatch failed");
            }
        }
    }

    /// Keepalive, login and presence bookkeeping. Returns true on the
    /// welcome numeric.
    fn track(&mut self, message: &ChatMessage) -> bool {
        let channel = message.channel.as_deref().unwrap_or_default();
        let nick = message.nick.as_deref().unwrap_or_default();
        let own = irc_eq(nick, &self.config.nick);

        match message.command.as_str() {
            "PING" => {
                let now = self.connection.now();
                self.connection.send(command::pong(message.text()), Some(now));
            }
            RPL_WELCOME => {
                self.handshake = true;
                self.welcomed_on = self.connection.connect_attempts();
                info!(server = %self.config.name, "Handshake complete");
                let joined = self.connection.join_channels(&self.config.channels);
                if !joined.is_empty() {
                    info!(server = %self.config.name, channels = ?joined, "Joining channels");
                }
                return true;
            }
            "JOIN" if !channel.is_empty() => {
                if own {
                    self.connection.mark_joined(channel);
                } else {
                    self.connection.user_joined(channel, nick);
                }
            }
            "PART" if !channel.is_empty() => {
                if own {
                    self.connection.forget_channel(channel);
                } else {
                    self.connection.user_parted(channel, nick);
                }
            }
            RPL_NAMREPLY if !channel.is_empty() => {
                self.connection.set_channel_users(channel, message.text());
            }
            "MODE" if !channel.is_empty() => {
                if let [modes, target, ..] = message.params.as_slice() {
                    apply_modes(&mut self.connection, channel, modes, target);
                }
            }
            _ => {}
        }
        false
    }

    fn inspect_chat(&mut self, registry: &mut PluginRegistry, message: &ChatMessage) {
        let text = message.text();
        let mut words = text.split_whitespace();
        let Some(first) = words.next() else {
            return;
        };

        let addressed = first.trim_start_matches('@').trim_end_matches([':', ',']);
        if irc_eq(addressed, &self.config.nick) {
            let rest = text.trim_start()[first.len()..].trim();
            if !rest.is_empty() {
                registry.try_regex_match(rest, Some(message), Some(self.server_context()));
            }
            return;
        }

        let mut event = if let Some(name) = first.strip_prefix('!') {
            if name.is_empty() {
                return;
            }
            let args = words.map(str::to_owned).collect();
            Event::command(name, message.clone(), args)
        } else if let Some(ctcp) = Ctcp::parse(text) {
            let args = ctcp
                .params
                .map(|p| p.split_whitespace().map(str::to_owned).collect())
                .unwrap_or_default();
            Event::command(&format!("ctcp{}", ctcp.command), message.clone(), args)
        } else {
            return;
        };

        event = event.with_server(self.config.name.clone());
        if let Err(e) = registry.dispatch(&mut event, Some(self.server_context())) {
            debug!(server = %self.config.name, error = %e, "Command dispatch failed");
        }
    }

    /// Say goodbye and drop the socket.
    pub async fn disconnect(&mut self) {
        self.connection.process_buffer().await;
        self.connection.disconnect(Some(&command::quit(None)));
        self.handshake = false;
    }
}

/// Apply `+o`/`-v`-style flags to one nick.
fn apply_modes(connection: &mut Connection, channel: &str, modes: &str, target: &str) {
    let mut adding = true;
    for c in modes.chars() {
        match c {
            '+' => adding = true,
            '-' => adding = false,
            mode if adding => connection.add_user_mode(channel, target, mode),
            mode => connection.remove_user_mode(channel, target, mode),
        }
    }
}
