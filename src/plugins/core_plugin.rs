//! The `core` plugin: liveness and identification.
//!
//! Answers `!ping`, replies to CTCP VERSION, greets users who say hello to
//! the bot by name and periodically logs which channels each server has
//! joined.

use tmibot_proto::{Ctcp, command};
use tracing::{debug, info, warn};

use crate::event::Event;
use crate::plugin::{BindingTable, Context, Plugin};

const DEFAULT_PING_REPLY: &str = "pong";
const DEFAULT_HEARTBEAT: u64 = 300;

pub struct CorePlugin {
    ping_reply: String,
    version: String,
    heartbeat: u64,
}

impl Default for CorePlugin {
    fn default() -> Self {
        Self {
            ping_reply: DEFAULT_PING_REPLY.to_owned(),
            version: format!("tmibot {}", env!("CARGO_PKG_VERSION")),
            heartbeat: DEFAULT_HEARTBEAT,
        }
    }
}

impl CorePlugin {
    pub const MAIN_CLASS: &'static str = "CorePlugin";

    /// Build from the manifest's `defaultSettings`:
    /// `ping_reply`, `version` and `heartbeat` (seconds) are all optional.
    pub fn from_settings(settings: &toml::Table) -> Self {
        let mut plugin = Self::default();
        if let Some(reply) = settings.get("ping_reply").and_then(|v| v.as_str()) {
            plugin.ping_reply = reply.to_owned();
        }
        if let Some(version) = settings.get("version").and_then(|v| v.as_str()) {
            plugin.version = version.to_owned();
        }
        if let Some(secs) = settings.get("heartbeat").and_then(|v| v.as_integer()) {
            plugin.heartbeat = u64::try_from(secs).unwrap_or(DEFAULT_HEARTBEAT);
        }
        plugin
    }

    fn cmd_ping(&mut self, event: &mut Event, ctx: &mut Context<'_>) {
        if let Err(e) = ctx.reply(event, &self.ping_reply) {
            debug!(error = %e, "ping reply dropped");
        }
        event.stop_propagation();
    }

    fn cmd_ctcpversion(&mut self, event: &mut Event, ctx: &mut Context<'_>) {
        let Some(nick) = event.message().and_then(|m| m.nick.clone()) else {
            return;
        };
        let body = Ctcp::new("VERSION", Some(self.version.as_str())).to_string();
        if let Err(e) = ctx.send_raw(command::notice(&nick, &body)) {
            debug!(error = %e, "VERSION reply dropped");
        }
    }

    fn on_connected(&mut self, _event: &mut Event, ctx: &mut Context<'_>) {
        info!(server = ctx.server_name().unwrap_or_default(), "Server ready");
    }

    fn heartbeat(&mut self, ctx: &mut Context<'_>) {
        let server = ctx.server_name().unwrap_or_default().to_owned();
        let channels: Vec<String> = ctx
            .connection()
            .map(|c| c.channels().map(str::to_owned).collect())
            .unwrap_or_default();
        debug!(server = %server, channels = ?channels, "Heartbeat");
    }
}

impl Plugin for CorePlugin {
    fn init(&mut self, ctx: &mut Context<'_>) -> bool {
        if let Err(e) = ctx.add_routine("heartbeat", self.heartbeat) {
            warn!(error = %e, "Heartbeat routine not scheduled");
            return false;
        }
        let greeted = ctx.on_match(r"^(hi|hello|hey)\b", |found, ctx| {
            let Some(message) = found.message.as_ref() else {
                return;
            };
            let nick = message.nick.as_deref().unwrap_or("there");
            if let Err(e) = ctx.reply_to(message, &format!("Hello, {nick}!")) {
                debug!(error = %e, "Greeting dropped");
            }
        });
        greeted.is_ok()
    }

    fn bindings(table: &mut BindingTable<Self>) {
        table
            .method("cmd_ping", Self::cmd_ping)
            .method("cmd_ctcpversion", Self::cmd_ctcpversion)
            .method("on_connected", Self::on_connected)
            .routine("heartbeat", Self::heartbeat);
    }
}
