//! Event envelopes passed through the bus.
//!
//! An event names the listener namespace it belongs to (its *kind*) and an
//! event name inside that namespace. Names are always lowercase.

use serde::Serialize;
use serde_json::Value;
use tmibot_proto::ChatMessage;

/// Names of the listeners every registry creates.
pub mod listeners {
    /// Lifecycle notifications (`connected`, `pluginloaded`, ...).
    pub const CORE: &str = "core";
    /// `!command` and CTCP requests found in chat text.
    pub const COMMAND: &str = "command";
    /// Every decoded protocol line, named after its command.
    pub const PROTOCOL: &str = "protocol";
    /// One-shot timers.
    pub const TIMEOUT: &str = "timeout";
}

/// Event data.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Payload {
    None,
    Message(ChatMessage),
    Command {
        message: ChatMessage,
        args: Vec<String>,
    },
    Timeout {
        delay: i64,
    },
    Data(Value),
}

/// One occurrence to dispatch.
#[derive(Debug, Clone)]
pub struct Event {
    kind: String,
    name: String,
    propagate: bool,
    broadcast: bool,
    server: Option<String>,
    payload: Payload,
}

impl Event {
    /// Build an event for any listener. Not forwarded to the relay unless
    /// [`Event::with_broadcast`] says so.
    pub fn new(kind: impl Into<String>, name: &str, payload: Payload) -> Self {
        Self {
            kind: kind.into(),
            name: name.to_lowercase(),
            propagate: true,
            broadcast: false,
            server: None,
            payload,
        }
    }

    /// A decoded protocol line, named after its command.
    pub fn protocol(message: ChatMessage) -> Self {
        let name = message.command.clone();
        Self::new(listeners::PROTOCOL, &name, Payload::Message(message)).with_broadcast(true)
    }

    /// A chat command.
    pub fn command(name: &str, message: ChatMessage, args: Vec<String>) -> Self {
        Self::new(listeners::COMMAND, name, Payload::Command { message, args })
            .with_broadcast(true)
    }

    /// A lifecycle notification.
    pub fn core(name: &str, data: Value) -> Self {
        Self::new(listeners::CORE, name, Payload::Data(data))
    }

    /// A fired timeout.
    pub fn timeout(name: &str, delay: i64) -> Self {
        Self::new(listeners::TIMEOUT, name, Payload::Timeout { delay })
    }

    pub fn with_broadcast(mut self, broadcast: bool) -> Self {
        self.broadcast = broadcast;
        self
    }

    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }

    /// Listener namespace this event is dispatched in.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn server(&self) -> Option<&str> {
        self.server.as_deref()
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Stop invoking further callbacks for this dispatch. There is no way to
    /// resume.
    pub fn stop_propagation(&mut self) {
        self.propagate = false;
    }

    pub fn propagates(&self) -> bool {
        self.propagate
    }

    pub fn is_broadcast(&self) -> bool {
        self.broadcast
    }

    /// The chat line behind a protocol or command event.
    pub fn message(&self) -> Option<&ChatMessage> {
        match &self.payload {
            Payload::Message(message) | Payload::Command { message, .. } => Some(message),
            _ => None,
        }
    }

    /// Command arguments; empty for other payloads.
    pub fn args(&self) -> &[String] {
        match &self.payload {
            Payload::Command { args, .. } => args,
            _ => &[],
        }
    }

    /// Serialized form forwarded to the relay.
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "type": self.kind,
            "name": self.name,
            "server": self.server,
            "payload": self.payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn privmsg() -> ChatMessage {
        ChatMessage::parse(":foo!foo@foo.tmi.twitch.tv PRIVMSG #bar :!hello world").unwrap()
    }

    #[test]
    fn names_are_lowercased() {
        let event = Event::new("custom", "SomeThing", Payload::None);
        assert_eq!(event.name(), "something");
        assert_eq!(event.kind(), "custom");
        assert!(!event.is_broadcast());
    }

    #[test]
    fn protocol_event_is_named_after_command() {
        let event = Event::protocol(privmsg());
        assert_eq!(event.kind(), listeners::PROTOCOL);
        assert_eq!(event.name(), "privmsg");
        assert!(event.is_broadcast());
        assert_eq!(event.message().unwrap().nick.as_deref(), Some("foo"));
    }

    #[test]
    fn stop_propagation_is_sticky() {
        let mut event = Event::core("connected", Value::Null);
        assert!(event.propagates());
        event.stop_propagation();
        assert!(!event.propagates());
    }

    #[test]
    fn command_args_and_json() {
        let event = Event::command("Hello", privmsg(), vec!["world".into()]).with_server("twitch");
        assert_eq!(event.name(), "hello");
        assert_eq!(event.args(), ["world".to_string()]);
        let json = event.to_json();
        assert_eq!(json["type"], "command");
        assert_eq!(json["server"], "twitch");
        assert_eq!(json["payload"]["kind"], "command");
        assert_eq!(json["payload"]["data"]["args"][0], "world");
    }

    #[test]
    fn timeout_has_no_message() {
        let event = Event::timeout("Tick", 5);
        assert_eq!(event.name(), "tick");
        assert!(event.message().is_none());
        assert!(event.args().is_empty());
    }
}
