//! # tmibot-proto
//!
//! Parsing and encoding for the constrained IRC dialect spoken by Twitch chat
//! (`irc.chat.twitch.tv`).
//!
//! ## Features
//!
//! - Line parsing with IRCv3 tag blocks, `nick!user@host` prefixes and
//!   trailing parameters ([`ChatMessage`])
//! - Synthetic `broadcaster`/`moderator`/`subscriber`/`turbo` flags derived
//!   from Twitch tags
//! - CTCP framing ([`ctcp`])
//! - RFC 1459 case folding ([`irc_to_lower`])
//! - Builders for every outbound command the bot emits ([`command`])
//!
//! ## Parsing
//!
//! ```rust
//! use tmibot_proto::ChatMessage;
//!
//! let raw = "@badge-info=;mod=1 :foo!foo@foo.tmi.twitch.tv PRIVMSG #bar :!hello world";
//! let msg = ChatMessage::parse(raw).expect("valid line");
//!
//! assert_eq!(msg.command, "PRIVMSG");
//! assert_eq!(msg.channel.as_deref(), Some("bar"));
//! assert_eq!(msg.nick.as_deref(), Some("foo"));
//! assert!(msg.moderator);
//! ```
//!
//! Full RFC 1459/2812 coverage is deliberately absent: only what Twitch sends
//! is understood.

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod casemap;
pub mod command;
pub mod ctcp;
pub mod error;
pub mod message;
pub mod prefix;
pub mod tags;

pub use self::casemap::{irc_eq, irc_to_lower};
pub use self::command::TWITCH_CAPS;
pub use self::ctcp::{CTCP_DELIM, Ctcp};
pub use self::error::ParseError;
pub use self::message::ChatMessage;
pub use self::prefix::Prefix;
pub use self::tags::Tags;
