//! CTCP framing inside PRIVMSG/NOTICE bodies.
//!
//! A CTCP request is chat text wrapped in `\x01` bytes, e.g.
//! `\x01ACTION waves\x01` for `/me waves`.

use std::fmt;

/// The CTCP delimiter byte.
pub const CTCP_DELIM: char = '\x01';

/// A parsed CTCP body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ctcp<'a> {
    /// Command name as sent (`ACTION`, `VERSION`, ...).
    pub command: &'a str,
    /// Everything after the command, if anything.
    pub params: Option<&'a str>,
}

impl<'a> Ctcp<'a> {
    /// Parse a message body. Returns `None` unless it starts with the
    /// delimiter and names a command. The closing delimiter is optional.
    pub fn parse(text: &'a str) -> Option<Self> {
        let text = text.strip_prefix(CTCP_DELIM)?;
        let text = text.strip_suffix(CTCP_DELIM).unwrap_or(text);

        let (command, params) = match text.split_once(' ') {
            Some((command, params)) => (command, (!params.is_empty()).then_some(params)),
            None => (text, None),
        };

        if command.is_empty() {
            return None;
        }

        Some(Self { command, params })
    }

    /// Whether a body starts a CTCP request.
    #[inline]
    pub fn is_ctcp(text: &str) -> bool {
        text.starts_with(CTCP_DELIM)
    }

    /// Build a reply or request with the given command and params.
    pub fn new(command: &'a str, params: Option<&'a str>) -> Self {
        Self { command, params }
    }
}

impl fmt::Display for Ctcp<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.params {
            Some(params) => write!(f, "{CTCP_DELIM}{} {params}{CTCP_DELIM}", self.command),
            None => write!(f, "{CTCP_DELIM}{}{CTCP_DELIM}", self.command),
        }
    }
}
