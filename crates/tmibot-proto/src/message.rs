//! Decoded chat lines.

use crate::casemap::irc_eq;
use crate::error::ParseError;
use crate::prefix::Prefix;
use crate::tags::Tags;

/// One decoded line from a Twitch chat server.
///
/// Besides the raw IRC pieces this carries flags Twitch only implies:
/// `broadcaster` (the sender owns the channel) and `moderator` (the sender
/// carries a moderator tag or user type).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChatMessage {
    /// The line as received, without CRLF.
    pub raw: String,
    /// IRCv3 tags (empty when the line had none).
    pub tags: Tags,
    /// Message source.
    pub prefix: Option<Prefix>,
    /// Sender nickname.
    pub nick: Option<String>,
    /// Sender username.
    pub user: Option<String>,
    /// Sender host.
    pub host: Option<String>,
    /// Command verb or three-digit numeric, as sent.
    pub command: String,
    /// Channel without its `#`.
    pub channel: Option<String>,
    /// Middle parameters other than the channel.
    pub params: Vec<String>,
    /// Trailing free text after ` :`.
    pub message: Option<String>,
    /// Sender is the owner of `channel`.
    pub broadcaster: bool,
    /// Sender is a channel moderator.
    pub moderator: bool,
    /// Sender is subscribed to the channel.
    pub subscriber: bool,
    /// Sender has Twitch Turbo.
    pub turbo: bool,
}

impl ChatMessage {
    /// Decode one line. Trailing CR/LF is ignored.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Err(ParseError::EmptyLine);
        }

        // Keepalive from the server: PING :tmi.twitch.tv
        if let Some(token) = line.strip_prefix("PING :") {
            return Ok(Self {
                raw: line.to_owned(),
                command: "PING".to_owned(),
                message: Some(token.to_owned()),
                ..Self::default()
            });
        }

        let mut rest = line;

        let tags = match rest.strip_prefix('@') {
            Some(stripped) => {
                let (block, tail) = stripped
                    .split_once(' ')
                    .ok_or_else(|| ParseError::DanglingTags(line.to_owned()))?;
                rest = tail.trim_start();
                Tags::parse(block)
            }
            None => Tags::default(),
        };

        let prefix = match rest.strip_prefix(':') {
            Some(stripped) => {
                let (source, tail) = stripped
                    .split_once(' ')
                    .ok_or_else(|| ParseError::MissingCommand(line.to_owned()))?;
                rest = tail.trim_start();
                Some(Prefix::parse(source))
            }
            None => None,
        };

        let (middle, trailing) = match rest.find(" :") {
            Some(pos) => (&rest[..pos], Some(&rest[pos + 2..])),
            None => match rest.strip_prefix(':') {
                Some(text) => ("", Some(text)),
                None => (rest, None),
            },
        };

        let mut words = middle.split_whitespace();
        let command = words
            .next()
            .ok_or_else(|| ParseError::MissingCommand(line.to_owned()))?
            .to_owned();

        let mut channel = None;
        let mut params = Vec::new();
        for word in words {
            match word.strip_prefix('#') {
                Some(name) if channel.is_none() => channel = Some(name.to_owned()),
                _ => params.push(word.to_owned()),
            }
        }

        let (nick, user, host) = match &prefix {
            Some(Prefix::Nickname(n, u, h)) => (
                Some(n.clone()),
                (!u.is_empty()).then(|| u.clone()),
                (!h.is_empty()).then(|| h.clone()),
            ),
            _ => (None, None, None),
        };

        let broadcaster = match (&nick, &channel) {
            (Some(n), Some(c)) => irc_eq(n, c),
            _ => false,
        } || tags.badges().any(|b| b == "broadcaster");

        let moderator = tags.flag("mod")
            || tags.get("user-type").is_some_and(|t| !t.is_empty())
            || tags.badges().any(|b| b == "moderator");

        let subscriber = tags.flag("subscriber");
        let turbo = tags.flag("turbo");

        Ok(Self {
            raw: line.to_owned(),
            tags,
            prefix,
            nick,
            user,
            host,
            command,
            channel,
            params,
            message: trailing.map(str::to_owned),
            broadcaster,
            moderator,
            subscriber,
            turbo,
        })
    }

    /// True for lines that carry chat text a user could type a command in.
    pub fn is_chat(&self) -> bool {
        matches!(self.command.as_str(), "PRIVMSG" | "NOTICE" | "WHISPER")
    }

    /// Where a reply to this message should go: `#channel`, or the sender
    /// for whispers.
    pub fn reply_target(&self) -> Option<String> {
        match (&self.channel, &self.nick) {
            (Some(channel), _) => Some(format!("#{channel}")),
            (None, Some(nick)) if self.command == "WHISPER" => Some(nick.clone()),
            _ => None,
        }
    }

    /// Trailing text, or an empty string.
    pub fn text(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }
}
