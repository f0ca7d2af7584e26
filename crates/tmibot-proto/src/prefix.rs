//! Message source (`:nick!user@host` or `:server.name`).

use std::fmt;

/// Origin of a message.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Prefix {
    /// Server name, e.g. `tmi.twitch.tv`.
    ServerName(String),
    /// User source: (nick, user, host).
    Nickname(String, String, String),
}

impl Prefix {
    /// Split a prefix (without the leading `:`).
    ///
    /// Lenient: nothing is validated. A name containing a dot and no `!`/`@`
    /// is taken as a server.
    pub fn parse(s: &str) -> Self {
        let (head, host) = match s.split_once('@') {
            Some((head, host)) => (head, Some(host)),
            None => (s, None),
        };
        let (nick, user) = match head.split_once('!') {
            Some((nick, user)) => (nick, Some(user)),
            None => (head, None),
        };

        if user.is_none() && host.is_none() && nick.contains('.') {
            return Self::ServerName(nick.to_owned());
        }

        Self::Nickname(
            nick.to_owned(),
            user.unwrap_or_default().to_owned(),
            host.unwrap_or_default().to_owned(),
        )
    }

    /// Nickname, if this is a user source.
    pub fn nick(&self) -> Option<&str> {
        match self {
            Self::Nickname(nick, _, _) => Some(nick),
            Self::ServerName(_) => None,
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServerName(name) => f.write_str(name),
            Self::Nickname(nick, user, host) => {
                f.write_str(nick)?;
                if !user.is_empty() {
                    write!(f, "!{user}")?;
                }
                if !host.is_empty() {
                    write!(f, "@{host}")?;
                }
                Ok(())
            }
        }
    }
}
