//! IRCv3 tag blocks as sent by Twitch.
//!
//! A tagged line starts with `@k=v;k=v ` before the optional prefix. Values
//! use the IRCv3 escaping scheme (`\:` for `;`, `\s` for space, ...).

use std::collections::BTreeMap;

/// Tags that Twitch sends as `0`/`1` and that we expose as booleans.
const BOOLEAN_TAGS: &[&str] = &["subscriber", "turbo", "mod", "first-msg", "returning-chatter"];

/// Decoded tag block. Keys are kept verbatim, values are unescaped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tags(BTreeMap<String, String>);

impl Tags {
    /// Parse the tag block without its leading `@`.
    ///
    /// A tag with no `=` is stored with an empty value, matching how Twitch
    /// sends `badge-info=` for chatters with no badge.
    pub fn parse(block: &str) -> Self {
        let map = block
            .split(';')
            .filter(|s| !s.is_empty())
            .map(|tag| match tag.split_once('=') {
                Some((key, value)) => (key.to_owned(), unescape_tag_value(value)),
                None => (tag.to_owned(), String::new()),
            })
            .collect();
        Self(map)
    }

    /// Raw value of a tag.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Whether the tag is present at all, even with an empty value.
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Value of a `0`/`1` flag tag. Missing or unparsable values are `false`.
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.get(key), Some("1") | Some("true"))
    }

    /// Names of the boolean tags this parser normalises.
    pub fn boolean_keys() -> &'static [&'static str] {
        BOOLEAN_TAGS
    }

    /// Badge names from the `badges` tag (`broadcaster/1,subscriber/12`).
    pub fn badges(&self) -> impl Iterator<Item = &str> {
        self.get("badges")
            .unwrap_or_default()
            .split(',')
            .filter(|b| !b.is_empty())
            .map(|b| b.split_once('/').map_or(b, |(name, _)| name))
    }

    /// Number of tags.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no tags were present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Unescape a tag value from wire format.
pub fn unescape_tag_value(value: &str) -> String {
    let mut unescaped = String::with_capacity(value.len());
    let mut iter = value.chars();
    while let Some(c) = iter.next() {
        let r = if c == '\\' {
            match iter.next() {
                Some(':') => ';',
                Some('s') => ' ',
                Some('\\') => '\\',
                Some('r') => '\r',
                Some('n') => '\n',
                Some(c) => c,
                None => break,
            }
        } else {
            c
        };
        unescaped.push(r);
    }
    unescaped
}
