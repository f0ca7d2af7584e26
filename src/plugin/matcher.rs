//! Free-text regex matchers, tried in registration order.

use regex::{Regex, RegexBuilder};
use tmibot_proto::ChatMessage;

use super::MatchFn;

/// What a matcher callback receives.
#[derive(Debug, Clone)]
pub struct RegexMatch {
    /// The text the pattern was tested against.
    pub text: String,
    /// Capture groups; index 0 is the whole match.
    pub captures: Vec<Option<String>>,
    /// Chat line the text came from, if any.
    pub message: Option<ChatMessage>,
}

struct Matcher {
    owner: String,
    regex: Regex,
    callback: MatchFn,
}

#[derive(Default)]
pub(crate) struct Matchers {
    entries: Vec<Matcher>,
}

impl Matchers {
    /// Compile `pattern` case-insensitive, multi-line and with `.` matching
    /// newlines.
    pub fn add(&mut self, owner: &str, pattern: &str, callback: MatchFn) -> Result<(), regex::Error> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .multi_line(true)
            .dot_matches_new_line(true)
            .build()?;
        self.entries.push(Matcher {
            owner: owner.to_owned(),
            regex,
            callback,
        });
        Ok(())
    }

    pub fn remove_owner(&mut self, owner: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|m| m.owner != owner);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// The first matcher whose pattern matches `text`.
    pub fn first_match(
        &self,
        text: &str,
        message: Option<&ChatMessage>,
    ) -> Option<(String, MatchFn, RegexMatch)> {
        self.entries.iter().find_map(|m| {
            let caps = m.regex.captures(text)?;
            let captures = caps
                .iter()
                .map(|c| c.map(|c| c.as_str().to_owned()))
                .collect();
            Some((
                m.owner.clone(),
                m.callback.clone(),
                RegexMatch {
                    text: text.to_owned(),
                    captures,
                    message: message.cloned(),
                },
            ))
        })
    }
}
