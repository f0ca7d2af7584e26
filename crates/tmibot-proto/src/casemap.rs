//! RFC 1459 case folding.
//!
//! Twitch lowercases channel and login names itself, but JOIN targets typed
//! by humans (and nicks in NAMES replies from other networks) may not be.
//! Channel bookkeeping folds every name through [`irc_to_lower`] so that
//! `#Foo` and `#foo` are one channel.

/// Fold one character using the `rfc1459` mapping.
///
/// Besides ASCII letters this maps `[`→`{`, `]`→`}`, `\`→`|` and `~`→`^`.
#[inline]
pub const fn irc_lower_char(c: char) -> char {
    match c {
        '[' => '{',
        ']' => '}',
        '\\' => '|',
        '~' => '^',
        'A'..='Z' => (c as u8 + 32) as char,
        _ => c,
    }
}

/// Fold a whole string.
pub fn irc_to_lower(s: &str) -> String {
    s.chars().map(irc_lower_char).collect()
}

/// Case-insensitive comparison under the `rfc1459` mapping.
pub fn irc_eq(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a
            .chars()
            .zip(b.chars())
            .all(|(ca, cb)| irc_lower_char(ca) == irc_lower_char(cb))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_ascii_and_brackets() {
        assert_eq!(irc_to_lower("#Some[Chan]"), "#some{chan}");
        assert_eq!(irc_to_lower("Nick\\~"), "nick|^");
    }

    #[test]
    fn eq_ignores_case() {
        assert!(irc_eq("#Bar", "#bar"));
        assert!(irc_eq("a[b", "A{B"));
        assert!(!irc_eq("#bar", "#baz"));
        assert!(!irc_eq("#bar", "#barr"));
    }
}
