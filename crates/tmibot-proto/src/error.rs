//! Error types for line parsing.

use thiserror::Error;

/// Reasons a raw line could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The line was empty (or only whitespace).
    #[error("empty line")]
    EmptyLine,

    /// A tag block was present but nothing followed it.
    #[error("tag block without message: {0}")]
    DanglingTags(String),

    /// A prefix was present but no command followed it.
    #[error("missing command in line: {0}")]
    MissingCommand(String),
}

impl ParseError {
    /// Static label for log fields.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyLine => "empty_line",
            Self::DanglingTags(_) => "dangling_tags",
            Self::MissingCommand(_) => "missing_command",
        }
    }
}
