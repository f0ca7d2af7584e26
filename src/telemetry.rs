//! Log level selection and tracing subscriber setup.

use serde::Deserialize;
use tracing_subscriber::EnvFilter;

/// Minimum severity written to the log.
///
/// Ordered: `Debug < Notice < Warning < Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Notice,
    Warning,
    Error,
}

impl LogLevel {
    /// Equivalent `EnvFilter` directive.
    pub fn as_directive(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Notice => "info",
            Self::Warning => "warn",
            Self::Error => "error",
        }
    }
}

/// Install the global fmt subscriber. `RUST_LOG` wins over `level`.
pub fn init(level: LogLevel) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(level.as_directive())),
        )
        .with_target(true)
        .init();
}

/// Standardized span constructors.
pub mod spans {
    use tracing::{Span, debug_span, info_span};

    /// Span covering one server session.
    pub fn session(name: &str) -> Span {
        info_span!("session", server = %name)
    }

    /// Span covering one dispatch.
    pub fn dispatch(listener: &str, event: &str) -> Span {
        debug_span!("dispatch", listener = %listener, event = %event)
    }
}
