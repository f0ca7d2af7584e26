//! Unified error handling for tmibot.
//!
//! Every subsystem reports failures as a typed enum. None of these are fatal
//! on their own: the caller logs them and decides whether to escalate. Only
//! boot (see `main.rs`) turns errors into a process exit.

use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Event bus errors
// ============================================================================

/// Failures of listener and binding bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("unknown listener: {0}")]
    UnknownListener(String),

    #[error("listener already exists: {0}")]
    DuplicateListener(String),

    #[error("{id} is already bound to {listener}/{event}")]
    DuplicateBinding {
        listener: String,
        event: String,
        id: String,
    },

    #[error("no binding {listener}/{event} for {id}")]
    UnknownBinding {
        listener: String,
        event: String,
        id: String,
    },
}

impl BusError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownListener(_) => "unknown_listener",
            Self::DuplicateListener(_) => "duplicate_listener",
            Self::DuplicateBinding { .. } => "duplicate_binding",
            Self::UnknownBinding { .. } => "unknown_binding",
        }
    }
}

// ============================================================================
// Plugin registry errors
// ============================================================================

/// Failures while loading, unloading or scheduling plugin work.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin already loaded: {0}")]
    AlreadyLoaded(String),

    #[error("plugin not loaded: {0}")]
    NotLoaded(String),

    #[error("plugin directory missing: {}", .0.display())]
    DirectoryMissing(PathBuf),

    #[error("failed to read manifest for {plugin}: {source}")]
    ManifestIo {
        plugin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse manifest for {plugin}: {source}")]
    ManifestParse {
        plugin: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("manifest for {0} has no pluginDefinition.mainClass")]
    MissingMainClass(String),

    #[error("no factory registered for main class {main_class} (plugin {plugin})")]
    UnknownFactory { plugin: String, main_class: String },

    #[error("dependency {dependency} of {plugin} failed to load: {source}")]
    Dependency {
        plugin: String,
        dependency: String,
        #[source]
        source: Box<PluginError>,
    },

    #[error("plugin {0} refused to initialise")]
    InitFailed(String),

    #[error("dependency cycle through plugin {0}")]
    DependencyCycle(String),

    #[error("plugin {plugin} is required by {}", .dependents.join(", "))]
    HasDependents {
        plugin: String,
        dependents: Vec<String>,
    },

    #[error("no routine method {method} on {owner}")]
    UnknownRoutine { owner: String, method: String },

    #[error("no pending timeout named {0}")]
    UnknownTimeout(String),

    #[error("no plugin context for this call")]
    NoOwner,

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("invalid matcher pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl PluginError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AlreadyLoaded(_) => "already_loaded",
            Self::NotLoaded(_) => "not_loaded",
            Self::DirectoryMissing(_) => "directory_missing",
            Self::ManifestIo { .. } => "manifest_io",
            Self::ManifestParse { .. } => "manifest_parse",
            Self::MissingMainClass(_) => "missing_main_class",
            Self::UnknownFactory { .. } => "unknown_factory",
            Self::Dependency { .. } => "dependency_failed",
            Self::InitFailed(_) => "init_failed",
            Self::DependencyCycle(_) => "dependency_cycle",
            Self::HasDependents { .. } => "has_dependents",
            Self::UnknownRoutine { .. } => "unknown_routine",
            Self::UnknownTimeout(_) => "unknown_timeout",
            Self::NoOwner => "no_owner",
            Self::Bus(e) => e.error_code(),
            Self::Pattern(_) => "invalid_pattern",
        }
    }
}

// ============================================================================
// Connection errors
// ============================================================================

/// Socket-level failures of one chat server connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("not connected")]
    NotConnected,

    #[error("connection closed by peer")]
    Closed,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConnectionError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotConnected => "not_connected",
            Self::Closed => "closed",
            Self::Io(_) => "io",
        }
    }
}
