//! Interfaces to services the runtime talks to but does not implement.
//!
//! Storage backends, access control and the control plane live outside the
//! core. The registry and scheduler only hold trait objects; the one backend
//! shipped here is [`MemoryStorage`].

mod storage;

pub use storage::MemoryStorage;

use serde_json::Value;

use crate::plugin::PluginRegistry;

/// Key-path configuration and data storage.
///
/// Paths are dotted (`quiz.scores.alice`). Writes are last-write-wins.
pub trait Storage {
    /// The value at `path`, or `None` when nothing is stored there.
    fn get(&self, path: &str) -> Option<Value>;

    /// Store `value` at `path`, creating intermediate objects. Returns
    /// `false` if the backend refused the write.
    fn set(&mut self, path: &str, value: Value) -> bool;

    /// Whether the backend can be reached. Checked once at boot.
    fn is_available(&self) -> bool {
        true
    }
}

/// Role-based access control. Told about command rights exactly when
/// command bindings are created and removed.
pub trait AccessControl {
    fn add_rights(&mut self, rights: &[String]);
    fn remove_rights(&mut self, rights: &[String]);
}

/// Remote control endpoint, polled once per scheduler tick.
pub trait ControlPlane {
    fn process(&mut self, registry: &mut PluginRegistry);
}
