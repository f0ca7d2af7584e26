//! tmibot - event-driven Twitch chat bot runtime.
//!
//! Sessions read protocol lines from each configured server, turn them into
//! events and dispatch them through the [`plugin::PluginRegistry`] to
//! dynamically loaded plugins. A single cooperative [`scheduler::Scheduler`]
//! loop drives everything; there are no threads and no locks.
//!
//! ```text
//! socket ─▶ Connection ─▶ ServerSession ─▶ EventBus ─▶ plugin callbacks
//!               ▲                                            │
//!               └──────────────── Connection::send ◀─────────┘
//! ```

pub mod bus;
pub mod clock;
pub mod collab;
pub mod config;
pub mod error;
pub mod event;
pub mod network;
pub mod plugin;
pub mod plugins;
pub mod scheduler;
pub mod session;
pub mod telemetry;
