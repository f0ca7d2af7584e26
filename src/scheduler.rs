//! The process's single control loop.
//!
//! Each tick steps every connected session in order, runs due routines
//! once the first server has welcomed us, polls the control plane and
//! keeps the relay alive. Nothing runs in parallel: every handler, routine
//! and timer executes on this loop, one after another.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info};

use crate::collab::ControlPlane;
use crate::plugin::PluginRegistry;
use crate::session::ServerSession;
use crate::telemetry::spans;

/// Pause between sessions and between ticks.
pub const TICK_YIELD: Duration = Duration::from_millis(1);

pub struct Scheduler {
    registry: PluginRegistry,
    sessions: Vec<ServerSession>,
    control: Option<Box<dyn ControlPlane>>,
    stop: CancellationToken,
}

impl Scheduler {
    pub fn new(registry: PluginRegistry, sessions: Vec<ServerSession>) -> Self {
        let stop = registry.shutdown_token();
        Self {
            registry,
            sessions,
            control: None,
            stop,
        }
    }

    pub fn with_control_plane(mut self, control: Box<dyn ControlPlane>) -> Self {
        self.control = Some(control);
        self
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut PluginRegistry {
        &mut self.registry
    }

    pub fn sessions(&self) -> &[ServerSession] {
        &self.sessions
    }

    pub fn sessions_mut(&mut self) -> &mut [ServerSession] {
        &mut self.sessions
    }

    /// Token that stops [`Scheduler::run`] when cancelled.
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Whether any session has completed its login handshake.
    pub fn handshake_complete(&self) -> bool {
        self.sessions.iter().any(ServerSession::handshake_complete)
    }

    /// One pass of the loop. Returns the number of protocol lines handled.
    pub async fn tick(&mut self) -> usize {
        let mut handled = 0;
        for session in &mut self.sessions {
            let span = spans::session(session.name());
            if session.is_connected() {
                handled += session
                    .step(&mut self.registry, None)
                    .instrument(span)
                    .await;
            } else {
                session.maintain().instrument(span).await;
            }
            tokio::time::sleep(TICK_YIELD).await;
        }

        if self.handshake_complete() {
            for session in &mut self.sessions {
                if session.is_connected() {
                    self.registry
                        .call_all_routines(false, Some(session.server_context()));
                }
            }
        }

        if let Some(control) = self.control.as_mut() {
            control.process(&mut self.registry);
        }
        self.registry.relay_keep_alive();
        handled
    }

    /// Run until the stop token is cancelled, then shut down.
    pub async fn run(&mut self) {
        info!(sessions = self.sessions.len(), "Scheduler started");
        while !self.stop.is_cancelled() {
            self.tick().await;
            tokio::select! {
                _ = self.stop.cancelled() => {}
                _ = tokio::time::sleep(TICK_YIELD) => {}
            }
        }
        self.shutdown().await;
    }

    /// Disconnect every session, then unload every plugin.
    pub async fn shutdown(&mut self) {
        info!("Scheduler stopping");
        for session in &mut self.sessions {
            session.disconnect().await;
        }
        self.registry.unload_all();
        debug!("All plugins unloaded");
    }
}
