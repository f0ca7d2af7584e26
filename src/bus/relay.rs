//! Best-effort forwarding of broadcastable events to an external relay.
//!
//! Relay failures never reach the dispatcher. They are counted, and after
//! [`MAX_RELAY_FAILURES`] consecutive failures the relay is disconnected and
//! the next connection attempt is pushed out by
//! `RELAY_RECONNECT_INTERVAL - RELAY_RECONNECT_GRACE` seconds.

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::event::Event;

/// Consecutive emit failures tolerated before backing off.
pub const MAX_RELAY_FAILURES: u32 = 5;
/// Regular relay reconnect period, in seconds.
pub const RELAY_RECONNECT_INTERVAL: i64 = 12 * 60 * 60;
/// Subtracted from the reconnect period when backing off after failures.
pub const RELAY_RECONNECT_GRACE: i64 = 5 * 60;

/// Relay failure as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("relay error: {0}")]
pub struct RelayError(pub String);

/// External event relay.
pub trait Relay {
    fn connect(&mut self) -> Result<(), RelayError>;
    fn disconnect(&mut self);
    fn is_available(&self) -> bool;
    fn keep_alive(&mut self) -> Result<(), RelayError>;
    fn emit(&mut self, event: &str, payload: Value) -> Result<(), RelayError>;
}

/// Relay plus its failure bookkeeping.
#[derive(Default)]
pub struct RelayLink {
    relay: Option<Box<dyn Relay>>,
    failures: u32,
    retry_at: Option<i64>,
}

impl RelayLink {
    pub fn set(&mut self, relay: Box<dyn Relay>) {
        self.relay = Some(relay);
        self.failures = 0;
        self.retry_at = None;
    }

    pub fn is_configured(&self) -> bool {
        self.relay.is_some()
    }

    /// Consecutive emit failures since the last success.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// When the next connection attempt is allowed, if backing off.
    pub fn retry_at(&self) -> Option<i64> {
        self.retry_at
    }

    /// Forward a dispatched event if it is broadcastable and the relay is up.
    pub fn forward(&mut self, event: &Event, now: i64) {
        if !event.is_broadcast() {
            return;
        }
        let Some(relay) = self.relay.as_mut() else {
            return;
        };
        if !relay.is_available() {
            return;
        }

        match relay.emit(event.name(), event.to_json()) {
            Ok(()) => self.failures = 0,
            Err(e) => {
                self.failures += 1;
                warn!(event = %event.name(), failures = self.failures, error = %e, "Relay emit failed");
                if self.failures >= MAX_RELAY_FAILURES {
                    relay.disconnect();
                    self.failures = 0;
                    self.retry_at = Some(now + RELAY_RECONNECT_INTERVAL - RELAY_RECONNECT_GRACE);
                    warn!(retry_at = ?self.retry_at, "Relay disconnected after repeated failures");
                }
            }
        }
    }

    /// Ping a live relay, or reconnect a dead one once its backoff expired.
    pub fn keep_alive(&mut self, now: i64) {
        let Some(relay) = self.relay.as_mut() else {
            return;
        };

        if relay.is_available() {
            if let Err(e) = relay.keep_alive() {
                debug!(error = %e, "Relay keepalive failed");
            }
            return;
        }

        if self.retry_at.is_some_and(|at| now < at) {
            return;
        }

        match relay.connect() {
            Ok(()) => {
                info!("Relay connected");
                self.retry_at = None;
                self.failures = 0;
            }
            Err(e) => {
                warn!(error = %e, "Relay connect failed");
                self.retry_at = Some(now + RELAY_RECONNECT_INTERVAL - RELAY_RECONNECT_GRACE);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Payload;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct State {
        up: bool,
        fail_emit: bool,
        connects: u32,
        emitted: Vec<String>,
    }

    struct MockRelay(Rc<RefCell<State>>);

    impl Relay for MockRelay {
        fn connect(&mut self) -> Result<(), RelayError> {
            let mut s = self.0.borrow_mut();
            s.connects += 1;
            s.up = true;
            Ok(())
        }
        fn disconnect(&mut self) {
            self.0.borrow_mut().up = false;
        }
        fn is_available(&self) -> bool {
            self.0.borrow().up
        }
        fn keep_alive(&mut self) -> Result<(), RelayError> {
            Ok(())
        }
        fn emit(&mut self, event: &str, _payload: Value) -> Result<(), RelayError> {
            let mut s = self.0.borrow_mut();
            if s.fail_emit {
                return Err(RelayError("unreachable".into()));
            }
            s.emitted.push(event.to_owned());
            Ok(())
        }
    }

    fn link(state: &Rc<RefCell<State>>) -> RelayLink {
        let mut link = RelayLink::default();
        link.set(Box::new(MockRelay(state.clone())));
        link
    }

    fn broadcast_event() -> Event {
        Event::new("protocol", "privmsg", Payload::None).with_broadcast(true)
    }

    #[test]
    fn forwards_only_broadcast_events() {
        let state = Rc::new(RefCell::new(State {
            up: true,
            ..State::default()
        }));
        let mut link = link(&state);
        link.forward(&broadcast_event(), 0);
        link.forward(&Event::new("core", "connected", Payload::None), 0);
        assert_eq!(state.borrow().emitted, vec!["privmsg"]);
    }

    #[test]
    fn backs_off_after_five_failures() {
        let state = Rc::new(RefCell::new(State {
            up: true,
            fail_emit: true,
            ..State::default()
        }));
        let mut link = link(&state);

        for _ in 0..4 {
            link.forward(&broadcast_event(), 1000);
        }
        assert!(state.borrow().up);
        assert_eq!(link.failures(), 4);

        link.forward(&broadcast_event(), 1000);
        assert!(!state.borrow().up);
        assert_eq!(link.retry_at(), Some(1000 + 11 * 3600 + 55 * 60));

        // No hot reconnect while backing off.
        link.keep_alive(1001);
        assert_eq!(state.borrow().connects, 0);

        link.keep_alive(1000 + 11 * 3600 + 55 * 60);
        assert_eq!(state.borrow().connects, 1);
        assert!(link.retry_at().is_none());
    }

    #[test]
    fn success_resets_failure_count() {
        let state = Rc::new(RefCell::new(State {
            up: true,
            fail_emit: true,
            ..State::default()
        }));
        let mut link = link(&state);
        link.forward(&broadcast_event(), 0);
        link.forward(&broadcast_event(), 0);
        state.borrow_mut().fail_emit = false;
        link.forward(&broadcast_event(), 0);
        assert_eq!(link.failures(), 0);
    }

    #[test]
    fn first_keep_alive_connects() {
        let state = Rc::new(RefCell::new(State::default()));
        let mut link = link(&state);
        link.keep_alive(0);
        assert_eq!(state.borrow().connects, 1);
        assert!(state.borrow().up);
    }
}
