//! Generic publish/subscribe bus.
//!
//! Events are grouped into named *listeners* (namespaces). Each listener
//! maps lowercase event names to an ordered list of bindings, and each
//! binding is owned by an id (normally the plugin's main class). The bus is
//! generic over the stored handler type `H`; it never calls handlers itself
//! except through the `invoke` closure given to [`EventBus::dispatch`], which
//! lets the plugin registry hand itself to callbacks without aliasing the
//! binding tables.
//!
//! ```text
//!  listener "command" (prefix "cmd_")
//!    ├── "hello" → [Greeter, Logger]
//!    └── "quit"  → [Admin]
//!  listener "protocol" (prefix "irc_")
//!    └── "privmsg" → [Logger]
//! ```

mod relay;

pub use relay::{
    MAX_RELAY_FAILURES, RELAY_RECONNECT_GRACE, RELAY_RECONNECT_INTERVAL, Relay, RelayError,
    RelayLink,
};

use std::collections::HashMap;
use tracing::{debug, warn};

use crate::error::BusError;
use crate::event::Event;

/// One callback attached to `(listener, event)`.
#[derive(Clone)]
pub struct Binding<H> {
    pub id: String,
    pub handler: H,
}

/// A `(listener, event)` pair that a binding was created for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BoundEvent {
    pub listener: String,
    pub event: String,
}

impl BoundEvent {
    /// Access-control right name: `listener/event`.
    pub fn right(&self) -> String {
        format!("{}/{}", self.listener, self.event)
    }
}

struct Listener<H> {
    prefix: String,
    events: HashMap<String, Vec<Binding<H>>>,
}

/// Listener namespaces and their bindings.
pub struct EventBus<H> {
    listeners: HashMap<String, Listener<H>>,
    /// Creation order, used when scanning prefixes.
    order: Vec<String>,
    relay: RelayLink,
}

impl<H> Default for EventBus<H> {
    fn default() -> Self {
        Self {
            listeners: HashMap::new(),
            order: Vec::new(),
            relay: RelayLink::default(),
        }
    }
}

impl<H: Clone> EventBus<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty namespace. `prefix` is the method-name prefix used by
    /// [`EventBus::auto_bind`]; an empty prefix opts out of auto-binding.
    pub fn add_listener(&mut self, name: &str, prefix: &str) -> Result<(), BusError> {
        if self.listeners.contains_key(name) {
            debug!(listener = %name, "Listener already exists");
            return Err(BusError::DuplicateListener(name.to_owned()));
        }
        self.listeners.insert(
            name.to_owned(),
            Listener {
                prefix: prefix.to_owned(),
                events: HashMap::new(),
            },
        );
        self.order.push(name.to_owned());
        Ok(())
    }

    /// Delete a namespace and every binding in it.
    pub fn remove_listener(&mut self, name: &str) -> Result<(), BusError> {
        if self.listeners.remove(name).is_none() {
            debug!(listener = %name, "Cannot remove unknown listener");
            return Err(BusError::UnknownListener(name.to_owned()));
        }
        self.order.retain(|n| n != name);
        Ok(())
    }

    pub fn has_listener(&self, name: &str) -> bool {
        self.listeners.contains_key(name)
    }

    /// `(name, prefix)` of every listener in creation order.
    pub fn listeners(&self) -> Vec<(&str, &str)> {
        self.order
            .iter()
            .filter_map(|name| {
                self.listeners
                    .get(name)
                    .map(|l| (name.as_str(), l.prefix.as_str()))
            })
            .collect()
    }

    /// Attach `handler` to `listener/event` under `id`.
    pub fn bind(&mut self, listener: &str, id: &str, event: &str, handler: H) -> Result<(), BusError> {
        let event = event.to_lowercase();
        let Some(ns) = self.listeners.get_mut(listener) else {
            debug!(listener = %listener, event = %event, "Bind to unknown listener");
            return Err(BusError::UnknownListener(listener.to_owned()));
        };

        let bindings = ns.events.entry(event.clone()).or_default();
        if bindings.iter().any(|b| b.id == id) {
            debug!(listener = %listener, event = %event, id = %id, "Duplicate binding");
            return Err(BusError::DuplicateBinding {
                listener: listener.to_owned(),
                event,
                id: id.to_owned(),
            });
        }

        bindings.push(Binding {
            id: id.to_owned(),
            handler,
        });
        Ok(())
    }

    /// Inverse of [`EventBus::bind`].
    pub fn unbind(&mut self, listener: &str, event: &str, id: &str) -> Result<(), BusError> {
        let event = event.to_lowercase();
        let unknown = || BusError::UnknownBinding {
            listener: listener.to_owned(),
            event: event.clone(),
            id: id.to_owned(),
        };

        let ns = self
            .listeners
            .get_mut(listener)
            .ok_or_else(|| BusError::UnknownListener(listener.to_owned()))?;
        let bindings = ns.events.get_mut(&event).ok_or_else(unknown)?;
        let pos = bindings.iter().position(|b| b.id == id).ok_or_else(unknown)?;
        bindings.remove(pos);
        if bindings.is_empty() {
            ns.events.remove(&event);
        }
        Ok(())
    }

    /// Bind every `(method name, handler)` whose name is `<prefix><event>` for
    /// some listener prefix. Returns the bindings created, in listener order.
    pub fn auto_bind(&mut self, id: &str, methods: &[(String, H)]) -> Vec<BoundEvent> {
        let prefixes: Vec<(String, String)> = self
            .listeners()
            .into_iter()
            .filter(|(_, prefix)| !prefix.is_empty())
            .map(|(name, prefix)| (name.to_owned(), prefix.to_owned()))
            .collect();

        let mut bound = Vec::new();
        for (listener, prefix) in &prefixes {
            for (method, handler) in methods {
                let Some(event) = method.strip_prefix(prefix.as_str()) else {
                    continue;
                };
                if event.is_empty() {
                    continue;
                }
                let event = event.to_lowercase();
                match self.bind(listener, id, &event, handler.clone()) {
                    Ok(()) => bound.push(BoundEvent {
                        listener: listener.clone(),
                        event,
                    }),
                    Err(e) => warn!(id = %id, method = %method, error = %e, "Auto-bind skipped"),
                }
            }
        }
        bound
    }

    /// Every binding owned by `id`.
    pub fn find_all_by_id(&self, id: &str) -> Vec<BoundEvent> {
        let mut found = Vec::new();
        for name in &self.order {
            let Some(ns) = self.listeners.get(name) else {
                continue;
            };
            let mut events: Vec<&String> = ns
                .events
                .iter()
                .filter(|(_, bindings)| bindings.iter().any(|b| b.id == id))
                .map(|(event, _)| event)
                .collect();
            events.sort();
            found.extend(events.into_iter().map(|event| BoundEvent {
                listener: name.clone(),
                event: event.clone(),
            }));
        }
        found
    }

    /// Remove every binding owned by `id`, returning how many were removed.
    pub fn unbind_all_by_id(&mut self, id: &str) -> usize {
        let mut removed = 0;
        for ns in self.listeners.values_mut() {
            for bindings in ns.events.values_mut() {
                let before = bindings.len();
                bindings.retain(|b| b.id != id);
                removed += before - bindings.len();
            }
            ns.events.retain(|_, bindings| !bindings.is_empty());
        }
        removed
    }

    /// Snapshot of the bindings an event would reach, in registration order.
    pub fn bindings_for(&self, event: &Event) -> Result<Vec<Binding<H>>, BusError> {
        let ns = self.listeners.get(event.kind()).ok_or_else(|| {
            debug!(listener = %event.kind(), event = %event.name(), "Dispatch to unknown listener");
            BusError::UnknownListener(event.kind().to_owned())
        })?;
        Ok(ns.events.get(event.name()).cloned().unwrap_or_default())
    }

    /// Invoke every binding for `event` through `invoke`, stopping as soon
    /// as the event's propagation is stopped, then forward it to the relay.
    /// Returns the number of bindings invoked.
    pub fn dispatch(
        &mut self,
        event: &mut Event,
        now: i64,
        mut invoke: impl FnMut(&Binding<H>, &mut Event),
    ) -> Result<usize, BusError> {
        let bindings = self.bindings_for(event)?;
        let mut invoked = 0;
        for binding in &bindings {
            if !event.propagates() {
                break;
            }
            invoke(binding, event);
            invoked += 1;
        }
        self.forward(event, now);
        Ok(invoked)
    }

    /// Relay forwarding half of a dispatch.
    pub fn forward(&mut self, event: &Event, now: i64) {
        self.relay.forward(event, now);
    }

    pub fn set_relay(&mut self, relay: Box<dyn Relay>) {
        self.relay.set(relay);
    }

    pub fn relay(&self) -> &RelayLink {
        &self.relay
    }

    /// Periodic relay upkeep, called by the scheduler.
    pub fn relay_keep_alive(&mut self, now: i64) {
        self.relay.keep_alive(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Payload;

    type Bus = EventBus<char>;

    fn bus() -> Bus {
        let mut bus = Bus::new();
        bus.add_listener("command", "cmd_").unwrap();
        bus.add_listener("protocol", "irc_").unwrap();
        bus
    }

    fn event(kind: &str, name: &str) -> Event {
        Event::new(kind, name, Payload::None)
    }

    #[test]
    fn duplicate_listener_fails() {
        let mut bus = bus();
        assert_eq!(
            bus.add_listener("command", "x_"),
            Err(BusError::DuplicateListener("command".into()))
        );
    }

    #[test]
    fn duplicate_binding_fails_and_original_runs_once() {
        let mut bus = bus();
        bus.bind("command", "Greeter", "Hello", 'A').unwrap();
        assert!(matches!(
            bus.bind("command", "Greeter", "hello", 'B'),
            Err(BusError::DuplicateBinding { .. })
        ));

        let mut calls = Vec::new();
        let invoked = bus
            .dispatch(&mut event("command", "hello"), 0, |b, _| calls.push(b.handler))
            .unwrap();
        assert_eq!(invoked, 1);
        assert_eq!(calls, vec!['A']);
    }

    #[test]
    fn stop_propagation_short_circuits() {
        let mut bus = bus();
        bus.bind("command", "A", "x", 'A').unwrap();
        bus.bind("command", "B", "x", 'B').unwrap();
        bus.bind("command", "C", "x", 'C').unwrap();

        let mut calls = Vec::new();
        bus.dispatch(&mut event("command", "x"), 0, |b, ev| {
            calls.push(b.handler);
            if b.handler == 'B' {
                ev.stop_propagation();
            }
        })
        .unwrap();
        assert_eq!(calls, vec!['A', 'B']);
    }

    #[test]
    fn dispatch_to_unknown_listener_fails() {
        let mut bus = bus();
        let err = bus.dispatch(&mut event("nope", "x"), 0, |_, _| {}).unwrap_err();
        assert_eq!(err, BusError::UnknownListener("nope".into()));
    }

    #[test]
    fn bind_to_unknown_listener_fails() {
        let mut bus = bus();
        assert_eq!(
            bus.bind("nope", "A", "x", 'A'),
            Err(BusError::UnknownListener("nope".into()))
        );
    }

    #[test]
    fn unbind_requires_every_component() {
        let mut bus = bus();
        bus.bind("command", "A", "x", 'A').unwrap();
        assert!(bus.unbind("command", "x", "B").is_err());
        assert!(bus.unbind("command", "y", "A").is_err());
        assert!(bus.unbind("nope", "x", "A").is_err());
        assert!(bus.unbind("command", "X", "A").is_ok());
        assert!(bus.bindings_for(&event("command", "x")).unwrap().is_empty());
    }

    #[test]
    fn auto_bind_matches_prefixes() {
        let mut bus = bus();
        let methods = vec![
            ("cmd_Hello".to_string(), 'h'),
            ("irc_privmsg".to_string(), 'p'),
            ("cmd_".to_string(), 'e'),
            ("helper".to_string(), 'x'),
        ];
        let bound = bus.auto_bind("Greeter", &methods);
        assert_eq!(
            bound,
            vec![
                BoundEvent {
                    listener: "command".into(),
                    event: "hello".into()
                },
                BoundEvent {
                    listener: "protocol".into(),
                    event: "privmsg".into()
                },
            ]
        );
        assert_eq!(bound[0].right(), "command/hello");
    }

    #[test]
    fn unbind_all_by_id_leaves_others() {
        let mut bus = bus();
        bus.bind("command", "A", "x", 'A').unwrap();
        bus.bind("command", "B", "x", 'B').unwrap();
        bus.bind("protocol", "A", "join", 'a').unwrap();

        assert_eq!(bus.find_all_by_id("A").len(), 2);
        assert_eq!(bus.unbind_all_by_id("A"), 2);
        assert!(bus.find_all_by_id("A").is_empty());

        let left = bus.bindings_for(&event("command", "x")).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, "B");
    }

    #[test]
    fn remove_listener_drops_bindings() {
        let mut bus = bus();
        bus.bind("command", "A", "x", 'A').unwrap();
        bus.remove_listener("command").unwrap();
        assert!(!bus.has_listener("command"));
        assert!(bus.remove_listener("command").is_err());
        assert_eq!(bus.listeners(), vec![("protocol", "irc_")]);
    }
}
