//! Periodic routines gated per server name.
//!
//! A routine with a 60 second interval runs once every 60 seconds for each
//! server name it is called with, not once globally.

use std::collections::HashMap;

use super::RoutineFn;

/// Interval used when none is given.
pub const DEFAULT_ROUTINE_INTERVAL: u64 = 1;

struct Routine {
    owner: String,
    method: String,
    interval: u64,
    last_run: HashMap<String, i64>,
    callback: RoutineFn,
}

/// Routine table keyed by `(owner, method)`, kept in registration order.
#[derive(Default)]
pub(crate) struct Routines {
    entries: Vec<Routine>,
}

impl Routines {
    fn position(&self, owner: &str, method: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|r| r.owner == owner && r.method == method)
    }

    /// Add or replace a routine. Replacing keeps its run history.
    pub fn add(&mut self, owner: &str, method: &str, interval: u64, callback: RoutineFn) {
        match self.position(owner, method) {
            Some(pos) => {
                let routine = &mut self.entries[pos];
                routine.interval = interval;
                routine.callback = callback;
            }
            None => self.entries.push(Routine {
                owner: owner.to_owned(),
                method: method.to_owned(),
                interval,
                last_run: HashMap::new(),
                callback,
            }),
        }
    }

    pub fn remove(&mut self, owner: &str, method: &str) -> bool {
        match self.position(owner, method) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Drop every routine of `owner`, returning how many were removed.
    pub fn remove_owner(&mut self, owner: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|r| r.owner != owner);
        before - self.entries.len()
    }

    pub fn set_interval(&mut self, owner: &str, method: &str, interval: u64) -> bool {
        match self.position(owner, method) {
            Some(pos) => {
                self.entries[pos].interval = interval;
                true
            }
            None => false,
        }
    }

    pub fn interval(&self, owner: &str, method: &str) -> Option<u64> {
        self.position(owner, method).map(|pos| self.entries[pos].interval)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Routines due for `server` at `now`. Their last run for `server` is
    /// stamped before they are returned.
    pub fn take_due(&mut self, server: &str, now: i64, force: bool) -> Vec<(String, RoutineFn)> {
        let mut due = Vec::new();
        for routine in &mut self.entries {
            let ready = force
                || match routine.last_run.get(server) {
                    None => true,
                    Some(last) => now - last >= i64::try_from(routine.interval).unwrap_or(i64::MAX),
                };
            if ready {
                routine.last_run.insert(server.to_owned(), now);
                due.push((routine.owner.clone(), routine.callback.clone()));
            }
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::Context;
    use std::rc::Rc;

    fn noop() -> RoutineFn {
        Rc::new(|_: &mut Context<'_>| {})
    }

    fn owners(due: &[(String, RoutineFn)]) -> Vec<&str> {
        due.iter().map(|(o, _)| o.as_str()).collect()
    }

    #[test]
    fn gates_per_server_name() {
        let mut routines = Routines::default();
        routines.add("Quiz", "tick", 5, noop());

        assert_eq!(routines.take_due("chanA", 100, false).len(), 1);
        assert!(routines.take_due("chanA", 100, false).is_empty());
        assert_eq!(routines.take_due("chanB", 100, false).len(), 1);

        assert!(routines.take_due("chanA", 104, false).is_empty());
        assert_eq!(routines.take_due("chanA", 105, false).len(), 1);
    }

    #[test]
    fn force_ignores_interval() {
        let mut routines = Routines::default();
        routines.add("Quiz", "tick", 60, noop());
        routines.take_due("a", 0, false);
        assert_eq!(routines.take_due("a", 1, true).len(), 1);
    }

    #[test]
    fn huge_interval_never_wraps() {
        let mut routines = Routines::default();
        routines.add("Quiz", "tick", u64::MAX, noop());
        assert_eq!(routines.take_due("a", 0, false).len(), 1);
        assert!(routines.take_due("a", 1, false).is_empty());
        assert!(routines.take_due("a", 1_000_000_000, false).is_empty());
    }

    #[test]
    fn keyed_by_owner_and_method() {
        let mut routines = Routines::default();
        routines.add("A", "tick", 1, noop());
        routines.add("A", "tick", 9, noop());
        routines.add("B", "tick", 1, noop());
        assert_eq!(routines.len(), 2);
        assert_eq!(routines.interval("A", "tick"), Some(9));

        assert!(routines.set_interval("B", "tick", 3));
        assert!(!routines.set_interval("B", "nope", 3));

        assert_eq!(owners(&routines.take_due("s", 0, false)), vec!["A", "B"]);
        assert_eq!(routines.remove_owner("A"), 1);
        assert!(routines.remove("B", "tick"));
        assert!(!routines.remove("B", "tick"));
        assert_eq!(routines.len(), 0);
    }
}
