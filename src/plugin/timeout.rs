//! One-shot timers keyed by event name.

/// A pending timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeout {
    /// Lowercase timeout event name.
    pub name: String,
    pub delay: i64,
    pub trigger_at: i64,
}

#[derive(Debug, Default)]
pub(crate) struct Timeouts {
    entries: Vec<Timeout>,
}

impl Timeouts {
    /// Schedule `name` to fire `delay` seconds from `now`. An existing timer
    /// with the same name is replaced.
    pub fn set(&mut self, name: &str, delay: i64, now: i64) {
        let name = name.to_lowercase();
        let timeout = Timeout {
            trigger_at: now + delay,
            delay,
            name,
        };
        match self.entries.iter_mut().find(|t| t.name == timeout.name) {
            Some(existing) => *existing = timeout,
            None => self.entries.push(timeout),
        }
    }

    /// Restart the delay of a pending timer.
    pub fn reset(&mut self, name: &str, now: i64) -> bool {
        let name = name.to_lowercase();
        match self.entries.iter_mut().find(|t| t.name == name) {
            Some(timeout) => {
                timeout.trigger_at = now + timeout.delay;
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self, name: &str) -> bool {
        let name = name.to_lowercase();
        let before = self.entries.len();
        self.entries.retain(|t| t.name != name);
        before != self.entries.len()
    }

    pub fn get(&self, name: &str) -> Option<&Timeout> {
        let name = name.to_lowercase();
        self.entries.iter().find(|t| t.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Remove and return every timer whose trigger time has been reached, in
    /// scheduling order.
    pub fn take_due(&mut self, now: i64) -> Vec<Timeout> {
        let mut fired = Vec::new();
        for i in (0..self.entries.len()).rev() {
            if self.entries[i].trigger_at <= now {
                fired.push(self.entries.remove(i));
            }
        }
        fired.reverse();
        fired
    }
}
