//! Outbound flood limiting.
//!
//! Twitch drops (and eventually bans) clients that send too fast. A limited
//! connection writes at most one queued line per [`FLOOD_INTERVAL`] seconds.

/// Minimum spacing between limited sends, in seconds.
pub const FLOOD_INTERVAL: i64 = 2;

/// Spacing gate for one connection's FIFO.
#[derive(Debug, Clone)]
pub struct FloodLimiter {
    enabled: bool,
    interval: i64,
    last_send: Option<i64>,
}

impl Default for FloodLimiter {
    fn default() -> Self {
        Self::new(true)
    }
}

impl FloodLimiter {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            interval: FLOOD_INTERVAL,
            last_send: None,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether another line may be written at `now`.
    pub fn check(&self, now: i64) -> bool {
        if !self.enabled {
            return true;
        }
        match self.last_send {
            Some(last) => now - last >= self.interval,
            None => true,
        }
    }

    /// Note a successful write.
    pub fn record(&mut self, now: i64) {
        self.last_send = Some(now);
    }

    pub fn last_send(&self) -> Option<i64> {
        self.last_send
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_send_is_free() {
        let limiter = FloodLimiter::new(true);
        assert!(limiter.check(0));
    }

    #[test]
    fn spacing_enforced_when_enabled() {
        let mut limiter = FloodLimiter::new(true);
        limiter.record(100);
        assert!(!limiter.check(100));
        assert!(!limiter.check(101));
        assert!(limiter.check(102));
    }

    #[test]
    fn disabled_never_blocks() {
        let mut limiter = FloodLimiter::new(false);
        limiter.record(100);
        assert!(limiter.check(100));
        assert_eq!(limiter.last_send(), Some(100));
    }
}
