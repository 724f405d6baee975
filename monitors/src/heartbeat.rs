//! Heartbeat monitor (§4.8): tracks `runtime.keepalive` liveness.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// What happens when a heartbeat times out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatPolicy {
    /// Log a risk event but keep trading.
    Warn,
    /// Log a risk event and halt the risk engine.
    Halt,
}

impl HeartbeatPolicy {
    /// Parse the config/wire value (`"warn"` or `"halt"`).
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "warn" => Some(Self::Warn),
            "halt" => Some(Self::Halt),
            _ => None,
        }
    }
}

/// Tracks the most recent `beat()` and reports a timeout once the configured
/// window has elapsed without one.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    timeout: Duration,
    policy: HeartbeatPolicy,
    last_beat: Mutex<Instant>,
}

impl HeartbeatMonitor {
    /// Build a monitor, considered alive as of construction time.
    #[must_use]
    pub fn new(timeout: Duration, policy: HeartbeatPolicy) -> Self {
        Self {
            timeout,
            policy,
            last_beat: Mutex::new(Instant::now()),
        }
    }

    /// Record a keepalive.
    pub fn beat(&self) {
        *self.last_beat.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    /// True once `timeout` has elapsed since the last `beat()`.
    #[must_use]
    pub fn timed_out(&self) -> bool {
        self.last_beat
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .elapsed()
            >= self.timeout
    }

    /// The configured policy for a timeout.
    #[must_use]
    pub fn policy(&self) -> HeartbeatPolicy {
        self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_policies() {
        assert_eq!(HeartbeatPolicy::parse("warn"), Some(HeartbeatPolicy::Warn));
        assert_eq!(HeartbeatPolicy::parse(" HALT "), Some(HeartbeatPolicy::Halt));
        assert_eq!(HeartbeatPolicy::parse("nope"), None);
    }

    #[test]
    fn not_timed_out_right_after_a_beat() {
        let monitor = HeartbeatMonitor::new(Duration::from_millis(20), HeartbeatPolicy::Warn);
        monitor.beat();
        assert!(!monitor.timed_out());
    }

    #[test]
    fn times_out_once_window_elapses() {
        let monitor = HeartbeatMonitor::new(Duration::from_millis(5), HeartbeatPolicy::Halt);
        std::thread::sleep(Duration::from_millis(15));
        assert!(monitor.timed_out());
        assert_eq!(monitor.policy(), HeartbeatPolicy::Halt);
    }
}
