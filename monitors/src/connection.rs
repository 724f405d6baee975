//! Connection-loss monitor (§4.8).

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default disconnect threshold before the monitor considers itself breached.
pub const DEFAULT_THRESHOLD: Duration = Duration::from_secs(30);

/// Tracks how long the provider has been continuously disconnected.
/// `breached()` flips once the gap exceeds `threshold`.
#[derive(Debug)]
pub struct ConnectionLossMonitor {
    threshold: Duration,
    disconnected_since: Mutex<Option<Instant>>,
}

impl ConnectionLossMonitor {
    /// Build a monitor with `DEFAULT_THRESHOLD`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_THRESHOLD)
    }

    /// Build a monitor with a custom threshold.
    #[must_use]
    pub fn with_threshold(threshold: Duration) -> Self {
        Self {
            threshold,
            disconnected_since: Mutex::new(None),
        }
    }

    /// Feed the current connection state, observed on the shared tick.
    pub fn observe(&self, connected: bool) {
        let mut since = self.disconnected_since.lock().unwrap_or_else(|e| e.into_inner());
        if connected {
            *since = None;
        } else if since.is_none() {
            *since = Some(Instant::now());
        }
    }

    /// True once the continuous disconnected span exceeds the threshold.
    #[must_use]
    pub fn breached(&self) -> bool {
        self.disconnected_since
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some_and(|since| since.elapsed() >= self.threshold)
    }
}

impl Default for ConnectionLossMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_breached_while_connected() {
        let monitor = ConnectionLossMonitor::with_threshold(Duration::from_millis(10));
        monitor.observe(true);
        assert!(!monitor.breached());
    }

    #[test]
    fn breaches_after_threshold_elapses() {
        let monitor = ConnectionLossMonitor::with_threshold(Duration::from_millis(5));
        monitor.observe(false);
        std::thread::sleep(Duration::from_millis(15));
        assert!(monitor.breached());
    }

    #[test]
    fn reconnecting_clears_the_breach() {
        let monitor = ConnectionLossMonitor::with_threshold(Duration::from_millis(5));
        monitor.observe(false);
        std::thread::sleep(Duration::from_millis(15));
        assert!(monitor.breached());
        monitor.observe(true);
        assert!(!monitor.breached());
    }
}
