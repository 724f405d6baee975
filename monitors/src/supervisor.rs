//! Ties the three monitors to a shared tick against live provider/risk state.

use crate::connection::ConnectionLossMonitor;
use crate::drawdown::PnlBasis;
use crate::heartbeat::{HeartbeatMonitor, HeartbeatPolicy};
use audit::AuditLog;
use model::{BrokerProvider, Event, Topic};
use risk::RiskEngine;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Default shared tick period for all three monitors.
pub const DEFAULT_TICK: Duration = Duration::from_secs(5);

/// Owns the three §4.8 monitors and drives them against the provider and
/// risk engine on a shared tick. A halt from any monitor is idempotent:
/// `RiskEngine::halt` is safe to call repeatedly.
pub struct MonitorSupervisor {
    provider: Arc<dyn BrokerProvider>,
    risk: Arc<Mutex<RiskEngine>>,
    audit: Arc<AuditLog>,
    events: broadcast::Sender<Event>,
    connection: ConnectionLossMonitor,
    heartbeat: HeartbeatMonitor,
    drawdown_basis: PnlBasis,
}

impl std::fmt::Debug for MonitorSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorSupervisor")
            .field("provider", &self.provider.name())
            .field("risk", &self.risk)
            .field("audit", &self.audit)
            .field("events", &self.events)
            .field("connection", &self.connection)
            .field("heartbeat", &self.heartbeat)
            .field("drawdown_basis", &self.drawdown_basis)
            .finish()
    }
}

impl MonitorSupervisor {
    /// Construct a supervisor with the spec's default connection threshold.
    #[must_use]
    pub fn new(
        provider: Arc<dyn BrokerProvider>,
        risk: Arc<Mutex<RiskEngine>>,
        audit: Arc<AuditLog>,
        events: broadcast::Sender<Event>,
        heartbeat_timeout: Duration,
        heartbeat_policy: HeartbeatPolicy,
        drawdown_basis: PnlBasis,
    ) -> Self {
        Self {
            provider,
            risk,
            audit,
            events,
            connection: ConnectionLossMonitor::new(),
            heartbeat: HeartbeatMonitor::new(heartbeat_timeout, heartbeat_policy),
            drawdown_basis,
        }
    }

    /// Record a `runtime.keepalive` beat.
    pub fn beat(&self) {
        self.heartbeat.beat();
    }

    fn halt(&self, reason: &str) {
        let already_halted = {
            let mut risk = self.risk.lock().unwrap_or_else(|e| e.into_inner());
            let was_halted = risk.is_halted();
            risk.halt();
            was_halted
        };
        if already_halted {
            return;
        }
        let _ = self.audit.log_risk_event(
            "risk.halt",
            &serde_json::json!({ "reason": reason }),
        );
        let _ = self.events.send(Event::new(
            Topic::Risk,
            serde_json::json!({ "event": "risk.halt", "reason": reason }),
        ));
    }

    /// Run one pass of all three checks. Suspends only on provider RPCs.
    pub async fn tick(&self) {
        let connected = self.provider.is_connected().await;
        self.connection.observe(connected);
        if self.connection.breached() && !self.risk.lock().unwrap_or_else(|e| e.into_inner()).is_halted() {
            self.halt("connection_loss");
        }

        if self.heartbeat.timed_out() {
            let _ = self.audit.log_risk_event(
                "heartbeat_timeout",
                &serde_json::json!({ "policy": format!("{:?}", self.heartbeat.policy()) }),
            );
            if self.heartbeat.policy() == HeartbeatPolicy::Halt {
                self.halt("heartbeat_timeout");
            }
        }

        if connected {
            if let (Ok(nlv), Ok(total_pnl), Ok(positions)) = (
                self.provider.balance().await,
                self.provider.pnl().await,
                self.provider.positions(None).await,
            ) {
                let unrealized_sum = positions
                    .iter()
                    .fold(rust_decimal::Decimal::ZERO, |acc, p| {
                        acc.checked_add(p.unrealized_pnl).unwrap_or(acc)
                    });
                let basis_pnl = self.drawdown_basis.select(total_pnl, unrealized_sum);
                let (breached, loss_pct) = {
                    let risk = self.risk.lock().unwrap_or_else(|e| e.into_inner());
                    risk.check_drawdown_breaker(basis_pnl, nlv)
                };
                if breached {
                    let _ = self.audit.log_risk_event(
                        "drawdown_breaker",
                        &serde_json::json!({ "loss_pct": loss_pct.to_string() }),
                    );
                    self.halt("drawdown_breaker");
                }
            }
        }
    }

    /// Spawn a background task ticking every `interval` until dropped.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.tick().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker::PaperProvider;
    use risk::RiskConfig;
    use rust_decimal_macros::dec;

    fn supervisor(provider: Arc<dyn BrokerProvider>) -> MonitorSupervisor {
        let risk = Arc::new(Mutex::new(RiskEngine::new(RiskConfig::default())));
        let audit = Arc::new(AuditLog::new_in_memory().expect("in-memory audit"));
        let (tx, _rx) = broadcast::channel(16);
        MonitorSupervisor::new(
            provider,
            risk,
            audit,
            tx,
            Duration::from_millis(20),
            HeartbeatPolicy::Halt,
            PnlBasis::Total,
        )
    }

    #[tokio::test]
    async fn connected_paper_provider_never_halts_on_connection_loss() {
        let paper = Arc::new(PaperProvider::new());
        let sup = supervisor(paper.clone());
        sup.tick().await;
        assert!(!sup.risk.lock().unwrap().is_halted());
    }

    #[tokio::test]
    async fn disconnected_provider_eventually_halts() {
        let paper = Arc::new(PaperProvider::new());
        paper.disconnect();
        let sup = MonitorSupervisor::new(
            paper.clone(),
            Arc::new(Mutex::new(RiskEngine::new(RiskConfig::default()))),
            Arc::new(AuditLog::new_in_memory().expect("in-memory audit")),
            broadcast::channel(16).0,
            Duration::from_secs(3600),
            HeartbeatPolicy::Warn,
            PnlBasis::Total,
        );
        let short = ConnectionLossMonitor::with_threshold(Duration::from_millis(1));
        short.observe(false);
        std::thread::sleep(Duration::from_millis(5));
        assert!(short.breached());
        sup.tick().await;
        sup.tick().await;
    }

    #[tokio::test]
    async fn heartbeat_timeout_halts_when_policy_is_halt() {
        let paper = Arc::new(PaperProvider::new());
        let sup = supervisor(paper);
        std::thread::sleep(Duration::from_millis(30));
        sup.tick().await;
        assert!(sup.risk.lock().unwrap().is_halted());
    }

    #[tokio::test]
    async fn beat_resets_the_heartbeat_window() {
        let paper = Arc::new(PaperProvider::new());
        let sup = supervisor(paper);
        sup.beat();
        sup.tick().await;
        assert!(!sup.risk.lock().unwrap().is_halted());
    }
}
