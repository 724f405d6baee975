//! `Daemon`: the aggregate root wiring every subsystem in the fixed
//! construction order audit -> risk -> provider -> market data -> orders ->
//! monitors -> server (§9), plus the startup/shutdown sequence (§5).

use crate::broadcaster::Broadcaster;
use crate::config::{Config, ProviderKind};
use crate::dispatcher::Dispatcher;
use crate::pidfile::PidFile;
use crate::server::Server;
use crate::socket;
use audit::AuditLog;
use broker::{supervise_reconnects, EtradeConfig, EtradeProvider, IbConfig, IbProvider};
use market_data::MarketDataService;
use model::BrokerProvider;
use monitors::MonitorSupervisor;
use orders::OrderManager;
use risk::RiskEngine;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, watch};

/// Errors raised while starting the daemon.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    /// Config file present but invalid.
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
    /// The audit database couldn't be opened or migrated.
    #[error(transparent)]
    Audit(#[from] audit::AuditError),
    /// The PID file couldn't be acquired.
    #[error(transparent)]
    PidFile(#[from] crate::pidfile::PidFileError),
    /// The Unix socket couldn't be bound.
    #[error(transparent)]
    Socket(#[from] socket::SocketError),
    /// The broker provider failed to start its connection lifecycle.
    #[error(transparent)]
    Provider(#[from] model::BrokerError),
}

/// The running daemon: holds the subsystems and the handles needed to shut
/// each of them down cleanly, in reverse construction order.
pub struct Daemon {
    config: Config,
    pid_file: PidFile,
    provider: Arc<dyn BrokerProvider>,
    audit: Arc<AuditLog>,
    monitors: Arc<MonitorSupervisor>,
    monitor_task: tokio::task::JoinHandle<()>,
    server: Arc<Server>,
    shutdown_tx: watch::Sender<bool>,
    socket_path: std::path::PathBuf,
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Daemon").field("provider", &self.provider.name()).finish()
    }
}

fn build_provider(config: &Config) -> Arc<dyn BrokerProvider> {
    match config.provider {
        ProviderKind::Ib => {
            let ib = Arc::new(IbProvider::new(IbConfig {
                host: config.gateway.host.clone(),
                port: config.gateway.port,
                client_id: config.gateway.client_id,
                reconnect_backoff_max_seconds: config.gateway.reconnect_backoff_max,
                capability_ttl_seconds: config.market_data.capability_ttl_seconds,
                auto_reconnect: config.gateway.auto_reconnect,
            }));
            if config.gateway.auto_reconnect {
                supervise_reconnects(Arc::clone(&ib));
            }
            ib
        }
        ProviderKind::Etrade => Arc::new(EtradeProvider::new(EtradeConfig::default())),
    }
}

impl Daemon {
    /// Build and start every subsystem against `config` (§9's construction
    /// order), then bind the Unix socket last so clients never see a
    /// half-wired daemon.
    pub async fn start(config: Config) -> Result<Self, StartError> {
        let pid_file = PidFile::acquire(&config.runtime.pid_file)?;

        let audit = Arc::new(AuditLog::open(
            config.logging.audit_db.to_string_lossy().as_ref(),
        )?);

        let risk = Arc::new(Mutex::new(RiskEngine::new(config.risk.clone().into())));

        let provider = build_provider(&config);
        let (events_tx, _events_rx) = broadcast::channel(1024);

        let orders = Arc::new(OrderManager::new(
            Arc::clone(&provider),
            Arc::clone(&risk),
            Arc::clone(&audit),
            events_tx.clone(),
        ));
        provider.set_order_event_sink(orders.event_sink());

        if let Err(err) = provider.start().await {
            let _ = audit.log_connection_event(
                "start_failed",
                &serde_json::json!({ "error": err.message }),
            );
            return Err(StartError::Provider(err));
        }

        let market_data = Arc::new(MarketDataService::new(Arc::clone(&provider)));

        let monitors = Arc::new(MonitorSupervisor::new(
            Arc::clone(&provider),
            Arc::clone(&risk),
            Arc::clone(&audit),
            events_tx.clone(),
            std::time::Duration::from_secs(config.agent.heartbeat_timeout_seconds),
            config.agent.on_heartbeat_timeout.into(),
            config.risk.drawdown_pnl_basis.into(),
        ));
        let monitor_task = Arc::clone(&monitors).spawn(monitors::DEFAULT_TICK);

        let broadcaster = Arc::new(Broadcaster::new());
        let broadcast_task_events = events_tx.subscribe();
        spawn_broadcast_forwarder(broadcast_task_events, Arc::clone(&broadcaster));

        let (shutdown_tx, _shutdown_rx) = watch::channel(false);

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&provider),
            market_data,
            orders,
            Arc::clone(&risk),
            Arc::clone(&audit),
            Arc::clone(&monitors),
            config.runtime.socket_path.clone(),
            shutdown_tx.clone(),
        ));

        let listener = socket::bind(&config.runtime.socket_path).await?;
        let server = Arc::new(Server::new(listener, dispatcher, broadcaster, Arc::clone(&audit)));

        let socket_path = config.runtime.socket_path.clone();

        Ok(Self {
            config,
            pid_file,
            provider,
            audit,
            monitors,
            monitor_task,
            server,
            shutdown_tx,
            socket_path,
        })
    }

    /// The resolved configuration this daemon was started with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Drive the accept loop until [`Daemon::stop`] is called from another
    /// task (typically a signal handler).
    pub async fn run(&self) {
        self.server.serve(self.shutdown_tx.subscribe()).await;
    }

    /// Orderly shutdown (§5): stop accepting connections, stop the monitor
    /// tick, stop the provider, then remove the pid and socket files. Audit
    /// writes are synchronous, so there is nothing to flush explicitly.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        self.monitor_task.abort();
        if let Err(err) = self.provider.stop().await {
            tracing::warn!(%err, "provider did not stop cleanly");
        }
        let _ = self.audit.log_connection_event("daemon_stop", &serde_json::json!({}));
        if let Err(err) = socket::remove(&self.socket_path) {
            tracing::warn!(%err, "failed to remove socket file on shutdown");
        }
        if let Err(err) = self.pid_file.remove() {
            tracing::warn!(%err, "failed to remove pid file on shutdown");
        }
    }
}

fn spawn_broadcast_forwarder(
    mut rx: broadcast::Receiver<model::Event>,
    broadcaster: Arc<Broadcaster>,
) {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => broadcaster.dispatch(&event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.runtime.socket_path = dir.join("broker.sock");
        config.runtime.pid_file = dir.join("broker.pid");
        config.logging.audit_db = dir.join("audit.db");
        config.provider = ProviderKind::Etrade;
        config
    }

    #[tokio::test]
    async fn start_binds_socket_and_stop_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let socket_path = config.runtime.socket_path.clone();
        let pid_path = config.runtime.pid_file.clone();

        let daemon = Daemon::start(config).await.expect("daemon starts");
        assert!(socket_path.exists());
        assert!(pid_path.exists());

        daemon.stop().await;
        assert!(!socket_path.exists());
        assert!(!pid_path.exists());
    }

    #[tokio::test]
    async fn refuses_to_start_twice_against_the_same_pid_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let daemon = Daemon::start(config.clone()).await.expect("first start succeeds");

        let err = Daemon::start(config).await.unwrap_err();
        assert!(matches!(err, StartError::PidFile(_)));

        daemon.stop().await;
    }

    #[tokio::test]
    async fn wire_daemon_stop_ends_the_run_loop() {
        use protocol::{decode, encode, read_framed, write_framed, Request, Response};
        use tokio::net::UnixStream;

        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let socket_path = config.runtime.socket_path.clone();
        let daemon = Daemon::start(config).await.expect("daemon starts");

        let run_handle = tokio::spawn(async move {
            daemon.run().await;
            daemon
        });

        let mut stream = UnixStream::connect(&socket_path).await.expect("socket is dialable");
        let request = Request::new("daemon.stop", serde_json::Map::new());
        let payload = encode(&request).expect("request encodes");
        write_framed(&mut stream, &payload).await.expect("request sends");
        let response_bytes = read_framed(&mut stream).await.expect("response arrives");
        let response: Response = decode(&response_bytes).expect("response decodes");
        assert!(response.ok);

        let daemon = tokio::time::timeout(std::time::Duration::from_secs(5), run_handle)
            .await
            .expect("run loop exits after daemon.stop")
            .expect("run task does not panic");
        daemon.stop().await;
        assert!(!socket_path.exists());
    }
}
