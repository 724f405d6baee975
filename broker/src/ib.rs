//! IB-style primary broker provider (§4.4): single-flight connect, auto
//! reconnect with exponential backoff, capability-probe caching, and a
//! delayed-data fallback for quote intents a live read can't satisfy.

use crate::backoff::Backoff;
use crate::common::Book;
use async_trait::async_trait;
use model::{
    Bar, BarPeriod, BarSize, BracketResult, BrokerError, BrokerProvider, Capability,
    ConnectionStatus, ErrorCode, ExposureBucket, ExposureBy, FillRecord, OptionChainEntry,
    OptionChainQuery, OrderEventSink, OrderRequest, OrderStatus, PlacementAck, PortfolioPosition,
    Quote, QuoteIntent, QuoteMeta, QuoteSource,
};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Connection parameters for the IB gateway (§6's "gateway host/port/client_id").
#[derive(Debug, Clone)]
pub struct IbConfig {
    /// Gateway host, e.g. `"127.0.0.1"`.
    pub host: String,
    /// Gateway port, e.g. `7497` for paper trading, `7496` for live.
    pub port: u16,
    /// Client id distinguishing this session among concurrent API clients.
    pub client_id: u32,
    /// Cap on the reconnect backoff delay, in seconds.
    pub reconnect_backoff_max_seconds: u64,
    /// How long a `quote_capabilities` snapshot is reused before re-probing.
    pub capability_ttl_seconds: u64,
    /// Whether to auto-reconnect after an unexpected disconnect.
    pub auto_reconnect: bool,
}

impl Default for IbConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7497,
            client_id: 1,
            reconnect_backoff_max_seconds: 60,
            capability_ttl_seconds: 30,
            auto_reconnect: true,
        }
    }
}

struct CapabilityCache {
    snapshot: BTreeMap<String, Capability>,
    cached_at: Instant,
}

/// The primary broker provider: a real TCP handshake against an IB-style
/// gateway for connection lifecycle, backed by an in-memory book for
/// quotes/positions/orders (§4.4, §4.5).
pub struct IbProvider {
    config: IbConfig,
    book: Arc<Book>,
    status: Arc<RwLock<ConnectionStatus>>,
    connect_lock: Arc<AsyncMutex<()>>,
    stopped: Arc<AtomicBool>,
    attempt: Arc<AtomicU32>,
    reconnect_task: AsyncMutex<Option<JoinHandle<()>>>,
    capability_cache: AsyncMutex<Option<CapabilityCache>>,
    force_delayed: AtomicBool,
}

impl std::fmt::Debug for IbProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IbProvider")
            .field("config", &self.config)
            .finish()
    }
}

impl IbProvider {
    /// Construct a disconnected provider against the given gateway config.
    #[must_use]
    pub fn new(config: IbConfig) -> Self {
        Self {
            config,
            book: Arc::new(Book::default()),
            status: Arc::new(RwLock::new(ConnectionStatus::Disconnected)),
            connect_lock: Arc::new(AsyncMutex::new(())),
            stopped: Arc::new(AtomicBool::new(false)),
            attempt: Arc::new(AtomicU32::new(0)),
            reconnect_task: AsyncMutex::new(None),
            capability_cache: AsyncMutex::new(None),
            force_delayed: AtomicBool::new(false),
        }
    }

    /// Expose the book so tests (and a real market-data feed thread) can
    /// push quotes, bars, positions, and balances.
    #[must_use]
    pub fn book(&self) -> &Arc<Book> {
        &self.book
    }

    /// Force every subsequent quote to take the delayed path, modeling the
    /// "no live data during competing session" error the spec calls out.
    pub fn force_delayed_data(&self, force: bool) {
        self.force_delayed.store(force, Ordering::SeqCst);
    }

    /// Report an execution against a broker order id, as if the gateway's
    /// own session had pushed it. Until this adapter parses the gateway's
    /// real execution stream, this is the entry point that fills take.
    pub fn report_fill(
        &self,
        broker_order_id: &str,
        price: Decimal,
        commission: Decimal,
    ) -> Option<FillRecord> {
        self.book.report_fill(broker_order_id, price, commission)
    }

    async fn attempt_connect(&self) -> Result<(), BrokerError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        match tokio::time::timeout(Duration::from_secs(5), TcpStream::connect(&addr)).await {
            Ok(Ok(_stream)) => {
                *self.status.write().await = ConnectionStatus::Connected {
                    connected_at: chrono::Utc::now(),
                };
                self.attempt.store(0, Ordering::SeqCst);
                info!(addr, client_id = self.config.client_id, "ib gateway connected");
                Ok(())
            }
            Ok(Err(e)) => Err(BrokerError::new(
                ErrorCode::IbDisconnected,
                format!("connect to {addr} failed: {e}"),
            )),
            Err(_) => Err(BrokerError::new(
                ErrorCode::Timeout,
                format!("connect to {addr} timed out"),
            )),
        }
    }

    fn spawn_reconnect_loop(self_arc: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self_arc);
        tokio::spawn(async move {
            let backoff = Backoff::new(this.config.reconnect_backoff_max_seconds);
            loop {
                if this.stopped.load(Ordering::SeqCst) {
                    return;
                }
                let attempt = this.attempt.fetch_add(1, Ordering::SeqCst).saturating_add(1);
                let delay = backoff.delay(attempt);
                *this.status.write().await = ConnectionStatus::Reconnecting {
                    attempt,
                    next_retry_at: chrono::Utc::now()
                        + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero()),
                };
                tokio::time::sleep(delay).await;
                if this.stopped.load(Ordering::SeqCst) {
                    return;
                }
                if this.attempt_connect().await.is_ok() {
                    return;
                }
                warn!(attempt, "ib reconnect attempt failed");
            }
        })
    }
}

#[async_trait]
impl BrokerProvider for IbProvider {
    fn name(&self) -> &'static str {
        "ib"
    }

    fn capabilities(&self) -> Capability {
        Capability::all()
    }

    fn set_order_event_sink(&self, sink: OrderEventSink) {
        self.book.set_event_sink(sink);
    }

    async fn start(&self) -> Result<(), BrokerError> {
        let _guard = self.connect_lock.lock().await;
        if self.status.read().await.is_connected() {
            return Ok(());
        }
        self.stopped.store(false, Ordering::SeqCst);
        *self.status.write().await = ConnectionStatus::Connecting;
        match self.attempt_connect().await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, "ib initial connect failed");
                if self.config.auto_reconnect {
                    Err(e)
                } else {
                    Err(e)
                }
            }
        }
    }

    async fn stop(&self) -> Result<(), BrokerError> {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(handle) = self.reconnect_task.lock().await.take() {
            handle.abort();
        }
        *self.status.write().await = ConnectionStatus::Disconnected;
        Ok(())
    }

    async fn ensure_connected(&self) -> Result<(), BrokerError> {
        if self.status.read().await.is_connected() {
            Ok(())
        } else {
            Err(BrokerError::new(
                ErrorCode::IbDisconnected,
                "ib gateway session is not connected",
            )
            .with_suggestion("Verify gateway host/port and that the gateway process is running"))
        }
    }

    async fn status(&self) -> ConnectionStatus {
        self.status.read().await.clone()
    }

    async fn quote(&self, symbols: &[String], intent: QuoteIntent) -> Result<Vec<Quote>, BrokerError> {
        self.ensure_connected().await?;
        let mut results = Vec::with_capacity(symbols.len());
        let force_delayed = self.force_delayed.load(Ordering::SeqCst);
        for symbol in symbols {
            let mut quote = self
                .book
                .get_quotes(std::slice::from_ref(symbol))
                .into_iter()
                .next()
                .unwrap_or_else(|| Book::synthesize_quote(symbol));
            let satisfied = intent.satisfied_by(
                quote.bid.is_some(),
                quote.ask.is_some(),
                quote.last.is_some(),
            );
            if force_delayed || !satisfied {
                quote.meta = QuoteMeta {
                    source: QuoteSource::Delayed,
                    fallback_used: true,
                    available_fields: quote.meta.available_fields.clone(),
                };
            }
            results.push(quote);
        }
        Ok(results)
    }

    async fn quote_capabilities(
        &self,
        symbols: &[String],
        refresh: bool,
    ) -> Result<BTreeMap<String, Capability>, BrokerError> {
        self.ensure_connected().await?;
        let mut cache = self.capability_cache.lock().await;
        let ttl = Duration::from_secs(self.config.capability_ttl_seconds);
        if !refresh {
            if let Some(cached) = cache.as_ref() {
                if cached.cached_at.elapsed() < ttl {
                    return Ok(cached.snapshot.clone());
                }
            }
        }
        let mut snapshot = BTreeMap::new();
        for symbol in symbols {
            let quote = self
                .book
                .get_quotes(std::slice::from_ref(symbol))
                .into_iter()
                .next()
                .unwrap_or_else(|| Book::synthesize_quote(symbol));
            snapshot.insert(
                symbol.clone(),
                Capability {
                    quote_live: quote.bid.is_some() && quote.ask.is_some(),
                    quote_delayed: true,
                    quote_delayed_frozen: true,
                    ..Capability::all()
                },
            );
        }
        *cache = Some(CapabilityCache {
            snapshot: snapshot.clone(),
            cached_at: Instant::now(),
        });
        Ok(snapshot)
    }

    async fn history(
        &self,
        symbol: &str,
        _period: BarPeriod,
        _bar: BarSize,
        _rth_only: bool,
    ) -> Result<Vec<Bar>, BrokerError> {
        self.ensure_connected().await?;
        Ok(self
            .book
            .bars
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(symbol)
            .cloned()
            .unwrap_or_default())
    }

    async fn option_chain(
        &self,
        query: &OptionChainQuery,
    ) -> Result<(Decimal, Vec<OptionChainEntry>), BrokerError> {
        self.ensure_connected().await?;
        let underlying = self
            .book
            .get_quotes(std::slice::from_ref(&query.symbol))
            .into_iter()
            .next()
            .and_then(|q| q.last)
            .unwrap_or(Decimal::ZERO);
        Ok((underlying, Vec::new()))
    }

    async fn positions(&self, symbol: Option<&str>) -> Result<Vec<PortfolioPosition>, BrokerError> {
        self.ensure_connected().await?;
        Ok(self.book.positions(symbol))
    }

    async fn balance(&self) -> Result<Decimal, BrokerError> {
        self.ensure_connected().await?;
        Ok(*self.book.balance.lock().unwrap_or_else(|e| e.into_inner()))
    }

    async fn pnl(&self) -> Result<Decimal, BrokerError> {
        self.ensure_connected().await?;
        Ok(*self.book.pnl.lock().unwrap_or_else(|e| e.into_inner()))
    }

    async fn exposure(&self, by: ExposureBy) -> Result<Vec<ExposureBucket>, BrokerError> {
        self.ensure_connected().await?;
        let positions = self.book.positions(None);
        let nlv = self.balance().await?;
        let mut buckets: BTreeMap<String, Decimal> = BTreeMap::new();
        for p in &positions {
            let key = match by {
                ExposureBy::Symbol => p.symbol.clone(),
                ExposureBy::Currency => p.currency.clone(),
                ExposureBy::Sector => p.sector.clone().unwrap_or_else(|| "UNKNOWN".to_string()),
                ExposureBy::AssetClass => {
                    p.asset_class.clone().unwrap_or_else(|| "UNKNOWN".to_string())
                }
            };
            let entry = buckets.entry(key).or_insert(Decimal::ZERO);
            *entry = entry.checked_add(p.market_value).unwrap_or(*entry);
        }
        Ok(buckets
            .into_iter()
            .map(|(key, notional)| {
                let pct = if nlv.is_zero() {
                    Decimal::ZERO
                } else {
                    notional
                        .checked_div(nlv)
                        .and_then(|r| r.checked_mul(Decimal::from(100)))
                        .unwrap_or(Decimal::ZERO)
                };
                ExposureBucket { key, notional, pct }
            })
            .collect())
    }

    async fn place_order(
        &self,
        req: &OrderRequest,
        client_order_id: &str,
    ) -> Result<PlacementAck, BrokerError> {
        self.ensure_connected().await?;
        Ok(self.book.place_order(req, client_order_id))
    }

    async fn place_bracket(
        &self,
        entry: &OrderRequest,
        _take_profit: Decimal,
        _stop_loss: Decimal,
    ) -> Result<BracketResult, BrokerError> {
        self.ensure_connected().await?;
        let entry_ack = self.book.place_order(entry, &uuid_like(entry));
        let tp_ack = self.book.place_order(entry, &format!("{}-tp", entry_ack.broker_order_id));
        let sl_ack = self.book.place_order(entry, &format!("{}-sl", entry_ack.broker_order_id));
        Ok(BracketResult {
            broker_order_ids: vec![
                entry_ack.broker_order_id,
                tp_ack.broker_order_id,
                sl_ack.broker_order_id,
            ],
            status: OrderStatus::Submitted,
        })
    }

    async fn cancel_order(&self, broker_order_id: &str) -> Result<(), BrokerError> {
        self.ensure_connected().await?;
        if self.book.cancel_order(broker_order_id) {
            Ok(())
        } else {
            Err(BrokerError::new(
                ErrorCode::IbRejected,
                format!("no such broker order id: {broker_order_id}"),
            ))
        }
    }

    async fn cancel_all(&self) -> Result<u32, BrokerError> {
        self.ensure_connected().await?;
        Ok(self.book.cancel_all())
    }

    async fn trades(&self) -> Result<Vec<(String, OrderStatus)>, BrokerError> {
        self.ensure_connected().await?;
        Ok(self.book.trades())
    }

    async fn fills(&self) -> Result<Vec<FillRecord>, BrokerError> {
        self.ensure_connected().await?;
        Ok(self.book.fills())
    }
}

/// A reconnect supervisor that owns an `Arc<IbProvider>`; `start` on the
/// provider itself does not auto-schedule a retry loop because
/// `BrokerProvider::start` takes `&self`, not `Arc<Self>` — callers that
/// want the reconnect loop should hold the provider behind an `Arc` and
/// call this once at daemon construction.
pub fn supervise_reconnects(provider: Arc<IbProvider>) {
    tokio::spawn(async move {
        loop {
            if provider.stopped.load(Ordering::SeqCst) {
                return;
            }
            let disconnected = !provider.status.read().await.is_connected();
            if disconnected && provider.config.auto_reconnect {
                let mut task = provider.reconnect_task.lock().await;
                if task.is_none() {
                    *task = Some(IbProvider::spawn_reconnect_loop(&provider));
                }
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    });
}

fn uuid_like(req: &OrderRequest) -> String {
    format!(
        "{}-{}-{}",
        req.symbol,
        req.side,
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{OrderSide, TimeInForce};
    use std::collections::BTreeMap as Map;
    use tokio::net::TcpListener;

    async fn fake_gateway() -> (IbConfig, TcpListener) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let config = IbConfig {
            host: addr.ip().to_string(),
            port: addr.port(),
            ..IbConfig::default()
        };
        (config, listener)
    }

    #[tokio::test]
    async fn connects_to_a_reachable_gateway() {
        let (config, listener) = fake_gateway().await;
        tokio::spawn(async move {
            loop {
                let _ = listener.accept().await;
            }
        });
        let provider = IbProvider::new(config);
        provider.start().await.unwrap();
        assert!(provider.status().await.is_connected());
    }

    #[tokio::test]
    async fn ensure_connected_fails_before_start() {
        let provider = IbProvider::new(IbConfig::default());
        let err = provider.ensure_connected().await.unwrap_err();
        assert_eq!(err.code, ErrorCode::IbDisconnected);
    }

    #[tokio::test]
    async fn quote_falls_back_to_delayed_when_forced() {
        let (config, listener) = fake_gateway().await;
        tokio::spawn(async move {
            loop {
                let _ = listener.accept().await;
            }
        });
        let provider = IbProvider::new(config);
        provider.start().await.unwrap();
        provider.force_delayed_data(true);
        let quotes = provider
            .quote(&["AAPL".to_string()], QuoteIntent::TopOfBook)
            .await
            .unwrap();
        assert_eq!(quotes.len(), 1);
        assert!(quotes[0].meta.fallback_used);
        assert_eq!(quotes[0].meta.source, QuoteSource::Delayed);
    }

    #[tokio::test]
    async fn place_and_cancel_order_round_trip() {
        let (config, listener) = fake_gateway().await;
        tokio::spawn(async move {
            loop {
                let _ = listener.accept().await;
            }
        });
        let provider = IbProvider::new(config);
        provider.start().await.unwrap();
        let req = OrderRequest {
            side: OrderSide::Buy,
            symbol: "AAPL".to_string(),
            qty: rust_decimal_macros::dec!(10),
            limit: Some(rust_decimal_macros::dec!(180)),
            stop: None,
            tif: TimeInForce::Day,
            client_order_id: None,
            tags: Map::new(),
        };
        let ack = provider.place_order(&req, "COID-1").await.unwrap();
        assert_eq!(ack.raw_status, "Submitted");
        provider.cancel_order(&ack.broker_order_id).await.unwrap();
        let trades = provider.trades().await.unwrap();
        assert_eq!(trades[0].1, OrderStatus::Cancelled);
    }
}
