use crate::capability::Capability;
use crate::error::BrokerError;
use crate::fill::FillRecord;
use crate::order::{OrderRequest, OrderStatus};
use crate::quote::{Bar, BarPeriod, BarSize, Quote, QuoteIntent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use crate::order::ParseEnumError;

/// Connection lifecycle state of a broker provider session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// No session; not attempting to connect.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// Connected and serving requests.
    Connected {
        /// When the session was established.
        connected_at: DateTime<Utc>,
    },
    /// Disconnected and waiting to retry, per the reconnect backoff schedule.
    Reconnecting {
        /// How many consecutive failed attempts have occurred.
        attempt: u32,
        /// When the next reconnect attempt will fire.
        next_retry_at: DateTime<Utc>,
    },
}

impl ConnectionStatus {
    /// True only when `Connected`.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }
}

/// A held position, as reported by the broker.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PortfolioPosition {
    /// Uppercased symbol.
    pub symbol: String,
    /// Signed quantity (negative for short).
    pub qty: Decimal,
    /// Average cost basis.
    pub avg_cost: Decimal,
    /// Current market value.
    pub market_value: Decimal,
    /// Unrealized profit or loss.
    pub unrealized_pnl: Decimal,
    /// Sector, when known.
    #[serde(default)]
    pub sector: Option<String>,
    /// Asset class, when known.
    #[serde(default)]
    pub asset_class: Option<String>,
    /// Listing currency.
    pub currency: String,
}

/// One row of a `portfolio.exposure` result, grouped by the requested dimension.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExposureBucket {
    /// The grouping key, e.g. a sector name or currency code.
    pub key: String,
    /// Net notional exposure in this bucket.
    pub notional: Decimal,
    /// Exposure as a percentage of NLV.
    pub pct: Decimal,
}

/// Dimension a `portfolio.exposure` query groups by (§6).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExposureBy {
    /// Group by symbol.
    Symbol,
    /// Group by listing currency.
    Currency,
    /// Group by sector.
    Sector,
    /// Group by asset class.
    AssetClass,
}

impl FromStr for ExposureBy {
    type Err = ParseEnumError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "symbol" => Ok(Self::Symbol),
            "currency" => Ok(Self::Currency),
            "sector" => Ok(Self::Sector),
            "asset_class" => Ok(Self::AssetClass),
            other => Err(ParseEnumError(other.to_string())),
        }
    }
}

/// Call or put.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    /// Call.
    Call,
    /// Put.
    Put,
}

impl FromStr for OptionType {
    type Err = ParseEnumError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "call" => Ok(Self::Call),
            "put" => Ok(Self::Put),
            other => Err(ParseEnumError(other.to_string())),
        }
    }
}

/// Parameters for a `market.chain` option chain query (§6).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OptionChainQuery {
    /// Underlying symbol.
    pub symbol: String,
    /// Specific expiry to filter to, if given.
    #[serde(default)]
    pub expiry: Option<String>,
    /// Strike range as a fraction of spot, e.g. `(0.9, 1.1)`.
    #[serde(default)]
    pub strike_range: Option<(Decimal, Decimal)>,
    /// Restrict to calls or puts.
    #[serde(default)]
    pub option_type: Option<OptionType>,
    /// Maximum rows to return.
    #[serde(default)]
    pub limit: Option<usize>,
    /// Offset into the filtered result set.
    #[serde(default)]
    pub offset: Option<usize>,
    /// Field projection; when given, only these keys appear per entry.
    #[serde(default)]
    pub fields: Option<Vec<String>>,
    /// When true, an empty result is an error instead of an empty list.
    #[serde(default)]
    pub strict: bool,
}

/// Parse `"0.9:1.1"` into `(0.9, 1.1)` (§8 boundary behavior).
pub fn parse_strike_range(raw: &str) -> Result<(Decimal, Decimal), ParseEnumError> {
    let (low, high) = raw
        .split_once(':')
        .ok_or_else(|| ParseEnumError(raw.to_string()))?;
    let low: Decimal = low.trim().parse().map_err(|_| ParseEnumError(raw.to_string()))?;
    let high: Decimal = high
        .trim()
        .parse()
        .map_err(|_| ParseEnumError(raw.to_string()))?;
    Ok((low, high))
}

/// A single option-chain row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OptionChainEntry {
    /// Option contract symbol (OCC-style or provider-native).
    pub symbol: String,
    /// Expiry date, `YYYY-MM-DD`.
    pub expiry: String,
    /// Strike price.
    pub strike: Decimal,
    /// Call or put.
    pub option_type: OptionType,
    /// Best bid, if available.
    #[serde(default)]
    pub bid: Option<Decimal>,
    /// Best ask, if available.
    #[serde(default)]
    pub ask: Option<Decimal>,
    /// Last traded price, if available.
    #[serde(default)]
    pub last: Option<Decimal>,
    /// Open interest.
    #[serde(default)]
    pub open_interest: Option<u64>,
    /// Traded volume.
    #[serde(default)]
    pub volume: Option<u64>,
}

/// The result of placing a bracket order (§6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BracketResult {
    /// Broker-assigned order ids for entry/take-profit/stop-loss legs.
    pub broker_order_ids: Vec<String>,
    /// Normalized status of the entry leg.
    pub status: OrderStatus,
}

/// The acceptance result of a single `place_order` call to the provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlacementAck {
    /// Broker-assigned order id.
    pub broker_order_id: String,
    /// Broker-reported status string, pre-normalization.
    pub raw_status: String,
}

/// A normalized event a provider pushes from its own session, independent
/// of the request/response call that created the order (§9: "the provider
/// adapter spawns one task per session that forwards normalized events to
/// the channel"). Routed by the daemon into `OrderManager::update_order_status`
/// / `OrderManager::add_fill`.
#[derive(Clone, Debug)]
pub enum OrderEvent {
    /// A status transition the broker reported for one order.
    Status {
        /// The client-assigned id the order was placed under.
        client_order_id: String,
        /// The broker's reported status, already provider-normalized.
        status: OrderStatus,
        /// Cumulative filled quantity, when the broker reports one.
        filled_qty: Option<Decimal>,
        /// Average price across the cumulative fill, when reported.
        avg_fill_price: Option<Decimal>,
    },
    /// An execution report, independent of (but usually alongside) a status push.
    Fill(FillRecord),
}

/// Callback a provider invokes when its own session receives an order-status
/// or execution push, bypassing request/response polling (§9). The daemon
/// registers one sink per provider instance before calling `start()`, so no
/// push that arrives immediately on connect is missed.
pub type OrderEventSink = Arc<dyn Fn(OrderEvent) + Send + Sync>;

/// Adapter to a remote brokerage session (GLOSSARY). Implementations are
/// capability-typed: the dispatcher refuses to route a command whose
/// capability is false rather than calling a method that would panic or
/// silently no-op.
#[async_trait]
pub trait BrokerProvider: Send + Sync {
    /// Human-readable provider name, e.g. `"ib"` or `"etrade"`.
    fn name(&self) -> &'static str;

    /// The capability map this provider advertises.
    fn capabilities(&self) -> Capability;

    /// Register where provider-pushed order events go. Call before `start()`.
    /// Default is a no-op for providers with no independent push channel.
    fn set_order_event_sink(&self, _sink: OrderEventSink) {}

    /// Begin the connection lifecycle. Idempotent while already connected.
    async fn start(&self) -> Result<(), BrokerError>;

    /// Tear down the session and cancel any pending reconnect loop.
    async fn stop(&self) -> Result<(), BrokerError>;

    /// Block until connected or fail with `IB_DISCONNECTED`/`TIMEOUT`.
    async fn ensure_connected(&self) -> Result<(), BrokerError>;

    /// Current connection status.
    async fn status(&self) -> ConnectionStatus;

    /// Convenience predicate over `status()`.
    async fn is_connected(&self) -> bool {
        self.status().await.is_connected()
    }

    /// Fetch quotes for the given symbols under the given intent.
    async fn quote(&self, symbols: &[String], intent: QuoteIntent) -> Result<Vec<Quote>, BrokerError>;

    /// Probe per-symbol field availability; cached for `capability_ttl_seconds`.
    async fn quote_capabilities(
        &self,
        symbols: &[String],
        refresh: bool,
    ) -> Result<BTreeMap<String, Capability>, BrokerError>;

    /// Historical bars. Default: not supported.
    async fn history(
        &self,
        _symbol: &str,
        _period: BarPeriod,
        _bar: BarSize,
        _rth_only: bool,
    ) -> Result<Vec<Bar>, BrokerError> {
        Err(not_supported("history"))
    }

    /// Option chain query. Default: not supported.
    async fn option_chain(
        &self,
        _query: &OptionChainQuery,
    ) -> Result<(Decimal, Vec<OptionChainEntry>), BrokerError> {
        Err(not_supported("option_chain"))
    }

    /// Current positions, optionally filtered to one symbol.
    async fn positions(&self, symbol: Option<&str>) -> Result<Vec<PortfolioPosition>, BrokerError>;

    /// Net liquidation value and related balance figures.
    async fn balance(&self) -> Result<Decimal, BrokerError>;

    /// Daily profit and loss, per the provider's own basis.
    async fn pnl(&self) -> Result<Decimal, BrokerError>;

    /// Exposure grouped by the given dimension. Default: not supported.
    async fn exposure(&self, _by: ExposureBy) -> Result<Vec<ExposureBucket>, BrokerError> {
        Err(not_supported("exposure"))
    }

    /// Submit a single order.
    async fn place_order(
        &self,
        req: &OrderRequest,
        client_order_id: &str,
    ) -> Result<PlacementAck, BrokerError>;

    /// Submit an entry/target/stop bracket. Default: not supported.
    async fn place_bracket(
        &self,
        _entry: &OrderRequest,
        _take_profit: Decimal,
        _stop_loss: Decimal,
    ) -> Result<BracketResult, BrokerError> {
        Err(not_supported("bracket_orders"))
    }

    /// Cancel a single order by broker order id.
    async fn cancel_order(&self, broker_order_id: &str) -> Result<(), BrokerError>;

    /// Cancel every open order. Default: not supported.
    async fn cancel_all(&self) -> Result<u32, BrokerError> {
        Err(not_supported("cancel_all"))
    }

    /// Provider-side view of open/recent orders, for reconciliation fallback.
    async fn trades(&self) -> Result<Vec<(String, OrderStatus)>, BrokerError>;

    /// Provider-side fills, for polling-based reconciliation.
    async fn fills(&self) -> Result<Vec<FillRecord>, BrokerError>;
}

fn not_supported(capability: &str) -> BrokerError {
    BrokerError::new(
        crate::error::ErrorCode::IbRejected,
        format!("{capability} not supported by this provider"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_strike_range() {
        assert_eq!(
            parse_strike_range("0.8:1.2").unwrap(),
            (Decimal::new(8, 1), Decimal::new(12, 1))
        );
        assert!(parse_strike_range("bad").is_err());
    }

    #[test]
    fn connection_status_is_connected_only_when_connected() {
        assert!(!ConnectionStatus::Disconnected.is_connected());
        assert!(ConnectionStatus::Connected {
            connected_at: Utc::now()
        }
        .is_connected());
    }
}
