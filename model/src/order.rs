use crate::risk::RiskCheckResult;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Error returned when parsing an invalid enum string.
#[derive(Debug)]
pub struct ParseEnumError(pub String);

impl std::fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unrecognized value: {}", self.0)
    }
}

impl std::error::Error for ParseEnumError {}

/// Side of an order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    /// Buy.
    Buy,
    /// Sell.
    Sell,
}

impl OrderSide {
    /// `1` for buy, `-1` for sell — used to sign notional deltas.
    #[must_use]
    pub fn sign(self) -> i64 {
        match self {
            Self::Buy => 1,
            Self::Sell => -1,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        };
        write!(f, "{s}")
    }
}

impl FromStr for OrderSide {
    type Err = ParseEnumError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buy" => Ok(Self::Buy),
            "sell" => Ok(Self::Sell),
            other => Err(ParseEnumError(other.to_string())),
        }
    }
}

/// Time in force.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Good for the current trading day.
    Day,
    /// Good till canceled.
    Gtc,
    /// Immediate or cancel.
    Ioc,
}

impl std::fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Day => "DAY",
            Self::Gtc => "GTC",
            Self::Ioc => "IOC",
        };
        write!(f, "{s}")
    }
}

impl FromStr for TimeInForce {
    type Err = ParseEnumError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DAY" => Ok(Self::Day),
            "GTC" => Ok(Self::Gtc),
            "IOC" => Ok(Self::Ioc),
            other => Err(ParseEnumError(other.to_string())),
        }
    }
}

/// Order type, inferred from the presence of `limit`/`stop` on a request (§3).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum OrderType {
    /// Neither limit nor stop given.
    Market,
    /// Limit only.
    Limit,
    /// Stop only.
    Stop,
    /// Both limit and stop given.
    StopLimit,
}

impl OrderType {
    /// Infer the order type from the (limit, stop) pair per §3.
    #[must_use]
    pub fn infer(limit: Option<Decimal>, stop: Option<Decimal>) -> Self {
        match (limit, stop) {
            (None, None) => Self::Market,
            (Some(_), None) => Self::Limit,
            (None, Some(_)) => Self::Stop,
            (Some(_), Some(_)) => Self::StopLimit,
        }
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Market => "market",
            Self::Limit => "limit",
            Self::Stop => "stop",
            Self::StopLimit => "stop_limit",
        };
        write!(f, "{s}")
    }
}

/// Closed set of order statuses (§3). `ACTIVE` = Submitted, Acknowledged,
/// PendingSubmit, PreSubmitted.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Submitted to the broker, awaiting acknowledgement.
    Submitted,
    /// Acknowledged by the broker.
    Acknowledged,
    /// Accepted by the daemon, not yet submitted to the broker.
    PendingSubmit,
    /// Pre-submitted (held pending market open, margin check, etc).
    PreSubmitted,
    /// Completely filled.
    Filled,
    /// Cancelled by caller or broker.
    Cancelled,
    /// Rejected by the broker or internal rules.
    Rejected,
    /// Broker reports the order as no longer working, not filled.
    Inactive,
}

impl OrderStatus {
    /// All variants, in the order §3 lists them.
    #[must_use]
    pub fn all() -> Vec<Self> {
        vec![
            Self::Submitted,
            Self::Acknowledged,
            Self::PendingSubmit,
            Self::PreSubmitted,
            Self::Filled,
            Self::Cancelled,
            Self::Rejected,
            Self::Inactive,
        ]
    }

    /// True for the four statuses that make up `ACTIVE` (§3).
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Submitted | Self::Acknowledged | Self::PendingSubmit | Self::PreSubmitted
        )
    }

    /// True once the order is in a terminal state that must never revert (§8).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled)
    }

    /// Normalize a broker-reported status string per §4.6's table.
    /// Case-insensitive, trimmed; unknown labels default to `Submitted`.
    #[must_use]
    pub fn normalize_default(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "submitted" => Self::Submitted,
            "acknowledged" => Self::Acknowledged,
            "pendingsubmit" => Self::PendingSubmit,
            "presubmitted" => Self::PreSubmitted,
            "filled" => Self::Filled,
            "cancelled" | "api cancelled" => Self::Cancelled,
            "rejected" => Self::Rejected,
            "inactive" => Self::Inactive,
            _ => Self::Submitted,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Submitted => "Submitted",
            Self::Acknowledged => "Acknowledged",
            Self::PendingSubmit => "PendingSubmit",
            Self::PreSubmitted => "PreSubmitted",
            Self::Filled => "Filled",
            Self::Cancelled => "Cancelled",
            Self::Rejected => "Rejected",
            Self::Inactive => "Inactive",
        };
        write!(f, "{s}")
    }
}

impl FromStr for OrderStatus {
    type Err = ParseEnumError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Submitted" => Ok(Self::Submitted),
            "Acknowledged" => Ok(Self::Acknowledged),
            "PendingSubmit" => Ok(Self::PendingSubmit),
            "PreSubmitted" => Ok(Self::PreSubmitted),
            "Filled" => Ok(Self::Filled),
            "Cancelled" => Ok(Self::Cancelled),
            "Rejected" => Ok(Self::Rejected),
            "Inactive" => Ok(Self::Inactive),
            other => Err(ParseEnumError(other.to_string())),
        }
    }
}

/// Caller-supplied, immutable-after-validation order request (§3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Buy or sell.
    pub side: OrderSide,
    /// Uppercased, trimmed symbol.
    pub symbol: String,
    /// Quantity, must be > 0.
    pub qty: Decimal,
    /// Optional limit price.
    #[serde(default)]
    pub limit: Option<Decimal>,
    /// Optional stop price.
    #[serde(default)]
    pub stop: Option<Decimal>,
    /// Time in force.
    pub tif: TimeInForce,
    /// Caller-chosen idempotency key.
    #[serde(default)]
    pub client_order_id: Option<String>,
    /// Free-form tags.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl OrderRequest {
    /// Normalize the symbol to uppercase/trimmed, per §3.
    pub fn normalize(&mut self) {
        self.symbol = self.symbol.trim().to_uppercase();
    }

    /// The order type inferred from (limit, stop).
    #[must_use]
    pub fn order_type(&self) -> OrderType {
        OrderType::infer(self.limit, self.stop)
    }

    /// The mark price for notional computation: limit > stop > cached mark > 0 (GLOSSARY).
    #[must_use]
    pub fn mark(&self, cached_mark: Option<Decimal>) -> Decimal {
        self.limit
            .or(self.stop)
            .or(cached_mark)
            .unwrap_or(Decimal::ZERO)
    }
}

/// Order owned by the order manager (§3). `client_order_id` is the unique key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Unique key within this daemon instance.
    pub client_order_id: String,
    /// Broker-assigned order id, once known.
    #[serde(default)]
    pub broker_order_id: Option<String>,
    /// Uppercased symbol.
    pub symbol: String,
    /// Buy or sell.
    pub side: OrderSide,
    /// Requested quantity.
    pub qty: Decimal,
    /// Order type inferred at submit time.
    pub order_type: OrderType,
    /// Optional limit price.
    pub limit: Option<Decimal>,
    /// Optional stop price.
    pub stop: Option<Decimal>,
    /// Time in force.
    pub tif: TimeInForce,
    /// Current status.
    pub status: OrderStatus,
    /// When the order was submitted to the provider.
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    /// When the order was fully filled.
    #[serde(default)]
    pub filled_at: Option<DateTime<Utc>>,
    /// Cumulative filled quantity.
    #[serde(default)]
    pub fill_qty: Decimal,
    /// Average fill price.
    #[serde(default)]
    pub fill_price: Option<Decimal>,
    /// Cumulative commission.
    #[serde(default)]
    pub commission: Decimal,
    /// Frozen snapshot of the risk-check result at submit time.
    pub risk_check_result: RiskCheckResult,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn infers_order_type_from_limit_and_stop() {
        assert_eq!(OrderType::infer(None, None), OrderType::Market);
        assert_eq!(OrderType::infer(Some(dec!(10)), None), OrderType::Limit);
        assert_eq!(OrderType::infer(None, Some(dec!(9))), OrderType::Stop);
        assert_eq!(
            OrderType::infer(Some(dec!(10)), Some(dec!(9))),
            OrderType::StopLimit
        );
    }

    #[test]
    fn normalizes_broker_status_labels() {
        assert_eq!(
            OrderStatus::normalize_default("  FILLED "),
            OrderStatus::Filled
        );
        assert_eq!(
            OrderStatus::normalize_default("API Cancelled"),
            OrderStatus::Cancelled
        );
        assert_eq!(
            OrderStatus::normalize_default("Pending Cancel"),
            OrderStatus::Submitted
        );
    }

    #[test]
    fn active_set_matches_spec() {
        assert!(OrderStatus::Submitted.is_active());
        assert!(OrderStatus::Acknowledged.is_active());
        assert!(OrderStatus::PendingSubmit.is_active());
        assert!(OrderStatus::PreSubmitted.is_active());
        assert!(!OrderStatus::Filled.is_active());
        assert!(!OrderStatus::Rejected.is_active());
    }

    #[test]
    fn mark_prefers_limit_then_stop_then_cache() {
        let mut req = OrderRequest {
            side: OrderSide::Buy,
            symbol: "aapl".into(),
            qty: dec!(10),
            limit: Some(dec!(100)),
            stop: Some(dec!(95)),
            tif: TimeInForce::Day,
            client_order_id: None,
            tags: BTreeMap::new(),
        };
        req.normalize();
        assert_eq!(req.symbol, "AAPL");
        assert_eq!(req.mark(Some(dec!(50))), dec!(100));
        req.limit = None;
        assert_eq!(req.mark(Some(dec!(50))), dec!(95));
        req.stop = None;
        assert_eq!(req.mark(Some(dec!(50))), dec!(50));
        assert_eq!(req.mark(None), Decimal::ZERO);
    }
}
