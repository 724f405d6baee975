use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An append-only execution record (§3). Deduplicated by `fill_id` on write.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FillRecord {
    /// Globally unique fill identifier.
    pub fill_id: String,
    /// The order this fill belongs to.
    pub client_order_id: String,
    /// Broker-assigned order id, when known.
    #[serde(default)]
    pub broker_order_id: Option<String>,
    /// Uppercased symbol.
    pub symbol: String,
    /// Filled quantity.
    pub qty: Decimal,
    /// Fill price.
    pub price: Decimal,
    /// Commission charged for this fill.
    pub commission: Decimal,
    /// When the fill occurred.
    pub timestamp: DateTime<Utc>,
}
