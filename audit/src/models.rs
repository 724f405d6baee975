use diesel::prelude::*;

/// A row from the `commands` table.
#[derive(Debug, Clone, Queryable, QueryableByName)]
#[diesel(table_name = crate::schema::commands)]
pub struct CommandRow {
    /// Autoincrement primary key.
    pub id: i64,
    /// RFC3339 timestamp.
    pub ts: String,
    /// Caller kind, e.g. `"cli"` or `"sdk"`.
    pub source: String,
    /// Dotted command name, e.g. `"order.place"`.
    pub command: String,
    /// Canonical (sorted-key) JSON of the command's arguments.
    pub arguments_json: String,
    /// Wire result code, e.g. `"OK"` or an `ErrorCode` string.
    pub result_code: String,
    /// The request's `request_id`.
    pub request_id: String,
}

/// A row from the `orders` table, keyed by `client_order_id`.
#[derive(Debug, Clone, Queryable, QueryableByName)]
#[diesel(table_name = crate::schema::orders)]
pub struct OrderRow {
    /// Unique key within this daemon instance.
    pub client_order_id: String,
    /// Broker-assigned order id, once known.
    pub broker_order_id: Option<String>,
    /// Uppercased symbol.
    pub symbol: String,
    /// `"buy"` or `"sell"`.
    pub side: String,
    /// Requested quantity, decimal text.
    pub qty: String,
    /// Order type inferred at submit time.
    pub order_type: String,
    /// Optional limit price, decimal text.
    pub limit_price: Option<String>,
    /// Optional stop price, decimal text.
    pub stop_price: Option<String>,
    /// Time in force.
    pub tif: String,
    /// Current status.
    pub status: String,
    /// RFC3339 timestamp, once submitted.
    pub submitted_at: Option<String>,
    /// RFC3339 timestamp, once filled.
    pub filled_at: Option<String>,
    /// Cumulative filled quantity, decimal text.
    pub fill_qty: String,
    /// Average fill price, decimal text.
    pub fill_price: Option<String>,
    /// Cumulative commission, decimal text.
    pub commission: String,
    /// Canonical (sorted-key) JSON of the frozen risk-check result.
    pub risk_check_result_json: String,
    /// RFC3339 creation timestamp.
    pub created_at: String,
    /// RFC3339 last-update timestamp.
    pub updated_at: String,
}

/// A row from the `fills` table, keyed by `fill_id`.
#[derive(Debug, Clone, Queryable, QueryableByName)]
#[diesel(table_name = crate::schema::fills)]
pub struct FillRow {
    /// Globally unique fill identifier.
    pub fill_id: String,
    /// The order this fill belongs to.
    pub client_order_id: String,
    /// Uppercased symbol.
    pub symbol: String,
    /// Filled quantity, decimal text.
    pub qty: String,
    /// Fill price, decimal text.
    pub price: String,
    /// Commission charged, decimal text.
    pub commission: String,
    /// RFC3339 timestamp.
    pub ts: String,
    /// Broker-assigned order id this fill belongs to, when known.
    pub broker_order_id: Option<String>,
}

/// A row from the `risk_events` table.
#[derive(Debug, Clone, Queryable, QueryableByName)]
#[diesel(table_name = crate::schema::risk_events)]
pub struct RiskEventRow {
    /// Autoincrement primary key.
    pub id: i64,
    /// RFC3339 timestamp.
    pub ts: String,
    /// Event type, e.g. `"halted"`, `"limit_set"`, `"override_created"`.
    pub event_type: String,
    /// Canonical (sorted-key) JSON detail blob.
    pub details_json: String,
}

/// A row from the `connection_events` table.
#[derive(Debug, Clone, Queryable, QueryableByName)]
#[diesel(table_name = crate::schema::connection_events)]
pub struct ConnectionEventRow {
    /// Autoincrement primary key.
    pub id: i64,
    /// RFC3339 timestamp.
    pub ts: String,
    /// Event name, e.g. `"connected"`, `"disconnected"`, `"reconnecting"`.
    pub event: String,
    /// Canonical (sorted-key) JSON detail blob.
    pub details_json: String,
}
