use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The effective risk limits after applying unexpired overrides (§3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RiskConfigSnapshot {
    /// Maximum position size as a percentage of NLV.
    pub max_position_pct: Decimal,
    /// Maximum notional value of a single order.
    pub max_order_value: Decimal,
    /// Maximum daily loss as a percentage of NLV before the drawdown breaker trips.
    pub max_daily_loss_pct: Decimal,
    /// Maximum sector exposure as a percentage of NLV.
    pub max_sector_exposure_pct: Decimal,
    /// Maximum single-name exposure as a percentage of NLV.
    pub max_single_name_pct: Decimal,
    /// Maximum number of simultaneously open orders.
    pub max_open_orders: u32,
    /// Maximum order submissions per rolling 60-second window.
    pub order_rate_limit: u32,
    /// Width of the duplicate-order fingerprint window, in seconds.
    pub duplicate_window_seconds: u64,
    /// If non-empty, only these uppercased symbols may be traded.
    pub symbol_allowlist: BTreeSet<String>,
    /// Uppercased symbols that may never be traded.
    pub symbol_blocklist: BTreeSet<String>,
    /// Whether the engine is currently halted.
    pub halted: bool,
}

/// A time-bounded change to a numeric risk parameter (GLOSSARY).
/// Invariant: `expires_at > created_at`; non-numeric params may not be overridden.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RiskOverride {
    /// Name of the overridden parameter.
    pub param: String,
    /// The override's value.
    pub value: Decimal,
    /// Operator-supplied reason.
    pub reason: String,
    /// When the override was created.
    pub created_at: DateTime<Utc>,
    /// When the override expires.
    pub expires_at: DateTime<Utc>,
}

/// Pre-trade context built fresh for each `check_order` call; never persisted (§3).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RiskContext {
    /// Net liquidation value.
    pub nlv: Decimal,
    /// Daily realized + unrealized PnL, per the configured basis.
    pub daily_pnl: Decimal,
    /// Count of currently open (ACTIVE) orders.
    pub open_orders: u32,
    /// Mark price by uppercased symbol.
    pub mark_prices: BTreeMap<String, Decimal>,
    /// Current position notional value by uppercased symbol.
    pub position_values: BTreeMap<String, Decimal>,
    /// Sector by uppercased symbol, when known.
    pub sector_map: BTreeMap<String, String>,
    /// Current notional exposure by sector, when known.
    pub sector_exposure: BTreeMap<String, Decimal>,
}

/// Result of a pre-trade risk check (§4.3).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RiskCheckResult {
    /// Whether the order passed every enforced check.
    pub ok: bool,
    /// Human-readable reasons for any violation.
    pub reasons: Vec<String>,
    /// Structured details, including `violation_codes` when `ok=false`.
    pub details: BTreeMap<String, serde_json::Value>,
    /// One-line actionable suggestion, computed at the check site.
    pub suggestion: Option<String>,
}

impl RiskCheckResult {
    /// A passing result with no reasons or details.
    #[must_use]
    pub fn pass() -> Self {
        Self {
            ok: true,
            ..Self::default()
        }
    }
}
