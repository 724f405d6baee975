use crate::error::RiskError;
use crate::param::{ParamValue, RiskParam};
use chrono::{DateTime, Utc};
use model::{
    BrokerError, ErrorCode, OrderRequest, RiskCheckResult, RiskConfigSnapshot, RiskContext,
    RiskOverride,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

/// Base (un-overridden) risk limits, mutated only by `set_limit`.
#[derive(Clone, Debug)]
struct BaseLimits {
    max_position_pct: Decimal,
    max_order_value: Decimal,
    max_daily_loss_pct: Decimal,
    max_sector_exposure_pct: Decimal,
    max_single_name_pct: Decimal,
    max_open_orders: Decimal,
    order_rate_limit: Decimal,
    duplicate_window_seconds: Decimal,
    symbol_allowlist: BTreeSet<String>,
    symbol_blocklist: BTreeSet<String>,
}

impl BaseLimits {
    fn numeric(&self, param: RiskParam) -> Decimal {
        match param {
            RiskParam::MaxPositionPct => self.max_position_pct,
            RiskParam::MaxOrderValue => self.max_order_value,
            RiskParam::MaxDailyLossPct => self.max_daily_loss_pct,
            RiskParam::MaxSectorExposurePct => self.max_sector_exposure_pct,
            RiskParam::MaxSingleNamePct => self.max_single_name_pct,
            RiskParam::MaxOpenOrders => self.max_open_orders,
            RiskParam::OrderRateLimit => self.order_rate_limit,
            RiskParam::DuplicateWindowSeconds => self.duplicate_window_seconds,
            RiskParam::SymbolAllowlist | RiskParam::SymbolBlocklist => Decimal::ZERO,
        }
    }

    fn set_numeric(&mut self, param: RiskParam, value: Decimal) {
        match param {
            RiskParam::MaxPositionPct => self.max_position_pct = value,
            RiskParam::MaxOrderValue => self.max_order_value = value,
            RiskParam::MaxDailyLossPct => self.max_daily_loss_pct = value,
            RiskParam::MaxSectorExposurePct => self.max_sector_exposure_pct = value,
            RiskParam::MaxSingleNamePct => self.max_single_name_pct = value,
            RiskParam::MaxOpenOrders => self.max_open_orders = value,
            RiskParam::OrderRateLimit => self.order_rate_limit = value,
            RiskParam::DuplicateWindowSeconds => self.duplicate_window_seconds = value,
            RiskParam::SymbolAllowlist | RiskParam::SymbolBlocklist => {}
        }
    }

    fn symbols(&self, param: RiskParam) -> &BTreeSet<String> {
        match param {
            RiskParam::SymbolAllowlist => &self.symbol_allowlist,
            _ => &self.symbol_blocklist,
        }
    }
}

/// Configuration the engine is constructed with — the defaults named in §6.
#[derive(Clone, Debug)]
pub struct RiskConfig {
    /// Maximum position size as a percentage of NLV.
    pub max_position_pct: Decimal,
    /// Maximum notional value of a single order.
    pub max_order_value: Decimal,
    /// Maximum daily loss as a percentage of NLV.
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
    /// Only these uppercased symbols may be traded, when non-empty.
    pub symbol_allowlist: BTreeSet<String>,
    /// Uppercased symbols that may never be traded.
    pub symbol_blocklist: BTreeSet<String>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_position_pct: dec!(20),
            max_order_value: dec!(50_000),
            max_daily_loss_pct: dec!(5),
            max_sector_exposure_pct: dec!(35),
            max_single_name_pct: dec!(20),
            max_open_orders: 25,
            order_rate_limit: 30,
            duplicate_window_seconds: 5,
            symbol_allowlist: BTreeSet::new(),
            symbol_blocklist: BTreeSet::new(),
        }
    }
}

/// Single-writer in-process pre-trade risk engine (§4.3).
///
/// Non-suspending and performs no I/O; owned exclusively by one task per §5.
#[derive(Debug)]
pub struct RiskEngine {
    limits: BaseLimits,
    halted: bool,
    order_times: VecDeque<DateTime<Utc>>,
    duplicate_times: HashMap<String, DateTime<Utc>>,
    overrides: Vec<RiskOverride>,
}

impl RiskEngine {
    /// Build an engine from the daemon's configured defaults.
    #[must_use]
    pub fn new(config: RiskConfig) -> Self {
        Self {
            limits: BaseLimits {
                max_position_pct: config.max_position_pct,
                max_order_value: config.max_order_value,
                max_daily_loss_pct: config.max_daily_loss_pct,
                max_sector_exposure_pct: config.max_sector_exposure_pct,
                max_single_name_pct: config.max_single_name_pct,
                max_open_orders: Decimal::from(config.max_open_orders),
                order_rate_limit: Decimal::from(config.order_rate_limit),
                duplicate_window_seconds: Decimal::from(config.duplicate_window_seconds),
                symbol_allowlist: config.symbol_allowlist,
                symbol_blocklist: config.symbol_blocklist,
            },
            halted: false,
            order_times: VecDeque::new(),
            duplicate_times: HashMap::new(),
            overrides: Vec::new(),
        }
    }

    /// Whether the engine is currently halted.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    fn cleanup_state(&mut self, now: DateTime<Utc>) {
        while let Some(front) = self.order_times.front() {
            if now.signed_duration_since(*front).num_seconds() > 60 {
                self.order_times.pop_front();
            } else {
                break;
            }
        }

        let window_seconds = self
            .effective_numeric(RiskParam::DuplicateWindowSeconds, now)
            .to_i64()
            .unwrap_or(0);
        self.duplicate_times
            .retain(|_, ts| now.signed_duration_since(*ts).num_seconds() <= window_seconds);

        self.overrides.retain(|ov| ov.expires_at > now);
    }

    fn effective_numeric(&self, param: RiskParam, now: DateTime<Utc>) -> Decimal {
        self.overrides
            .iter()
            .rev()
            .find(|ov| ov.param == param.as_str() && ov.expires_at > now)
            .map_or_else(|| self.limits.numeric(param), |ov| ov.value)
    }

    fn effective_symbols(&self, param: RiskParam) -> &BTreeSet<String> {
        self.limits.symbols(param)
    }

    /// The effective limits after applying non-expired overrides (§4.3).
    pub fn snapshot(&mut self) -> RiskConfigSnapshot {
        let now = Utc::now();
        self.cleanup_state(now);
        RiskConfigSnapshot {
            max_position_pct: self.effective_numeric(RiskParam::MaxPositionPct, now),
            max_order_value: self.effective_numeric(RiskParam::MaxOrderValue, now),
            max_daily_loss_pct: self.effective_numeric(RiskParam::MaxDailyLossPct, now),
            max_sector_exposure_pct: self.effective_numeric(RiskParam::MaxSectorExposurePct, now),
            max_single_name_pct: self.effective_numeric(RiskParam::MaxSingleNamePct, now),
            max_open_orders: self
                .effective_numeric(RiskParam::MaxOpenOrders, now)
                .to_u32()
                .unwrap_or(u32::MAX),
            order_rate_limit: self
                .effective_numeric(RiskParam::OrderRateLimit, now)
                .to_u32()
                .unwrap_or(u32::MAX),
            duplicate_window_seconds: self
                .effective_numeric(RiskParam::DuplicateWindowSeconds, now)
                .to_u64()
                .unwrap_or(0),
            symbol_allowlist: self.limits.symbol_allowlist.clone(),
            symbol_blocklist: self.limits.symbol_blocklist.clone(),
            halted: self.halted,
        }
    }

    /// Permanently change a limit. Rejects unknown params and coerces `value`
    /// per the param's type (§4.3).
    pub fn set_limit(
        &mut self,
        param: &str,
        value: &Value,
    ) -> Result<RiskConfigSnapshot, RiskError> {
        let param: RiskParam = param.parse()?;
        match ParamValue::coerce(param, value)? {
            ParamValue::Numeric(d) => self.limits.set_numeric(param, d),
            ParamValue::Symbols(symbols) => match param {
                RiskParam::SymbolAllowlist => self.limits.symbol_allowlist = symbols,
                RiskParam::SymbolBlocklist => self.limits.symbol_blocklist = symbols,
                _ => unreachable!("non-numeric coercion only produced for symbol-list params"),
            },
        }
        Ok(self.snapshot())
    }

    /// Append a time-bounded override. Numeric params only (§3).
    pub fn override_limit(
        &mut self,
        param: &str,
        value: &Value,
        duration_seconds: u64,
        reason: &str,
    ) -> Result<RiskOverride, RiskError> {
        let parsed: RiskParam = param.parse()?;
        let coerced = ParamValue::coerce(parsed, value)?;
        let decimal = coerced
            .as_numeric()
            .ok_or_else(|| RiskError::NonNumericOverride(parsed.to_string()))?;
        let now = Utc::now();
        let override_ = RiskOverride {
            param: parsed.to_string(),
            value: decimal,
            reason: reason.to_string(),
            created_at: now,
            expires_at: now
                + chrono::Duration::seconds(duration_seconds.min(i64::MAX as u64) as i64),
        };
        self.overrides.push(override_.clone());
        Ok(override_)
    }

    /// Toggle halted on. Short-circuits all subsequent order checks.
    pub fn halt(&mut self) {
        self.halted = true;
    }

    /// Toggle halted off.
    pub fn resume(&mut self) {
        self.halted = false;
    }

    /// List non-expired overrides.
    pub fn list_overrides(&mut self) -> Vec<RiskOverride> {
        let now = Utc::now();
        self.cleanup_state(now);
        self.overrides.clone()
    }

    /// Parse `"Ns|Nm|Nh|N"` into a whole number of seconds (§4.3).
    pub fn parse_duration(value: &str) -> Result<u64, RiskError> {
        let raw = value.trim().to_lowercase();
        let (digits, multiplier) = if let Some(stripped) = raw.strip_suffix('h') {
            (stripped, 3600)
        } else if let Some(stripped) = raw.strip_suffix('m') {
            (stripped, 60)
        } else if let Some(stripped) = raw.strip_suffix('s') {
            (stripped, 1)
        } else {
            (raw.as_str(), 1)
        };
        let amount: u64 = digits
            .parse()
            .map_err(|_| RiskError::InvalidDuration(value.to_string()))?;
        amount
            .checked_mul(multiplier)
            .ok_or(RiskError::Overflow("duration"))
    }

    /// `(breached, loss_pct)` for the standalone drawdown breaker (§4.8).
    #[must_use]
    pub fn check_drawdown_breaker(&self, daily_pnl: Decimal, nlv: Decimal) -> (bool, Decimal) {
        if nlv <= Decimal::ZERO {
            return (false, Decimal::ZERO);
        }
        let now = Utc::now();
        let loss_pct = pct_of(daily_pnl.min(Decimal::ZERO), nlv);
        let breached = loss_pct > self.effective_numeric(RiskParam::MaxDailyLossPct, now);
        (breached, loss_pct)
    }

    /// Run the full pre-trade check (§4.3's numbered algorithm). Internal
    /// counters (`order_times`, `duplicate_times`) advance only on `ok=true`.
    pub fn check_order(&mut self, req: &OrderRequest, ctx: &RiskContext) -> RiskCheckResult {
        let now = Utc::now();
        self.cleanup_state(now);

        if self.halted {
            let mut details = BTreeMap::new();
            details.insert("halted".to_string(), Value::Bool(true));
            details.insert(
                "violation_codes".to_string(),
                json!([ErrorCode::RiskHalted.as_str()]),
            );
            return RiskCheckResult {
                ok: false,
                reasons: vec!["trading is halted".to_string()],
                details,
                suggestion: None,
            };
        }

        let symbol = req.symbol.trim().to_uppercase();
        let mut reasons = Vec::new();
        let mut details: BTreeMap<String, Value> = BTreeMap::new();
        let mut violation_codes: BTreeSet<&'static str> = BTreeSet::new();

        let allowlist = self.effective_symbols(RiskParam::SymbolAllowlist);
        let blocklist = self.effective_symbols(RiskParam::SymbolBlocklist);
        if !allowlist.is_empty() && !allowlist.contains(&symbol) {
            reasons.push(format!("symbol {symbol} is not in allowlist"));
        }
        if blocklist.contains(&symbol) {
            reasons.push(format!("symbol {symbol} is in blocklist"));
        }

        let rate_limit = self
            .effective_numeric(RiskParam::OrderRateLimit, now)
            .to_u32()
            .unwrap_or(u32::MAX);
        #[allow(clippy::cast_possible_truncation)]
        let orders_last_minute = self.order_times.len() as u32;
        if orders_last_minute >= rate_limit {
            reasons.push(format!("order rate limit exceeded ({rate_limit}/minute)"));
            details.insert("orders_last_minute".to_string(), json!(orders_last_minute));
            details.insert("limit".to_string(), json!(rate_limit));
            violation_codes.insert(ErrorCode::RateLimited.as_str());
        }

        let duplicate_key = format!(
            "{}:{}:{}:{}:{}:{}",
            req.side,
            symbol,
            req.qty,
            fmt_opt(req.limit),
            fmt_opt(req.stop),
            req.tif
        );
        if self.duplicate_times.contains_key(&duplicate_key) {
            reasons.push("duplicate order detected inside duplicate window".to_string());
            details.insert(
                "duplicate_window_seconds".to_string(),
                json!(self
                    .effective_numeric(RiskParam::DuplicateWindowSeconds, now)
                    .to_u64()
                    .unwrap_or(0)),
            );
            violation_codes.insert(ErrorCode::DuplicateOrder.as_str());
        }

        let mark = req.mark(ctx.mark_prices.get(&symbol).copied());
        let notional = mul_abs(req.qty, mark);
        details.insert("notional".to_string(), json!(notional.to_string()));

        let max_order_value = self.effective_numeric(RiskParam::MaxOrderValue, now);
        if max_order_value > Decimal::ZERO && notional > max_order_value {
            reasons.push(format!(
                "order notional {notional:.2} exceeds max_order_value {max_order_value:.2}"
            ));
        }

        let max_open_orders = self
            .effective_numeric(RiskParam::MaxOpenOrders, now)
            .to_u32()
            .unwrap_or(u32::MAX);
        if ctx.open_orders >= max_open_orders {
            reasons.push(format!(
                "open orders {} exceed max_open_orders {max_open_orders}",
                ctx.open_orders
            ));
        }

        if ctx.nlv > Decimal::ZERO {
            let current_value = ctx
                .position_values
                .get(&symbol)
                .copied()
                .unwrap_or(Decimal::ZERO);
            let signed_notional = notional
                .checked_mul(Decimal::from(req.side.sign()))
                .unwrap_or(notional);
            let projected_value = current_value.checked_add(signed_notional).unwrap_or(current_value);
            let projected_pct = pct_of(projected_value, ctx.nlv);

            let max_position_pct = self.effective_numeric(RiskParam::MaxPositionPct, now);
            if projected_pct > max_position_pct {
                reasons.push(format!(
                    "projected position {projected_pct:.2}% exceeds max_position_pct {max_position_pct:.2}%"
                ));
            }

            let max_single_name_pct = self.effective_numeric(RiskParam::MaxSingleNamePct, now);
            if projected_pct > max_single_name_pct {
                reasons.push(format!(
                    "projected position {projected_pct:.2}% exceeds max_single_name_pct {max_single_name_pct:.2}%"
                ));
            }

            if let Some(sector) = ctx.sector_map.get(&symbol) {
                let current_sector = ctx
                    .sector_exposure
                    .get(sector)
                    .copied()
                    .unwrap_or(Decimal::ZERO);
                let projected_sector_value = current_sector
                    .checked_add(signed_notional)
                    .unwrap_or(current_sector);
                let projected_sector_pct = pct_of(projected_sector_value, ctx.nlv);
                details.insert("sector".to_string(), json!(sector));
                details.insert(
                    "projected_sector_pct".to_string(),
                    json!(projected_sector_pct.round_dp(4).to_string()),
                );
                let max_sector = self.effective_numeric(RiskParam::MaxSectorExposurePct, now);
                if projected_sector_pct > max_sector {
                    reasons.push(format!(
                        "projected sector exposure {projected_sector_pct:.2}% exceeds max_sector_exposure_pct {max_sector:.2}%"
                    ));
                }
            }

            let max_daily_loss_pct = self.effective_numeric(RiskParam::MaxDailyLossPct, now);
            let loss_pct = pct_of(ctx.daily_pnl.min(Decimal::ZERO), ctx.nlv);
            details.insert(
                "daily_loss_pct".to_string(),
                json!(loss_pct.round_dp(4).to_string()),
            );
            if loss_pct > max_daily_loss_pct {
                reasons.push(format!(
                    "daily drawdown {loss_pct:.2}% exceeds max_daily_loss_pct {max_daily_loss_pct:.2}%"
                ));
            }
        }

        if !reasons.is_empty() {
            if !violation_codes.is_empty() {
                details.insert(
                    "violation_codes".to_string(),
                    json!(violation_codes.into_iter().collect::<Vec<_>>()),
                );
            }
            let suggestion = if notional > max_order_value && mark > Decimal::ZERO {
                let max_qty = max_order_value.checked_div(mark).unwrap_or(Decimal::ZERO);
                Some(format!(
                    "reduce quantity to <= {}",
                    max_qty.trunc().to_i64().unwrap_or(0)
                ))
            } else {
                None
            };
            return RiskCheckResult {
                ok: false,
                reasons,
                details,
                suggestion,
            };
        }

        self.order_times.push_back(now);
        self.duplicate_times.insert(duplicate_key, now);
        RiskCheckResult {
            ok: true,
            reasons: Vec::new(),
            details,
            suggestion: None,
        }
    }

    /// `check_order`, raising a typed `BrokerError` on failure (§4.3).
    /// Code precedence: halted ⇒ `RISK_HALTED`; else `RATE_LIMITED` >
    /// `DUPLICATE_ORDER` > `RISK_CHECK_FAILED`.
    pub fn assert_order(
        &mut self,
        req: &OrderRequest,
        ctx: &RiskContext,
    ) -> Result<RiskCheckResult, BrokerError> {
        let result = self.check_order(req, ctx);
        if result.ok {
            return Ok(result);
        }
        let violation_codes: Vec<&str> = result
            .details
            .get("violation_codes")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let code = if self.halted {
            ErrorCode::RiskHalted
        } else if violation_codes.contains(&ErrorCode::RateLimited.as_str()) {
            ErrorCode::RateLimited
        } else if violation_codes.contains(&ErrorCode::DuplicateOrder.as_str()) {
            ErrorCode::DuplicateOrder
        } else {
            ErrorCode::RiskCheckFailed
        };

        let details_value = Value::Object(result.details.clone().into_iter().collect());
        let mut err = BrokerError::new(code, result.reasons.join("; ")).with_details(details_value);
        if let Some(suggestion) = result.suggestion.clone() {
            err = err.with_suggestion(suggestion);
        }
        Err(err)
    }
}

fn fmt_opt(value: Option<Decimal>) -> String {
    value.map_or_else(|| "None".to_string(), |d| d.to_string())
}

fn mul_abs(a: Decimal, b: Decimal) -> Decimal {
    a.checked_mul(b).map(|v| v.abs()).unwrap_or(Decimal::MAX)
}

fn pct_of(value: Decimal, nlv: Decimal) -> Decimal {
    if nlv == Decimal::ZERO {
        return Decimal::ZERO;
    }
    value
        .abs()
        .checked_div(nlv)
        .and_then(|ratio| ratio.checked_mul(dec!(100)))
        .unwrap_or(Decimal::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{OrderSide, TimeInForce};

    fn engine() -> RiskEngine {
        RiskEngine::new(RiskConfig {
            order_rate_limit: 5,
            duplicate_window_seconds: 60,
            ..RiskConfig::default()
        })
    }

    fn order(symbol: &str, qty: Decimal, limit: Option<Decimal>) -> OrderRequest {
        OrderRequest {
            side: OrderSide::Buy,
            symbol: symbol.to_string(),
            qty,
            limit,
            stop: None,
            tif: TimeInForce::Day,
            client_order_id: None,
            tags: Default::default(),
        }
    }

    #[test]
    fn accepts_a_clean_order() {
        let mut engine = engine();
        let result = engine.check_order(&order("AAPL", dec!(10), Some(dec!(100))), &RiskContext::default());
        assert!(result.ok);
    }

    #[test]
    fn halted_engine_rejects_with_risk_halted_code() {
        let mut engine = engine();
        engine.halt();
        let result = engine.check_order(&order("AAPL", dec!(10), Some(dec!(100))), &RiskContext::default());
        assert!(!result.ok);
        assert_eq!(result.reasons, vec!["trading is halted"]);
    }

    #[test]
    fn duplicate_order_within_window_is_rejected() {
        let mut engine = engine();
        let req = order("MSFT", dec!(10), Some(dec!(100)));
        let ctx = RiskContext::default();
        let first = engine.check_order(&req, &ctx);
        assert!(first.ok);
        let second = engine.check_order(&req, &ctx);
        assert!(!second.ok);
        assert!(second
            .details
            .get("violation_codes")
            .and_then(Value::as_array)
            .unwrap()
            .iter()
            .any(|v| v.as_str() == Some("DUPLICATE_ORDER")));
    }

    #[test]
    fn rate_limit_trips_after_configured_count() {
        let mut engine = engine();
        let ctx = RiskContext::default();
        for i in 0..5 {
            let req = order(&format!("SYM{i}"), dec!(1), Some(dec!(10)));
            assert!(engine.check_order(&req, &ctx).ok);
        }
        let sixth = order("SYM9", dec!(1), Some(dec!(10)));
        let result = engine.check_order(&sixth, &ctx);
        assert!(!result.ok);
        assert!(result.reasons.iter().any(|r| r.contains("rate limit")));
    }

    #[test]
    fn max_order_value_violation_includes_suggestion() {
        let mut engine = RiskEngine::new(RiskConfig {
            max_order_value: dec!(1000),
            ..RiskConfig::default()
        });
        let req = order("AAPL", dec!(100), Some(dec!(100)));
        let result = engine.check_order(&req, &RiskContext::default());
        assert!(!result.ok);
        assert_eq!(result.suggestion, Some("reduce quantity to <= 10".to_string()));
    }

    #[test]
    fn position_pct_enforced_against_nlv() {
        let mut engine = RiskEngine::new(RiskConfig {
            max_position_pct: dec!(10),
            max_single_name_pct: dec!(50),
            ..RiskConfig::default()
        });
        let mut ctx = RiskContext {
            nlv: dec!(10_000),
            ..RiskContext::default()
        };
        ctx.mark_prices.insert("AAPL".to_string(), dec!(100));
        let req = order("AAPL", dec!(50), None);
        let result = engine.check_order(&req, &ctx);
        assert!(!result.ok);
        assert!(result
            .reasons
            .iter()
            .any(|r| r.contains("max_position_pct")));
    }

    #[test]
    fn assert_order_raises_rate_limited_over_generic_failure() {
        let mut engine = engine();
        let ctx = RiskContext::default();
        for i in 0..5 {
            let req = order(&format!("SYM{i}"), dec!(1), Some(dec!(10)));
            engine.assert_order(&req, &ctx).unwrap();
        }
        let sixth = order("SYM9", dec!(1), Some(dec!(10)));
        let err = engine.assert_order(&sixth, &ctx).unwrap_err();
        assert_eq!(err.code, ErrorCode::RateLimited);
    }

    #[test]
    fn override_limit_rejects_symbol_list_params() {
        let mut engine = engine();
        let err = engine
            .override_limit("symbol_allowlist", &json!(["AAPL"]), 60, "test")
            .unwrap_err();
        assert_eq!(err, RiskError::NonNumericOverride("symbol_allowlist".to_string()));
    }

    #[test]
    fn override_limit_expires_and_falls_back_to_base() {
        let mut engine = engine();
        engine
            .override_limit("max_order_value", &json!(100), 0, "tight window")
            .unwrap();
        // An override that has already expired must not suppress the base limit.
        std::thread::sleep(std::time::Duration::from_millis(5));
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.max_order_value, RiskConfig::default().max_order_value);
    }

    #[test]
    fn parse_duration_accepts_suffixes() {
        assert_eq!(RiskEngine::parse_duration("90s").unwrap(), 90);
        assert_eq!(RiskEngine::parse_duration("5m").unwrap(), 300);
        assert_eq!(RiskEngine::parse_duration("2h").unwrap(), 7200);
        assert_eq!(RiskEngine::parse_duration("42").unwrap(), 42);
        assert!(RiskEngine::parse_duration("bad").is_err());
    }

    #[test]
    fn set_limit_rejects_unknown_param() {
        let mut engine = engine();
        let err = engine.set_limit("not_a_param", &json!(1)).unwrap_err();
        assert_eq!(err, RiskError::UnknownParam("not_a_param".to_string()));
    }
}
