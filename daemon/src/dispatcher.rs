//! Command-table dispatch (§4.7, §6): one entry point matching on
//! `request.command`, building typed parameters via [`crate::params`] and
//! mapping every subsystem error into the wire `BrokerError` taxonomy.
//!
//! `events.subscribe` is not handled here: the server intercepts it before
//! reaching [`Dispatcher::dispatch`], since it needs to register a
//! broadcaster subscription and keep the connection open rather than return
//! a single response.

use crate::params;
use crate::schema;
use audit::{AuditLog, AuditTable, CommandFilter, OrderFilter};
use market_data::MarketDataService;
use model::{
    BrokerError, BrokerProvider, ErrorCode, ExposureBy, OptionChainQuery, OrderRequest,
    OrderSide, OrderStatus, QuoteIntent, TimeInForce,
};
use monitors::MonitorSupervisor;
use orders::{OrderManager, StatusFilter};
use risk::{RiskEngine, RiskError};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::watch;

/// Every command this daemon answers, used for `schema.get` and for
/// computing "did you mean" suggestions on an unknown command.
pub const COMMANDS: &[&str] = &[
    "daemon.status",
    "daemon.stop",
    "quote.snapshot",
    "market.capabilities",
    "market.history",
    "market.chain",
    "portfolio.positions",
    "portfolio.balance",
    "portfolio.pnl",
    "portfolio.exposure",
    "portfolio.snapshot",
    "order.place",
    "order.bracket",
    "order.status",
    "orders.list",
    "order.cancel",
    "orders.cancel_all",
    "fills.list",
    "risk.check",
    "risk.limits",
    "risk.set",
    "risk.halt",
    "risk.resume",
    "risk.override",
    "runtime.keepalive",
    "events.subscribe",
    "audit.commands",
    "audit.orders",
    "audit.risk",
    "audit.export",
    "schema.get",
];

/// Routes a decoded command to the owned subsystems (§4.7, §9's fixed
/// construction order: audit, risk, provider, market data, orders, monitors).
pub struct Dispatcher {
    provider: Arc<dyn BrokerProvider>,
    market_data: Arc<MarketDataService>,
    orders: Arc<OrderManager>,
    risk: Arc<Mutex<RiskEngine>>,
    audit: Arc<AuditLog>,
    monitors: Arc<MonitorSupervisor>,
    started_at: Instant,
    socket_path: PathBuf,
    shutdown_tx: watch::Sender<bool>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").field("provider", &self.provider.name()).finish()
    }
}

impl Dispatcher {
    /// Wire the dispatcher to its already-constructed subsystems.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        provider: Arc<dyn BrokerProvider>,
        market_data: Arc<MarketDataService>,
        orders: Arc<OrderManager>,
        risk: Arc<Mutex<RiskEngine>>,
        audit: Arc<AuditLog>,
        monitors: Arc<MonitorSupervisor>,
        socket_path: PathBuf,
        shutdown_tx: watch::Sender<bool>,
    ) -> Self {
        Self {
            provider,
            market_data,
            orders,
            risk,
            audit,
            monitors,
            started_at: Instant::now(),
            socket_path,
            shutdown_tx,
        }
    }

    /// Route `command` to its handler. `events.subscribe` is rejected here
    /// on purpose — see the module docs.
    pub async fn dispatch(&self, command: &str, params: &Map<String, Value>) -> Result<Value, BrokerError> {
        match command {
            "daemon.status" => self.daemon_status().await,
            "daemon.stop" => self.daemon_stop(),
            "quote.snapshot" => self.quote_snapshot(params).await,
            "market.capabilities" => self.market_capabilities(params).await,
            "market.history" => self.market_history(params).await,
            "market.chain" => self.market_chain(params).await,
            "portfolio.positions" => self.portfolio_positions(params).await,
            "portfolio.balance" => self.portfolio_balance().await,
            "portfolio.pnl" => self.portfolio_pnl().await,
            "portfolio.exposure" => self.portfolio_exposure(params).await,
            "portfolio.snapshot" => self.portfolio_snapshot(params).await,
            "order.place" => self.order_place(params).await,
            "order.bracket" => self.order_bracket(params).await,
            "order.status" => self.order_status(params).await,
            "orders.list" => self.orders_list(params),
            "order.cancel" => self.order_cancel(params).await,
            "orders.cancel_all" => self.orders_cancel_all(params).await,
            "fills.list" => self.fills_list(params),
            "risk.check" => self.risk_check(params).await,
            "risk.limits" => self.risk_limits(),
            "risk.set" => self.risk_set(params),
            "risk.halt" => self.risk_halt(),
            "risk.resume" => self.risk_resume(),
            "risk.override" => self.risk_override(params),
            "runtime.keepalive" => self.runtime_keepalive(params).await,
            "events.subscribe" => Err(BrokerError::new(
                ErrorCode::InvalidArgs,
                "events.subscribe requires the request's stream flag",
            )),
            "audit.commands" => self.audit_commands(params),
            "audit.orders" => self.audit_orders(params),
            "audit.risk" => self.audit_risk(params),
            "audit.export" => self.audit_export(params),
            "schema.get" => Ok(schema::describe(params::string_opt(params, "command")?.as_deref())),
            other => Err(unknown_command(other)),
        }
    }

    async fn daemon_status(&self) -> Result<Value, BrokerError> {
        let uptime_seconds = self.started_at.elapsed().as_secs();
        let connection = self.provider.status().await;
        let risk_halted = self.risk.lock().unwrap_or_else(|e| e.into_inner()).is_halted();
        Ok(json!({
            "uptime_seconds": uptime_seconds,
            "connection": connection,
            "provider_capabilities": self.provider.capabilities(),
            "risk_halted": risk_halted,
            "socket": self.socket_path.display().to_string(),
        }))
    }

    /// Signal [`Daemon::stop`](crate::daemon::Daemon::stop)'s shutdown watch
    /// and ack immediately; the caller's connection closes once the accept
    /// loop observes the signal, same as the in-process ctrl_c path.
    fn daemon_stop(&self) -> Result<Value, BrokerError> {
        let _ = self.shutdown_tx.send(true);
        Ok(json!({ "stopping": true }))
    }

    async fn quote_snapshot(&self, p: &Map<String, Value>) -> Result<Value, BrokerError> {
        let symbols = params::string_vec(p, "symbols")?;
        let force = params::bool_or(p, "force", false)?;
        let intent: QuoteIntent = params::parse_opt(p, "intent")?.unwrap_or_default();
        let quotes = self.market_data.quote(&symbols, force, intent).await?;
        let meta = self.market_data.quote_capabilities_with_meta(&symbols, false).await?;
        Ok(json!({
            "quotes": quotes,
            "intent": intent,
            "provider_capabilities": meta.capabilities,
            "provider_capabilities_cache": { "cache_age_ms": meta.cache_age_ms },
        }))
    }

    async fn market_capabilities(&self, p: &Map<String, Value>) -> Result<Value, BrokerError> {
        let symbols = params::string_vec_opt(p, "symbols")?;
        let refresh = params::bool_or(p, "refresh", false)?;
        let meta = self.market_data.quote_capabilities_with_meta(&symbols, refresh).await?;
        Ok(json!({
            "capabilities": meta.capabilities,
            "cache": { "cache_age_ms": meta.cache_age_ms },
        }))
    }

    async fn market_history(&self, p: &Map<String, Value>) -> Result<Value, BrokerError> {
        let symbol = params::string(p, "symbol")?.trim().to_uppercase();
        let period = params::parse(p, "period")?;
        let bar = params::parse(p, "bar")?;
        let rth_only = params::bool_or(p, "rth_only", false)?;
        let strict = params::bool_or(p, "strict", false)?;
        let bars = self.provider.history(&symbol, period, bar, rth_only).await?;
        if strict && bars.is_empty() {
            return Err(BrokerError::new(
                ErrorCode::InvalidSymbol,
                format!("no history available for {symbol}"),
            ));
        }
        Ok(json!({ "bars": bars }))
    }

    async fn market_chain(&self, p: &Map<String, Value>) -> Result<Value, BrokerError> {
        let symbol = params::string(p, "symbol")?.trim().to_uppercase();
        let expiry = params::string_opt(p, "expiry")?;
        let strike_range = match params::string_opt(p, "strike_range")? {
            Some(raw) => Some(
                model::parse_strike_range(&raw)
                    .map_err(|_| params::invalid("strike_range", "expected \"low:high\""))?,
            ),
            None => None,
        };
        let option_type = params::parse_opt(p, "type")?;
        let limit = params::usize_opt(p, "limit")?;
        let offset = params::usize_opt(p, "offset")?.unwrap_or(0);
        let fields = params::string_vec_opt(p, "fields")?;
        let strict = params::bool_or(p, "strict", false)?;

        let query = OptionChainQuery {
            symbol: symbol.clone(),
            expiry,
            strike_range,
            option_type,
            limit,
            offset: Some(offset),
            fields: if fields.is_empty() { None } else { Some(fields.clone()) },
            strict,
        };
        let (underlying_price, entries) = self.provider.option_chain(&query).await?;
        if strict && entries.is_empty() {
            return Err(BrokerError::new(
                ErrorCode::InvalidSymbol,
                format!("no option chain entries for {symbol}"),
            ));
        }
        let total = entries.len();
        let page: Vec<_> = entries
            .into_iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .collect();
        let returned = page.len();
        Ok(json!({
            "symbol": symbol,
            "underlying_price": underlying_price,
            "entries": page,
            "pagination": { "total": total, "offset": offset, "limit": limit, "returned": returned },
            "fields": if fields.is_empty() { Value::Null } else { json!(fields) },
        }))
    }

    async fn portfolio_positions(&self, p: &Map<String, Value>) -> Result<Value, BrokerError> {
        let symbol = params::string_opt(p, "symbol")?;
        let positions = self.provider.positions(symbol.as_deref()).await?;
        Ok(json!({ "positions": positions }))
    }

    async fn portfolio_balance(&self) -> Result<Value, BrokerError> {
        Ok(json!({ "balance": self.provider.balance().await? }))
    }

    async fn portfolio_pnl(&self) -> Result<Value, BrokerError> {
        Ok(json!({ "pnl": self.provider.pnl().await? }))
    }

    async fn portfolio_exposure(&self, p: &Map<String, Value>) -> Result<Value, BrokerError> {
        let by: ExposureBy = params::parse(p, "by")?;
        let exposure = self.provider.exposure(by).await?;
        Ok(json!({ "exposure": exposure, "by": by }))
    }

    async fn portfolio_snapshot(&self, p: &Map<String, Value>) -> Result<Value, BrokerError> {
        let symbols = params::string_vec_opt(p, "symbols")?;
        let intent: QuoteIntent = params::parse_opt(p, "intent")?.unwrap_or_default();
        let force = params::bool_or(p, "force", false)?;
        let exposure_by: ExposureBy = params::parse_opt(p, "exposure_by")?.unwrap_or(ExposureBy::Symbol);

        let quotes = if symbols.is_empty() {
            Vec::new()
        } else {
            self.market_data.quote(&symbols, force, intent).await?
        };
        let positions = self.provider.positions(None).await?;
        let balance = self.provider.balance().await?;
        let pnl = self.provider.pnl().await?;
        let exposure = self.provider.exposure(exposure_by).await.unwrap_or_default();
        let connection = self.provider.status().await;
        let mut risk = self.risk.lock().unwrap_or_else(|e| e.into_inner());
        let risk_limits = risk.snapshot();
        drop(risk);

        Ok(json!({
            "quotes": quotes,
            "positions": positions,
            "balance": balance,
            "pnl": pnl,
            "exposure": exposure,
            "risk_limits": risk_limits,
            "connection": connection,
        }))
    }

    fn build_order_request(p: &Map<String, Value>) -> Result<OrderRequest, BrokerError> {
        let side: OrderSide = params::parse(p, "side")?;
        let symbol = params::string(p, "symbol")?;
        let qty = params::decimal(p, "qty")?;
        let limit = params::decimal_opt(p, "limit")?;
        let stop = params::decimal_opt(p, "stop")?;
        let tif: TimeInForce = params::parse_opt(p, "tif")?.unwrap_or(TimeInForce::Day);
        let client_order_id = match params::string_opt(p, "client_order_id")? {
            Some(id) => Some(id),
            None => params::string_opt(p, "idempotency_key")?,
        };
        Ok(OrderRequest {
            side,
            symbol,
            qty,
            limit,
            stop,
            tif,
            client_order_id,
            tags: Default::default(),
        })
    }

    async fn order_place(&self, p: &Map<String, Value>) -> Result<Value, BrokerError> {
        let req = Self::build_order_request(p)?;
        let dry_run = params::bool_or(p, "dry_run", false)?;
        if dry_run {
            let preview = self.orders.dry_run(req).await?;
            return Ok(json!({
                "order": preview.order,
                "dry_run": preview.dry_run,
                "risk_check": preview.risk_check,
                "submit_allowed": preview.submit_allowed,
            }));
        }
        let order = self.orders.place_order(req).await?;
        Ok(json!({
            "order": order,
            "dry_run": false,
            "risk_check": order.risk_check_result,
            "submit_allowed": true,
        }))
    }

    async fn order_bracket(&self, p: &Map<String, Value>) -> Result<Value, BrokerError> {
        let side: OrderSide = params::parse(p, "side")?;
        let symbol = params::string(p, "symbol")?;
        let qty = params::decimal(p, "qty")?;
        let entry = params::decimal(p, "entry")?;
        let tp = params::decimal(p, "tp")?;
        let sl = params::decimal(p, "sl")?;
        let tif: TimeInForce = params::parse_opt(p, "tif")?.unwrap_or(TimeInForce::Day);
        let req = OrderRequest {
            side,
            symbol,
            qty,
            limit: Some(entry),
            stop: None,
            tif,
            client_order_id: None,
            tags: Default::default(),
        };
        let record = self.orders.place_bracket(req, tp, sl).await?;
        Ok(json!({
            "client_order_id": record.client_order_id,
            "ib_order_ids": record.broker_order_id.into_iter().collect::<Vec<_>>(),
            "status": record.status,
        }))
    }

    async fn order_status(&self, p: &Map<String, Value>) -> Result<Value, BrokerError> {
        let order_id = params::string(p, "order_id")?;
        let order = self
            .orders
            .order_status(&order_id)
            .await
            .ok_or_else(|| BrokerError::new(ErrorCode::InvalidArgs, format!("unknown order: {order_id}")))?;
        Ok(json!({ "order": order }))
    }

    /// Filtered by `status` (default `all`) and, when `since` is given, to
    /// records with a `submitted_at` at or after it — a pending order with
    /// no timestamp yet simply doesn't match a `since` filter.
    fn orders_list(&self, p: &Map<String, Value>) -> Result<Value, BrokerError> {
        let status = params::string_opt(p, "status")?.unwrap_or_else(|| "all".to_string());
        let filter = parse_status_filter(&status)?;
        let since = parse_since(p)?;
        let mut orders = self.orders.list_orders(filter);
        if let Some(since) = since {
            orders.retain(|o| o.submitted_at.is_some_and(|ts| ts >= since));
        }
        Ok(json!({ "orders": orders }))
    }

    async fn order_cancel(&self, p: &Map<String, Value>) -> Result<Value, BrokerError> {
        let order_id = params::string(p, "order_id")?;
        let result = self.orders.cancel_order(&order_id).await?;
        Ok(json!({
            "client_order_id": result.client_order_id,
            "cancelled": result.cancelled,
            "broker_order_id": result.broker_order_id,
        }))
    }

    /// `failed` is always empty: `OrderManager::cancel_all` returns only a
    /// count, with no per-order failure detail to report.
    async fn orders_cancel_all(&self, p: &Map<String, Value>) -> Result<Value, BrokerError> {
        let confirm = params::bool_or(p, "confirm", false)?;
        if !confirm {
            return Err(params::invalid("confirm", "must be true to cancel all open orders"));
        }
        let _json_mode = params::bool_or(p, "json_mode", false)?;
        let requested = self.orders.list_orders(StatusFilter::Active).len();
        let cancelled_count = self.orders.cancel_all().await?;
        Ok(json!({
            "cancelled": usize::try_from(cancelled_count).unwrap_or(usize::MAX) >= requested,
            "requested": requested,
            "cancelled_count": cancelled_count,
            "failed": Value::Array(Vec::new()),
        }))
    }

    fn fills_list(&self, p: &Map<String, Value>) -> Result<Value, BrokerError> {
        let symbol = params::string_opt(p, "symbol")?;
        let since = parse_since(p)?;
        let mut fills = self.orders.list_fills(symbol.as_deref());
        if let Some(since) = since {
            fills.retain(|f| f.timestamp >= since);
        }
        Ok(json!({ "fills": fills }))
    }

    async fn risk_check(&self, p: &Map<String, Value>) -> Result<Value, BrokerError> {
        let req = Self::build_order_request(p)?;
        let preview = self.orders.dry_run(req).await?;
        serde_json::to_value(preview.risk_check)
            .map_err(|e| BrokerError::new(ErrorCode::InternalError, e.to_string()))
    }

    fn risk_limits(&self) -> Result<Value, BrokerError> {
        let mut risk = self.risk.lock().unwrap_or_else(|e| e.into_inner());
        Ok(json!({ "limits": risk.snapshot() }))
    }

    fn risk_set(&self, p: &Map<String, Value>) -> Result<Value, BrokerError> {
        let param = params::string(p, "param")?;
        let value = p.get("value").cloned().ok_or_else(|| params::missing("value"))?;
        let mut risk = self.risk.lock().unwrap_or_else(|e| e.into_inner());
        let snapshot = risk.set_limit(&param, &value).map_err(risk_err)?;
        drop(risk);
        let _ = self.audit.log_risk_event(
            "limit_set",
            &json!({ "param": param, "value": value }),
        );
        Ok(json!({ "limits": snapshot }))
    }

    fn risk_halt(&self) -> Result<Value, BrokerError> {
        let mut risk = self.risk.lock().unwrap_or_else(|e| e.into_inner());
        risk.halt();
        drop(risk);
        let _ = self.audit.log_risk_event("risk.halt", &json!({ "reason": "operator" }));
        Ok(json!({ "halted": true }))
    }

    fn risk_resume(&self) -> Result<Value, BrokerError> {
        let mut risk = self.risk.lock().unwrap_or_else(|e| e.into_inner());
        risk.resume();
        drop(risk);
        let _ = self.audit.log_risk_event("risk.resume", &json!({}));
        Ok(json!({ "halted": false }))
    }

    fn risk_override(&self, p: &Map<String, Value>) -> Result<Value, BrokerError> {
        let param = params::string(p, "param")?;
        let value = p.get("value").cloned().ok_or_else(|| params::missing("value"))?;
        let duration_seconds = parse_duration_param(p)?;
        let reason = params::string(p, "reason")?;
        let mut risk = self.risk.lock().unwrap_or_else(|e| e.into_inner());
        let override_ = risk
            .override_limit(&param, &value, duration_seconds, &reason)
            .map_err(risk_err)?;
        drop(risk);
        let _ = self.audit.log_risk_event("override_created", &json!(override_));
        Ok(json!({ "override": override_ }))
    }

    async fn runtime_keepalive(&self, p: &Map<String, Value>) -> Result<Value, BrokerError> {
        self.monitors.beat();
        let latency_ms = match params::string_opt(p, "sent_at")? {
            Some(raw) => chrono::DateTime::parse_from_rfc3339(&raw)
                .ok()
                .map(|sent| chrono::Utc::now().signed_duration_since(sent).num_milliseconds().max(0)),
            None => None,
        };
        let connected = self.provider.is_connected().await;
        let halted = self.risk.lock().unwrap_or_else(|e| e.into_inner()).is_halted();
        Ok(json!({ "ok": true, "latency_ms": latency_ms, "connected": connected, "halted": halted }))
    }

    fn audit_commands(&self, p: &Map<String, Value>) -> Result<Value, BrokerError> {
        let filter = CommandFilter {
            source: params::string_opt(p, "source")?,
            since: parse_since(p)?,
            request_id: params::string_opt(p, "request_id")?,
        };
        let rows = self.audit.fetch_commands(&filter).map_err(audit_err)?;
        Ok(json!({ "commands": rows.into_iter().map(command_row_to_json).collect::<Vec<_>>() }))
    }

    fn audit_orders(&self, p: &Map<String, Value>) -> Result<Value, BrokerError> {
        let status = params::string_opt(p, "status")?
            .map(|s| OrderStatus::from_str(&s))
            .transpose()
            .map_err(|_| params::invalid("status", "unrecognized order status"))?;
        let filter = OrderFilter { status, since: parse_since(p)? };
        let orders = self.audit.fetch_orders(&filter).map_err(audit_err)?;
        Ok(json!({ "orders": orders }))
    }

    fn audit_risk(&self, p: &Map<String, Value>) -> Result<Value, BrokerError> {
        let event_type = params::string_opt(p, "event_type")?;
        let rows = self.audit.fetch_risk_events(event_type.as_deref()).map_err(audit_err)?;
        Ok(json!({ "risk_events": rows.into_iter().map(risk_event_row_to_json).collect::<Vec<_>>() }))
    }

    fn audit_export(&self, p: &Map<String, Value>) -> Result<Value, BrokerError> {
        let output = params::string(p, "output")?;
        let table_name = params::string(p, "table")?;
        let format = params::string_opt(p, "format")?.unwrap_or_else(|| "csv".to_string());
        if format != "csv" {
            return Err(params::invalid("format", "only \"csv\" is supported"));
        }
        let table = match table_name.as_str() {
            "orders" => AuditTable::Orders,
            "commands" => AuditTable::Commands,
            "risk" => AuditTable::Risk,
            other => return Err(params::invalid("table", format!("unknown table '{other}'"))),
        };
        let rows = self.audit.export_csv(table, std::path::Path::new(&output)).map_err(audit_err)?;
        Ok(json!({ "output": output, "rows": rows }))
    }
}

fn command_row_to_json(row: audit::CommandRow) -> Value {
    json!({
        "id": row.id,
        "ts": row.ts,
        "source": row.source,
        "command": row.command,
        "arguments_json": row.arguments_json,
        "result_code": row.result_code,
        "request_id": row.request_id,
    })
}

fn risk_event_row_to_json(row: audit::RiskEventRow) -> Value {
    json!({
        "id": row.id,
        "ts": row.ts,
        "event_type": row.event_type,
        "details_json": row.details_json,
    })
}

fn parse_since(p: &Map<String, Value>) -> Result<Option<chrono::DateTime<chrono::Utc>>, BrokerError> {
    match params::string_opt(p, "since")? {
        None => Ok(None),
        Some(raw) => chrono::DateTime::parse_from_rfc3339(&raw)
            .map(|dt| Some(dt.with_timezone(&chrono::Utc)))
            .map_err(|_| params::invalid("since", "expected an RFC3339 timestamp")),
    }
}

fn parse_duration_param(p: &Map<String, Value>) -> Result<u64, BrokerError> {
    match p.get("duration") {
        Some(Value::String(raw)) => RiskEngine::parse_duration(raw).map_err(risk_err),
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| params::invalid("duration", "expected a non-negative integer")),
        _ => Err(params::missing("duration")),
    }
}

fn parse_status_filter(raw: &str) -> Result<StatusFilter, BrokerError> {
    match raw.to_lowercase().as_str() {
        "all" => Ok(StatusFilter::All),
        "active" => Ok(StatusFilter::Active),
        "filled" => Ok(StatusFilter::Filled),
        "cancelled" => Ok(StatusFilter::Cancelled),
        _ => OrderStatus::from_str(raw)
            .map(StatusFilter::Exact)
            .map_err(|_| params::invalid("status", "one of: all, active, filled, cancelled")),
    }
}

fn risk_err(err: RiskError) -> BrokerError {
    let message = err.to_string();
    match err {
        RiskError::UnknownParam(_) | RiskError::InvalidValue { .. } | RiskError::NonNumericOverride(_)
        | RiskError::InvalidDuration(_) => BrokerError::new(ErrorCode::InvalidArgs, message),
        RiskError::Overflow(_) => BrokerError::new(ErrorCode::InternalError, message),
    }
}

fn audit_err(err: audit::AuditError) -> BrokerError {
    BrokerError::new(err.code(), err.to_string())
}

/// `INVALID_ARGS` for an unrecognized command, with a Levenshtein-nearest
/// suggestion from [`COMMANDS`] when one is close enough to be useful (§7).
pub fn unknown_command(command: &str) -> BrokerError {
    let err = BrokerError::new(ErrorCode::InvalidArgs, format!("unknown command: {command}"));
    match suggest_command(command) {
        Some(suggestion) => err.with_suggestion(format!("did you mean \"{suggestion}\"?")),
        None => err,
    }
}

/// The closest known command to `unknown`, if any edit distance is small
/// relative to the command's own length.
#[must_use]
pub fn suggest_command(unknown: &str) -> Option<&'static str> {
    COMMANDS
        .iter()
        .map(|&candidate| (candidate, levenshtein(unknown, candidate)))
        .filter(|(candidate, distance)| *distance <= (candidate.len() / 2).max(2))
        .min_by_key(|(_, distance)| *distance)
        .map(|(candidate, _)| candidate)
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut prev_diag = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let tmp = row[j + 1];
            row[j + 1] = if ca == cb {
                prev_diag
            } else {
                1 + prev_diag.min(row[j]).min(row[j + 1])
            };
            prev_diag = tmp;
        }
    }
    row[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggests_the_closest_known_command() {
        assert_eq!(suggest_command("daemon.stats"), Some("daemon.status"));
        assert_eq!(suggest_command("order.plce"), Some("order.place"));
    }

    #[test]
    fn refuses_to_suggest_when_nothing_is_close() {
        assert_eq!(suggest_command("xyzzy"), None);
    }

    #[test]
    fn status_filter_accepts_named_buckets_and_exact_statuses() {
        assert!(matches!(parse_status_filter("active").unwrap(), StatusFilter::Active));
        assert!(matches!(
            parse_status_filter("Filled").unwrap(),
            StatusFilter::Exact(OrderStatus::Filled)
        ));
        assert!(parse_status_filter("bogus").is_err());
    }

    #[test]
    fn risk_error_maps_to_invalid_args_except_overflow() {
        assert_eq!(risk_err(RiskError::UnknownParam("x".into())).code, ErrorCode::InvalidArgs);
        assert_eq!(risk_err(RiskError::Overflow("duration")).code, ErrorCode::InternalError);
    }
}
