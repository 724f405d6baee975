//! `OrderManager`: the order lifecycle state machine (§4.6).

use crate::error::OrderError;
use crate::normalizer::{DefaultStatusNormalizer, StatusNormalizer};
use audit::AuditLog;
use chrono::Utc;
use model::{
    BrokerError, BrokerProvider, ErrorCode, Event, FillRecord, OrderEvent, OrderEventSink,
    OrderRecord, OrderRequest, OrderStatus, RiskCheckResult, RiskContext, Topic,
};
use risk::RiskEngine;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Status filter accepted by `list_orders` (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    /// Every local record.
    All,
    /// Any of the four `ACTIVE` statuses.
    Active,
    /// `Filled` only.
    Filled,
    /// `Cancelled` only.
    Cancelled,
    /// A single literal `OrderStatus`.
    Exact(OrderStatus),
}

impl StatusFilter {
    fn matches(self, status: OrderStatus) -> bool {
        match self {
            Self::All => true,
            Self::Active => status.is_active(),
            Self::Filled => status == OrderStatus::Filled,
            Self::Cancelled => status == OrderStatus::Cancelled,
            Self::Exact(s) => s == status,
        }
    }
}

/// Result of a successful `cancel_order` call (§4.6).
#[derive(Debug, Clone)]
pub struct CancelResult {
    /// The order's client id.
    pub client_order_id: String,
    /// Whether the cancel was accepted.
    pub cancelled: bool,
    /// Broker order id, if the record had one.
    pub broker_order_id: Option<String>,
}

/// Result of a dry-run order preview (§4.6).
#[derive(Debug, Clone)]
pub struct DryRunResult {
    /// The preview record; never submitted.
    pub order: OrderRecord,
    /// Always `true`, carried for wire-shape parity with a real placement.
    pub dry_run: bool,
    /// The non-mutating risk check result.
    pub risk_check: RiskCheckResult,
    /// Whether a real `place_order` would be allowed to proceed.
    pub submit_allowed: bool,
}

/// Owns in-memory order/fill state and coordinates risk checks, broker
/// calls, audit writes, and event emission for every order operation (§4.6).
pub struct OrderManager {
    provider: Arc<dyn BrokerProvider>,
    risk: Arc<Mutex<RiskEngine>>,
    audit: Arc<AuditLog>,
    events: broadcast::Sender<Event>,
    normalizer: Box<dyn StatusNormalizer>,
    records: Mutex<BTreeMap<String, OrderRecord>>,
    fills: Mutex<Vec<FillRecord>>,
}

impl std::fmt::Debug for OrderManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderManager").field("provider", &self.provider.name()).finish()
    }
}

impl OrderManager {
    /// Construct a manager with the default (§4.6-table) status normalizer.
    #[must_use]
    pub fn new(
        provider: Arc<dyn BrokerProvider>,
        risk: Arc<Mutex<RiskEngine>>,
        audit: Arc<AuditLog>,
        events: broadcast::Sender<Event>,
    ) -> Self {
        Self::with_normalizer(provider, risk, audit, events, Box::new(DefaultStatusNormalizer))
    }

    /// Construct a manager with a provider-specific status normalizer.
    #[must_use]
    pub fn with_normalizer(
        provider: Arc<dyn BrokerProvider>,
        risk: Arc<Mutex<RiskEngine>>,
        audit: Arc<AuditLog>,
        events: broadcast::Sender<Event>,
        normalizer: Box<dyn StatusNormalizer>,
    ) -> Self {
        Self {
            provider,
            risk,
            audit,
            events,
            normalizer,
            records: Mutex::new(BTreeMap::new()),
            fills: Mutex::new(Vec::new()),
        }
    }

    fn emit(&self, topic: Topic, payload: Value) {
        let _ = self.events.send(Event::new(topic, payload));
    }

    fn lookup(&self, client_order_id: &str) -> Option<OrderRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(client_order_id)
            .cloned()
    }

    fn insert(&self, record: OrderRecord) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(record.client_order_id.clone(), record);
    }

    async fn build_risk_context(&self, req: &OrderRequest) -> Result<RiskContext, BrokerError> {
        let nlv = self.provider.balance().await?;
        let daily_pnl = self.provider.pnl().await?;
        let positions = self.provider.positions(None).await.unwrap_or_default();
        let open_orders = u32::try_from(
            self.records
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .values()
                .filter(|r| r.status.is_active())
                .count(),
        )
        .unwrap_or(u32::MAX);

        let mut mark_prices = BTreeMap::new();
        mark_prices.insert(req.symbol.clone(), req.mark(None));
        let mut position_values = BTreeMap::new();
        let mut sector_map = BTreeMap::new();
        let mut sector_exposure: BTreeMap<String, Decimal> = BTreeMap::new();
        for p in &positions {
            position_values.insert(p.symbol.clone(), p.market_value);
            if let Some(sector) = &p.sector {
                sector_map.insert(p.symbol.clone(), sector.clone());
                let entry = sector_exposure.entry(sector.clone()).or_insert(Decimal::ZERO);
                *entry = entry.checked_add(p.market_value).unwrap_or(*entry);
            }
        }

        Ok(RiskContext {
            nlv,
            daily_pnl,
            open_orders,
            mark_prices,
            position_values,
            sector_map,
            sector_exposure,
        })
    }

    fn blank_record(req: &OrderRequest, client_order_id: &str, risk_check: RiskCheckResult) -> OrderRecord {
        OrderRecord {
            client_order_id: client_order_id.to_string(),
            broker_order_id: None,
            symbol: req.symbol.clone(),
            side: req.side,
            qty: req.qty,
            order_type: req.order_type(),
            limit: req.limit,
            stop: req.stop,
            tif: req.tif,
            status: OrderStatus::PendingSubmit,
            submitted_at: None,
            filled_at: None,
            fill_qty: Decimal::ZERO,
            fill_price: None,
            commission: Decimal::ZERO,
            risk_check_result: risk_check,
        }
    }

    /// Place a single order (§4.6). Idempotent on a known `client_order_id`.
    pub async fn place_order(&self, mut req: OrderRequest) -> Result<OrderRecord, OrderError> {
        req.normalize();
        if let Some(existing_id) = req.client_order_id.clone() {
            if let Some(existing) = self.lookup(&existing_id) {
                return Ok(existing);
            }
        }
        let client_order_id = req.client_order_id.clone().unwrap_or_else(generate_client_order_id);

        let ctx = self.build_risk_context(&req).await?;
        let risk_check = {
            let mut risk = self.risk.lock().unwrap_or_else(|e| e.into_inner());
            risk.assert_order(&req, &ctx)?
        };

        let mut record = Self::blank_record(&req, &client_order_id, risk_check);
        self.insert(record.clone());

        let ack = match self.provider.place_order(&req, &client_order_id).await {
            Ok(ack) => ack,
            Err(err) => {
                record.status = OrderStatus::Rejected;
                self.insert(record.clone());
                self.audit.upsert_order(&record)?;
                return Err(err.into());
            }
        };

        record.broker_order_id = Some(ack.broker_order_id);
        record.status = self.normalizer.normalize(&ack.raw_status);
        record.submitted_at = Some(Utc::now());
        self.insert(record.clone());
        self.audit.upsert_order(&record)?;
        self.emit(Topic::Orders, serde_json::to_value(&record).unwrap_or(Value::Null));
        Ok(record)
    }

    /// Place an entry/target/stop bracket (§4.6). One risk check on the entry leg.
    pub async fn place_bracket(
        &self,
        mut entry: OrderRequest,
        take_profit: Decimal,
        stop_loss: Decimal,
    ) -> Result<OrderRecord, OrderError> {
        entry.normalize();
        let client_order_id = entry.client_order_id.clone().unwrap_or_else(generate_client_order_id);

        let ctx = self.build_risk_context(&entry).await?;
        let risk_check = {
            let mut risk = self.risk.lock().unwrap_or_else(|e| e.into_inner());
            risk.assert_order(&entry, &ctx)?
        };

        let mut record = Self::blank_record(&entry, &client_order_id, risk_check);
        self.insert(record.clone());

        let result = self
            .provider
            .place_bracket(&entry, take_profit, stop_loss)
            .await;
        let bracket = match result {
            Ok(bracket) => bracket,
            Err(err) => {
                record.status = OrderStatus::Rejected;
                self.insert(record.clone());
                self.audit.upsert_order(&record)?;
                return Err(err.into());
            }
        };

        record.broker_order_id = bracket.broker_order_ids.first().cloned();
        record.status = bracket.status;
        record.submitted_at = Some(Utc::now());
        self.insert(record.clone());
        self.audit.upsert_order(&record)?;
        self.emit(Topic::Orders, serde_json::to_value(&record).unwrap_or(Value::Null));
        Ok(record)
    }

    /// Apply a provider-driven status update (§4.6). Unknown ids are silently
    /// ignored on the wire, but logged at debug level to `connection_events`
    /// so an operator can see the provider is relaying orders we don't own.
    pub fn update_order_status(
        &self,
        client_order_id: &str,
        status: OrderStatus,
        filled_qty: Option<Decimal>,
        avg_fill_price: Option<Decimal>,
    ) {
        let Some(mut record) = self.lookup(client_order_id) else {
            tracing::debug!(client_order_id, "status update for unknown order");
            let _ = self.audit.log_connection_event(
                "unknown_order_status",
                &serde_json::json!({ "client_order_id": client_order_id, "status": status.to_string() }),
            );
            return;
        };
        record.status = self.normalizer.normalize(&status.to_string());
        if record.status == OrderStatus::Filled {
            record.filled_at = Some(Utc::now());
            if let Some(qty) = filled_qty {
                record.fill_qty = qty;
            }
            record.fill_price = avg_fill_price.or(record.fill_price);
        }
        self.insert(record.clone());
        if let Err(err) = self.audit.upsert_order(&record) {
            tracing::error!(%err, "failed to persist order status update");
        }
        self.emit(Topic::Orders, serde_json::to_value(&record).unwrap_or(Value::Null));
    }

    /// A sink a `BrokerProvider` can be given to route its own pushed events
    /// back into this manager (§4.6, §9), routing status pushes into
    /// `update_order_status` and execution reports into `add_fill`.
    #[must_use]
    pub fn event_sink(self: &Arc<Self>) -> OrderEventSink {
        let manager = Arc::clone(self);
        Arc::new(move |event: OrderEvent| match event {
            OrderEvent::Status {
                client_order_id,
                status,
                filled_qty,
                avg_fill_price,
            } => {
                manager.update_order_status(&client_order_id, status, filled_qty, avg_fill_price);
            }
            OrderEvent::Fill(fill) => {
                if let Err(err) = manager.add_fill(fill) {
                    tracing::error!(%err, "failed to record provider-pushed fill");
                }
            }
        })
    }

    /// Append a fill (§4.6). Deduplicated by `fill_id` at the audit layer.
    pub fn add_fill(&self, fill: FillRecord) -> Result<(), OrderError> {
        let is_new = self.audit.log_fill(&fill)?;
        if is_new {
            self.fills.lock().unwrap_or_else(|e| e.into_inner()).push(fill.clone());
            self.emit(Topic::Fills, serde_json::to_value(&fill).unwrap_or(Value::Null));
        }
        Ok(())
    }

    /// Cancel a single order (§4.6).
    pub async fn cancel_order(&self, client_order_id: &str) -> Result<CancelResult, OrderError> {
        let Some(mut record) = self.lookup(client_order_id) else {
            return Err(OrderError::UnknownOrder(client_order_id.to_string()));
        };
        let Some(broker_order_id) = record.broker_order_id.clone() else {
            return Err(BrokerError::new(
                ErrorCode::InvalidArgs,
                "order has no broker order id yet",
            )
            .into());
        };
        self.provider.cancel_order(&broker_order_id).await?;
        record.status = OrderStatus::Cancelled;
        self.insert(record.clone());
        self.audit.upsert_order(&record)?;
        self.emit(Topic::Orders, serde_json::to_value(&record).unwrap_or(Value::Null));
        Ok(CancelResult {
            client_order_id: client_order_id.to_string(),
            cancelled: true,
            broker_order_id: Some(broker_order_id),
        })
    }

    /// Cancel every open order (§4.6).
    pub async fn cancel_all(&self) -> Result<u32, OrderError> {
        let count = self.provider.cancel_all().await?;
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let active_ids: Vec<String> = records
            .values()
            .filter(|r| r.status.is_active())
            .map(|r| r.client_order_id.clone())
            .collect();
        for id in &active_ids {
            if let Some(record) = records.get_mut(id) {
                record.status = OrderStatus::Cancelled;
                let _ = self.audit.upsert_order(record);
            }
        }
        drop(records);
        self.emit(Topic::Orders, serde_json::json!({ "cancel_all": true, "count": count }));
        Ok(count)
    }

    /// The local record for `client_order_id`, falling back to the
    /// provider's trade list when the id isn't locally known (§4.6).
    pub async fn order_status(&self, client_order_id: &str) -> Option<OrderRecord> {
        if let Some(record) = self.lookup(client_order_id) {
            return Some(record);
        }
        let trades = self.provider.trades().await.ok()?;
        trades
            .iter()
            .find(|(id, _)| id == client_order_id)
            .map(|(_, status)| {
                let mut record = OrderRecord {
                    client_order_id: client_order_id.to_string(),
                    broker_order_id: Some(client_order_id.to_string()),
                    symbol: String::new(),
                    side: model::OrderSide::Buy,
                    qty: Decimal::ZERO,
                    order_type: model::OrderType::Market,
                    limit: None,
                    stop: None,
                    tif: model::TimeInForce::Day,
                    status: *status,
                    submitted_at: None,
                    filled_at: None,
                    fill_qty: Decimal::ZERO,
                    fill_price: None,
                    commission: Decimal::ZERO,
                    risk_check_result: RiskCheckResult::default(),
                };
                record.status = *status;
                record
            })
    }

    /// Local records matching `filter` (§4.6).
    #[must_use]
    pub fn list_orders(&self, filter: StatusFilter) -> Vec<OrderRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|r| filter.matches(r.status))
            .cloned()
            .collect()
    }

    /// Local fills, optionally filtered by symbol (§4.6).
    #[must_use]
    pub fn list_fills(&self, symbol: Option<&str>) -> Vec<FillRecord> {
        let local = self.fills.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let from_audit = self.audit.fetch_fills(symbol).unwrap_or_default();
        let mut merged: BTreeMap<String, FillRecord> = BTreeMap::new();
        for fill in from_audit.into_iter().chain(local) {
            merged.insert(fill.fill_id.clone(), fill);
        }
        merged.into_values().collect()
    }

    /// Preview an order without submitting it (§4.6): runs `risk.check_order`
    /// (not `assert_order`), records a `check_passed`/`check_failed` audit
    /// event, and never calls the provider.
    pub async fn dry_run(&self, mut req: OrderRequest) -> Result<DryRunResult, OrderError> {
        req.normalize();
        let ctx = self.build_risk_context(&req).await?;
        let risk_check = {
            let mut risk = self.risk.lock().unwrap_or_else(|e| e.into_inner());
            risk.check_order(&req, &ctx)
        };
        let event_type = if risk_check.ok { "check_passed" } else { "check_failed" };
        let _ = self
            .audit
            .log_risk_event(event_type, &serde_json::to_value(&risk_check).unwrap_or(Value::Null));

        let client_order_id = req.client_order_id.clone().unwrap_or_else(generate_client_order_id);
        let order = Self::blank_record(&req, &client_order_id, risk_check.clone());
        Ok(DryRunResult {
            order,
            dry_run: true,
            submit_allowed: risk_check.ok,
            risk_check,
        })
    }
}

fn generate_client_order_id() -> String {
    format!("ord-{}", uuid::Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;
    use audit::AuditLog;
    use broker::PaperProvider;
    use model::{OrderSide, TimeInForce};
    use risk::{RiskConfig, RiskEngine};
    use rust_decimal_macros::dec;

    fn manager() -> OrderManager {
        let provider: Arc<dyn BrokerProvider> = Arc::new(PaperProvider::new());
        let risk = Arc::new(Mutex::new(RiskEngine::new(RiskConfig::default())));
        let audit = Arc::new(AuditLog::new_in_memory().expect("in-memory audit"));
        let (tx, _rx) = broadcast::channel(16);
        OrderManager::new(provider, risk, audit, tx)
    }

    fn request(symbol: &str, client_order_id: Option<&str>) -> OrderRequest {
        OrderRequest {
            side: OrderSide::Buy,
            symbol: symbol.to_string(),
            qty: dec!(10),
            limit: Some(dec!(100)),
            stop: None,
            tif: TimeInForce::Day,
            client_order_id: client_order_id.map(str::to_string),
            tags: Default::default(),
        }
    }

    #[tokio::test]
    async fn place_order_round_trips_and_is_idempotent() {
        let mgr = manager();
        let req = request("AAPL", Some("idemp-1"));
        let first = mgr.place_order(req.clone()).await.expect("placement succeeds");
        assert_eq!(first.client_order_id, "idemp-1");
        assert!(first.broker_order_id.is_some());

        let second = mgr.place_order(req).await.expect("idempotent replay");
        assert_eq!(second.client_order_id, first.client_order_id);
        assert_eq!(second.broker_order_id, first.broker_order_id);
    }

    #[tokio::test]
    async fn cancel_order_transitions_local_record() {
        let mgr = manager();
        let placed = mgr
            .place_order(request("MSFT", Some("cancel-me")))
            .await
            .expect("placement succeeds");
        assert!(placed.status.is_active());

        let result = mgr.cancel_order("cancel-me").await.expect("cancel succeeds");
        assert!(result.cancelled);
        let record = mgr.lookup("cancel-me").expect("record still present");
        assert_eq!(record.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancel_order_rejects_unknown_id() {
        let mgr = manager();
        let err = mgr.cancel_order("does-not-exist").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgs);
    }

    #[tokio::test]
    async fn dry_run_never_calls_the_provider() {
        let mgr = manager();
        let preview = mgr
            .dry_run(request("TSLA", None))
            .await
            .expect("dry run succeeds");
        assert!(preview.dry_run);
        assert!(preview.submit_allowed);
        assert!(preview.order.broker_order_id.is_none());
        assert!(mgr.list_orders(StatusFilter::All).is_empty());
    }

    #[test]
    fn add_fill_dedups_by_fill_id() {
        let mgr = manager();
        let fill = model::FillRecord {
            fill_id: "fill-1".to_string(),
            client_order_id: "idemp-1".to_string(),
            broker_order_id: Some("b-1".to_string()),
            symbol: "AAPL".to_string(),
            qty: dec!(10),
            price: dec!(100),
            commission: dec!(1),
            timestamp: Utc::now(),
        };
        mgr.add_fill(fill.clone()).expect("first insert");
        mgr.add_fill(fill).expect("duplicate insert is a no-op");
        assert_eq!(mgr.list_fills(None).len(), 1);
    }

    #[tokio::test]
    async fn provider_pushed_fill_transitions_the_local_record() {
        let provider = Arc::new(PaperProvider::new());
        let dyn_provider: Arc<dyn BrokerProvider> = provider.clone();
        let risk = Arc::new(Mutex::new(RiskEngine::new(RiskConfig::default())));
        let audit = Arc::new(AuditLog::new_in_memory().expect("in-memory audit"));
        let (tx, _rx) = broadcast::channel(16);
        let mgr = Arc::new(OrderManager::new(dyn_provider, risk, audit, tx));
        provider.set_order_event_sink(mgr.event_sink());

        let placed = mgr
            .place_order(request("AAPL", Some("push-fill")))
            .await
            .expect("placement succeeds");
        let broker_order_id = placed.broker_order_id.expect("placed order has a broker id");

        provider
            .report_fill(&broker_order_id, dec!(101), dec!(1))
            .expect("broker order id is known to the book");

        let record = mgr.lookup("push-fill").expect("record still present");
        assert_eq!(record.status, OrderStatus::Filled);
        assert_eq!(record.fill_qty, dec!(10));
        assert_eq!(record.fill_price, Some(dec!(101)));
        assert_eq!(mgr.list_fills(None).len(), 1);
    }

    #[tokio::test]
    async fn list_orders_filters_by_status() {
        let mgr = manager();
        mgr.place_order(request("AAPL", Some("a")))
            .await
            .expect("placement succeeds");
        mgr.cancel_order("a").await.expect("cancel succeeds");
        mgr.place_order(request("MSFT", Some("b")))
            .await
            .expect("placement succeeds");

        assert_eq!(mgr.list_orders(StatusFilter::Cancelled).len(), 1);
        assert_eq!(mgr.list_orders(StatusFilter::All).len(), 2);
    }
}
