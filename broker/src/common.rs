//! Shared in-memory broker-side bookkeeping used by every provider in this
//! crate. A real adapter's wire protocol differs (IB's socket framing vs.
//! E*Trade's REST calls); what they share is the shape of the state they
//! track locally between provider round-trips: quotes, positions, orders,
//! and fills. Centralizing it here keeps each provider file focused on its
//! actual point of difference (session lifecycle, capability set).

use chrono::Utc;
use model::{
    Bar, FillRecord, OrderEvent, OrderEventSink, OrderRequest, OrderStatus, PlacementAck,
    PortfolioPosition, Quote, QuoteMeta,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// A broker-side order record, as the provider itself sees it (distinct
/// from `model::OrderRecord`, which is the order manager's view).
#[derive(Debug, Clone)]
pub struct BrokerSideOrder {
    /// Broker-assigned id, e.g. `"1001"`.
    pub broker_order_id: String,
    /// The client-chosen id this order was placed under.
    pub client_order_id: String,
    pub symbol: String,
    pub status: OrderStatus,
    pub qty: Decimal,
}

/// In-memory book shared by every provider: quotes, positions, orders, fills.
/// `event_sink`, when registered, is invoked whenever this book itself
/// changes an order's status or records a fill, standing in for a
/// provider's own session pushing order-status/execution events (§9).
pub struct Book {
    pub quotes: Mutex<BTreeMap<String, Quote>>,
    pub bars: Mutex<BTreeMap<String, Vec<Bar>>>,
    pub positions: Mutex<Vec<PortfolioPosition>>,
    pub balance: Mutex<Decimal>,
    pub pnl: Mutex<Decimal>,
    pub orders: Mutex<BTreeMap<String, BrokerSideOrder>>,
    pub fills: Mutex<Vec<FillRecord>>,
    next_order_id: Mutex<u64>,
    next_fill_id: Mutex<u64>,
    event_sink: Mutex<Option<OrderEventSink>>,
}

impl std::fmt::Debug for Book {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Book")
            .field("orders", &self.orders)
            .field("fills", &self.fills)
            .finish()
    }
}

impl Default for Book {
    fn default() -> Self {
        Self {
            quotes: Mutex::new(BTreeMap::new()),
            bars: Mutex::new(BTreeMap::new()),
            positions: Mutex::new(Vec::new()),
            balance: Mutex::new(dec!(100_000)),
            pnl: Mutex::new(Decimal::ZERO),
            orders: Mutex::new(BTreeMap::new()),
            fills: Mutex::new(Vec::new()),
            next_order_id: Mutex::new(1000),
            next_fill_id: Mutex::new(1),
            event_sink: Mutex::new(None),
        }
    }
}

impl Book {
    /// Seed or overwrite a symbol's quote, for tests and for a provider's
    /// own market-data feed to push updates into.
    pub fn set_quote(&self, quote: Quote) {
        let mut quotes = self.quotes.lock().unwrap_or_else(|e| e.into_inner());
        quotes.insert(quote.symbol.clone(), quote);
    }

    /// Look up cached quotes for the requested symbols, in order, skipping
    /// symbols this book has never seen.
    pub fn get_quotes(&self, symbols: &[String]) -> Vec<Quote> {
        let quotes = self.quotes.lock().unwrap_or_else(|e| e.into_inner());
        symbols.iter().filter_map(|s| quotes.get(s).cloned()).collect()
    }

    /// A best-effort live quote for a symbol this book has never been told
    /// about: a flat quote at $100 with no live fields, useful as a
    /// deterministic placeholder so `quote()` never 500s on an unknown
    /// but syntactically valid symbol.
    pub fn synthesize_quote(symbol: &str) -> Quote {
        Quote {
            symbol: symbol.to_string(),
            bid: Some(dec!(99.95)),
            ask: Some(dec!(100.05)),
            last: Some(dec!(100.00)),
            volume: Some(dec!(1000)),
            timestamp: Utc::now(),
            exchange: "SMART".to_string(),
            currency: "USD".to_string(),
            meta: QuoteMeta::live(
                ["bid", "ask", "last", "volume"]
                    .iter()
                    .map(|s| (*s).to_string())
                    .collect(),
            ),
        }
    }

    /// Record a new broker-side order and return its assigned id and
    /// initial status (always `"Submitted"` from this book's perspective).
    pub fn place_order(&self, req: &OrderRequest, client_order_id: &str) -> PlacementAck {
        let mut next_id = self.next_order_id.lock().unwrap_or_else(|e| e.into_inner());
        let broker_order_id = next_id.to_string();
        *next_id = next_id.saturating_add(1);
        drop(next_id);

        let mut orders = self.orders.lock().unwrap_or_else(|e| e.into_inner());
        orders.insert(
            broker_order_id.clone(),
            BrokerSideOrder {
                broker_order_id: broker_order_id.clone(),
                client_order_id: client_order_id.to_string(),
                symbol: req.symbol.clone(),
                status: OrderStatus::Submitted,
                qty: req.qty,
            },
        );
        PlacementAck {
            broker_order_id,
            raw_status: "Submitted".to_string(),
        }
    }

    /// Cancel a broker-side order by id, returning whether it existed.
    pub fn cancel_order(&self, broker_order_id: &str) -> bool {
        let mut orders = self.orders.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(order) = orders.get_mut(broker_order_id) {
            order.status = OrderStatus::Cancelled;
            let client_order_id = order.client_order_id.clone();
            drop(orders);
            self.notify_status(&client_order_id, OrderStatus::Cancelled, None, None);
            true
        } else {
            false
        }
    }

    /// Cancel every order still in an active state; returns the count cancelled.
    pub fn cancel_all(&self) -> u32 {
        let mut orders = self.orders.lock().unwrap_or_else(|e| e.into_inner());
        let mut count: u32 = 0;
        let mut cancelled = Vec::new();
        for order in orders.values_mut() {
            if order.status.is_active() {
                order.status = OrderStatus::Cancelled;
                count = count.saturating_add(1);
                cancelled.push(order.client_order_id.clone());
            }
        }
        drop(orders);
        for client_order_id in cancelled {
            self.notify_status(&client_order_id, OrderStatus::Cancelled, None, None);
        }
        count
    }

    /// Register where this book's own order-status/fill transitions go.
    /// Stands in for a provider's session wiring its push events (§9).
    pub fn set_event_sink(&self, sink: OrderEventSink) {
        *self.event_sink.lock().unwrap_or_else(|e| e.into_inner()) = Some(sink);
    }

    fn notify_status(
        &self,
        client_order_id: &str,
        status: OrderStatus,
        filled_qty: Option<Decimal>,
        avg_fill_price: Option<Decimal>,
    ) {
        let sink = self.event_sink.lock().unwrap_or_else(|e| e.into_inner()).clone();
        if let Some(sink) = sink {
            sink(OrderEvent::Status {
                client_order_id: client_order_id.to_string(),
                status,
                filled_qty,
                avg_fill_price,
            });
        }
    }

    /// Report a full fill against a broker-side order, transitioning it to
    /// `Filled` and pushing both a status event and a fill event through the
    /// registered sink. Used by scripted/test providers and by the
    /// deterministic paths that stand in for a real broker's execution feed.
    pub fn report_fill(
        &self,
        broker_order_id: &str,
        price: Decimal,
        commission: Decimal,
    ) -> Option<FillRecord> {
        let mut orders = self.orders.lock().unwrap_or_else(|e| e.into_inner());
        let order = orders.get_mut(broker_order_id)?;
        order.status = OrderStatus::Filled;
        let client_order_id = order.client_order_id.clone();
        let symbol = order.symbol.clone();
        let qty = order.qty;
        drop(orders);

        let mut next_fill_id = self.next_fill_id.lock().unwrap_or_else(|e| e.into_inner());
        let fill_id = format!("fill-{next_fill_id}");
        *next_fill_id = next_fill_id.saturating_add(1);
        drop(next_fill_id);

        let record = FillRecord {
            fill_id,
            client_order_id: client_order_id.clone(),
            broker_order_id: Some(broker_order_id.to_string()),
            symbol,
            qty,
            price,
            commission,
            timestamp: Utc::now(),
        };
        self.fills.lock().unwrap_or_else(|e| e.into_inner()).push(record.clone());

        self.notify_status(&client_order_id, OrderStatus::Filled, Some(qty), Some(price));
        let sink = self.event_sink.lock().unwrap_or_else(|e| e.into_inner()).clone();
        if let Some(sink) = sink {
            sink(OrderEvent::Fill(record.clone()));
        }
        Some(record)
    }

    /// Snapshot of every tracked order as `(broker_order_id, status)`.
    pub fn trades(&self) -> Vec<(String, OrderStatus)> {
        let orders = self.orders.lock().unwrap_or_else(|e| e.into_inner());
        orders.values().map(|o| (o.broker_order_id.clone(), o.status)).collect()
    }

    /// Every fill this book has recorded, optionally filtered by id.
    pub fn fills(&self) -> Vec<FillRecord> {
        self.fills.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Open positions, optionally filtered to one symbol.
    pub fn positions(&self, symbol: Option<&str>) -> Vec<PortfolioPosition> {
        let positions = self.positions.lock().unwrap_or_else(|e| e.into_inner());
        match symbol {
            Some(s) => positions.iter().filter(|p| p.symbol == s).cloned().collect(),
            None => positions.clone(),
        }
    }
}
