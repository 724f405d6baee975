//! A deterministic in-memory broker, for tests and dry-running the daemon
//! without a real gateway (§4.4). Scripted: callers seed quotes, positions,
//! and fill outcomes directly on the book rather than the provider
//! simulating a remote session, mirroring the scripted-response style of
//! a mock exchange server used elsewhere in this corpus for testing.

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
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Always-on, always-connected test broker. `start`/`stop` toggle a flag so
/// tests can exercise `ensure_connected` failure paths without a network.
#[derive(Debug, Default)]
pub struct PaperProvider {
    book: Arc<Book>,
    connected: AtomicBool,
}

impl PaperProvider {
    /// A provider that starts already connected.
    #[must_use]
    pub fn new() -> Self {
        Self {
            book: Arc::new(Book::default()),
            connected: AtomicBool::new(true),
        }
    }

    /// Expose the book for test setup: seed quotes, positions, balance.
    #[must_use]
    pub fn book(&self) -> &Arc<Book> {
        &self.book
    }

    /// Force the next `ensure_connected` to fail, for monitor/reconnect tests.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Script a fill against an already-placed broker order id, pushing a
    /// status and fill event through the registered sink. Stands in for the
    /// execution report a real gateway would push on its own session.
    pub fn report_fill(
        &self,
        broker_order_id: &str,
        price: Decimal,
        commission: Decimal,
    ) -> Option<FillRecord> {
        self.book.report_fill(broker_order_id, price, commission)
    }
}

#[async_trait]
impl BrokerProvider for PaperProvider {
    fn name(&self) -> &'static str {
        "paper"
    }

    fn capabilities(&self) -> Capability {
        Capability::all()
    }

    fn set_order_event_sink(&self, sink: OrderEventSink) {
        self.book.set_event_sink(sink);
    }

    async fn start(&self) -> Result<(), BrokerError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), BrokerError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn ensure_connected(&self) -> Result<(), BrokerError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BrokerError::new(ErrorCode::IbDisconnected, "paper provider stopped"))
        }
    }

    async fn status(&self) -> ConnectionStatus {
        if self.connected.load(Ordering::SeqCst) {
            ConnectionStatus::Connected {
                connected_at: chrono::Utc::now(),
            }
        } else {
            ConnectionStatus::Disconnected
        }
    }

    async fn quote(&self, symbols: &[String], intent: QuoteIntent) -> Result<Vec<Quote>, BrokerError> {
        self.ensure_connected().await?;
        Ok(symbols
            .iter()
            .map(|s| {
                let mut quote = self
                    .book
                    .get_quotes(std::slice::from_ref(s))
                    .into_iter()
                    .next()
                    .unwrap_or_else(|| Book::synthesize_quote(s));
                if !intent.satisfied_by(quote.bid.is_some(), quote.ask.is_some(), quote.last.is_some())
                {
                    quote.meta = QuoteMeta {
                        source: QuoteSource::Delayed,
                        fallback_used: true,
                        available_fields: quote.meta.available_fields.clone(),
                    };
                }
                quote
            })
            .collect())
    }

    async fn quote_capabilities(
        &self,
        symbols: &[String],
        _refresh: bool,
    ) -> Result<BTreeMap<String, Capability>, BrokerError> {
        self.ensure_connected().await?;
        Ok(symbols.iter().map(|s| (s.clone(), Capability::all())).collect())
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
        let ack = self.book.place_order(entry, "bracket-entry");
        Ok(BracketResult {
            broker_order_ids: vec![ack.broker_order_id],
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

#[cfg(test)]
mod tests {
    use super::*;
    use model::{OrderSide, TimeInForce};
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap as Map;

    #[tokio::test]
    async fn starts_connected_by_default() {
        let provider = PaperProvider::new();
        assert!(provider.status().await.is_connected());
    }

    #[tokio::test]
    async fn disconnect_makes_ensure_connected_fail() {
        let provider = PaperProvider::new();
        provider.disconnect();
        let err = provider.ensure_connected().await.unwrap_err();
        assert_eq!(err.code, ErrorCode::IbDisconnected);
    }

    #[tokio::test]
    async fn place_order_round_trips_through_the_book() {
        let provider = PaperProvider::new();
        let req = OrderRequest {
            side: OrderSide::Buy,
            symbol: "AAPL".to_string(),
            qty: dec!(5),
            limit: Some(dec!(150)),
            stop: None,
            tif: TimeInForce::Day,
            client_order_id: None,
            tags: Map::new(),
        };
        let ack = provider.place_order(&req, "COID-1").await.unwrap();
        let trades = provider.trades().await.unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].0, ack.broker_order_id);
    }
}
