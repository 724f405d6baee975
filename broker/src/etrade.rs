//! A plug-compatible secondary provider demonstrating that a second broker
//! can satisfy the same `BrokerProvider` trait with a reduced capability
//! map (§1, §4.4): no persistent session auth, no bracket orders.

use crate::common::Book;
use async_trait::async_trait;
use model::{
    Bar, BarPeriod, BarSize, BracketResult, BrokerError, BrokerProvider, Capability,
    ConnectionStatus, ErrorCode, ExposureBucket, ExposureBy, FillRecord, OrderEventSink,
    OrderRequest, OrderStatus, PlacementAck, PortfolioPosition, Quote, QuoteIntent, QuoteMeta,
    QuoteSource,
};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// E*Trade session configuration. Unlike IB, a session here is re-acquired
/// on every `start()` — there is no persistent-connection handshake to
/// reconnect, only a re-auth the spec scopes out (`persistent_auth: false`).
#[derive(Debug, Clone, Default)]
pub struct EtradeConfig {
    /// Consumer key for the configured E*Trade sandbox or production app.
    pub consumer_key: String,
}

/// A thinner adapter than `IbProvider`: same trait, a smaller capability
/// map, and no reconnect loop — a dropped session is simply re-acquired
/// on the next call.
#[derive(Debug)]
pub struct EtradeProvider {
    config: EtradeConfig,
    book: Arc<Book>,
    connected: AtomicBool,
}

impl EtradeProvider {
    /// Construct a disconnected provider for the given app configuration.
    #[must_use]
    pub fn new(config: EtradeConfig) -> Self {
        Self {
            config,
            book: Arc::new(Book::default()),
            connected: AtomicBool::new(false),
        }
    }

    /// Expose the book so tests can seed quotes/positions.
    #[must_use]
    pub fn book(&self) -> &Arc<Book> {
        &self.book
    }
}

fn not_supported(capability: &str) -> BrokerError {
    BrokerError::new(
        ErrorCode::IbRejected,
        format!("{capability} not supported by the etrade provider"),
    )
}

#[async_trait]
impl BrokerProvider for EtradeProvider {
    fn name(&self) -> &'static str {
        "etrade"
    }

    fn capabilities(&self) -> Capability {
        Capability {
            bracket_orders: false,
            persistent_auth: false,
            option_chain: false,
            ..Capability::all()
        }
    }

    fn set_order_event_sink(&self, sink: OrderEventSink) {
        self.book.set_event_sink(sink);
    }

    async fn start(&self) -> Result<(), BrokerError> {
        if self.config.consumer_key.is_empty() {
            return Err(BrokerError::new(
                ErrorCode::InvalidArgs,
                "etrade consumer_key is not configured",
            ));
        }
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
            Err(BrokerError::new(
                ErrorCode::IbDisconnected,
                "etrade session is not active",
            )
            .with_suggestion("Re-authenticate the etrade session and retry"))
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
        let mut results = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let mut quote = self
                .book
                .get_quotes(std::slice::from_ref(symbol))
                .into_iter()
                .next()
                .unwrap_or_else(|| Book::synthesize_quote(symbol));
            if !intent.satisfied_by(quote.bid.is_some(), quote.ask.is_some(), quote.last.is_some()) {
                quote.meta = QuoteMeta {
                    source: QuoteSource::Delayed,
                    fallback_used: true,
                    available_fields: quote.meta.available_fields.clone(),
                };
            }
            results.push(quote);
        }
        Ok(results)
    }

    async fn quote_capabilities(
        &self,
        symbols: &[String],
        _refresh: bool,
    ) -> Result<BTreeMap<String, Capability>, BrokerError> {
        self.ensure_connected().await?;
        Ok(symbols
            .iter()
            .map(|s| {
                (
                    s.clone(),
                    Capability {
                        quote_live: false,
                        quote_delayed: true,
                        bracket_orders: false,
                        persistent_auth: false,
                        ..Capability::all()
                    },
                )
            })
            .collect())
    }

    async fn history(
        &self,
        _symbol: &str,
        _period: BarPeriod,
        _bar: BarSize,
        _rth_only: bool,
    ) -> Result<Vec<Bar>, BrokerError> {
        Err(not_supported("history"))
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

    async fn exposure(&self, _by: ExposureBy) -> Result<Vec<ExposureBucket>, BrokerError> {
        Err(not_supported("exposure"))
    }

    async fn place_order(
        &self,
        req: &OrderRequest,
        client_order_id: &str,
    ) -> Result<PlacementAck, BrokerError> {
        self.ensure_connected().await?;
        Ok(self.book.place_order(req, client_order_id))
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

    #[tokio::test]
    async fn refuses_to_start_without_a_consumer_key() {
        let provider = EtradeProvider::new(EtradeConfig::default());
        let err = provider.start().await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidArgs);
    }

    #[tokio::test]
    async fn capability_map_excludes_brackets_and_persistent_auth() {
        let provider = EtradeProvider::new(EtradeConfig {
            consumer_key: "key".to_string(),
        });
        let caps = provider.capabilities();
        assert!(!caps.bracket_orders);
        assert!(!caps.persistent_auth);
        assert!(!caps.option_chain);
    }

    #[tokio::test]
    async fn history_is_not_supported() {
        let provider = EtradeProvider::new(EtradeConfig {
            consumer_key: "key".to_string(),
        });
        provider.start().await.unwrap();
        let err = provider
            .history("AAPL", BarPeriod::OneDay, BarSize::OneMinute, false)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::IbRejected);
    }
}
