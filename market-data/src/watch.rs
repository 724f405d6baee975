//! `watch`: a lazy, push-style quote stream ticking on a fixed interval (§4.5).

use crate::service::MarketDataService;
use async_stream::stream;
use futures::Stream;
use model::{BrokerError, QuoteIntent};
use std::sync::Arc;
use std::time::Duration;

/// Yield a field-projected quote for `symbol` on every `interval` tick,
/// until the stream is dropped. Errors from the underlying provider are
/// yielded rather than ending the stream, so a transient disconnect doesn't
/// silently stop a long-lived subscription.
pub fn watch(
    service: Arc<MarketDataService>,
    symbol: String,
    fields: Vec<String>,
    interval: Duration,
) -> impl Stream<Item = Result<serde_json::Value, BrokerError>> {
    stream! {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let result = service
                .quote(std::slice::from_ref(&symbol), false, QuoteIntent::BestEffort)
                .await
                .and_then(|quotes| {
                    quotes
                        .first()
                        .map(|q| MarketDataService::project(q, &fields))
                        .unwrap_or_else(|| {
                            Err(BrokerError::new(
                                model::ErrorCode::InvalidSymbol,
                                format!("unknown symbol: {symbol}"),
                            ))
                        })
                });
            yield result;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker::PaperProvider;
    use futures_util::StreamExt;
    use model::BrokerProvider;

    #[tokio::test]
    async fn watch_yields_a_projection_on_every_tick() {
        let provider = Arc::new(PaperProvider::new());
        provider.start().await.unwrap();
        let service = Arc::new(MarketDataService::new(provider));
        let stream = watch(service, "AAPL".to_string(), vec!["last".to_string()], Duration::from_millis(5));
        tokio::pin!(stream);
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first["symbol"], "AAPL");
        assert!(first.get("last").is_some());
    }
}
