//! `MarketDataService`: the TTL-cached quote/history layer in front of a
//! `BrokerProvider` (§4.5).

use crate::cache::QuoteCache;
use model::{
    BarPeriod, BarSize, BrokerError, BrokerProvider, Capability, ErrorCode, Quote, QuoteIntent,
    QuoteMeta, QuoteSource,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

/// Default TTL for cached quote snapshots (§4.5).
pub const DEFAULT_QUOTE_TTL: Duration = Duration::from_secs(2);

/// A capability snapshot plus the age of the cache it was served alongside,
/// returned by `quote_capabilities_with_meta`.
#[derive(Debug, Clone)]
pub struct CapabilitiesWithMeta {
    /// Per-symbol capability map, as reported by the provider.
    pub capabilities: BTreeMap<String, Capability>,
    /// Age of the freshest cached quote, if the cache is non-empty.
    pub cache_age_ms: Option<u64>,
}

/// Wraps a `BrokerProvider` with a TTL quote cache and a history-based
/// last-price fallback (§4.5).
pub struct MarketDataService {
    provider: Arc<dyn BrokerProvider>,
    cache: QuoteCache,
}

impl std::fmt::Debug for MarketDataService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketDataService")
            .field("provider", &self.provider.name())
            .field("cache", &self.cache)
            .finish()
    }
}

impl MarketDataService {
    /// A service with the default 2s TTL.
    #[must_use]
    pub fn new(provider: Arc<dyn BrokerProvider>) -> Self {
        Self::with_ttl(provider, DEFAULT_QUOTE_TTL)
    }

    /// A service with an explicit cache TTL, for tests and tuned deployments.
    #[must_use]
    pub fn with_ttl(provider: Arc<dyn BrokerProvider>, ttl: Duration) -> Self {
        Self {
            provider,
            cache: QuoteCache::new(ttl),
        }
    }

    /// Quotes for `symbols`, in the caller's requested order, filtered to
    /// symbols the provider actually returns. Cached entries are reused
    /// unless `force_refresh` is set; uncached/forced symbols are fetched
    /// from the provider in a single batched call, then back-filled with a
    /// history-based last price when the intent still isn't satisfied and
    /// the provider supports `history`.
    pub async fn quote(
        &self,
        symbols: &[String],
        force_refresh: bool,
        intent: QuoteIntent,
    ) -> Result<Vec<Quote>, BrokerError> {
        let uppercased: Vec<String> = symbols.iter().map(|s| s.to_uppercase()).collect();

        let mut to_fetch = Vec::new();
        let mut fresh: BTreeMap<String, Quote> = BTreeMap::new();
        for symbol in &uppercased {
            if !force_refresh {
                if let Some(quote) = self.cache.get(symbol) {
                    fresh.insert(symbol.clone(), quote);
                    continue;
                }
            }
            to_fetch.push(symbol.clone());
        }

        if !to_fetch.is_empty() {
            let fetched = self.provider.quote(&to_fetch, intent).await?;
            for quote in fetched {
                self.cache.put(quote.clone());
                fresh.insert(quote.symbol.clone(), quote);
            }
        }

        let capabilities = self.provider.capabilities();
        let mut results = Vec::with_capacity(uppercased.len());
        for symbol in &uppercased {
            let Some(mut quote) = fresh.get(symbol).cloned() else {
                continue;
            };
            let needs_last = matches!(intent, QuoteIntent::BestEffort | QuoteIntent::LastOnly)
                && quote.last.is_none();
            if needs_last && capabilities.history {
                if let Some(last) = self.history_last_price(symbol).await {
                    quote.last = Some(last);
                    let mut fields: BTreeSet<String> = quote.meta.available_fields.clone();
                    fields.insert("last".to_string());
                    quote.meta = QuoteMeta {
                        source: QuoteSource::History,
                        fallback_used: true,
                        available_fields: fields,
                    };
                    self.cache.put(quote.clone());
                }
            }
            results.push(quote);
        }
        Ok(results)
    }

    async fn history_last_price(&self, symbol: &str) -> Option<rust_decimal::Decimal> {
        let bars = self
            .provider
            .history(symbol, BarPeriod::OneDay, BarSize::OneMinute, false)
            .await
            .ok()?;
        bars.last().map(|bar| bar.close)
    }

    /// The provider's current capability map per symbol, plus the age of the
    /// freshest cached quote (§4.5).
    pub async fn quote_capabilities_with_meta(
        &self,
        symbols: &[String],
        refresh: bool,
    ) -> Result<CapabilitiesWithMeta, BrokerError> {
        let uppercased: Vec<String> = symbols.iter().map(|s| s.to_uppercase()).collect();
        let capabilities = self.provider.quote_capabilities(&uppercased, refresh).await?;
        let cache_age_ms = self
            .cache
            .freshest_age()
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
        Ok(CapabilitiesWithMeta {
            capabilities,
            cache_age_ms,
        })
    }

    /// Ensure the provider session is usable before a dependent call.
    pub async fn ensure_connected(&self) -> Result<(), BrokerError> {
        self.provider.ensure_connected().await
    }

    fn reject_unknown_fields(fields: &[String]) -> Result<(), BrokerError> {
        const KNOWN: [&str; 6] = ["bid", "ask", "last", "volume", "exchange", "currency"];
        for field in fields {
            if !KNOWN.contains(&field.as_str()) {
                return Err(BrokerError::new(
                    ErrorCode::InvalidArgs,
                    format!("unknown quote field: {field}"),
                ));
            }
        }
        Ok(())
    }

    /// Project a quote down to the requested fields, keyed by field name.
    pub fn project(quote: &Quote, fields: &[String]) -> Result<serde_json::Value, BrokerError> {
        Self::reject_unknown_fields(fields)?;
        let mut map = serde_json::Map::new();
        map.insert("symbol".to_string(), serde_json::Value::String(quote.symbol.clone()));
        for field in fields {
            let value = match field.as_str() {
                "bid" => serde_json::to_value(quote.bid),
                "ask" => serde_json::to_value(quote.ask),
                "last" => serde_json::to_value(quote.last),
                "volume" => serde_json::to_value(quote.volume),
                "exchange" => serde_json::to_value(quote.exchange.clone()),
                "currency" => serde_json::to_value(quote.currency.clone()),
                _ => unreachable!("validated by reject_unknown_fields"),
            }
            .unwrap_or(serde_json::Value::Null);
            map.insert(field.clone(), value);
        }
        Ok(serde_json::Value::Object(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker::PaperProvider;
    use chrono::Utc;
    use model::Bar;
    use rust_decimal_macros::dec;

    fn seed_history(provider: &PaperProvider, symbol: &str, close: rust_decimal::Decimal) {
        provider.book().bars.lock().unwrap().insert(
            symbol.to_string(),
            vec![Bar {
                timestamp: Utc::now(),
                open: close,
                high: close,
                low: close,
                close,
                volume: dec!(100),
            }],
        );
    }

    #[tokio::test]
    async fn caches_a_quote_until_ttl_expires() {
        let provider = Arc::new(PaperProvider::new());
        provider.start().await.unwrap();
        provider.book().set_quote(model::Quote {
            symbol: "AAPL".to_string(),
            bid: Some(dec!(150)),
            ask: Some(dec!(150.1)),
            last: Some(dec!(150.05)),
            volume: None,
            timestamp: Utc::now(),
            exchange: "SMART".to_string(),
            currency: "USD".to_string(),
            meta: QuoteMeta::live(BTreeSet::new()),
        });
        let service = MarketDataService::with_ttl(provider, Duration::from_millis(50));
        let quotes = service.quote(&["aapl".to_string()], false, QuoteIntent::BestEffort).await.unwrap();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].symbol, "AAPL");
    }

    #[tokio::test]
    async fn falls_back_to_history_last_price_when_missing() {
        let provider = Arc::new(PaperProvider::new());
        provider.start().await.unwrap();
        // No live quote seeded: Book::synthesize_quote always has `last`, so
        // force the fallback by placing an order that sets nothing — instead
        // assert directly against history_last_price's private path via a
        // quote whose `last` we clear after the provider call by seeding a
        // quote with no last.
        provider.book().set_quote(model::Quote {
            symbol: "MSFT".to_string(),
            bid: None,
            ask: None,
            last: None,
            volume: None,
            timestamp: Utc::now(),
            exchange: "SMART".to_string(),
            currency: "USD".to_string(),
            meta: QuoteMeta {
                source: QuoteSource::Live,
                fallback_used: false,
                available_fields: BTreeSet::new(),
            },
        });
        seed_history(&provider, "MSFT", dec!(305.25));
        let service = MarketDataService::new(provider);
        let quotes = service
            .quote(&["MSFT".to_string()], true, QuoteIntent::LastOnly)
            .await
            .unwrap();
        assert_eq!(quotes[0].last, Some(dec!(305.25)));
        assert_eq!(quotes[0].meta.source, QuoteSource::History);
        assert!(quotes[0].meta.fallback_used);
    }

    #[tokio::test]
    async fn project_rejects_unknown_field() {
        let quote = model::Quote {
            symbol: "AAPL".to_string(),
            bid: Some(dec!(1)),
            ask: Some(dec!(1)),
            last: Some(dec!(1)),
            volume: None,
            timestamp: Utc::now(),
            exchange: "SMART".to_string(),
            currency: "USD".to_string(),
            meta: QuoteMeta::live(BTreeSet::new()),
        };
        let err = MarketDataService::project(&quote, &["nope".to_string()]).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidArgs);
    }
}
