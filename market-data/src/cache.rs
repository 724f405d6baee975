//! TTL snapshot cache keyed by uppercased symbol (§4.5).

use model::Quote;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A quote cache with a fixed time-to-live; entries older than the TTL are
/// treated as misses by `get` without being evicted eagerly.
#[derive(Debug)]
pub struct QuoteCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, EntryRecord>>,
}

#[derive(Clone, Debug)]
struct EntryRecord {
    quote: Quote,
    cached_at: Instant,
}

impl QuoteCache {
    /// A cache whose entries are considered fresh for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// A fresh cached quote for `symbol`, if one exists and hasn't expired.
    pub fn get(&self, symbol: &str) -> Option<Quote> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let record = entries.get(symbol)?;
        if record.cached_at.elapsed() < self.ttl {
            Some(record.quote.clone())
        } else {
            None
        }
    }

    /// Age of the freshest entry in the cache, if any, for cache-age metadata.
    pub fn freshest_age(&self) -> Option<Duration> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.values().map(|r| r.cached_at.elapsed()).min()
    }

    /// Store or replace a quote, keyed by its own (already-uppercased) symbol.
    pub fn put(&self, quote: Quote) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            quote.symbol.clone(),
            EntryRecord {
                quote,
                cached_at: Instant::now(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use model::QuoteMeta;
    use rust_decimal_macros::dec;
    use std::collections::BTreeSet;

    fn quote(symbol: &str) -> Quote {
        Quote {
            symbol: symbol.to_string(),
            bid: Some(dec!(10)),
            ask: Some(dec!(10.1)),
            last: Some(dec!(10.05)),
            volume: None,
            timestamp: Utc::now(),
            exchange: "SMART".to_string(),
            currency: "USD".to_string(),
            meta: QuoteMeta::live(BTreeSet::new()),
        }
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = QuoteCache::new(Duration::from_millis(10));
        cache.put(quote("AAPL"));
        assert!(cache.get("AAPL").is_some());
        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.get("AAPL").is_none());
    }

    #[test]
    fn miss_for_unknown_symbol() {
        let cache = QuoteCache::new(Duration::from_secs(2));
        assert!(cache.get("MSFT").is_none());
    }
}
