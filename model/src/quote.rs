use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

use crate::order::ParseEnumError;

/// Quote-shape selector governing fallback behavior (GLOSSARY).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteIntent {
    /// Any of bid/ask/last is acceptable.
    BestEffort,
    /// Both bid and ask are required.
    TopOfBook,
    /// Only `last` is required.
    LastOnly,
}

impl Default for QuoteIntent {
    fn default() -> Self {
        Self::BestEffort
    }
}

impl std::fmt::Display for QuoteIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::BestEffort => "best_effort",
            Self::TopOfBook => "top_of_book",
            Self::LastOnly => "last_only",
        };
        write!(f, "{s}")
    }
}

impl FromStr for QuoteIntent {
    type Err = ParseEnumError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "best_effort" => Ok(Self::BestEffort),
            "top_of_book" => Ok(Self::TopOfBook),
            "last_only" => Ok(Self::LastOnly),
            other => Err(ParseEnumError(other.to_string())),
        }
    }
}

impl QuoteIntent {
    /// True if `fields` satisfies this intent's minimum requirement.
    #[must_use]
    pub fn satisfied_by(self, has_bid: bool, has_ask: bool, has_last: bool) -> bool {
        match self {
            Self::BestEffort => has_bid || has_ask || has_last,
            Self::TopOfBook => has_bid && has_ask,
            Self::LastOnly => has_last,
        }
    }
}

/// Where a quote's fields ultimately came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteSource {
    /// Real-time market data.
    Live,
    /// Delayed market data (typically 15-20 minutes).
    Delayed,
    /// Back-filled from a historical bar query.
    History,
}

impl std::fmt::Display for QuoteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Live => "live",
            Self::Delayed => "delayed",
            Self::History => "history",
        };
        write!(f, "{s}")
    }
}

/// Per-quote metadata describing provenance and fallback behavior (§3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuoteMeta {
    /// Where the returned fields came from.
    pub source: QuoteSource,
    /// Whether any fallback path was exercised to produce this quote.
    pub fallback_used: bool,
    /// Which of bid/ask/last/volume were actually available.
    pub available_fields: BTreeSet<String>,
}

impl QuoteMeta {
    /// A metadata block reporting a clean live read with all fields present.
    #[must_use]
    pub fn live(available_fields: BTreeSet<String>) -> Self {
        Self {
            source: QuoteSource::Live,
            fallback_used: false,
            available_fields,
        }
    }
}

/// A market quote (§3). Invariant: `symbol` is uppercased.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Quote {
    /// Uppercased symbol.
    pub symbol: String,
    /// Best bid, if available.
    #[serde(default)]
    pub bid: Option<Decimal>,
    /// Best ask, if available.
    #[serde(default)]
    pub ask: Option<Decimal>,
    /// Last traded price, if available.
    #[serde(default)]
    pub last: Option<Decimal>,
    /// Last traded volume, if available.
    #[serde(default)]
    pub volume: Option<Decimal>,
    /// Quote timestamp.
    pub timestamp: DateTime<Utc>,
    /// Listing exchange.
    pub exchange: String,
    /// Quote currency.
    pub currency: String,
    /// Provenance metadata.
    pub meta: QuoteMeta,
}

/// A history query lookback period (§6).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarPeriod {
    /// One day.
    #[serde(rename = "1d")]
    OneDay,
    /// Five days.
    #[serde(rename = "5d")]
    FiveDays,
    /// Thirty days.
    #[serde(rename = "30d")]
    ThirtyDays,
    /// Ninety days.
    #[serde(rename = "90d")]
    NinetyDays,
    /// One year.
    #[serde(rename = "1y")]
    OneYear,
}

impl FromStr for BarPeriod {
    type Err = ParseEnumError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1d" => Ok(Self::OneDay),
            "5d" => Ok(Self::FiveDays),
            "30d" => Ok(Self::ThirtyDays),
            "90d" => Ok(Self::NinetyDays),
            "1y" => Ok(Self::OneYear),
            other => Err(ParseEnumError(other.to_string())),
        }
    }
}

/// A history query bar size (§6).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum BarSize {
    /// One minute.
    OneMinute,
    /// Five minutes.
    FiveMinutes,
    /// Fifteen minutes.
    FifteenMinutes,
    /// One hour.
    OneHour,
    /// One day.
    OneDay,
}

impl FromStr for BarSize {
    type Err = ParseEnumError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Self::OneMinute),
            "5m" => Ok(Self::FiveMinutes),
            "15m" => Ok(Self::FifteenMinutes),
            "1h" => Ok(Self::OneHour),
            "1d" => Ok(Self::OneDay),
            other => Err(ParseEnumError(other.to_string())),
        }
    }
}

/// A single OHLCV bar.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Bar {
    /// Bar open timestamp.
    pub timestamp: DateTime<Utc>,
    /// Open price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Close price.
    pub close: Decimal,
    /// Traded volume.
    pub volume: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_of_book_requires_both_sides() {
        assert!(!QuoteIntent::TopOfBook.satisfied_by(true, false, true));
        assert!(QuoteIntent::TopOfBook.satisfied_by(true, true, false));
    }

    #[test]
    fn best_effort_accepts_any_field() {
        assert!(QuoteIntent::BestEffort.satisfied_by(false, false, true));
        assert!(!QuoteIntent::BestEffort.satisfied_by(false, false, false));
    }

    #[test]
    fn parses_period_and_bar_size() {
        assert_eq!(BarPeriod::from_str("90d").unwrap(), BarPeriod::NinetyDays);
        assert_eq!(BarSize::from_str("15m").unwrap(), BarSize::FifteenMinutes);
        assert!(BarSize::from_str("3m").is_err());
    }
}
