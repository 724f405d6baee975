use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::order::ParseEnumError;

/// The unit of event fan-out (GLOSSARY). Subscribers filter by topic set.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    /// Order lifecycle transitions.
    Orders,
    /// New fills.
    Fills,
    /// Position changes.
    Positions,
    /// PnL changes.
    Pnl,
    /// Risk-engine state changes (halt/resume, limit changes).
    Risk,
    /// Connection lifecycle changes.
    Connection,
}

impl Topic {
    /// All topics, in the order §3/§6 list them.
    #[must_use]
    pub fn all() -> Vec<Self> {
        vec![
            Self::Orders,
            Self::Fills,
            Self::Positions,
            Self::Pnl,
            Self::Risk,
            Self::Connection,
        ]
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Orders => "orders",
            Self::Fills => "fills",
            Self::Positions => "positions",
            Self::Pnl => "pnl",
            Self::Risk => "risk",
            Self::Connection => "connection",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Topic {
    type Err = ParseEnumError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "orders" => Ok(Self::Orders),
            "fills" => Ok(Self::Fills),
            "positions" => Ok(Self::Positions),
            "pnl" => Ok(Self::Pnl),
            "risk" => Ok(Self::Risk),
            "connection" => Ok(Self::Connection),
            other => Err(ParseEnumError(other.to_string())),
        }
    }
}

/// An event broadcast on the internal event bus (§3), later framed as an
/// `EventEnvelope` by the protocol codec.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    /// Which broadcast channel this event belongs to.
    pub topic: Topic,
    /// When the event was produced.
    pub timestamp: DateTime<Utc>,
    /// Event-specific payload.
    pub payload: Value,
}

impl Event {
    /// Build an event stamped with the current time.
    #[must_use]
    pub fn new(topic: Topic, payload: Value) -> Self {
        Self {
            topic,
            timestamp: Utc::now(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_round_trips_through_display_and_from_str() {
        for topic in Topic::all() {
            let parsed: Topic = topic.to_string().parse().expect("valid topic string");
            assert_eq!(parsed, topic);
        }
    }

    #[test]
    fn unknown_topic_fails_to_parse() {
        assert!(Topic::from_str("not_a_topic").is_err());
    }
}
