use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Closed error taxonomy shared by the risk engine, broker providers, and the
/// dispatcher. Every error carries a stable string code, a human message, an
/// optional details map, and an optional suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Missing or invalid parameters; unknown command; unknown risk param.
    InvalidArgs,
    /// Socket missing or not answering (client-side).
    DaemonNotRunning,
    /// Provider is not connected.
    IbDisconnected,
    /// Broker-side business rejection of an action.
    IbRejected,
    /// Symbol unknown or not permissioned.
    InvalidSymbol,
    /// Generic pre-trade denial.
    RiskCheckFailed,
    /// Denial while halted.
    RiskHalted,
    /// Order submission rate exceeded.
    RateLimited,
    /// Identical order fingerprint within window.
    DuplicateOrder,
    /// Request exceeded the configured timeout.
    Timeout,
    /// Unexpected fault.
    InternalError,
}

impl ErrorCode {
    /// Exit code mapped for client convenience (§7).
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            Self::InvalidArgs => 2,
            Self::DaemonNotRunning => 3,
            Self::IbDisconnected => 4,
            Self::RiskCheckFailed => 5,
            Self::RiskHalted => 6,
            Self::Timeout => 10,
            Self::IbRejected
            | Self::InvalidSymbol
            | Self::RateLimited
            | Self::DuplicateOrder
            | Self::InternalError => 1,
        }
    }

    /// The stable wire string for this code, e.g. `"RISK_HALTED"`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgs => "INVALID_ARGS",
            Self::DaemonNotRunning => "DAEMON_NOT_RUNNING",
            Self::IbDisconnected => "IB_DISCONNECTED",
            Self::IbRejected => "IB_REJECTED",
            Self::InvalidSymbol => "INVALID_SYMBOL",
            Self::RiskCheckFailed => "RISK_CHECK_FAILED",
            Self::RiskHalted => "RISK_HALTED",
            Self::RateLimited => "RATE_LIMITED",
            Self::DuplicateOrder => "DUPLICATE_ORDER",
            Self::Timeout => "TIMEOUT",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Classify a broker-raised message by substring inspection (§7).
    #[must_use]
    pub fn classify_broker_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("not connected")
            || lower.contains("disconnect")
            || lower.contains("connection")
            || lower.contains("socket")
            || lower.contains("transport")
        {
            Self::IbDisconnected
        } else if lower.contains("symbol") || lower.contains("contract") {
            Self::InvalidSymbol
        } else if lower.contains("timeout") || lower.contains("timed out") {
            Self::Timeout
        } else {
            Self::IbRejected
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured, wire-serializable error: `{code, message, details, suggestion}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerError {
    /// Stable error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Structured detail map, e.g. `{violation_codes: [...]}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// One-line actionable suggestion, computed at the throw site.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl BrokerError {
    /// Build an error with no details or suggestion.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            suggestion: None,
        }
    }

    /// Attach a details map.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Attach a suggestion.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Exit code mapped for client convenience.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.code.exit_code()
    }
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for BrokerError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_table() {
        assert_eq!(ErrorCode::InvalidArgs.exit_code(), 2);
        assert_eq!(ErrorCode::DaemonNotRunning.exit_code(), 3);
        assert_eq!(ErrorCode::IbDisconnected.exit_code(), 4);
        assert_eq!(ErrorCode::RiskCheckFailed.exit_code(), 5);
        assert_eq!(ErrorCode::RiskHalted.exit_code(), 6);
        assert_eq!(ErrorCode::Timeout.exit_code(), 10);
        assert_eq!(ErrorCode::InternalError.exit_code(), 1);
        assert_eq!(ErrorCode::IbRejected.exit_code(), 1);
    }

    #[test]
    fn classifies_disconnect_messages() {
        assert_eq!(
            ErrorCode::classify_broker_message("socket reset by peer"),
            ErrorCode::IbDisconnected
        );
        assert_eq!(
            ErrorCode::classify_broker_message("no security definition found for symbol"),
            ErrorCode::InvalidSymbol
        );
        assert_eq!(
            ErrorCode::classify_broker_message("order rejected: insufficient funds"),
            ErrorCode::IbRejected
        );
    }

    #[test]
    fn display_matches_wire_string() {
        assert_eq!(ErrorCode::RiskHalted.to_string(), "RISK_HALTED");
    }
}
