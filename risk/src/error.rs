use thiserror::Error;

/// Errors raised by engine administration calls (`set_limit`, `override_limit`,
/// `parse_duration`). Pre-trade check failures are not errors — they are
/// `RiskCheckResult { ok: false, .. }` — except via `assert_order`, which
/// raises `model::BrokerError` per §4.3.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RiskError {
    /// `set_limit`/`override_limit` given a name outside the mutable param set.
    #[error("unknown risk parameter '{0}'")]
    UnknownParam(String),
    /// A param's value could not be coerced to its expected type.
    #[error("invalid value for risk parameter '{param}': {reason}")]
    InvalidValue {
        /// The parameter name.
        param: String,
        /// Why coercion failed.
        reason: String,
    },
    /// `override_limit` was called against a non-numeric param (§3).
    #[error("risk override supports only numeric params, got '{0}'")]
    NonNumericOverride(String),
    /// `parse_duration` was given a string matching none of `Ns|Nm|Nh|N`.
    #[error("invalid duration '{0}'")]
    InvalidDuration(String),
    /// An arithmetic operation would have overflowed `Decimal`.
    #[error("arithmetic overflow computing {0}")]
    Overflow(&'static str),
}
