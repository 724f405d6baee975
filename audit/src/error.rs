use thiserror::Error;

/// Errors raised by the audit log. Per the contract, any write failure
/// propagates to callers as `model::ErrorCode::InternalError`.
#[derive(Debug, Error)]
pub enum AuditError {
    /// A query or statement failed against the underlying connection.
    #[error("audit database error: {0}")]
    Database(#[from] diesel::result::Error),
    /// The initial connection to the database file could not be established.
    #[error("failed to connect to audit database: {0}")]
    Connection(#[from] diesel::ConnectionError),
    /// Embedded migrations failed to apply.
    #[error("failed to run audit migrations: {0}")]
    Migration(String),
    /// CSV export could not write to the destination path.
    #[error("audit export io error: {0}")]
    Io(#[from] std::io::Error),
    /// A JSON blob could not be encoded or decoded.
    #[error("audit serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// A stored RFC3339 timestamp failed to parse.
    #[error("invalid timestamp stored in audit row: {0}")]
    InvalidTimestamp(String),
    /// A stored decimal string failed to parse.
    #[error("invalid decimal stored in audit row: {0}")]
    InvalidDecimal(String),
    /// A stored enum label did not match any known variant.
    #[error("invalid enum value stored in audit row: {0}")]
    InvalidEnumValue(String),
    /// `export_csv` was asked for a table outside `{orders, commands, risk}`.
    #[error("unknown audit export table '{0}'")]
    UnknownTable(String),
}

impl AuditError {
    /// Every audit failure propagates as `INTERNAL_ERROR` (§4.2's contract).
    #[must_use]
    pub fn code(&self) -> model::ErrorCode {
        model::ErrorCode::InternalError
    }
}
