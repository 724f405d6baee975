use model::{BrokerError, ErrorCode};

/// Errors raised by the order manager, distinct from a risk rejection or a
/// broker rejection (both of which are already a `BrokerError`).
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    /// The broker provider rejected or failed the call.
    #[error(transparent)]
    Broker(#[from] BrokerError),
    /// The audit log failed to durably record the operation.
    #[error("audit log error: {0}")]
    Audit(#[from] audit::AuditError),
    /// No local record and the provider has no knowledge of this id either.
    #[error("unknown order: {0}")]
    UnknownOrder(String),
}

impl OrderError {
    /// Map to the wire error code (§7).
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Broker(e) => e.code,
            Self::Audit(_) => ErrorCode::InternalError,
            Self::UnknownOrder(_) => ErrorCode::InvalidArgs,
        }
    }
}

impl From<OrderError> for BrokerError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::Broker(e) => e,
            other => BrokerError::new(other.code(), other.to_string()),
        }
    }
}
