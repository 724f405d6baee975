use thiserror::Error;

/// Errors raised by the wire codec itself, distinct from the application-level
/// `BrokerError` taxonomy carried inside a `Response`.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The underlying stream failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// A value could not be encoded to MessagePack.
    #[error("encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    /// A frame's bytes could not be decoded into the requested type.
    #[error("decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    /// The length prefix exceeded the configured maximum frame size.
    #[error("frame of {len} bytes exceeds the {max}-byte limit")]
    FrameTooLarge {
        /// The length prefix read from the wire.
        len: usize,
        /// The configured maximum.
        max: usize,
    },
}
