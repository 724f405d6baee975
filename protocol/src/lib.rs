//! brokerd Protocol Crate - Wire Codec
//!
//! Length-prefixed framing plus a MessagePack envelope codec for the
//! request/response/event protocol spoken over the daemon's Unix socket.

#![warn(missing_docs, rust_2018_idioms, missing_debug_implementations)]

/// MessagePack encode/decode over the envelope types.
pub mod codec;
/// Request/Response/EventEnvelope wire types.
pub mod envelope;
/// Codec-level error type.
pub mod error;
/// Length-prefixed frame read/write helpers.
pub mod framing;

pub use codec::{decode, encode};
pub use envelope::{ErrorPayload, EventEnvelope, Request, Response};
pub use error::ProtocolError;
pub use framing::{frame, read_framed, write_framed, MAX_FRAME_BYTES};
