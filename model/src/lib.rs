//! brokerd Model Crate - Shared Domain Types
//!
//! Domain records shared by every subsystem of the daemon: order requests,
//! order records, fills, quotes, risk configuration, and the broker
//! provider trait. Nothing here performs I/O.

// === FINANCIAL APPLICATION SAFETY LINTS ===
// These lint rules are critical for financial applications where precision,
// safety, and reliability are paramount. Violations can lead to financial losses.

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::float_arithmetic,
    clippy::arithmetic_side_effects,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs, rust_2018_idioms, missing_debug_implementations)]

/// Broker provider trait and connection-level types
pub mod broker;
/// Capability map advertised by a broker provider
pub mod capability;
/// Error taxonomy shared across the daemon
pub mod error;
/// Topic-based event envelope for the broadcaster
pub mod event;
/// Fill (execution) records
pub mod fill;
/// Order request/record/status types
pub mod order;
/// Quote and market-bar types
pub mod quote;
/// Risk configuration, overrides, and pre-trade context
pub mod risk;

pub use broker::{
    parse_strike_range, BracketResult, BrokerProvider, ConnectionStatus, ExposureBucket,
    ExposureBy, OptionChainEntry, OptionChainQuery, OptionType, OrderEvent, OrderEventSink,
    PlacementAck, PortfolioPosition,
};
pub use capability::Capability;
pub use error::{BrokerError, ErrorCode};
pub use event::{Event, Topic};
pub use fill::FillRecord;
pub use order::{OrderRecord, OrderRequest, OrderSide, OrderStatus, OrderType, TimeInForce};
pub use quote::{Bar, BarPeriod, BarSize, Quote, QuoteIntent, QuoteMeta, QuoteSource};
pub use risk::{RiskCheckResult, RiskConfigSnapshot, RiskContext, RiskOverride};
