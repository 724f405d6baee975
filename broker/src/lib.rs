//! brokerd Broker Provider Adapters
//!
//! Concrete `model::BrokerProvider` implementations: `ib` (the primary,
//! IB-style gateway adapter with reconnect and delayed-data fallback),
//! `etrade` (a plug-compatible secondary adapter with a reduced capability
//! map), and `paper` (a deterministic in-memory provider for tests and
//! dry-running the daemon without any network).

// === FINANCIAL APPLICATION SAFETY LINTS ===
// These lint rules are critical for financial applications where precision,
// safety, and reliability are paramount. Violations can lead to financial losses.

#![deny(
    // Error handling safety - force proper error handling
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,

    // Financial precision safety - prevent calculation errors
    clippy::float_arithmetic,
    clippy::arithmetic_side_effects,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
)]
// Allow unwrap and expect in test code only
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
// Standard Rust lints for code quality
#![warn(missing_docs, rust_2018_idioms, missing_debug_implementations)]

pub mod backoff;
pub mod common;
pub mod etrade;
pub mod ib;
pub mod paper;

pub use backoff::Backoff;
pub use common::{Book, BrokerSideOrder};
pub use etrade::{EtradeConfig, EtradeProvider};
pub use ib::{supervise_reconnects, IbConfig, IbProvider};
pub use paper::PaperProvider;
