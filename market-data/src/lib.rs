//! brokerd Market-Data Crate
//!
//! A TTL-cached quote/history layer in front of a `model::BrokerProvider`:
//! batched quote fetches with a short-lived per-symbol cache, a
//! history-based last-price fallback when live data is unavailable, and a
//! push-style `watch` stream for field-projected polling subscriptions.

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::float_arithmetic,
    clippy::arithmetic_side_effects,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs, rust_2018_idioms, missing_debug_implementations)]

mod cache;
mod service;
mod watch;

pub use service::{CapabilitiesWithMeta, MarketDataService, DEFAULT_QUOTE_TTL};
pub use watch::watch;
