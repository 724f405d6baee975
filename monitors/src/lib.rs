//! brokerd Monitors
//!
//! The three background checkers described in §4.8, run off one shared tick:
//! `ConnectionLossMonitor` (halts on a sustained disconnect),
//! `HeartbeatMonitor` (halts or warns on a stale `runtime.keepalive`), and a
//! drawdown breaker reusing `risk::RiskEngine::check_drawdown_breaker` with a
//! configurable PnL basis.

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

mod connection;
mod drawdown;
mod heartbeat;
mod supervisor;

pub use connection::{ConnectionLossMonitor, DEFAULT_THRESHOLD};
pub use drawdown::PnlBasis;
pub use heartbeat::{HeartbeatMonitor, HeartbeatPolicy};
pub use supervisor::{MonitorSupervisor, DEFAULT_TICK};
