//! brokerd Daemon Crate - Aggregate Root, Socket Server, Command Dispatch
//!
//! Wires every subsystem crate (`model`, `protocol`, `risk`, `audit`,
//! `broker`, `market-data`, `orders`, `monitors`) into one long-running Unix
//! socket service: [`daemon::Daemon`] owns startup/shutdown, [`server`] runs
//! the per-connection accept loop, and [`dispatcher`] maps each request's
//! command onto the owned subsystems.

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

/// Event fan-out to `events.subscribe` connections.
pub mod broadcaster;
/// TOML configuration plus `BROKERD_*` environment overrides.
pub mod config;
/// The aggregate root tying every subsystem together.
pub mod daemon;
/// Command-table dispatch.
pub mod dispatcher;
/// Typed request-parameter accessors.
pub mod params;
/// PID file lifecycle.
pub mod pidfile;
/// `schema.get`'s static command descriptors.
pub mod schema;
/// Unix socket accept loop and per-connection framing.
pub mod server;
/// Unix socket bind/probe/cleanup.
pub mod socket;

pub use broadcaster::Broadcaster;
pub use config::Config;
pub use daemon::{Daemon, StartError};
pub use dispatcher::Dispatcher;
pub use pidfile::PidFile;
pub use server::Server;
