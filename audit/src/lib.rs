//! brokerd Audit Crate - Append-Only Trade and Command Log
//!
//! A single-writer SQLite audit trail for the brokerd trading daemon:
//! every dispatched command, order lifecycle transition, fill, risk event,
//! and connection-status change is recorded durably before the daemon
//! acknowledges it, using Diesel ORM over a WAL-mode connection.

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

/// The `AuditLog` connection wrapper and its read/write operations
pub mod database;
/// Error taxonomy for audit failures
pub mod error;
/// Row structs matching `schema`, decoded to and from domain types
pub mod models;
/// Diesel table definitions, mirroring `migrations/`
pub mod schema;

pub use database::{AuditLog, AuditTable, CommandFilter, OrderFilter};
pub use error::AuditError;
pub use models::{CommandRow, ConnectionEventRow, FillRow, OrderRow, RiskEventRow};
