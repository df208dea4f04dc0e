// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Netpulse fleet service.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a
//! single-writer concurrency model via `tokio-rusqlite`, and typed
//! operations for command rows and the device registry. The single writer
//! plus SQL transactions is the serialization point that makes concurrent
//! claim/submit/extend calls safe across request handlers and the
//! visibility reclaimer.

pub mod database;
pub mod directory;
pub mod migrations;
pub mod models;
pub mod queries;

pub use database::Database;
pub use directory::{hash_secret, SqliteDirectory};
pub use models::*;
pub use queries::commands::GuardedOutcome;
