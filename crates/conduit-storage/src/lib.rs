// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite progress store for the Conduit forwarding engine.
//!
//! WAL-mode SQLite with embedded migrations and a single writer through
//! `tokio-rusqlite`. Holds forwarding sessions, the per-id dedup ledger,
//! failed messages, operator settings and statistics.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

pub use adapter::SqliteStore;
pub use database::Database;
