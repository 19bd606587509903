// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row mapping between SQLite and the domain types in `conduit-core`.

use std::str::FromStr;

use rusqlite::Row;
use rusqlite::types::Type;

pub use conduit_core::types::{
    Counters, FailedMessage, ForwardSession, LifetimeCounters, MessageRecord,
};

/// Parse a TEXT column into a strum-backed enum.
pub(crate) fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) const SESSION_COLUMNS: &str = "id, source_chat, target_chat, from_id, to_id, current_id, status, last_error, created_at, updated_at";

pub(crate) fn session_from_row(row: &Row<'_>) -> rusqlite::Result<ForwardSession> {
    Ok(ForwardSession {
        id: row.get(0)?,
        source_chat: row.get(1)?,
        target_chat: row.get(2)?,
        from_id: row.get(3)?,
        to_id: row.get(4)?,
        current_id: row.get(5)?,
        status: parse_column(row, 6)?,
        last_error: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

pub(crate) const RECORD_COLUMNS: &str =
    "session_id, source_id, status, target_id, fingerprint, retry_count, updated_at";

pub(crate) fn record_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRecord> {
    Ok(MessageRecord {
        session_id: row.get(0)?,
        source_id: row.get(1)?,
        status: parse_column(row, 2)?,
        target_id: row.get(3)?,
        fingerprint: row.get(4)?,
        retry_count: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

pub(crate) const FAILED_COLUMNS: &str =
    "session_id, source_id, error_kind, error_message, attempt_count, strategy_used, last_attempt_at";

pub(crate) fn failed_from_row(row: &Row<'_>) -> rusqlite::Result<FailedMessage> {
    Ok(FailedMessage {
        session_id: row.get(0)?,
        source_id: row.get(1)?,
        error_kind: parse_column(row, 2)?,
        error_message: row.get(3)?,
        attempt_count: row.get(4)?,
        strategy_used: row.get(5)?,
        last_attempt_at: row.get(6)?,
    })
}

/// Reads `fetched, forwarded, duplicate, deleted, filtered, failed` starting at `start`.
pub(crate) fn counters_from_row(row: &Row<'_>, start: usize) -> rusqlite::Result<Counters> {
    let get = |i: usize| -> rusqlite::Result<u64> {
        let v: i64 = row.get(start + i)?;
        Ok(v.max(0) as u64)
    };
    Ok(Counters {
        fetched: get(0)?,
        forwarded: get(1)?,
        duplicate: get(2)?,
        deleted: get(3)?,
        filtered: get(4)?,
        failed: get(5)?,
    })
}
