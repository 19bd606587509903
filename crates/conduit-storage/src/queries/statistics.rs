// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Checkpoints, session and lifetime statistics, and reset.

use conduit_core::{Checkpoint, ConduitError};
use rusqlite::{OptionalExtension, TransactionBehavior, params};

use crate::database::{Database, map_tr_err};
use crate::models::{Counters, LifetimeCounters, counters_from_row};

/// Persist cursor and session counters atomically.
///
/// The cursor only moves forward: when the stored `current_id` is already
/// ahead of the checkpoint the transaction is rolled back and `false` is
/// returned. Lifetime counters receive the difference between the new and
/// the previously stored session counters, so saving the same checkpoint
/// twice changes nothing and concurrent sessions never overwrite each other.
pub async fn save_checkpoint(db: &Database, checkpoint: &Checkpoint) -> Result<bool, ConduitError> {
    let cp = checkpoint.clone();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let moved = tx.execute(
                "UPDATE forward_sessions SET current_id = ?2,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1 AND current_id <= ?2",
                params![cp.session_id, cp.current_id],
            )?;
            if moved == 0 {
                // Dropping the transaction rolls it back.
                return Ok(false);
            }

            let previous = tx
                .query_row(
                    "SELECT fetched, forwarded, duplicate, deleted, filtered, failed
                     FROM session_statistics WHERE session_id = ?1",
                    params![cp.session_id],
                    |row| counters_from_row(row, 0),
                )
                .optional()?
                .unwrap_or_default();

            let c = &cp.counters;
            tx.execute(
                "INSERT INTO session_statistics
                     (session_id, fetched, forwarded, duplicate, deleted, filtered, failed)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(session_id) DO UPDATE SET
                     fetched = excluded.fetched,
                     forwarded = excluded.forwarded,
                     duplicate = excluded.duplicate,
                     deleted = excluded.deleted,
                     filtered = excluded.filtered,
                     failed = excluded.failed,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![
                    cp.session_id,
                    c.fetched as i64,
                    c.forwarded as i64,
                    c.duplicate as i64,
                    c.deleted as i64,
                    c.filtered as i64,
                    c.failed as i64,
                ],
            )?;

            let delta = |new: u64, old: u64| new as i64 - old as i64;
            tx.execute(
                "UPDATE lifetime_statistics SET
                     fetched = MAX(0, fetched + ?1),
                     forwarded = MAX(0, forwarded + ?2),
                     duplicate = MAX(0, duplicate + ?3),
                     deleted = MAX(0, deleted + ?4),
                     filtered = MAX(0, filtered + ?5),
                     failed = MAX(0, failed + ?6),
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = 1",
                params![
                    delta(c.fetched, previous.fetched),
                    delta(c.forwarded, previous.forwarded),
                    delta(c.duplicate, previous.duplicate),
                    delta(c.deleted, previous.deleted),
                    delta(c.filtered, previous.filtered),
                    delta(c.failed, previous.failed),
                ],
            )?;
            tx.commit()?;
            Ok(true)
        })
        .await
        .map_err(map_tr_err)
}

/// Counters as of the last checkpoint; zero when none was written.
pub async fn load_counters(db: &Database, session_id: &str) -> Result<Counters, ConduitError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Counters, rusqlite::Error> {
            let counters = conn
                .query_row(
                    "SELECT fetched, forwarded, duplicate, deleted, filtered, failed
                     FROM session_statistics WHERE session_id = ?1",
                    params![session_id],
                    |row| counters_from_row(row, 0),
                )
                .optional()?;
            Ok(counters.unwrap_or_default())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn load_lifetime(db: &Database) -> Result<LifetimeCounters, ConduitError> {
    db.connection()
        .call(|conn| -> Result<LifetimeCounters, rusqlite::Error> {
            conn.query_row(
                "SELECT fetched, forwarded, duplicate, deleted, filtered, failed, sessions_started
                 FROM lifetime_statistics WHERE id = 1",
                [],
                |row| {
                    let started: i64 = row.get(6)?;
                    Ok(LifetimeCounters {
                        counters: counters_from_row(row, 0)?,
                        sessions_started: started.max(0) as u64,
                    })
                },
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Wipe sessions, ledger, failures and session statistics.
pub async fn reset_all(db: &Database) -> Result<(), ConduitError> {
    db.connection()
        .call(|conn| -> Result<(), rusqlite::Error> {
            let tx = conn.transaction()?;
            tx.execute_batch(
                "DELETE FROM failed_messages;
                 DELETE FROM message_records;
                 DELETE FROM session_statistics;
                 DELETE FROM forward_sessions;",
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
