// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dedup ledger queries.

use conduit_core::{ConduitError, SourceId};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::models::{FailedMessage, MessageRecord, RECORD_COLUMNS, record_from_row};

/// Ledger entry for one id.
pub async fn get_record(
    db: &Database,
    session_id: &str,
    source_id: SourceId,
) -> Result<Option<MessageRecord>, ConduitError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<MessageRecord>, rusqlite::Error> {
            conn.query_row(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM message_records
                     WHERE session_id = ?1 AND source_id = ?2"
                ),
                params![session_id, source_id],
                record_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// A `forwarded` entry for `source_id` from any other session on the same route.
pub async fn find_forwarded_elsewhere(
    db: &Database,
    session_id: &str,
    source_chat: &str,
    target_chat: &str,
    source_id: SourceId,
) -> Result<Option<MessageRecord>, ConduitError> {
    let session_id = session_id.to_string();
    let source_chat = source_chat.to_string();
    let target_chat = target_chat.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<MessageRecord>, rusqlite::Error> {
            conn.query_row(
                "SELECT r.session_id, r.source_id, r.status, r.target_id, r.fingerprint,
                        r.retry_count, r.updated_at
                 FROM message_records r
                 JOIN forward_sessions s ON s.id = r.session_id
                 WHERE r.source_id = ?1 AND r.status = 'forwarded' AND r.session_id != ?2
                   AND s.source_chat = ?3 AND s.target_chat = ?4
                 ORDER BY r.updated_at DESC LIMIT 1",
                params![source_id, session_id, source_chat, target_chat],
                record_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// A `forwarded` entry in this session carrying `fingerprint`.
pub async fn find_fingerprint(
    db: &Database,
    session_id: &str,
    fingerprint: &str,
) -> Result<Option<MessageRecord>, ConduitError> {
    let session_id = session_id.to_string();
    let fingerprint = fingerprint.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<MessageRecord>, rusqlite::Error> {
            conn.query_row(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM message_records
                     WHERE session_id = ?1 AND fingerprint = ?2 AND status = 'forwarded'
                     ORDER BY source_id LIMIT 1"
                ),
                params![session_id, fingerprint],
                record_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Upsert a ledger entry and its failure row in one transaction.
///
/// `failure = None` clears any failure row left from an earlier attempt.
pub async fn record_outcome(
    db: &Database,
    record: &MessageRecord,
    failure: Option<&FailedMessage>,
) -> Result<(), ConduitError> {
    let record = record.clone();
    let failure = failure.cloned();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO message_records
                     (session_id, source_id, status, target_id, fingerprint, retry_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(session_id, source_id) DO UPDATE SET
                     status = excluded.status,
                     target_id = excluded.target_id,
                     fingerprint = COALESCE(excluded.fingerprint, message_records.fingerprint),
                     retry_count = excluded.retry_count,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![
                    record.session_id,
                    record.source_id,
                    record.status.to_string(),
                    record.target_id,
                    record.fingerprint,
                    record.retry_count,
                ],
            )?;
            match failure {
                Some(f) => {
                    tx.execute(
                        "INSERT INTO failed_messages
                             (session_id, source_id, error_kind, error_message, attempt_count, strategy_used)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                         ON CONFLICT(session_id, source_id) DO UPDATE SET
                             error_kind = excluded.error_kind,
                             error_message = excluded.error_message,
                             attempt_count = excluded.attempt_count,
                             strategy_used = excluded.strategy_used,
                             last_attempt_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                        params![
                            f.session_id,
                            f.source_id,
                            f.error_kind.to_string(),
                            f.error_message,
                            f.attempt_count,
                            f.strategy_used,
                        ],
                    )?;
                }
                None => {
                    tx.execute(
                        "DELETE FROM failed_messages WHERE session_id = ?1 AND source_id = ?2",
                        params![record.session_id, record.source_id],
                    )?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
