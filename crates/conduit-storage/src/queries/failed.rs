// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Failed message listing. Writes go through [`records::record_outcome`](super::records::record_outcome).

use conduit_core::{ConduitError, SourceId};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::models::{FAILED_COLUMNS, FailedMessage, failed_from_row};

/// Failures newest first.
pub async fn list_failed(
    db: &Database,
    session_id: Option<&str>,
    limit: usize,
) -> Result<Vec<FailedMessage>, ConduitError> {
    let session_id = session_id.map(str::to_string);
    db.connection()
        .call(move |conn| -> Result<Vec<FailedMessage>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {FAILED_COLUMNS} FROM failed_messages
                 WHERE (?1 IS NULL OR session_id = ?1)
                 ORDER BY last_attempt_at DESC, source_id DESC
                 LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![session_id, limit as i64], failed_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_failed(
    db: &Database,
    session_id: &str,
    source_id: SourceId,
) -> Result<Option<FailedMessage>, ConduitError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<FailedMessage>, rusqlite::Error> {
            conn.query_row(
                &format!(
                    "SELECT {FAILED_COLUMNS} FROM failed_messages
                     WHERE session_id = ?1 AND source_id = ?2"
                ),
                params![session_id, source_id],
                failed_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}
