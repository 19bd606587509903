// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Forwarding session CRUD and the run lease.

use conduit_core::{ConduitError, SessionRequest, SessionStatus};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::models::{ForwardSession, SESSION_COLUMNS, session_from_row};

/// Insert a new `idle` session with its cursor at `from_id`.
///
/// Bumps `lifetime_statistics.sessions_started` in the same transaction.
pub async fn create_session(
    db: &Database,
    request: &SessionRequest,
) -> Result<ForwardSession, ConduitError> {
    request.validate()?;
    let request = request.clone();
    let id = uuid::Uuid::new_v4().to_string();
    db.connection()
        .call(move |conn| -> Result<ForwardSession, rusqlite::Error> {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO forward_sessions (id, source_chat, target_chat, from_id, to_id, current_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?4)",
                params![
                    id,
                    request.source_chat,
                    request.target_chat,
                    request.from_id,
                    request.to_id,
                ],
            )?;
            tx.execute(
                "INSERT INTO session_statistics (session_id) VALUES (?1)",
                params![id],
            )?;
            tx.execute(
                "UPDATE lifetime_statistics SET sessions_started = sessions_started + 1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = 1",
                [],
            )?;
            let session = tx.query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM forward_sessions WHERE id = ?1"),
                params![id],
                session_from_row,
            )?;
            tx.commit()?;
            Ok(session)
        })
        .await
        .map_err(map_tr_err)
}

/// Get a session by id.
pub async fn get_session(db: &Database, id: &str) -> Result<Option<ForwardSession>, ConduitError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<ForwardSession>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM forward_sessions WHERE id = ?1"),
                params![id],
                session_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Sessions newest first. `rowid` breaks ties between equal timestamps.
pub async fn list_sessions(
    db: &Database,
    limit: usize,
) -> Result<Vec<ForwardSession>, ConduitError> {
    db.connection()
        .call(move |conn| -> Result<Vec<ForwardSession>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM forward_sessions
                 ORDER BY created_at DESC, rowid DESC LIMIT ?1"
            ))?;
            let rows = stmt.query_map(params![limit as i64], session_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// What happened when trying to take the run lease.
enum Lease {
    Acquired(ForwardSession),
    Missing,
    Busy,
    Closed(SessionStatus),
}

/// Move a resumable session to `running` in one transaction.
pub async fn acquire_lease(db: &Database, id: &str) -> Result<ForwardSession, ConduitError> {
    let session_id = id.to_string();
    let lease = db
        .connection()
        .call(move |conn| -> Result<Lease, rusqlite::Error> {
            let tx = conn.transaction()?;
            let current = tx
                .query_row(
                    &format!("SELECT {SESSION_COLUMNS} FROM forward_sessions WHERE id = ?1"),
                    params![session_id],
                    session_from_row,
                )
                .optional()?;
            let lease = match current {
                None => Lease::Missing,
                Some(s) if s.status == SessionStatus::Running => Lease::Busy,
                Some(s) if !s.status.is_resumable() => Lease::Closed(s.status),
                Some(mut s) => {
                    tx.execute(
                        "UPDATE forward_sessions SET status = 'running', last_error = NULL,
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                         WHERE id = ?1",
                        params![s.id],
                    )?;
                    s.status = SessionStatus::Running;
                    s.last_error = None;
                    Lease::Acquired(s)
                }
            };
            tx.commit()?;
            Ok(lease)
        })
        .await
        .map_err(map_tr_err)?;

    match lease {
        Lease::Acquired(session) => Ok(session),
        Lease::Missing => Err(ConduitError::SessionNotFound {
            session_id: id.to_string(),
        }),
        Lease::Busy => Err(ConduitError::SessionBusy {
            session_id: id.to_string(),
        }),
        Lease::Closed(status) => Err(ConduitError::InvalidTransition {
            session_id: id.to_string(),
            status,
            action: "resume",
        }),
    }
}

/// Set status and last error.
pub async fn update_status(
    db: &Database,
    id: &str,
    status: SessionStatus,
    last_error: Option<&str>,
) -> Result<(), ConduitError> {
    let session_id = id.to_string();
    let status = status.to_string();
    let last_error = last_error.map(str::to_string);
    let changed = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "UPDATE forward_sessions SET status = ?1, last_error = ?2,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?3",
                params![status, last_error, session_id],
            )
        })
        .await
        .map_err(map_tr_err)?;
    if changed == 0 {
        return Err(ConduitError::SessionNotFound {
            session_id: id.to_string(),
        });
    }
    Ok(())
}

/// Sessions left `running` by a process that died become `paused`.
pub async fn recover_stale(db: &Database) -> Result<Vec<String>, ConduitError> {
    db.connection()
        .call(|conn| -> Result<Vec<String>, rusqlite::Error> {
            let tx = conn.transaction()?;
            let ids = {
                let mut stmt =
                    tx.prepare("SELECT id FROM forward_sessions WHERE status = 'running'")?;
                let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                rows.collect::<Result<Vec<_>, _>>()?
            };
            tx.execute(
                "UPDATE forward_sessions SET status = 'paused',
                 last_error = 'interrupted: process exited while running',
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE status = 'running'",
                [],
            )?;
            tx.commit()?;
            Ok(ids)
        })
        .await
        .map_err(map_tr_err)
}
