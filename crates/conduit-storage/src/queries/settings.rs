// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key/value operator settings.

use conduit_core::ConduitError;
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};

pub async fn get_setting(db: &Database, key: &str) -> Result<Option<String>, ConduitError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<String>, rusqlite::Error> {
            conn.query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn set_setting(db: &Database, key: &str, value: &str) -> Result<(), ConduitError> {
    let key = key.to_string();
    let value = value.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO settings (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![key, value],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn delete_setting(db: &Database, key: &str) -> Result<(), ConduitError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute("DELETE FROM settings WHERE key = ?1", params![key])?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// All settings ordered by key.
pub async fn all_settings(db: &Database) -> Result<Vec<(String, String)>, ConduitError> {
    db.connection()
        .call(|conn| -> Result<Vec<(String, String)>, rusqlite::Error> {
            let mut stmt = conn.prepare("SELECT key, value FROM settings ORDER BY key")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn set_overwrites_and_delete_removes() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("t.db").to_str().unwrap())
            .await
            .unwrap();

        assert!(get_setting(&db, "speed_mode").await.unwrap().is_none());
        set_setting(&db, "speed_mode", "fast").await.unwrap();
        set_setting(&db, "speed_mode", "safe").await.unwrap();
        set_setting(&db, "delay", "2.5").await.unwrap();
        assert_eq!(
            get_setting(&db, "speed_mode").await.unwrap().as_deref(),
            Some("safe")
        );

        let all = all_settings(&db).await.unwrap();
        assert_eq!(
            all,
            vec![
                ("delay".to_string(), "2.5".to_string()),
                ("speed_mode".to_string(), "safe".to_string()),
            ]
        );

        delete_setting(&db, "delay").await.unwrap();
        assert!(get_setting(&db, "delay").await.unwrap().is_none());
        db.close().await.unwrap();
    }
}
