// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the [`ProgressStore`] trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use conduit_config::model::StorageConfig;
use conduit_core::{
    AdapterType, Checkpoint, ConduitError, Counters, FailedMessage, ForwardSession, HealthStatus,
    LifetimeCounters, MessageRecord, PluginAdapter, ProgressStore, SessionRequest, SessionStatus,
    SourceId,
};

use crate::database::{Database, map_tr_err};
use crate::queries::{failed, records, sessions, settings, statistics};

/// SQLite-backed progress store.
///
/// The database is opened lazily by [`ProgressStore::initialize`].
pub struct SqliteStore {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStore {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Open a store at `path` with default options.
    pub async fn open(path: &str) -> Result<Self, ConduitError> {
        let store = Self::new(StorageConfig {
            database_path: path.to_string(),
            wal_mode: true,
        });
        store.initialize().await?;
        Ok(store)
    }

    fn db(&self) -> Result<&Database, ConduitError> {
        self.db.get().ok_or_else(|| ConduitError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, ConduitError> {
        let db = match self.db() {
            Ok(db) => db,
            Err(e) => return Ok(HealthStatus::Unhealthy(e.to_string())),
        };
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ConduitError> {
        if let Some(db) = self.db.get() {
            db.checkpoint_wal().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl ProgressStore for SqliteStore {
    async fn initialize(&self) -> Result<(), ConduitError> {
        let db = Database::open_with(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| ConduitError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite progress store initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), ConduitError> {
        self.db()?.checkpoint_wal().await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    // --- Sessions ---

    async fn create_session(
        &self,
        request: &SessionRequest,
    ) -> Result<ForwardSession, ConduitError> {
        sessions::create_session(self.db()?, request).await
    }

    async fn get_session(&self, id: &str) -> Result<Option<ForwardSession>, ConduitError> {
        sessions::get_session(self.db()?, id).await
    }

    async fn latest_session(&self) -> Result<Option<ForwardSession>, ConduitError> {
        Ok(sessions::list_sessions(self.db()?, 1).await?.into_iter().next())
    }

    async fn list_sessions(&self, limit: usize) -> Result<Vec<ForwardSession>, ConduitError> {
        sessions::list_sessions(self.db()?, limit).await
    }

    async fn acquire_lease(&self, id: &str) -> Result<ForwardSession, ConduitError> {
        sessions::acquire_lease(self.db()?, id).await
    }

    async fn update_status(
        &self,
        id: &str,
        status: SessionStatus,
        last_error: Option<&str>,
    ) -> Result<(), ConduitError> {
        sessions::update_status(self.db()?, id, status, last_error).await
    }

    async fn recover_stale_sessions(&self) -> Result<Vec<String>, ConduitError> {
        sessions::recover_stale(self.db()?).await
    }

    // --- Dedup ledger ---

    async fn get_record(
        &self,
        session_id: &str,
        source_id: SourceId,
    ) -> Result<Option<MessageRecord>, ConduitError> {
        records::get_record(self.db()?, session_id, source_id).await
    }

    async fn find_forwarded_elsewhere(
        &self,
        session: &ForwardSession,
        source_id: SourceId,
    ) -> Result<Option<MessageRecord>, ConduitError> {
        records::find_forwarded_elsewhere(
            self.db()?,
            &session.id,
            &session.source_chat,
            &session.target_chat,
            source_id,
        )
        .await
    }

    async fn find_fingerprint(
        &self,
        session_id: &str,
        fingerprint: &str,
    ) -> Result<Option<MessageRecord>, ConduitError> {
        records::find_fingerprint(self.db()?, session_id, fingerprint).await
    }

    async fn record_outcome(
        &self,
        record: &MessageRecord,
        failure: Option<&FailedMessage>,
    ) -> Result<(), ConduitError> {
        records::record_outcome(self.db()?, record, failure).await
    }

    // --- Checkpoints and statistics ---

    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<bool, ConduitError> {
        statistics::save_checkpoint(self.db()?, checkpoint).await
    }

    async fn load_counters(&self, session_id: &str) -> Result<Counters, ConduitError> {
        statistics::load_counters(self.db()?, session_id).await
    }

    async fn load_lifetime(&self) -> Result<LifetimeCounters, ConduitError> {
        statistics::load_lifetime(self.db()?).await
    }

    // --- Failures ---

    async fn list_failed(
        &self,
        session_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<FailedMessage>, ConduitError> {
        failed::list_failed(self.db()?, session_id, limit).await
    }

    async fn get_failed(
        &self,
        session_id: &str,
        source_id: SourceId,
    ) -> Result<Option<FailedMessage>, ConduitError> {
        failed::get_failed(self.db()?, session_id, source_id).await
    }

    // --- Settings ---

    async fn get_setting(&self, key: &str) -> Result<Option<String>, ConduitError> {
        settings::get_setting(self.db()?, key).await
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<(), ConduitError> {
        settings::set_setting(self.db()?, key, value).await
    }

    async fn delete_setting(&self, key: &str) -> Result<(), ConduitError> {
        settings::delete_setting(self.db()?, key).await
    }

    async fn all_settings(&self) -> Result<Vec<(String, String)>, ConduitError> {
        settings::all_settings(self.db()?).await
    }

    // --- Reset ---

    async fn reset_all(&self) -> Result<(), ConduitError> {
        statistics::reset_all(self.db()?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn uninitialized_store_reports_unhealthy() {
        let store = SqliteStore::new(StorageConfig {
            database_path: "/nonexistent/never-opened.db".into(),
            wal_mode: true,
        });
        assert!(matches!(
            store.health_check().await.unwrap(),
            HealthStatus::Unhealthy(_)
        ));
        assert!(store.get_session("x").await.is_err());
    }

    #[tokio::test]
    async fn double_initialize_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("p.db");
        let store = SqliteStore::open(path.to_str().unwrap()).await.unwrap();
        assert!(store.initialize().await.is_err());
        assert_eq!(store.health_check().await.unwrap(), HealthStatus::Healthy);
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn latest_session_is_most_recent() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("p.db").to_str().unwrap())
            .await
            .unwrap();
        assert!(store.latest_session().await.unwrap().is_none());

        let req = SessionRequest {
            source_chat: "@a".into(),
            target_chat: "@b".into(),
            from_id: 1,
            to_id: Some(3),
        };
        store.create_session(&req).await.unwrap();
        let second = store.create_session(&req).await.unwrap();
        assert_eq!(store.latest_session().await.unwrap().unwrap().id, second.id);
        store.shutdown().await.unwrap();
    }
}
