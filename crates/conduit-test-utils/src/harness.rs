// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for engine integration tests.
//!
//! `TestHarness` wires a [`MockPlatform`], a [`RecordingNotifier`] and a
//! SQLite store in a temporary directory. [`TestHarness::reopen_store`]
//! opens a second store on the same file to simulate a process restart.

use std::sync::Arc;

use conduit_config::ConduitConfig;
use conduit_config::model::StorageConfig;
use conduit_core::{ConduitError, ProgressStore};
use conduit_storage::SqliteStore;

use crate::mock_platform::MockPlatform;
use crate::notifier::RecordingNotifier;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    config: ConduitConfig,
    platform: Option<MockPlatform>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            config: ConduitConfig::default(),
            platform: None,
        }
    }

    /// Start from this config. The database path is always replaced.
    pub fn with_config(mut self, config: ConduitConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_platform(mut self, platform: MockPlatform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub async fn build(self) -> Result<TestHarness, ConduitError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| ConduitError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("test.db").to_string_lossy().to_string();

        let mut config = self.config;
        config.storage = StorageConfig {
            database_path: db_path.clone(),
            wal_mode: true,
        };

        let store = SqliteStore::new(config.storage.clone());
        store.initialize().await?;

        Ok(TestHarness {
            platform: Arc::new(self.platform.unwrap_or_default()),
            store: Arc::new(store),
            notifier: Arc::new(RecordingNotifier::new()),
            config,
            db_path,
            _temp_dir: temp_dir,
        })
    }
}

/// Mock collaborators plus a real store on a throwaway database.
pub struct TestHarness {
    pub platform: Arc<MockPlatform>,
    pub store: Arc<SqliteStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub config: ConduitConfig,
    pub db_path: String,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Harness with default config and an empty platform.
    pub async fn new() -> Result<Self, ConduitError> {
        Self::builder().build().await
    }

    /// Open another store on the same database file.
    pub async fn reopen_store(&self) -> Result<Arc<SqliteStore>, ConduitError> {
        let store = SqliteStore::new(self.config.storage.clone());
        store.initialize().await?;
        Ok(Arc::new(store))
    }
}
