// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable progress store: sessions, dedup ledger, failures, settings and statistics.

use async_trait::async_trait;

use crate::error::ConduitError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    Checkpoint, Counters, FailedMessage, ForwardSession, LifetimeCounters, MessageRecord,
    SessionRequest, SessionStatus, SourceId,
};

#[async_trait]
pub trait ProgressStore: PluginAdapter {
    /// Opens the backend and applies pending migrations.
    async fn initialize(&self) -> Result<(), ConduitError>;

    /// Flushes pending writes and releases the backend.
    async fn close(&self) -> Result<(), ConduitError>;

    // --- Sessions ---

    /// Creates an `idle` session with its cursor at `from_id` and bumps
    /// the lifetime session count.
    async fn create_session(&self, request: &SessionRequest)
    -> Result<ForwardSession, ConduitError>;

    async fn get_session(&self, id: &str) -> Result<Option<ForwardSession>, ConduitError>;

    /// Most recently created session.
    async fn latest_session(&self) -> Result<Option<ForwardSession>, ConduitError>;

    async fn list_sessions(&self, limit: usize) -> Result<Vec<ForwardSession>, ConduitError>;

    /// Atomically moves a resumable session to `running`.
    ///
    /// Fails with `SessionBusy` when the session is already running and with
    /// `InvalidTransition` when it is cancelled or completed.
    async fn acquire_lease(&self, id: &str) -> Result<ForwardSession, ConduitError>;

    /// Sets the session status and last error. Releasing the lease is a call
    /// with any status other than `running`.
    async fn update_status(
        &self,
        id: &str,
        status: SessionStatus,
        last_error: Option<&str>,
    ) -> Result<(), ConduitError>;

    /// Moves sessions left `running` by a dead process to `paused`.
    /// Returns the ids touched.
    async fn recover_stale_sessions(&self) -> Result<Vec<String>, ConduitError>;

    // --- Dedup ledger ---

    async fn get_record(
        &self,
        session_id: &str,
        source_id: SourceId,
    ) -> Result<Option<MessageRecord>, ConduitError>;

    /// A `forwarded` record for this id written by another session on the same route.
    async fn find_forwarded_elsewhere(
        &self,
        session: &ForwardSession,
        source_id: SourceId,
    ) -> Result<Option<MessageRecord>, ConduitError>;

    /// A `forwarded` record in this session carrying the same content fingerprint.
    async fn find_fingerprint(
        &self,
        session_id: &str,
        fingerprint: &str,
    ) -> Result<Option<MessageRecord>, ConduitError>;

    /// Upserts the ledger entry. With `Some(failure)` the failure row is
    /// upserted in the same transaction; with `None` any failure row for
    /// the id is removed.
    async fn record_outcome(
        &self,
        record: &MessageRecord,
        failure: Option<&FailedMessage>,
    ) -> Result<(), ConduitError>;

    // --- Checkpoints and statistics ---

    /// Persists cursor and session counters in one transaction and adds
    /// their change since the previous checkpoint to the lifetime counters.
    /// Returns `false` when the stored cursor is already ahead (stale write);
    /// the stored state is then left untouched.
    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<bool, ConduitError>;

    async fn load_counters(&self, session_id: &str) -> Result<Counters, ConduitError>;

    async fn load_lifetime(&self) -> Result<LifetimeCounters, ConduitError>;

    // --- Failures ---

    /// Failures newest first, optionally scoped to one session.
    async fn list_failed(
        &self,
        session_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<FailedMessage>, ConduitError>;

    async fn get_failed(
        &self,
        session_id: &str,
        source_id: SourceId,
    ) -> Result<Option<FailedMessage>, ConduitError>;

    // --- Settings ---

    async fn get_setting(&self, key: &str) -> Result<Option<String>, ConduitError>;

    async fn set_setting(&self, key: &str, value: &str) -> Result<(), ConduitError>;

    async fn delete_setting(&self, key: &str) -> Result<(), ConduitError>;

    async fn all_settings(&self) -> Result<Vec<(String, String)>, ConduitError>;

    // --- Reset ---

    /// Removes every session, ledger entry, failure and session statistic.
    /// Lifetime statistics and settings survive.
    async fn reset_all(&self) -> Result<(), ConduitError>;
}
