// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Duplicate detection against the message ledger.

use std::sync::Arc;

use conduit_config::model::PolicyConfig;
use conduit_core::{
    ConduitError, ForwardSession, MessageRecord, ProgressStore, RecordStatus, SourceId,
    SourceMessage,
};
use sha2::{Digest, Sha256};
use tracing::debug;

/// What the ledger already knows about an id before any network work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Known {
    /// This session already settled the id; replay it without sending.
    Settled(MessageRecord),
    /// Another session on the same route already forwarded it.
    ForwardedElsewhere(MessageRecord),
    Unknown,
}

pub struct DedupTracker {
    store: Arc<dyn ProgressStore>,
    cross_session: bool,
    by_fingerprint: bool,
}

impl DedupTracker {
    pub fn new(store: Arc<dyn ProgressStore>, policy: &PolicyConfig) -> Self {
        Self {
            store,
            cross_session: policy.dedup_cross_session,
            by_fingerprint: policy.dedup_by_fingerprint,
        }
    }

    /// Ledger lookup done before contacting the platform.
    pub async fn lookup(
        &self,
        session: &ForwardSession,
        source_id: SourceId,
    ) -> Result<Known, ConduitError> {
        if let Some(record) = self.store.get_record(&session.id, source_id).await? {
            if record.status.is_terminal() {
                return Ok(Known::Settled(record));
            }
        }
        if self.cross_session {
            if let Some(record) = self.store.find_forwarded_elsewhere(session, source_id).await? {
                debug!(
                    source_id,
                    other_session = %record.session_id,
                    "already forwarded by an earlier session"
                );
                return Ok(Known::ForwardedElsewhere(record));
            }
        }
        Ok(Known::Unknown)
    }

    /// Fingerprint of a fetched message, when fingerprint dedup is enabled.
    pub fn fingerprint_of(&self, message: &SourceMessage) -> Option<String> {
        self.by_fingerprint.then(|| fingerprint(message))
    }

    /// Whether a message with this fingerprint was already forwarded in the session.
    pub async fn seen_fingerprint(
        &self,
        session_id: &str,
        fingerprint: &str,
    ) -> Result<bool, ConduitError> {
        Ok(self
            .store
            .find_fingerprint(session_id, fingerprint)
            .await?
            .is_some_and(|r| r.status == RecordStatus::Forwarded))
    }
}

/// Content fingerprint: the platform file id for media, a SHA-256 of the text otherwise.
pub fn fingerprint(message: &SourceMessage) -> String {
    if let Some(media) = &message.media {
        return format!("file:{}", media.file_unique_id);
    }
    let mut hasher = Sha256::new();
    hasher.update(message.kind.to_string().as_bytes());
    hasher.update([0u8]);
    hasher.update(message.text.as_deref().unwrap_or_default().as_bytes());
    hasher.update([0u8]);
    hasher.update(message.caption.as_deref().unwrap_or_default().as_bytes());
    format!("sha256:{}", hex::encode(hasher.finalize()))
}
