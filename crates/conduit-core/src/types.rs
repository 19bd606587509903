// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the engine, the store and the command layer.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::ConduitError;

/// Source-feed message id. Ids are ordered and gaps are allowed.
pub type SourceId = i64;

/// Id assigned by the platform to a message re-emitted in the target feed.
pub type TargetId = i64;

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the role an adapter plays.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Platform,
    Storage,
    Notifier,
}

/// Lifecycle state of a forwarding session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Running,
    Paused,
    Cancelled,
    Completed,
    Failed,
}

impl SessionStatus {
    /// States from which a session can (re)acquire the run lease.
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::Idle | Self::Paused | Self::Failed)
    }

    /// States a session never leaves on its own.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed)
    }
}

/// Per-id outcome stored in the dedup ledger.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Pending,
    Forwarded,
    Duplicate,
    Filtered,
    Deleted,
    Failed,
}

impl RecordStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Reason code persisted with a failed message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimited,
    Forbidden,
    NotFound,
    PayloadTooLarge,
    TransientNetwork,
    Unauthorized,
    Unknown,
}

/// Named pacing presets for the inter-message delay.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum SpeedMode {
    Fast,
    #[default]
    Normal,
    Safe,
}

impl SpeedMode {
    /// Base delay between two messages for this preset.
    pub fn base_delay(&self) -> Duration {
        match self {
            Self::Fast => Duration::from_millis(500),
            Self::Normal => Duration::from_millis(1000),
            Self::Safe => Duration::from_millis(2500),
        }
    }
}

/// What a source message carries.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Text,
    Photo,
    Video,
    Document,
    Audio,
    Voice,
    VideoNote,
    Sticker,
    Animation,
    Poll,
    Contact,
    Location,
    Venue,
    Dice,
    Service,
    Unsupported,
}

/// File attached to a source message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Platform id that stays stable across re-uploads of the same file.
    pub file_unique_id: String,
    pub size_bytes: u64,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
}

/// A message as returned by the platform's fetch call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMessage {
    pub id: SourceId,
    pub kind: ContentKind,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub media: Option<MediaInfo>,
}

impl SourceMessage {
    /// True when there is nothing to re-emit.
    pub fn is_empty(&self) -> bool {
        let blank = |s: &Option<String>| s.as_deref().is_none_or(|t| t.trim().is_empty());
        self.media.is_none() && blank(&self.text) && blank(&self.caption)
    }

    pub fn media_size(&self) -> Option<u64> {
        self.media.as_ref().map(|m| m.size_bytes)
    }
}

/// Content handed to the platform when re-emitting a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundContent {
    /// Source id this content was copied from.
    pub source_id: SourceId,
    pub kind: ContentKind,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub media: Option<MediaInfo>,
    /// Fully buffered file body; `None` for text-only messages.
    pub bytes: Option<Vec<u8>>,
}

/// Handle for a chunked upload in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadHandle {
    pub upload_id: String,
    pub target_chat: String,
}

/// Parameters for a new forwarding session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRequest {
    pub source_chat: String,
    pub target_chat: String,
    pub from_id: SourceId,
    /// Inclusive upper bound; `None` runs until the feed has no more content.
    pub to_id: Option<SourceId>,
}

impl SessionRequest {
    pub fn validate(&self) -> Result<(), ConduitError> {
        if self.source_chat.trim().is_empty() || self.target_chat.trim().is_empty() {
            return Err(ConduitError::Validation(
                "source and target chats must be set".into(),
            ));
        }
        if self.from_id < 1 {
            return Err(ConduitError::Validation(format!(
                "from_id must be positive, got {}",
                self.from_id
            )));
        }
        if let Some(to) = self.to_id {
            if to < self.from_id {
                return Err(ConduitError::Validation(format!(
                    "to_id {to} is before from_id {}",
                    self.from_id
                )));
            }
            // The cursor rests one past `to_id` once the range is done.
            if to == SourceId::MAX {
                return Err(ConduitError::Validation(format!(
                    "to_id must be below {}",
                    SourceId::MAX
                )));
            }
        }
        Ok(())
    }
}

/// Count of ids in `[from, to]`; zero when empty.
pub fn span(from: SourceId, to: SourceId) -> u64 {
    (i128::from(to) - i128::from(from) + 1).clamp(0, i128::from(u64::MAX)) as u64
}

/// A persisted forwarding session and its cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardSession {
    pub id: String,
    pub source_chat: String,
    pub target_chat: String,
    pub from_id: SourceId,
    pub to_id: Option<SourceId>,
    /// Next id to process. Never decreases.
    pub current_id: SourceId,
    pub status: SessionStatus,
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ForwardSession {
    /// Checks `from_id <= current_id <= to_id + 1`.
    pub fn check_cursor(&self) -> Result<(), ConduitError> {
        let upper_ok = self
            .to_id
            .is_none_or(|to| i128::from(self.current_id) <= i128::from(to) + 1);
        if self.current_id < self.from_id || !upper_ok {
            return Err(ConduitError::CorruptCheckpoint {
                session_id: self.id.clone(),
                detail: format!(
                    "cursor {} outside range [{}, {}]",
                    self.current_id,
                    self.from_id,
                    self.to_id
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| "open".into())
                ),
            });
        }
        Ok(())
    }

    /// Number of ids in a bounded range.
    pub fn total(&self) -> Option<u64> {
        self.to_id
            .map(|to| span(self.from_id, to))
    }

    /// Ids left to process in a bounded range.
    pub fn remaining(&self) -> Option<u64> {
        self.to_id.map(|to| span(self.current_id, to))
    }

    /// Share of the bounded range already behind the cursor, 0.0 to 100.0.
    pub fn percentage(&self) -> Option<f64> {
        let total = self.total()?;
        if total == 0 {
            return Some(100.0);
        }
        let done = (i128::from(self.current_id) - i128::from(self.from_id)).max(0) as f64;
        Some((done / total as f64 * 100.0).min(100.0))
    }

    /// Same source and target feeds.
    pub fn same_route(&self, other: &ForwardSession) -> bool {
        self.source_chat == other.source_chat && self.target_chat == other.target_chat
    }
}

/// Dedup ledger entry, unique per `(session_id, source_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub session_id: String,
    pub source_id: SourceId,
    pub status: RecordStatus,
    pub target_id: Option<TargetId>,
    pub fingerprint: Option<String>,
    /// Transient retries consumed; rate-limit waits are not counted.
    pub retry_count: u32,
    pub updated_at: String,
}

impl MessageRecord {
    pub fn new(session_id: &str, source_id: SourceId, status: RecordStatus) -> Self {
        Self {
            session_id: session_id.to_string(),
            source_id,
            status,
            target_id: None,
            fingerprint: None,
            retry_count: 0,
            updated_at: String::new(),
        }
    }
}

/// An id that exhausted every strategy; retriable by the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedMessage {
    pub session_id: String,
    pub source_id: SourceId,
    pub error_kind: ErrorKind,
    pub error_message: String,
    pub attempt_count: u32,
    pub strategy_used: String,
    pub last_attempt_at: String,
}

/// Outcome counters for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub fetched: u64,
    pub forwarded: u64,
    pub duplicate: u64,
    pub deleted: u64,
    pub filtered: u64,
    pub failed: u64,
}

impl Counters {
    /// Count one terminal outcome. `Pending` is ignored.
    pub fn record(&mut self, status: RecordStatus) {
        if let Some(slot) = self.slot(status) {
            *slot += 1;
        }
    }

    /// Undo a previously counted outcome (used when a failed id is retried).
    pub fn unrecord(&mut self, status: RecordStatus) {
        if let Some(slot) = self.slot(status) {
            *slot = slot.saturating_sub(1);
        }
    }

    fn slot(&mut self, status: RecordStatus) -> Option<&mut u64> {
        match status {
            RecordStatus::Pending => None,
            RecordStatus::Forwarded => Some(&mut self.forwarded),
            RecordStatus::Duplicate => Some(&mut self.duplicate),
            RecordStatus::Filtered => Some(&mut self.filtered),
            RecordStatus::Deleted => Some(&mut self.deleted),
            RecordStatus::Failed => Some(&mut self.failed),
        }
    }

    /// Ids that reached any terminal status.
    pub fn processed(&self) -> u64 {
        self.forwarded + self.duplicate + self.deleted + self.filtered + self.failed
    }

    pub fn plus(&self, other: &Counters) -> Counters {
        Counters {
            fetched: self.fetched + other.fetched,
            forwarded: self.forwarded + other.forwarded,
            duplicate: self.duplicate + other.duplicate,
            deleted: self.deleted + other.deleted,
            filtered: self.filtered + other.filtered,
            failed: self.failed + other.failed,
        }
    }

    pub fn saturating_sub(&self, other: &Counters) -> Counters {
        Counters {
            fetched: self.fetched.saturating_sub(other.fetched),
            forwarded: self.forwarded.saturating_sub(other.forwarded),
            duplicate: self.duplicate.saturating_sub(other.duplicate),
            deleted: self.deleted.saturating_sub(other.deleted),
            filtered: self.filtered.saturating_sub(other.filtered),
            failed: self.failed.saturating_sub(other.failed),
        }
    }
}

/// Counters accumulated over every session; never reset implicitly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifetimeCounters {
    #[serde(flatten)]
    pub counters: Counters,
    pub sessions_started: u64,
}

/// One atomic write of session progress.
///
/// Lifetime totals are not carried: the store adds the difference against
/// the previously saved session counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub session_id: String,
    pub current_id: SourceId,
    pub counters: Counters,
}

/// Structured status emitted to the notifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub session_id: String,
    pub state: SessionStatus,
    #[serde(flatten)]
    pub counters: Counters,
    pub percentage: Option<f64>,
    /// Messages per minute over the recent window.
    pub speed: f64,
    pub eta_secs: Option<u64>,
    pub current_id: SourceId,
}

/// Session and lifetime statistics for the command layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    pub session_id: Option<String>,
    pub session: Counters,
    pub lifetime: LifetimeCounters,
    pub speed: f64,
    pub eta_secs: Option<u64>,
}
