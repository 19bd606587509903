// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Conduit forwarding engine.
//!
//! Two layers: [`PlatformError`] is what the messaging platform reports for a
//! single call and never escapes the per-message loop, while [`ConduitError`]
//! is what engine, store and command-layer operations return.

use std::time::Duration;

use thiserror::Error;

use crate::types::{ErrorKind, SessionStatus};

/// The primary error type used across adapter traits and engine operations.
#[derive(Debug, Error)]
pub enum ConduitError {
    /// Configuration errors (invalid TOML, bad values, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Platform collaborator errors outside the per-message loop (health checks, horizon lookups).
    #[error("platform error: {message}")]
    Platform {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operator input rejected before any state was touched.
    #[error("invalid value: {0}")]
    Validation(String),

    /// Another engine instance holds the session lease.
    #[error("session {session_id} is already running")]
    SessionBusy { session_id: String },

    /// No session with this id exists.
    #[error("session not found: {session_id}")]
    SessionNotFound { session_id: String },

    /// The requested lifecycle action is not allowed from the current status.
    #[error("cannot {action} session {session_id} while it is {status}")]
    InvalidTransition {
        session_id: String,
        status: SessionStatus,
        action: &'static str,
    },

    /// A persisted checkpoint violates the cursor range invariant.
    #[error("corrupt checkpoint for session {session_id}: {detail}")]
    CorruptCheckpoint { session_id: String, detail: String },

    /// The platform revoked our authorization; nothing more can be sent.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ConduitError {
    /// Whether this error must halt a running session.
    ///
    /// Fatal errors move the session to `failed`; everything else is reported
    /// to the caller and leaves the session untouched.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Storage { .. }
                | Self::CorruptCheckpoint { .. }
                | Self::Unauthorized(_)
                | Self::Internal(_)
        )
    }
}

/// An error reported by the messaging platform for a single call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    /// Platform-mandated wait before the call may be repeated.
    #[error("rate limited, retry after {}s", retry_after.as_secs_f64())]
    RateLimited { retry_after: Duration },

    /// The call is not permitted (e.g. forwarding restricted on the source).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The message does not exist (deleted or never existed).
    #[error("message not found")]
    NotFound,

    /// The payload exceeds what this call accepts.
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    /// Connectivity or server-side hiccup worth retrying.
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// Credentials revoked or account deactivated.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Anything the client could not classify.
    #[error("{0}")]
    Unknown(String),
}

impl PlatformError {
    /// Reason code persisted with failed messages.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::NotFound => ErrorKind::NotFound,
            Self::PayloadTooLarge(_) => ErrorKind::PayloadTooLarge,
            Self::TransientNetwork(_) => ErrorKind::TransientNetwork,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Unknown(_) => ErrorKind::Unknown,
        }
    }
}

impl From<PlatformError> for ConduitError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::Unauthorized(msg) => Self::Unauthorized(msg),
            other => Self::Platform {
                message: other.to_string(),
                source: Some(Box::new(other)),
            },
        }
    }
}
