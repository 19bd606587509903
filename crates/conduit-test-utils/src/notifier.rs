// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Status notifier that records what it was given.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use conduit_core::{ConduitError, StatusNotifier, StatusSnapshot};

#[derive(Default)]
pub struct RecordingNotifier {
    snapshots: Mutex<Vec<StatusSnapshot>>,
    attempts: AtomicUsize,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every publish fails after being counted.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Successfully published snapshots, oldest first.
    pub fn snapshots(&self) -> Vec<StatusSnapshot> {
        self.snapshots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn last(&self) -> Option<StatusSnapshot> {
        self.snapshots().pop()
    }

    /// Publish calls, including failed ones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusNotifier for RecordingNotifier {
    async fn publish(&self, snapshot: &StatusSnapshot) -> Result<(), ConduitError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ConduitError::Internal("notifier unavailable".into()));
        }
        self.snapshots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(snapshot.clone());
        Ok(())
    }
}
