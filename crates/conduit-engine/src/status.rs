// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Throttled status publishing.
//!
//! The engine pushes a snapshot into a `watch` channel after every id; the
//! publisher task forwards at most one per interval to the notifier and
//! always delivers the last snapshot of a run.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use conduit_core::{ConduitError, StatusNotifier, StatusSnapshot};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct StatusPublisher {
    notifier: Arc<dyn StatusNotifier>,
    interval: Duration,
}

impl StatusPublisher {
    pub fn new(notifier: Arc<dyn StatusNotifier>, interval: Duration) -> Self {
        Self { notifier, interval }
    }

    /// Run until `done` is cancelled, then publish the final snapshot if it is new.
    pub fn spawn(
        self,
        rx: watch::Receiver<StatusSnapshot>,
        done: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(rx, done))
    }

    async fn run(self, mut rx: watch::Receiver<StatusSnapshot>, done: CancellationToken) {
        let mut last: Option<StatusSnapshot> = None;
        let mut last_at: Option<Instant> = None;

        loop {
            tokio::select! {
                biased;
                _ = done.cancelled() => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }

            if let Some(at) = last_at {
                let next = at + self.interval;
                tokio::select! {
                    biased;
                    _ = done.cancelled() => break,
                    _ = tokio::time::sleep_until(next) => {}
                }
            }

            let snapshot = rx.borrow_and_update().clone();
            self.publish(&snapshot).await;
            last = Some(snapshot);
            last_at = Some(Instant::now());
        }

        let snapshot = rx.borrow_and_update().clone();
        if last.as_ref() != Some(&snapshot) {
            self.publish(&snapshot).await;
        }
    }

    async fn publish(&self, snapshot: &StatusSnapshot) {
        if let Err(e) = self.notifier.publish(snapshot).await {
            warn!(session_id = %snapshot.session_id, error = %e, "status notifier failed");
        }
    }
}

/// Notifier that writes snapshots to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl StatusNotifier for LogNotifier {
    async fn publish(&self, snapshot: &StatusSnapshot) -> Result<(), ConduitError> {
        let c = &snapshot.counters;
        info!(
            session_id = %snapshot.session_id,
            state = %snapshot.state,
            current_id = snapshot.current_id,
            fetched = c.fetched,
            forwarded = c.forwarded,
            duplicate = c.duplicate,
            deleted = c.deleted,
            filtered = c.filtered,
            failed = c.failed,
            percentage = snapshot.percentage,
            speed = snapshot.speed,
            eta_secs = snapshot.eta_secs,
            "forwarding status"
        );
        Ok(())
    }
}
