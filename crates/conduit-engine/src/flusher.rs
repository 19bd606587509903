// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic checkpoint flush, independent of the per-N flush in the loop.

use std::sync::Arc;
use std::time::Duration;

use conduit_core::{Checkpoint, ProgressStore};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct ProgressFlusher {
    store: Arc<dyn ProgressStore>,
    interval: Duration,
}

impl ProgressFlusher {
    pub fn new(store: Arc<dyn ProgressStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    pub fn spawn(self, rx: watch::Receiver<Checkpoint>, done: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(rx, done))
    }

    async fn run(self, mut rx: watch::Receiver<Checkpoint>, done: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = done.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if !rx.has_changed().unwrap_or(false) {
                continue;
            }
            let checkpoint = rx.borrow_and_update().clone();
            match self.store.save_checkpoint(&checkpoint).await {
                Ok(true) => debug!(
                    session_id = %checkpoint.session_id,
                    current_id = checkpoint.current_id,
                    "periodic checkpoint"
                ),
                Ok(false) => debug!(
                    session_id = %checkpoint.session_id,
                    "periodic checkpoint superseded"
                ),
                Err(e) => warn!(
                    session_id = %checkpoint.session_id,
                    error = %e,
                    "periodic checkpoint failed"
                ),
            }
        }
    }
}
