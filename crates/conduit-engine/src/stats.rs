// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session counters plus throughput over a sliding window.

use std::collections::VecDeque;

use conduit_core::{Counters, RecordStatus};
use tokio::time::Instant;

#[derive(Debug)]
pub struct StatsAggregator {
    window: usize,
    completions: VecDeque<Instant>,
    session: Counters,
}

impl StatsAggregator {
    /// Start from the session counters of the last checkpoint.
    pub fn new(window: usize, session: Counters) -> Self {
        Self {
            window: window.max(2),
            completions: VecDeque::new(),
            session,
        }
    }

    /// Count a freshly processed id and feed the speed window.
    pub fn record(&mut self, status: RecordStatus, fetched: bool) {
        self.count(status, fetched);
        self.completions.push_back(Instant::now());
        while self.completions.len() > self.window {
            self.completions.pop_front();
        }
    }

    /// Count an id replayed from the ledger. No network work, so no speed sample.
    pub fn restore(&mut self, status: RecordStatus, fetched: bool) {
        self.count(status, fetched);
    }

    /// Move one id from `from` to `to` outside the normal forward pass.
    pub fn reclassify(&mut self, from: RecordStatus, to: RecordStatus, fetched: bool) {
        self.session.unrecord(from);
        self.count(to, fetched);
    }

    fn count(&mut self, status: RecordStatus, fetched: bool) {
        self.session.record(status);
        if fetched {
            self.session.fetched += 1;
        }
    }

    pub fn counters(&self) -> Counters {
        self.session
    }

    /// Messages per minute over the completion window; 0.0 until two samples exist.
    pub fn speed_per_min(&self) -> f64 {
        let (Some(first), Some(last)) = (self.completions.front(), self.completions.back()) else {
            return 0.0;
        };
        let elapsed = last.duration_since(*first).as_secs_f64();
        if self.completions.len() < 2 || elapsed <= 0.0 {
            return 0.0;
        }
        (self.completions.len() - 1) as f64 / elapsed * 60.0
    }

    /// Seconds until `remaining` ids are done at the current speed; unknown at zero speed.
    pub fn eta_secs(&self, remaining: Option<u64>) -> Option<u64> {
        let remaining = remaining?;
        let speed = self.speed_per_min();
        if speed <= 0.0 {
            return None;
        }
        Some((remaining as f64 / speed * 60.0).ceil() as u64)
    }
}
