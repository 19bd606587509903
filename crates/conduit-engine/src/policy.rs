// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Content policy: which fetched messages are marked `filtered`.

use conduit_config::model::PolicyConfig;
use conduit_core::{ContentKind, SourceMessage};

const MIB: u64 = 1024 * 1024;

/// Why a message was filtered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    Kind(ContentKind),
    Empty,
    TooLarge { size_bytes: u64 },
}

#[derive(Debug, Clone)]
pub struct ContentPolicy {
    filtered_kinds: Vec<ContentKind>,
    skip_empty: bool,
    max_file_size: u64,
}

impl ContentPolicy {
    pub fn new(config: &PolicyConfig, max_file_size_mb: u64) -> Self {
        Self {
            filtered_kinds: config.filtered_kinds.clone(),
            skip_empty: config.skip_empty,
            max_file_size: max_file_size_mb.saturating_mul(MIB),
        }
    }

    /// `Some(reason)` when the message must not be re-emitted.
    pub fn check(&self, message: &SourceMessage) -> Option<FilterReason> {
        if self.filtered_kinds.contains(&message.kind) {
            return Some(FilterReason::Kind(message.kind));
        }
        if self.skip_empty && message.is_empty() {
            return Some(FilterReason::Empty);
        }
        match message.media_size() {
            Some(size_bytes) if size_bytes > self.max_file_size => {
                Some(FilterReason::TooLarge { size_bytes })
            }
            _ => None,
        }
    }
}
