// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sink for periodic status snapshots.

use async_trait::async_trait;

use crate::error::ConduitError;
use crate::types::StatusSnapshot;

/// Receives status snapshots from the publisher.
///
/// Failures are logged by the publisher and never stop a run.
#[async_trait]
pub trait StatusNotifier: Send + Sync + 'static {
    async fn publish(&self, snapshot: &StatusSnapshot) -> Result<(), ConduitError>;
}
