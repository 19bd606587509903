// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Base adapter trait shared by platform clients and stores.

use async_trait::async_trait;

use crate::error::ConduitError;
use crate::types::{AdapterType, HealthStatus};

/// Identity, health and shutdown for every pluggable collaborator.
#[async_trait]
pub trait PluginAdapter: Send + Sync + 'static {
    /// Returns the human-readable name of this adapter instance.
    fn name(&self) -> &str;

    /// Returns the semantic version of this adapter.
    fn version(&self) -> semver::Version;

    fn adapter_type(&self) -> AdapterType;

    async fn health_check(&self) -> Result<HealthStatus, ConduitError>;

    /// Releases held resources (connections, file handles).
    async fn shutdown(&self) -> Result<(), ConduitError>;
}
