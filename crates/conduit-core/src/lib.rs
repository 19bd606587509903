// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Conduit forwarding engine.
//!
//! Provides the error types, domain types and collaborator traits shared by
//! the engine, the SQLite store and the operator CLI.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{ConduitError, PlatformError};
pub use types::{
    AdapterType, Checkpoint, ContentKind, Counters, ErrorKind, FailedMessage, ForwardSession,
    HealthStatus, LifetimeCounters, MediaInfo, MessageRecord, OutboundContent, RecordStatus,
    SessionRequest, SessionStatus, SourceId, SourceMessage, SpeedMode, StatisticsSnapshot,
    StatusSnapshot, TargetId, UploadHandle,
};

pub use traits::{ByteStream, PlatformClient, PluginAdapter, ProgressStore, StatusNotifier};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_type_round_trips() {
        use std::str::FromStr;

        for variant in [AdapterType::Platform, AdapterType::Storage, AdapterType::Notifier] {
            let parsed = AdapterType::from_str(&variant.to_string()).expect("should parse back");
            assert_eq!(variant, parsed);
        }
    }

    #[test]
    fn collaborator_traits_are_object_safe() {
        fn _platform(_: &dyn PlatformClient) {}
        fn _store(_: &dyn ProgressStore) {}
        fn _notifier(_: &dyn StatusNotifier) {}
    }
}
