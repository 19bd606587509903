// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Conduit integration tests.
//!
//! Provides mock collaborators and a harness backed by a temporary SQLite
//! store, so engine tests run deterministically without a real platform.
//!
//! # Components
//!
//! - [`MockPlatform`] - scriptable messaging platform with call capture
//! - [`RecordingNotifier`] - status notifier that keeps every snapshot
//! - [`TestHarness`] - temp database, mocks and config wired together

pub mod harness;
pub mod mock_platform;
pub mod notifier;

pub use harness::TestHarness;
pub use mock_platform::{MockPlatform, Op, SentMessage};
pub use notifier::RecordingNotifier;
