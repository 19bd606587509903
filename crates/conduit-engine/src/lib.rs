// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resumable forwarding engine.
//!
//! Copies a contiguous range of source ids from one chat to another, strictly
//! in order, with a durable per-id ledger so a crash or restart never sends a
//! message twice and never skips one. Each id runs through a fallback chain of
//! transfer strategies with exponential retry, platform-mandated rate-limit
//! waits and adaptive pacing.

pub mod controller;
pub mod cursor;
pub mod dedup;
pub mod engine;
pub mod flusher;
pub mod policy;
pub mod rate;
pub mod recording;
pub mod retry;
pub mod settings;
pub mod stats;
pub mod status;
pub mod strategy;

pub use controller::Controller;
pub use engine::{ControlSignal, EngineDeps, EngineHandle, ForwardingEngine};
pub use settings::{Setting, Settings, SettingsHandle};
pub use status::LogNotifier;
pub use strategy::{ChunkedTransfer, DirectRelay, Reupload, StrategyChain, TransferStrategy};
