// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator traits for the forwarding engine.
//!
//! Adapters extend the [`PluginAdapter`] base trait and use `#[async_trait]`
//! for dynamic dispatch compatibility.

pub mod adapter;
pub mod notifier;
pub mod platform;
pub mod store;

pub use adapter::PluginAdapter;
pub use notifier::StatusNotifier;
pub use platform::{ByteStream, PlatformClient};
pub use store::ProgressStore;
