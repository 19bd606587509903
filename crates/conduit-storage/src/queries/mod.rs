// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules, one per table family.

pub mod failed;
pub mod records;
pub mod sessions;
pub mod settings;
pub mod statistics;
