// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` so a misspelled key is
//! reported at startup instead of silently falling back to a default.

use conduit_core::{ContentKind, SpeedMode};
use serde::{Deserialize, Serialize};

/// Top-level Conduit configuration.
///
/// Every section is optional and defaults to the values below.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConduitConfig {
    /// Progress store location.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Engine loop, checkpoint cadence and transfer limits.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Transient-error backoff.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Inter-message pacing and flood protection.
    #[serde(default)]
    pub rate: RateConfig,

    /// Status publishing cadence.
    #[serde(default)]
    pub status: StatusConfig,

    /// Which messages count as filtered or duplicate.
    #[serde(default)]
    pub policy: PolicyConfig,
}

/// SQLite progress store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: true,
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("conduit").join("conduit.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("conduit.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_true() -> bool {
    true
}

/// How retries are budgeted across the strategy chain for one id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryBudget {
    /// Each strategy gets `max_retries` transient retries of its own.
    #[default]
    PerStrategy,
    /// All strategies for an id draw from one `max_retries` pool.
    Shared,
}

/// Forwarding engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Persist a checkpoint after this many processed ids.
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: u64,

    /// Background flush interval, independent of throughput.
    #[serde(default = "default_checkpoint_interval_secs")]
    pub checkpoint_interval_secs: u64,

    /// How often the engine re-reads operator settings from the store.
    #[serde(default = "default_settings_refresh_secs")]
    pub settings_refresh_secs: u64,

    /// Media above this size goes through the chunked transfer.
    #[serde(default = "default_chunk_threshold_mb")]
    pub chunk_threshold_mb: u64,

    /// Window size for chunked transfers.
    #[serde(default = "default_chunk_size_bytes")]
    pub chunk_size_bytes: usize,

    /// Media above this size is never transferred and counts as filtered.
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,

    #[serde(default)]
    pub retry_budget: RetryBudget,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            checkpoint_every: default_checkpoint_every(),
            checkpoint_interval_secs: default_checkpoint_interval_secs(),
            settings_refresh_secs: default_settings_refresh_secs(),
            chunk_threshold_mb: default_chunk_threshold_mb(),
            chunk_size_bytes: default_chunk_size_bytes(),
            max_file_size_mb: default_max_file_size_mb(),
            retry_budget: RetryBudget::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_checkpoint_every() -> u64 {
    10
}

fn default_checkpoint_interval_secs() -> u64 {
    30
}

fn default_settings_refresh_secs() -> u64 {
    5
}

fn default_chunk_threshold_mb() -> u64 {
    50
}

fn default_chunk_size_bytes() -> usize {
    1024 * 1024
}

fn default_max_file_size_mb() -> u64 {
    2048
}

/// Exponential backoff for transient errors.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Transient retries before a strategy gives up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound for any single backoff sleep.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_multiplier() -> f64 {
    2.0
}

/// Pacing between messages and adaptive flood backoff.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RateConfig {
    #[serde(default)]
    pub speed_mode: SpeedMode,

    /// Explicit delay override in seconds; wins over `speed_mode` when set.
    #[serde(default)]
    pub delay_seconds: Option<f64>,

    #[serde(default = "default_true")]
    pub flood_protect: bool,

    /// Look-back window for the rate-limited ratio.
    #[serde(default = "default_flood_window_secs")]
    pub flood_window_secs: u64,

    /// Ratio of rate-limited attempts above which the delay is multiplied.
    #[serde(default = "default_flood_threshold")]
    pub flood_threshold: f64,

    #[serde(default = "default_flood_backoff_factor")]
    pub flood_backoff_factor: f64,

    /// Cap for the effective inter-message delay.
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: f64,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            speed_mode: SpeedMode::default(),
            delay_seconds: None,
            flood_protect: true,
            flood_window_secs: default_flood_window_secs(),
            flood_threshold: default_flood_threshold(),
            flood_backoff_factor: default_flood_backoff_factor(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

fn default_flood_window_secs() -> u64 {
    60
}

fn default_flood_threshold() -> f64 {
    0.1
}

fn default_flood_backoff_factor() -> f64 {
    2.0
}

fn default_max_delay_secs() -> f64 {
    60.0
}

/// Status snapshot cadence.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StatusConfig {
    /// Minimum spacing between two published snapshots.
    #[serde(default = "default_status_interval_secs")]
    pub interval_secs: u64,

    /// Number of completion timestamps kept for the speed estimate.
    #[serde(default = "default_speed_window")]
    pub speed_window: usize,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_status_interval_secs(),
            speed_window: default_speed_window(),
        }
    }
}

fn default_status_interval_secs() -> u64 {
    5
}

fn default_speed_window() -> usize {
    50
}

/// Content policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    /// Message kinds never re-emitted.
    #[serde(default = "default_filtered_kinds")]
    pub filtered_kinds: Vec<ContentKind>,

    /// Treat messages with no text, caption or media as filtered.
    #[serde(default = "default_true")]
    pub skip_empty: bool,

    /// Mark ids already forwarded by an earlier session on the same route as duplicate.
    #[serde(default = "default_true")]
    pub dedup_cross_session: bool,

    /// Mark messages whose content fingerprint was already forwarded as duplicate.
    #[serde(default)]
    pub dedup_by_fingerprint: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            filtered_kinds: default_filtered_kinds(),
            skip_empty: true,
            dedup_cross_session: true,
            dedup_by_fingerprint: false,
        }
    }
}

fn default_filtered_kinds() -> Vec<ContentKind> {
    vec![ContentKind::Service, ContentKind::Unsupported]
}
