// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use crate::diagnostic::ConfigError;
use crate::model::ConduitConfig;

/// Accepted range for an explicit inter-message delay, in seconds.
pub const DELAY_RANGE: std::ops::RangeInclusive<f64> = 0.1..=60.0;

/// Largest accepted `max_retries`.
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every violation instead of stopping at the first one.
pub fn validate_config(config: &ConduitConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    let engine = &config.engine;
    if engine.checkpoint_every == 0 {
        fail("engine.checkpoint_every must be at least 1".to_string());
    }
    if engine.checkpoint_interval_secs == 0 {
        fail("engine.checkpoint_interval_secs must be at least 1".to_string());
    }
    if engine.chunk_size_bytes == 0 {
        fail("engine.chunk_size_bytes must be greater than 0".to_string());
    }
    if engine.max_file_size_mb < engine.chunk_threshold_mb {
        fail(format!(
            "engine.max_file_size_mb ({}) must not be below engine.chunk_threshold_mb ({})",
            engine.max_file_size_mb, engine.chunk_threshold_mb
        ));
    }

    let retry = &config.retry;
    if retry.max_retries > MAX_RETRIES_LIMIT {
        fail(format!(
            "retry.max_retries must be at most {MAX_RETRIES_LIMIT}, got {}",
            retry.max_retries
        ));
    }
    if retry.multiplier < 1.0 {
        fail(format!(
            "retry.multiplier must be at least 1.0, got {}",
            retry.multiplier
        ));
    }
    if retry.max_delay_ms < retry.base_delay_ms {
        fail(format!(
            "retry.max_delay_ms ({}) must not be below retry.base_delay_ms ({})",
            retry.max_delay_ms, retry.base_delay_ms
        ));
    }

    let rate = &config.rate;
    if let Some(delay) = rate.delay_seconds
        && !DELAY_RANGE.contains(&delay)
    {
        fail(format!(
            "rate.delay_seconds must be between 0.1 and 60, got {delay}"
        ));
    }
    if !(rate.flood_threshold > 0.0 && rate.flood_threshold <= 1.0) {
        fail(format!(
            "rate.flood_threshold must be in (0, 1], got {}",
            rate.flood_threshold
        ));
    }
    if rate.flood_backoff_factor < 1.0 {
        fail(format!(
            "rate.flood_backoff_factor must be at least 1.0, got {}",
            rate.flood_backoff_factor
        ));
    }
    if rate.flood_window_secs == 0 {
        fail("rate.flood_window_secs must be at least 1".to_string());
    }
    if rate.max_delay_secs < *DELAY_RANGE.start() {
        fail(format!(
            "rate.max_delay_secs must be at least 0.1, got {}",
            rate.max_delay_secs
        ));
    }

    if config.status.interval_secs == 0 {
        fail("status.interval_secs must be at least 1".to_string());
    }
    if config.status.speed_window < 2 {
        fail(format!(
            "status.speed_window must be at least 2, got {}",
            config.status.speed_window
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&ConduitConfig::default()).is_ok());
    }

    #[test]
    fn collects_all_errors() {
        let mut config = ConduitConfig::default();
        config.retry.max_retries = 11;
        config.rate.delay_seconds = Some(0.05);
        config.status.interval_secs = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn delay_bounds_are_inclusive() {
        let mut config = ConduitConfig::default();
        config.rate.delay_seconds = Some(0.1);
        assert!(validate_config(&config).is_ok());
        config.rate.delay_seconds = Some(60.0);
        assert!(validate_config(&config).is_ok());
        config.rate.delay_seconds = Some(60.5);
        assert!(validate_config(&config).is_err());
    }
}
