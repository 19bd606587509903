// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator settings: validation, persistence and the snapshot the engine
//! reads once per iteration.
//!
//! The command layer is the only writer. Values live in the store's
//! `settings` table and overlay the `[rate]` and `[retry]` config defaults.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use conduit_config::ConduitConfig;
use conduit_config::validation::{DELAY_RANGE, MAX_RETRIES_LIMIT};
use conduit_core::{ConduitError, ProgressStore, SpeedMode};
use serde::Serialize;
use tracing::warn;

const KEY_DELAY: &str = "delay";
const KEY_SPEED_MODE: &str = "speed_mode";
const KEY_MAX_RETRIES: &str = "max_retries";
const KEY_FLOOD_PROTECT: &str = "flood_protect";

/// A consistent view of the operator settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    /// Explicit delay override; `None` means use the speed mode preset.
    pub delay_seconds: Option<f64>,
    pub speed_mode: SpeedMode,
    pub max_retries: u32,
    pub flood_protect: bool,
}

impl Settings {
    pub fn from_config(config: &ConduitConfig) -> Self {
        Self {
            delay_seconds: config.rate.delay_seconds,
            speed_mode: config.rate.speed_mode,
            max_retries: config.retry.max_retries,
            flood_protect: config.rate.flood_protect,
        }
    }

    /// Delay between messages before flood backoff.
    pub fn base_delay(&self) -> Duration {
        match self.delay_seconds {
            Some(secs) => Duration::from_secs_f64(secs),
            None => self.speed_mode.base_delay(),
        }
    }

    /// Overlay persisted key/value pairs. Invalid stored values are skipped.
    pub fn overlay(mut self, pairs: &[(String, String)]) -> Self {
        for (key, value) in pairs {
            match Setting::parse(key, value) {
                Ok(setting) => setting.apply(&mut self),
                Err(e) => warn!(key = %key, value = %value, error = %e, "ignoring stored setting"),
            }
        }
        self
    }
}

/// One validated operator setting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Setting {
    Delay(f64),
    SpeedMode(SpeedMode),
    MaxRetries(u32),
    FloodProtect(bool),
}

impl Setting {
    /// Accepted keys, as shown to operators.
    pub const KEYS: &'static [&'static str] =
        &[KEY_DELAY, KEY_SPEED_MODE, KEY_MAX_RETRIES, KEY_FLOOD_PROTECT];

    /// Validate operator input. Nothing is mutated on error.
    pub fn parse(key: &str, value: &str) -> Result<Self, ConduitError> {
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "delay" | "delay_seconds" => {
                let secs: f64 = value.parse().map_err(|_| {
                    ConduitError::Validation(format!("delay must be a number, got `{value}`"))
                })?;
                if !DELAY_RANGE.contains(&secs) {
                    return Err(ConduitError::Validation(format!(
                        "delay must be between 0.1 and 60 seconds, got {secs}"
                    )));
                }
                Ok(Self::Delay(secs))
            }
            "speed_mode" | "speed" => value.parse::<SpeedMode>().map(Self::SpeedMode).map_err(|_| {
                ConduitError::Validation(format!(
                    "speed mode must be one of fast, normal, safe; got `{value}`"
                ))
            }),
            "max_retries" | "retries" => {
                let retries: u32 = value.parse().map_err(|_| {
                    ConduitError::Validation(format!(
                        "max_retries must be a whole number, got `{value}`"
                    ))
                })?;
                if retries > MAX_RETRIES_LIMIT {
                    return Err(ConduitError::Validation(format!(
                        "max_retries must be between 0 and {MAX_RETRIES_LIMIT}, got {retries}"
                    )));
                }
                Ok(Self::MaxRetries(retries))
            }
            "flood_protect" | "flood_protection" => match value.to_ascii_lowercase().as_str() {
                "on" | "true" | "yes" | "1" => Ok(Self::FloodProtect(true)),
                "off" | "false" | "no" | "0" => Ok(Self::FloodProtect(false)),
                _ => Err(ConduitError::Validation(format!(
                    "flood_protect must be on or off, got `{value}`"
                ))),
            },
            other => Err(ConduitError::Validation(format!(
                "unknown setting `{other}`; valid settings: {}",
                Self::KEYS.join(", ")
            ))),
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Self::Delay(_) => KEY_DELAY,
            Self::SpeedMode(_) => KEY_SPEED_MODE,
            Self::MaxRetries(_) => KEY_MAX_RETRIES,
            Self::FloodProtect(_) => KEY_FLOOD_PROTECT,
        }
    }

    /// Canonical stored form.
    pub fn value_string(&self) -> String {
        match self {
            Self::Delay(secs) => secs.to_string(),
            Self::SpeedMode(mode) => mode.to_string(),
            Self::MaxRetries(n) => n.to_string(),
            Self::FloodProtect(on) => if *on { "on" } else { "off" }.to_string(),
        }
    }

    pub fn apply(&self, settings: &mut Settings) {
        match *self {
            Self::Delay(secs) => settings.delay_seconds = Some(secs),
            Self::SpeedMode(mode) => {
                settings.speed_mode = mode;
                settings.delay_seconds = None;
            }
            Self::MaxRetries(n) => settings.max_retries = n,
            Self::FloodProtect(on) => settings.flood_protect = on,
        }
    }
}

/// Read the persisted settings on top of the config defaults.
pub async fn load_settings(
    store: &dyn ProgressStore,
    config: &ConduitConfig,
) -> Result<Settings, ConduitError> {
    let pairs = store.all_settings().await?;
    Ok(Settings::from_config(config).overlay(&pairs))
}

/// Persist a validated setting. Choosing a speed mode drops any explicit delay.
pub async fn persist_setting(
    store: &dyn ProgressStore,
    setting: &Setting,
) -> Result<(), ConduitError> {
    store
        .set_setting(setting.key(), &setting.value_string())
        .await?;
    if let Setting::SpeedMode(_) = setting {
        store.delete_setting(KEY_DELAY).await?;
    }
    Ok(())
}

/// Shared, lock-free settings snapshot. Readers never block the writer.
#[derive(Debug, Clone)]
pub struct SettingsHandle {
    inner: Arc<ArcSwap<Settings>>,
}

impl SettingsHandle {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(settings)),
        }
    }

    pub fn snapshot(&self) -> Arc<Settings> {
        self.inner.load_full()
    }

    pub fn replace(&self, settings: Settings) {
        self.inner.store(Arc::new(settings));
    }

    /// Apply one setting to the current snapshot.
    pub fn update(&self, setting: &Setting) {
        self.inner.rcu(|current| {
            let mut next = Settings::clone(current);
            setting.apply(&mut next);
            next
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_bounds() {
        assert_eq!(Setting::parse("delay", "0.1").unwrap(), Setting::Delay(0.1));
        assert_eq!(Setting::parse("delay", "60").unwrap(), Setting::Delay(60.0));
        assert!(Setting::parse("delay", "0.05").is_err());
        assert!(Setting::parse("delay", "61").is_err());
        assert!(Setting::parse("delay", "soon").is_err());
    }

    #[test]
    fn retries_bounds() {
        assert_eq!(
            Setting::parse("retries", "0").unwrap(),
            Setting::MaxRetries(0)
        );
        assert_eq!(
            Setting::parse("max_retries", "10").unwrap(),
            Setting::MaxRetries(10)
        );
        assert!(Setting::parse("max_retries", "11").is_err());
        assert!(Setting::parse("max_retries", "-1").is_err());
    }

    #[test]
    fn speed_and_flood_values() {
        assert_eq!(
            Setting::parse("speed", "Fast").unwrap(),
            Setting::SpeedMode(SpeedMode::Fast)
        );
        assert!(Setting::parse("speed_mode", "warp").is_err());
        assert_eq!(
            Setting::parse("flood_protect", "OFF").unwrap(),
            Setting::FloodProtect(false)
        );
        assert!(Setting::parse("flood_protect", "maybe").is_err());
        assert!(Setting::parse("colour", "blue").is_err());
    }

    #[test]
    fn speed_mode_clears_delay_override() {
        let mut s = Settings::from_config(&ConduitConfig::default());
        Setting::Delay(4.0).apply(&mut s);
        assert_eq!(s.base_delay(), Duration::from_secs(4));

        Setting::SpeedMode(SpeedMode::Safe).apply(&mut s);
        assert_eq!(s.delay_seconds, None);
        assert_eq!(s.base_delay(), Duration::from_millis(2500));
    }

    #[test]
    fn overlay_skips_invalid_values() {
        let pairs = vec![
            ("max_retries".to_string(), "99".to_string()),
            ("flood_protect".to_string(), "off".to_string()),
        ];
        let s = Settings::from_config(&ConduitConfig::default()).overlay(&pairs);
        assert_eq!(s.max_retries, 3);
        assert!(!s.flood_protect);
    }

    #[test]
    fn handle_updates_are_visible_to_readers() {
        let handle = SettingsHandle::new(Settings::from_config(&ConduitConfig::default()));
        let reader = handle.clone();
        let before = reader.snapshot();

        handle.update(&Setting::MaxRetries(7));
        assert_eq!(before.max_retries, 3);
        assert_eq!(reader.snapshot().max_retries, 7);
    }
}
