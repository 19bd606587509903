// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Lookup order: `./conduit.toml` > `~/.config/conduit/conduit.toml` >
//! `/etc/conduit/conduit.toml`, with `CONDUIT_` environment overrides on top.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::ConduitConfig;

/// Top-level sections that environment variables may address.
const SECTIONS: &[&str] = &["storage", "engine", "retry", "rate", "status", "policy"];

pub(crate) const SYSTEM_CONFIG: &str = "/etc/conduit/conduit.toml";
pub(crate) const LOCAL_CONFIG: &str = "conduit.toml";

pub(crate) fn user_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("conduit/conduit.toml"))
        .unwrap_or_default()
}

/// Load configuration from the standard hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/conduit/conduit.toml`
/// 3. `~/.config/conduit/conduit.toml`
/// 4. `./conduit.toml`
/// 5. `CONDUIT_*` environment variables
pub fn load_config() -> Result<ConduitConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no file lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<ConduitConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ConduitConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ConduitConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ConduitConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The Figment used by [`load_config`], before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(ConduitConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG))
        .merge(Toml::file(user_config_path()))
        .merge(Toml::file(LOCAL_CONFIG))
        .merge(env_provider())
}

/// Environment provider with explicit section mapping.
///
/// `Env::split("_")` would turn `CONDUIT_RETRY_MAX_RETRIES` into
/// `retry.max.retries`; only the first segment names the section.
fn env_provider() -> Env {
    Env::prefixed("CONDUIT_").map(|key| map_env_key(key.as_str()).into())
}

pub(crate) fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_map_to_sections() {
        assert_eq!(map_env_key("retry_max_retries"), "retry.max_retries");
        assert_eq!(map_env_key("storage_database_path"), "storage.database_path");
        assert_eq!(map_env_key("rate_flood_protect"), "rate.flood_protect");
        assert_eq!(map_env_key("status_interval_secs"), "status.interval_secs");
        assert_eq!(map_env_key("unknown_thing"), "unknown_thing");
    }

    #[test]
    fn env_overrides_apply() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("CONDUIT_RETRY_MAX_RETRIES", "7");
            jail.set_env("CONDUIT_RATE_SPEED_MODE", "safe");
            let config: ConduitConfig = Figment::new()
                .merge(Serialized::defaults(ConduitConfig::default()))
                .merge(env_provider())
                .extract()?;
            assert_eq!(config.retry.max_retries, 7);
            assert_eq!(config.rate.speed_mode, conduit_core::SpeedMode::Safe);
            Ok(())
        });
    }
}
