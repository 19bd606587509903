// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Store-level operator commands: `failed`, `set`, `reset`, `sessions`
//! and `recover`.

use conduit_config::ConduitConfig;
use conduit_core::{ConduitError, FailedMessage, ForwardSession, ProgressStore};
use conduit_engine::Setting;
use conduit_engine::controller::reset_progress;
use conduit_engine::settings::{Settings, load_settings, persist_setting};
use serde::Serialize;
use tracing::info;

use crate::Output;
use crate::status::state_label;

/// Run the `conduit failed` command.
pub async fn run_failed(
    store: &dyn ProgressStore,
    session: Option<&str>,
    limit: usize,
    out: Output,
) -> Result<(), ConduitError> {
    let session_id = match session {
        Some(id) => Some(id.to_string()),
        None => store.latest_session().await?.map(|s| s.id),
    };
    let failed = store.list_failed(session_id.as_deref(), limit).await?;

    if out.json {
        out.print_json(&failed);
        return Ok(());
    }

    if failed.is_empty() {
        println!("no failed messages");
        return Ok(());
    }
    for entry in &failed {
        print_failed(entry);
    }
    Ok(())
}

fn print_failed(entry: &FailedMessage) {
    println!(
        "  #{:<10} {:<14} {:<18} attempts={} at {}",
        entry.source_id,
        entry.error_kind.to_string(),
        entry.strategy_used,
        entry.attempt_count,
        entry.last_attempt_at,
    );
    println!("              {}", entry.error_message);
}

/// Settings as shown after `conduit set`.
#[derive(Debug, Serialize)]
pub struct SetResponse {
    pub key: &'static str,
    pub value: String,
    pub effective: Settings,
}

/// Run the `conduit set <key> <value>` command.
///
/// Invalid input is rejected before anything is written.
pub async fn run_set(
    store: &dyn ProgressStore,
    config: &ConduitConfig,
    key: &str,
    value: &str,
    out: Output,
) -> Result<Settings, ConduitError> {
    let setting = Setting::parse(key, value)?;
    persist_setting(store, &setting).await?;
    let effective = load_settings(store, config).await?;
    info!(key = setting.key(), value = %setting.value_string(), "setting updated");

    if out.json {
        out.print_json(&SetResponse {
            key: setting.key(),
            value: setting.value_string(),
            effective: effective.clone(),
        });
    } else {
        println!("{} = {}", setting.key(), setting.value_string());
        println!(
            "effective delay {:.1}s, speed {}, retries {}, flood protect {}",
            effective.base_delay().as_secs_f64(),
            effective.speed_mode,
            effective.max_retries,
            if effective.flood_protect { "on" } else { "off" },
        );
    }
    Ok(effective)
}

/// Run the `conduit reset` command.
pub async fn run_reset(store: &dyn ProgressStore, confirm: bool) -> Result<(), ConduitError> {
    reset_progress(store, confirm).await?;
    println!("all sessions and progress removed; lifetime totals kept");
    Ok(())
}

/// Run the `conduit sessions` command.
pub async fn run_sessions(
    store: &dyn ProgressStore,
    limit: usize,
    out: Output,
) -> Result<(), ConduitError> {
    let sessions = store.list_sessions(limit).await?;

    if out.json {
        out.print_json(&sessions);
        return Ok(());
    }

    if sessions.is_empty() {
        println!("no sessions");
        return Ok(());
    }
    for session in &sessions {
        print_session(session, out.color);
    }
    Ok(())
}

fn print_session(session: &ForwardSession, use_color: bool) {
    let range = match session.to_id {
        Some(to) => format!("{}..={to}", session.from_id),
        None => format!("{}..", session.from_id),
    };
    println!(
        "  {}  {:<10} {} -> {}  ids {range}  cursor {}",
        session.id,
        state_label(session.status, use_color),
        session.source_chat,
        session.target_chat,
        session.current_id,
    );
    if let Some(err) = &session.last_error {
        println!("      last error: {err}");
    }
}

/// Run the `conduit recover` command.
///
/// Sessions still marked running belong to a process that is gone; they
/// become paused so they can be resumed.
pub async fn run_recover(store: &dyn ProgressStore, out: Output) -> Result<Vec<String>, ConduitError> {
    let recovered = store.recover_stale_sessions().await?;

    if out.json {
        out.print_json(&recovered);
    } else if recovered.is_empty() {
        println!("no interrupted sessions");
    } else {
        for id in &recovered {
            println!("  {id}  paused");
        }
    }
    Ok(recovered)
}

#[cfg(test)]
mod tests {
    use conduit_core::{SessionRequest, SessionStatus, SpeedMode};
    use conduit_storage::SqliteStore;

    use super::*;

    const QUIET: Output = Output {
        json: true,
        color: false,
    };

    async fn temp_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conduit.db");
        let store = SqliteStore::open(&path.to_string_lossy()).await.unwrap();
        (dir, store)
    }

    fn request() -> SessionRequest {
        SessionRequest {
            source_chat: "source".into(),
            target_chat: "target".into(),
            from_id: 1,
            to_id: Some(10),
        }
    }

    #[tokio::test]
    async fn set_persists_and_overlays_config() {
        let (_dir, store) = temp_store().await;
        let config = ConduitConfig::default();

        let effective = run_set(&store, &config, "speed", "safe", QUIET).await.unwrap();
        assert_eq!(effective.speed_mode, SpeedMode::Safe);
        assert_eq!(
            store.get_setting("speed_mode").await.unwrap().as_deref(),
            Some("safe")
        );
    }

    #[tokio::test]
    async fn set_rejects_invalid_values_without_writing() {
        let (_dir, store) = temp_store().await;
        let config = ConduitConfig::default();

        let err = run_set(&store, &config, "delay", "0.01", QUIET).await.unwrap_err();
        assert!(matches!(err, ConduitError::Validation(_)));
        assert!(store.all_settings().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reset_requires_confirmation() {
        let (_dir, store) = temp_store().await;
        store.create_session(&request()).await.unwrap();

        assert!(run_reset(&store, false).await.is_err());
        assert_eq!(store.list_sessions(10).await.unwrap().len(), 1);

        run_reset(&store, true).await.unwrap();
        assert!(store.list_sessions(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn recover_pauses_sessions_left_running() {
        let (_dir, store) = temp_store().await;
        let session = store.create_session(&request()).await.unwrap();
        store.acquire_lease(&session.id).await.unwrap();

        let recovered = run_recover(&store, QUIET).await.unwrap();
        assert_eq!(recovered, vec![session.id.clone()]);

        let after = store.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(after.status, SessionStatus::Paused);
    }
}
