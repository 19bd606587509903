// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `conduit status` and `conduit stats` command implementations.
//!
//! Both read the durable store only. Speed and ETA are live values that
//! exist while a session runs in-process, so the persisted view reports
//! counters and progress without them.

use conduit_core::{
    AdapterType, ConduitError, Counters, HealthStatus, PluginAdapter, ProgressStore, SessionStatus,
    StatisticsSnapshot, StatusSnapshot,
};
use conduit_engine::controller::{persisted_status, statistics};
use serde::Serialize;

use crate::Output;

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub active: bool,
    pub store: StoreHealth,
    #[serde(flatten)]
    pub snapshot: Option<StatusSnapshot>,
}

/// Identity and health of the progress store backend.
#[derive(Debug, Serialize)]
pub struct StoreHealth {
    pub adapter: String,
    pub kind: AdapterType,
    pub version: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Run the store's health check. A failing check is reported, not returned.
pub(crate) async fn store_health(store: &dyn ProgressStore) -> StoreHealth {
    let (status, detail) = match store.health_check().await {
        Ok(HealthStatus::Healthy) => ("healthy", None),
        Ok(HealthStatus::Degraded(reason)) => ("degraded", Some(reason)),
        Ok(HealthStatus::Unhealthy(reason)) => ("unhealthy", Some(reason)),
        Err(e) => ("unhealthy", Some(e.to_string())),
    };
    StoreHealth {
        adapter: store.name().to_string(),
        kind: store.adapter_type(),
        version: store.version().to_string(),
        status,
        detail,
    }
}

/// Format seconds into a short human-readable duration.
pub(crate) fn format_duration(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// Run the `conduit status` command.
pub async fn run_status(store: &dyn ProgressStore, out: Output) -> Result<(), ConduitError> {
    let health = store_health(store).await;
    let snapshot = persisted_status(store).await?;

    if out.json {
        let resp = StatusResponse {
            active: snapshot
                .as_ref()
                .is_some_and(|s| s.state == SessionStatus::Running),
            store: health,
            snapshot,
        };
        out.print_json(&resp);
        return Ok(());
    }

    println!();
    println!("  conduit status");
    println!("  {}", "-".repeat(35));
    print_health(&health);
    match snapshot {
        Some(snapshot) => print_snapshot(&snapshot, out.color),
        None => {
            println!("    State:    no forwarding session yet");
        }
    }
    println!();
    Ok(())
}

/// Run the `conduit stats` command.
pub async fn run_stats(store: &dyn ProgressStore, out: Output) -> Result<(), ConduitError> {
    let status = persisted_status(store).await?;
    let stats = statistics(store, status).await?;

    if out.json {
        out.print_json(&stats);
        return Ok(());
    }

    print_statistics(&stats);
    Ok(())
}

fn print_snapshot(snapshot: &StatusSnapshot, use_color: bool) {
    println!("    Session:  {}", snapshot.session_id);
    println!("    State:    {}", state_label(snapshot.state, use_color));
    println!("    Cursor:   {}", snapshot.current_id);
    match snapshot.percentage {
        Some(pct) => println!("    Progress: {pct:.1}%"),
        None => println!("    Progress: open range"),
    }
    if let Some(eta) = snapshot.eta_secs {
        println!(
            "    Speed:    {:.1}/min (eta {})",
            snapshot.speed,
            format_duration(eta)
        );
    }
    print_counters("Counters", &snapshot.counters);
}

fn print_health(health: &StoreHealth) {
    match &health.detail {
        Some(detail) => println!(
            "    Store:    {} {} ({}: {detail})",
            health.adapter, health.version, health.status
        ),
        None => println!(
            "    Store:    {} {} ({})",
            health.adapter, health.version, health.status
        ),
    }
}

fn print_statistics(stats: &StatisticsSnapshot) {
    println!();
    println!("  conduit stats");
    println!("  {}", "-".repeat(35));
    match &stats.session_id {
        Some(id) => {
            println!("    Session:  {id}");
            print_counters("Session", &stats.session);
        }
        None => println!("    Session:  none"),
    }
    print_counters("Lifetime", &stats.lifetime.counters);
    println!("    Sessions started: {}", stats.lifetime.sessions_started);
    println!();
}

fn print_counters(label: &str, c: &Counters) {
    println!("    {label}:");
    println!("      fetched   {:>8}", c.fetched);
    println!("      forwarded {:>8}", c.forwarded);
    println!("      duplicate {:>8}", c.duplicate);
    println!("      deleted   {:>8}", c.deleted);
    println!("      filtered  {:>8}", c.filtered);
    println!("      failed    {:>8}", c.failed);
}

pub(crate) fn state_label(state: SessionStatus, use_color: bool) -> String {
    let label = state.to_string();
    if !use_color {
        return label;
    }
    use colored::Colorize;
    match state {
        SessionStatus::Running | SessionStatus::Completed => label.green().to_string(),
        SessionStatus::Paused | SessionStatus::Idle => label.yellow().to_string(),
        SessionStatus::Failed | SessionStatus::Cancelled => label.red().to_string(),
    }
}
