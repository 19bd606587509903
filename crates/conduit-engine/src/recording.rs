// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade; without an installed recorder these are no-ops.

use conduit_core::{RecordStatus, SessionStatus};
use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Register all Conduit metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        "conduit_messages_total",
        "Source ids reaching a terminal status, by status"
    );
    describe_counter!(
        "conduit_flood_waits_total",
        "Platform-mandated rate-limit waits honored"
    );
    describe_counter!(
        "conduit_strategy_escalations_total",
        "Strategy failures that escalated to the next strategy"
    );
    describe_gauge!("conduit_session_running", "1 while a session is running");
    describe_histogram!(
        "conduit_message_seconds",
        "Wall time spent on one source id, excluding the inter-message delay"
    );
}

/// Record a terminal outcome for one source id.
pub fn record_outcome(status: RecordStatus) {
    metrics::counter!("conduit_messages_total", "status" => status.to_string()).increment(1);
}

pub fn record_flood_wait() {
    metrics::counter!("conduit_flood_waits_total").increment(1);
}

pub fn record_escalation(strategy: &str) {
    metrics::counter!("conduit_strategy_escalations_total", "strategy" => strategy.to_string())
        .increment(1);
}

pub fn set_session_state(status: SessionStatus) {
    let running = if status == SessionStatus::Running { 1.0 } else { 0.0 };
    metrics::gauge!("conduit_session_running").set(running);
}

pub fn record_message_latency(seconds: f64) {
    metrics::histogram!("conduit_message_seconds").record(seconds);
}
