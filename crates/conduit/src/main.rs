// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conduit - resumable message forwarding between two feeds.
//!
//! This is the operator CLI. It works against the durable progress store,
//! so it can inspect and manage sessions whether or not a forwarder is
//! currently running.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod commands;
mod status;

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use conduit_config::ConduitConfig;
use conduit_core::{ConduitError, ProgressStore};
use conduit_engine::recording;
use conduit_storage::SqliteStore;
use serde::Serialize;

/// Conduit - resumable message forwarding between two feeds.
#[derive(Parser, Debug)]
#[command(name = "conduit", version, about, long_about = None)]
struct Cli {
    /// Configuration file to use instead of the standard search path.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    plain: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Show store health and the state and progress of the latest session.
    Status,
    /// Show session and lifetime counters.
    Stats,
    /// List ids that exhausted every transfer strategy.
    Failed {
        /// Session to inspect; defaults to the latest one.
        #[arg(long)]
        session: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Change an operator setting (delay, speed_mode, max_retries, flood_protect).
    Set { key: String, value: String },
    /// Remove all sessions and progress. Lifetime totals are kept.
    Reset {
        /// Confirm the reset.
        #[arg(long)]
        yes: bool,
    },
    /// List recent sessions.
    Sessions {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Pause sessions left running by a process that exited.
    Recover,
}

/// How command output is rendered.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Output {
    pub json: bool,
    pub color: bool,
}

impl Output {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            json: cli.json,
            color: !cli.plain && std::io::stdout().is_terminal(),
        }
    }

    pub(crate) fn print_json<T: Serialize + ?Sized>(&self, value: &T) {
        println!(
            "{}",
            serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
        );
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => conduit_config::load_and_validate_path(path),
        None => conduit_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            conduit_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.engine.log_level);
    recording::register_metrics();

    if let Err(e) = run(&cli, &config).await {
        eprintln!("conduit: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: &Cli, config: &ConduitConfig) -> Result<(), ConduitError> {
    let out = Output::from_cli(cli);
    let store = SqliteStore::new(config.storage.clone());
    store.initialize().await?;

    let result = match &cli.command {
        Commands::Status => status::run_status(&store, out).await,
        Commands::Stats => status::run_stats(&store, out).await,
        Commands::Failed { session, limit } => {
            commands::run_failed(&store, session.as_deref(), *limit, out).await
        }
        Commands::Set { key, value } => commands::run_set(&store, config, key, value, out)
            .await
            .map(|_| ()),
        Commands::Reset { yes } => commands::run_reset(&store, *yes).await,
        Commands::Sessions { limit } => commands::run_sessions(&store, *limit, out).await,
        Commands::Recover => commands::run_recover(&store, out).await.map(|_| ()),
    };

    store.close().await?;
    result
}

/// Install the global tracing subscriber. `RUST_LOG` overrides the config level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("conduit={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use serial_test::serial;

    use super::*;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    #[serial]
    fn binary_loads_config_defaults() {
        let config = conduit_config::load_and_validate().expect("default config should be valid");
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from(["conduit", "failed", "--limit", "5", "--json"]).unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Failed { limit, session } => {
                assert_eq!(limit, 5);
                assert!(session.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn reset_defaults_to_unconfirmed() {
        let cli = Cli::try_parse_from(["conduit", "reset"]).unwrap();
        assert!(matches!(cli.command, Commands::Reset { yes: false }));
    }

    #[tokio::test]
    #[serial]
    async fn run_against_explicit_config_creates_store() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("data").join("conduit.db");
        let config_path = dir.path().join("conduit.toml");
        std::fs::write(
            &config_path,
            format!("[storage]\ndatabase_path = {:?}\n", db.to_string_lossy()),
        )
        .unwrap();

        let config = conduit_config::load_and_validate_path(&config_path).unwrap();
        let cli = Cli::try_parse_from(["conduit", "--json", "sessions"]).unwrap();
        run(&cli, &config).await.unwrap();
        assert!(db.exists());

        let cli = Cli::try_parse_from(["conduit", "status", "--plain"]).unwrap();
        run(&cli, &config).await.unwrap();
    }
}
