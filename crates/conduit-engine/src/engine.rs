// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-session forwarding loop.
//!
//! One [`ForwardingEngine`] owns one leased session and processes its ids
//! strictly in order. For each id it consults the ledger, fetches, applies
//! policy, runs the strategy chain, writes the terminal ledger entry and only
//! then advances the cursor. Pause and cancel are honored between ids.

use std::sync::Arc;
use std::time::Duration;

use conduit_config::ConduitConfig;
use conduit_core::{
    Checkpoint, ConduitError, ErrorKind, FailedMessage, ForwardSession, MessageRecord, PlatformClient,
    PlatformError, ProgressStore, RecordStatus, SessionStatus, SourceId, StatusNotifier,
    StatusSnapshot, TargetId,
};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cursor::{Advance, CursorManager};
use crate::dedup::{DedupTracker, Known};
use crate::flusher::ProgressFlusher;
use crate::policy::ContentPolicy;
use crate::rate::RateController;
use crate::recording;
use crate::retry::{AttemptTally, RetryPolicy, with_retry};
use crate::settings::{Settings, SettingsHandle, load_settings};
use crate::stats::StatsAggregator;
use crate::status::StatusPublisher;
use crate::strategy::{ChainOutcome, StrategyChain, StrategyContext};

/// Strategy name recorded when the fetch itself failed.
const FETCH: &str = "fetch";

/// Operator request observed at the safe point between ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    Run,
    Pause,
    Cancel,
}

/// Collaborators shared by every engine run.
#[derive(Clone)]
pub struct EngineDeps {
    pub platform: Arc<dyn PlatformClient>,
    pub store: Arc<dyn ProgressStore>,
    pub notifier: Arc<dyn StatusNotifier>,
    pub config: Arc<ConduitConfig>,
    pub settings: SettingsHandle,
}

/// Control and observation side of a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    control: watch::Sender<ControlSignal>,
    status: watch::Receiver<StatusSnapshot>,
}

impl EngineHandle {
    pub fn pause(&self) {
        self.signal(ControlSignal::Pause);
    }

    pub fn cancel(&self) {
        self.signal(ControlSignal::Cancel);
    }

    fn signal(&self, signal: ControlSignal) {
        // Cancel wins over a pending pause.
        self.control.send_if_modified(|current| {
            let next = match (*current, signal) {
                (ControlSignal::Cancel, _) => ControlSignal::Cancel,
                (_, requested) => requested,
            };
            let changed = *current != next;
            *current = next;
            changed
        });
    }

    /// Latest snapshot, updated after every id.
    pub fn status(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.clone()
    }
}

/// How the forward loop stopped without a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    Exhausted,
    Paused,
    Cancelled,
}

/// Result of processing one id.
#[derive(Debug, Clone, Copy)]
struct Processed {
    status: RecordStatus,
    /// The message body was fetched successfully.
    fetched: bool,
    /// The platform was contacted; replayed ids skip the inter-message delay.
    network: bool,
}

pub struct ForwardingEngine {
    deps: EngineDeps,
    session: ForwardSession,
    cursor: CursorManager,
    chain: StrategyChain,
    policy: ContentPolicy,
    dedup: DedupTracker,
    rate: RateController,
    retry: RetryPolicy,
    stats: StatsAggregator,
    control_tx: watch::Sender<ControlSignal>,
    control_rx: watch::Receiver<ControlSignal>,
    status_tx: watch::Sender<StatusSnapshot>,
}

impl ForwardingEngine {
    /// Prepare an engine for `session`, loading its counters as of the last checkpoint.
    pub async fn new(deps: EngineDeps, session: ForwardSession) -> Result<Self, ConduitError> {
        let cursor = CursorManager::from_session(&session)?;
        let counters = deps.store.load_counters(&session.id).await?;
        let config = deps.config.clone();

        let retry = RetryPolicy::from_config(&config.retry);
        let stats = StatsAggregator::new(config.status.speed_window, counters);
        let (control_tx, control_rx) = watch::channel(ControlSignal::Run);
        let (status_tx, _) = watch::channel(placeholder_snapshot(&session));

        let mut engine = Self {
            chain: StrategyChain::new(&config.engine, retry.clone()),
            policy: ContentPolicy::new(&config.policy, config.engine.max_file_size_mb),
            dedup: DedupTracker::new(deps.store.clone(), &config.policy),
            rate: RateController::new(&config.rate),
            retry,
            stats,
            cursor,
            control_tx,
            control_rx,
            status_tx,
            session,
            deps,
        };
        let initial = engine.snapshot(engine.session.status);
        engine.status_tx.send_replace(initial);
        Ok(engine)
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            control: self.control_tx.clone(),
            status: self.status_tx.subscribe(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session.id
    }

    /// Drive the session until the range is exhausted, the operator stops it,
    /// or a fatal error occurs. Returns the status the session was left in.
    pub async fn run(mut self) -> Result<SessionStatus, ConduitError> {
        let config = self.deps.config.clone();
        recording::set_session_state(SessionStatus::Running);
        info!(
            session_id = %self.session.id,
            source = %self.session.source_chat,
            target = %self.session.target_chat,
            current_id = self.cursor.current(),
            to_id = ?self.session.to_id,
            strategies = ?self.chain.names(),
            "forwarding session started"
        );

        let flush_done = CancellationToken::new();
        let status_done = CancellationToken::new();
        let (checkpoint_tx, checkpoint_rx) = watch::channel(self.checkpoint());
        let flusher = ProgressFlusher::new(
            self.deps.store.clone(),
            Duration::from_secs(config.engine.checkpoint_interval_secs.max(1)),
        )
        .spawn(checkpoint_rx, flush_done.clone());
        let publisher = StatusPublisher::new(
            self.deps.notifier.clone(),
            Duration::from_secs(config.status.interval_secs.max(1)),
        )
        .spawn(self.status_tx.subscribe(), status_done.clone());

        self.publish(SessionStatus::Running);
        let outcome = self.forward_loop(&checkpoint_tx).await;

        flush_done.cancel();
        if let Err(e) = flusher.await {
            warn!(error = %e, "checkpoint flusher task ended abnormally");
        }

        let result = match outcome {
            Ok(exit) => self.finish(exit).await,
            Err(e) => Err(e),
        };

        let final_status = match &result {
            Ok(status) => *status,
            Err(e) => {
                self.fail(e).await;
                SessionStatus::Failed
            }
        };

        self.publish(final_status);
        recording::set_session_state(final_status);
        status_done.cancel();
        if let Err(e) = publisher.await {
            warn!(error = %e, "status publisher task ended abnormally");
        }

        result
    }

    /// Persist the final checkpoint and the terminal or paused status.
    async fn finish(&mut self, exit: LoopExit) -> Result<SessionStatus, ConduitError> {
        self.flush().await?;
        let status = match exit {
            LoopExit::Exhausted => SessionStatus::Completed,
            LoopExit::Paused => SessionStatus::Paused,
            LoopExit::Cancelled => SessionStatus::Cancelled,
        };
        self.deps
            .store
            .update_status(&self.session.id, status, None)
            .await?;
        info!(
            session_id = %self.session.id,
            status = %status,
            current_id = self.cursor.current(),
            forwarded = self.stats.counters().forwarded,
            failed = self.stats.counters().failed,
            "forwarding session stopped"
        );
        Ok(status)
    }

    /// Best-effort checkpoint and transition to `failed` after a fatal error.
    async fn fail(&mut self, err: &ConduitError) {
        error!(session_id = %self.session.id, error = %err, "forwarding session failed");
        if let Err(e) = self.flush().await {
            warn!(session_id = %self.session.id, error = %e, "final checkpoint failed");
        }
        let message = err.to_string();
        if let Err(e) = self
            .deps
            .store
            .update_status(&self.session.id, SessionStatus::Failed, Some(&message))
            .await
        {
            warn!(session_id = %self.session.id, error = %e, "could not mark session failed");
        }
    }

    async fn forward_loop(
        &mut self,
        checkpoint_tx: &watch::Sender<Checkpoint>,
    ) -> Result<LoopExit, ConduitError> {
        let config = self.deps.config.clone();
        let refresh_every = Duration::from_secs(config.engine.settings_refresh_secs.max(1));
        let mut refresh_at = Instant::now() + refresh_every;
        let mut since_checkpoint = 0u64;

        loop {
            match *self.control_rx.borrow_and_update() {
                ControlSignal::Run => {}
                ControlSignal::Pause => return Ok(LoopExit::Paused),
                ControlSignal::Cancel => return Ok(LoopExit::Cancelled),
            }

            if Instant::now() >= refresh_at {
                self.refresh_settings().await;
                refresh_at = Instant::now() + refresh_every;
            }
            let settings = self.deps.settings.snapshot();

            let id = match self.cursor.advance() {
                Advance::Next(id) => id,
                Advance::RangeExhausted => return Ok(LoopExit::Exhausted),
                Advance::NeedsHorizon => {
                    let latest = self.fetch_horizon(&settings).await?;
                    match self.cursor.set_horizon(latest) {
                        Advance::Next(id) => id,
                        _ => return Ok(LoopExit::Exhausted),
                    }
                }
            };

            let started = Instant::now();
            let processed = self.process_id(id, &settings).await?;
            self.cursor.complete(id)?;
            if processed.network {
                self.stats.record(processed.status, processed.fetched);
                recording::record_outcome(processed.status);
                recording::record_message_latency(started.elapsed().as_secs_f64());
            } else {
                self.stats.restore(processed.status, processed.fetched);
            }

            checkpoint_tx.send_replace(self.checkpoint());
            since_checkpoint += 1;
            if since_checkpoint >= config.engine.checkpoint_every {
                self.flush().await?;
                since_checkpoint = 0;
            }
            self.publish(SessionStatus::Running);

            if processed.network {
                let delay = self.rate.current_delay(&settings);
                self.interruptible_sleep(delay).await;
            }
        }
    }

    /// Sleep for the inter-message delay unless the operator intervenes.
    async fn interruptible_sleep(&mut self, delay: Duration) {
        if delay.is_zero() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = self.control_rx.changed() => {}
        }
    }

    async fn refresh_settings(&self) {
        match load_settings(self.deps.store.as_ref(), &self.deps.config).await {
            Ok(settings) => {
                if *self.deps.settings.snapshot() != settings {
                    debug!(?settings, "settings changed");
                    self.deps.settings.replace(settings);
                }
            }
            Err(e) => warn!(error = %e, "settings refresh failed, keeping snapshot"),
        }
    }

    async fn fetch_horizon(&mut self, settings: &Settings) -> Result<Option<SourceId>, ConduitError> {
        let platform = self.deps.platform.clone();
        let chat = self.session.source_chat.clone();
        let mut budget = settings.max_retries;
        let mut tally = AttemptTally::default();
        let latest = with_retry(
            "latest_message_id",
            &self.retry,
            &mut budget,
            &mut tally,
            &mut self.rate,
            || platform.latest_message_id(&chat),
        )
        .await?;
        debug!(session_id = %self.session.id, ?latest, "refreshed feed horizon");
        Ok(latest)
    }

    /// Settle one id: replay it from the ledger or transfer it and record the outcome.
    async fn process_id(&mut self, id: SourceId, settings: &Settings) -> Result<Processed, ConduitError> {
        match self.dedup.lookup(&self.session, id).await? {
            Known::Settled(record) => {
                debug!(source_id = id, status = %record.status, "replaying settled id");
                return Ok(Processed {
                    status: record.status,
                    fetched: !matches!(
                        record.status,
                        RecordStatus::Deleted | RecordStatus::Duplicate
                    ),
                    network: false,
                });
            }
            Known::ForwardedElsewhere(_) => {
                let record = MessageRecord::new(&self.session.id, id, RecordStatus::Duplicate);
                self.deps.store.record_outcome(&record, None).await?;
                recording::record_outcome(RecordStatus::Duplicate);
                return Ok(Processed {
                    status: RecordStatus::Duplicate,
                    fetched: false,
                    network: false,
                });
            }
            Known::Unknown => {}
        }
        self.transfer(id, settings).await
    }

    /// Fetch, filter and transfer one id, then write its terminal ledger entry.
    async fn transfer(&mut self, id: SourceId, settings: &Settings) -> Result<Processed, ConduitError> {
        let platform = self.deps.platform.clone();
        let source_chat = self.session.source_chat.clone();
        let mut tally = AttemptTally::default();
        let mut budget = settings.max_retries;

        let fetched = with_retry(
            FETCH,
            &self.retry,
            &mut budget,
            &mut tally,
            &mut self.rate,
            || platform.fetch(&source_chat, id),
        )
        .await;

        let mut target_id: Option<TargetId> = None;
        let mut fingerprint: Option<String> = None;
        let mut failure: Option<FailedMessage> = None;
        let mut was_fetched = false;

        let status = match fetched {
            Err(PlatformError::NotFound) => RecordStatus::Deleted,
            Err(PlatformError::Unauthorized(msg)) => return Err(ConduitError::Unauthorized(msg)),
            Err(err) => {
                failure = Some(self.failed_message(id, &err.to_string(), err.kind(), FETCH, &tally));
                RecordStatus::Failed
            }
            Ok(message) => {
                was_fetched = true;
                fingerprint = self.dedup.fingerprint_of(&message);
                if let Some(reason) = self.policy.check(&message) {
                    debug!(source_id = id, ?reason, "filtered by policy");
                    RecordStatus::Filtered
                } else if self.fingerprint_seen(fingerprint.as_deref()).await? {
                    debug!(source_id = id, fingerprint = ?fingerprint, "content already forwarded");
                    RecordStatus::Duplicate
                } else {
                    let ctx = StrategyContext {
                        platform: platform.as_ref(),
                        session: &self.session,
                    };
                    let outcome = self
                        .chain
                        .run(&ctx, &message, settings.max_retries, &mut tally, &mut self.rate)
                        .await?;
                    match outcome {
                        ChainOutcome::Forwarded {
                            target_id: sent, ..
                        } => {
                            target_id = Some(sent);
                            RecordStatus::Forwarded
                        }
                        ChainOutcome::Deleted => RecordStatus::Deleted,
                        ChainOutcome::Exhausted {
                            kind,
                            message: reason,
                            strategy,
                        } => {
                            warn!(
                                source_id = id,
                                error_kind = %kind,
                                attempts = tally.attempts,
                                "all strategies failed"
                            );
                            failure =
                                Some(self.failed_message(id, &reason, kind, strategy, &tally));
                            RecordStatus::Failed
                        }
                    }
                }
            }
        };

        let record = MessageRecord {
            target_id,
            fingerprint: if status == RecordStatus::Forwarded {
                fingerprint
            } else {
                None
            },
            retry_count: tally.retries,
            ..MessageRecord::new(&self.session.id, id, status)
        };
        self.deps
            .store
            .record_outcome(&record, failure.as_ref())
            .await?;

        Ok(Processed {
            status,
            fetched: was_fetched,
            network: true,
        })
    }

    async fn fingerprint_seen(&self, fingerprint: Option<&str>) -> Result<bool, ConduitError> {
        match fingerprint {
            Some(fp) => self.dedup.seen_fingerprint(&self.session.id, fp).await,
            None => Ok(false),
        }
    }

    fn failed_message(
        &self,
        id: SourceId,
        reason: &str,
        kind: ErrorKind,
        strategy: &str,
        tally: &AttemptTally,
    ) -> FailedMessage {
        FailedMessage {
            session_id: self.session.id.clone(),
            source_id: id,
            error_kind: kind,
            error_message: reason.to_string(),
            attempt_count: tally.attempts,
            strategy_used: strategy.to_string(),
            last_attempt_at: String::new(),
        }
    }

    /// Re-process one failed id of a session that is not running.
    ///
    /// The cursor is untouched; counters move from `failed` to the new outcome.
    pub async fn retry_failed(mut self, source_id: SourceId) -> Result<RecordStatus, ConduitError> {
        if self.session.status == SessionStatus::Running {
            return Err(ConduitError::InvalidTransition {
                session_id: self.session.id.clone(),
                status: self.session.status,
                action: "retry failed ids of",
            });
        }
        let failed = self
            .deps
            .store
            .get_failed(&self.session.id, source_id)
            .await?
            .ok_or_else(|| {
                ConduitError::Validation(format!(
                    "message {source_id} has no failure recorded in session {}",
                    self.session.id
                ))
            })?;

        let settings = self.deps.settings.snapshot();
        let processed = self.transfer(source_id, &settings).await?;
        let fetched_now = processed.fetched && failed.strategy_used == FETCH;
        self.stats
            .reclassify(RecordStatus::Failed, processed.status, fetched_now);
        recording::record_outcome(processed.status);
        self.flush().await?;

        info!(
            session_id = %self.session.id,
            source_id,
            status = %processed.status,
            "retried failed message"
        );
        Ok(processed.status)
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            session_id: self.session.id.clone(),
            current_id: self.cursor.current(),
            counters: self.stats.counters(),
        }
    }

    async fn flush(&self) -> Result<(), ConduitError> {
        let checkpoint = self.checkpoint();
        if !self.deps.store.save_checkpoint(&checkpoint).await? {
            debug!(
                session_id = %checkpoint.session_id,
                current_id = checkpoint.current_id,
                "checkpoint superseded by a newer write"
            );
        }
        Ok(())
    }

    fn snapshot(&self, state: SessionStatus) -> StatusSnapshot {
        StatusSnapshot {
            session_id: self.session.id.clone(),
            state,
            counters: self.stats.counters(),
            percentage: self.cursor.percentage(),
            speed: self.stats.speed_per_min(),
            eta_secs: self.stats.eta_secs(self.cursor.remaining()),
            current_id: self.cursor.current(),
        }
    }

    fn publish(&self, state: SessionStatus) {
        self.status_tx.send_replace(self.snapshot(state));
    }
}

fn placeholder_snapshot(session: &ForwardSession) -> StatusSnapshot {
    StatusSnapshot {
        session_id: session.id.clone(),
        state: session.status,
        counters: Default::default(),
        percentage: session.percentage(),
        speed: 0.0,
        eta_secs: None,
        current_id: session.current_id,
    }
}
