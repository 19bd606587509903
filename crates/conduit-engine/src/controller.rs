// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator-facing command surface.
//!
//! The controller owns at most one running engine per process, validates
//! operator input before touching any state, and is the only writer of
//! settings.

use std::sync::Arc;

use conduit_config::ConduitConfig;
use conduit_core::{
    ConduitError, FailedMessage, ForwardSession, PlatformClient, ProgressStore, RecordStatus,
    SessionRequest, SessionStatus, SourceId, StatisticsSnapshot, StatusNotifier, StatusSnapshot,
};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::engine::{EngineDeps, EngineHandle, ForwardingEngine};
use crate::settings::{Setting, Settings, SettingsHandle, load_settings, persist_setting};

/// Upper bound on sessions scanned when checking for a live lease before reset.
const RESET_SCAN_LIMIT: usize = 1000;

struct ActiveRun {
    session_id: String,
    handle: EngineHandle,
    task: Option<JoinHandle<Result<SessionStatus, ConduitError>>>,
}

impl ActiveRun {
    /// A taken task is being awaited by [`Controller::wait`] and still counts as running.
    fn is_running(&self) -> bool {
        self.task.as_ref().is_none_or(|t| !t.is_finished())
    }
}

pub struct Controller {
    deps: EngineDeps,
    active: Mutex<Option<ActiveRun>>,
}

impl Controller {
    /// Build a controller, overlaying persisted settings on the config defaults.
    pub async fn new(
        platform: Arc<dyn PlatformClient>,
        store: Arc<dyn ProgressStore>,
        notifier: Arc<dyn StatusNotifier>,
        config: ConduitConfig,
    ) -> Result<Self, ConduitError> {
        let settings = load_settings(store.as_ref(), &config).await?;
        Ok(Self::from_deps(EngineDeps {
            platform,
            store,
            notifier,
            config: Arc::new(config),
            settings: SettingsHandle::new(settings),
        }))
    }

    pub fn from_deps(deps: EngineDeps) -> Self {
        Self {
            deps,
            active: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> Arc<Settings> {
        self.deps.settings.snapshot()
    }

    /// Create a session for `request` and start forwarding it.
    pub async fn start(&self, request: SessionRequest) -> Result<ForwardSession, ConduitError> {
        request.validate()?;
        let mut active = self.active.lock().await;
        ensure_idle(&active)?;
        let session = self.deps.store.create_session(&request).await?;
        info!(
            session_id = %session.id,
            source = %session.source_chat,
            target = %session.target_chat,
            from_id = session.from_id,
            to_id = ?session.to_id,
            "session created"
        );
        self.launch(&mut active, &session.id).await
    }

    /// Resume `session_id`, or the most recent session when `None`.
    pub async fn resume(&self, session_id: Option<&str>) -> Result<ForwardSession, ConduitError> {
        let mut active = self.active.lock().await;
        ensure_idle(&active)?;
        let id = match session_id {
            Some(id) => id.to_string(),
            None => self.latest_session().await?.id,
        };
        self.launch(&mut active, &id).await
    }

    async fn launch(
        &self,
        active: &mut Option<ActiveRun>,
        session_id: &str,
    ) -> Result<ForwardSession, ConduitError> {
        let session = self.deps.store.acquire_lease(session_id).await?;
        let engine = match ForwardingEngine::new(self.deps.clone(), session.clone()).await {
            Ok(engine) => engine,
            Err(e) => {
                // The lease was taken; do not leave the session stuck in `running`.
                let message = e.to_string();
                if let Err(release) = self
                    .deps
                    .store
                    .update_status(session_id, SessionStatus::Failed, Some(&message))
                    .await
                {
                    warn!(session_id, error = %release, "could not release lease");
                }
                return Err(e);
            }
        };
        let handle = engine.handle();
        let task = tokio::spawn(engine.run());
        *active = Some(ActiveRun {
            session_id: session.id.clone(),
            handle,
            task: Some(task),
        });
        Ok(session)
    }

    /// Ask the running engine to stop after the current id.
    pub async fn pause(&self) -> Result<(), ConduitError> {
        let active = self.active.lock().await;
        match active.as_ref().filter(|run| run.is_running()) {
            Some(run) => {
                info!(session_id = %run.session_id, "pause requested");
                run.handle.pause();
                Ok(())
            }
            None => Err(ConduitError::Validation("no session is running".into())),
        }
    }

    /// Stop the running engine after a final checkpoint, or cancel a stopped session.
    pub async fn cancel(&self, session_id: Option<&str>) -> Result<(), ConduitError> {
        {
            let active = self.active.lock().await;
            if let Some(run) = active.as_ref().filter(|run| run.is_running()) {
                if session_id.is_none_or(|id| id == run.session_id) {
                    info!(session_id = %run.session_id, "cancel requested");
                    run.handle.cancel();
                    return Ok(());
                }
            }
        }

        let session = match session_id {
            Some(id) => self.require_session(id).await?,
            None => self.latest_session().await?,
        };
        if session.status.is_final() || session.status == SessionStatus::Running {
            return Err(ConduitError::InvalidTransition {
                session_id: session.id,
                status: session.status,
                action: "cancel",
            });
        }
        self.deps
            .store
            .update_status(&session.id, SessionStatus::Cancelled, None)
            .await?;
        info!(session_id = %session.id, "session cancelled");
        Ok(())
    }

    /// Wait for the running engine to stop. `None` when nothing was started.
    pub async fn wait(&self) -> Result<Option<SessionStatus>, ConduitError> {
        let task = {
            let mut active = self.active.lock().await;
            active.as_mut().and_then(|run| run.task.take())
        };
        let Some(task) = task else {
            return Ok(None);
        };
        let result = task
            .await
            .map_err(|e| ConduitError::Internal(format!("engine task panicked: {e}")))?;
        self.active.lock().await.take();
        result.map(Some)
    }

    /// Wipe sessions, ledger and failures. Lifetime statistics and settings survive.
    pub async fn reset(&self, confirm: bool) -> Result<(), ConduitError> {
        let active = self.active.lock().await;
        if let Some(run) = active.as_ref().filter(|run| run.is_running()) {
            return Err(ConduitError::InvalidTransition {
                session_id: run.session_id.clone(),
                status: SessionStatus::Running,
                action: "reset",
            });
        }
        reset_progress(self.deps.store.as_ref(), confirm).await
    }

    /// Live snapshot of the running engine, or the last persisted state.
    pub async fn status(&self) -> Result<Option<StatusSnapshot>, ConduitError> {
        match self.live_status().await {
            Some(snapshot) => Ok(Some(snapshot)),
            None => persisted_status(self.deps.store.as_ref()).await,
        }
    }

    /// Session and lifetime counters. Lifetime includes progress not yet checkpointed.
    pub async fn stats(&self) -> Result<StatisticsSnapshot, ConduitError> {
        let status = self.status().await?;
        statistics(self.deps.store.as_ref(), status).await
    }

    /// Failed messages of the current or most recent session.
    pub async fn failed(&self, limit: usize) -> Result<Vec<FailedMessage>, ConduitError> {
        let session_id = match self.current_session_id().await {
            Some(id) => Some(id),
            None => self.deps.store.latest_session().await?.map(|s| s.id),
        };
        self.deps
            .store
            .list_failed(session_id.as_deref(), limit)
            .await
    }

    /// Validate, persist and publish one operator setting.
    pub async fn set_setting(&self, key: &str, value: &str) -> Result<Setting, ConduitError> {
        let setting = Setting::parse(key, value)?;
        persist_setting(self.deps.store.as_ref(), &setting).await?;
        self.deps.settings.update(&setting);
        info!(key = setting.key(), value = %setting.value_string(), "setting updated");
        Ok(setting)
    }

    /// Re-run one failed id of the most recent session.
    pub async fn retry_failed(&self, source_id: SourceId) -> Result<RecordStatus, ConduitError> {
        let active = self.active.lock().await;
        if let Some(run) = active.as_ref().filter(|run| run.is_running()) {
            return Err(ConduitError::InvalidTransition {
                session_id: run.session_id.clone(),
                status: SessionStatus::Running,
                action: "retry failed ids of",
            });
        }
        let session = self.latest_session().await?;
        let engine = ForwardingEngine::new(self.deps.clone(), session).await?;
        let status = engine.retry_failed(source_id).await;
        drop(active);
        status
    }

    /// Mark sessions left `running` by a crashed process as `paused`.
    pub async fn recover_stale(&self) -> Result<Vec<String>, ConduitError> {
        let active = self.active.lock().await;
        if active.as_ref().is_some_and(ActiveRun::is_running) {
            return Err(ConduitError::Validation(
                "cannot recover stale sessions while this process is forwarding".into(),
            ));
        }
        let recovered = self.deps.store.recover_stale_sessions().await?;
        for id in &recovered {
            warn!(session_id = %id, "recovered session interrupted while running");
        }
        Ok(recovered)
    }

    async fn live_status(&self) -> Option<StatusSnapshot> {
        let active = self.active.lock().await;
        active.as_ref().map(|run| run.handle.status())
    }

    async fn current_session_id(&self) -> Option<String> {
        let active = self.active.lock().await;
        active.as_ref().map(|run| run.session_id.clone())
    }

    async fn latest_session(&self) -> Result<ForwardSession, ConduitError> {
        self.deps
            .store
            .latest_session()
            .await?
            .ok_or_else(|| ConduitError::Validation("no forwarding session exists".into()))
    }

    async fn require_session(&self, id: &str) -> Result<ForwardSession, ConduitError> {
        self.deps
            .store
            .get_session(id)
            .await?
            .ok_or_else(|| ConduitError::SessionNotFound {
                session_id: id.to_string(),
            })
    }
}

/// Last persisted state of the most recent session.
pub async fn persisted_status(
    store: &dyn ProgressStore,
) -> Result<Option<StatusSnapshot>, ConduitError> {
    let Some(session) = store.latest_session().await? else {
        return Ok(None);
    };
    let counters = store.load_counters(&session.id).await?;
    Ok(Some(StatusSnapshot {
        session_id: session.id.clone(),
        state: session.status,
        counters,
        percentage: session.percentage(),
        speed: 0.0,
        eta_secs: None,
        current_id: session.current_id,
    }))
}

/// Combine a session snapshot with the persisted lifetime counters.
///
/// Progress in `status` that is not checkpointed yet is added to the lifetime totals.
pub async fn statistics(
    store: &dyn ProgressStore,
    status: Option<StatusSnapshot>,
) -> Result<StatisticsSnapshot, ConduitError> {
    let mut lifetime = store.load_lifetime().await?;
    let Some(status) = status else {
        return Ok(StatisticsSnapshot {
            session_id: None,
            session: Default::default(),
            lifetime,
            speed: 0.0,
            eta_secs: None,
        });
    };
    let persisted = store.load_counters(&status.session_id).await?;
    lifetime.counters = lifetime
        .counters
        .plus(&status.counters.saturating_sub(&persisted));
    Ok(StatisticsSnapshot {
        session_id: Some(status.session_id),
        session: status.counters,
        lifetime,
        speed: status.speed,
        eta_secs: status.eta_secs,
    })
}

/// Wipe sessions, ledger and failures after confirmation.
///
/// Refused while any stored session holds the running lease.
pub async fn reset_progress(store: &dyn ProgressStore, confirm: bool) -> Result<(), ConduitError> {
    if !confirm {
        return Err(ConduitError::Validation(
            "reset discards all sessions and progress; confirmation is required".into(),
        ));
    }
    let sessions = store.list_sessions(RESET_SCAN_LIMIT).await?;
    if let Some(live) = sessions.iter().find(|s| s.status == SessionStatus::Running) {
        return Err(ConduitError::InvalidTransition {
            session_id: live.id.clone(),
            status: live.status,
            action: "reset",
        });
    }
    store.reset_all().await?;
    info!(sessions = sessions.len(), "progress reset");
    Ok(())
}

fn ensure_idle(active: &Option<ActiveRun>) -> Result<(), ConduitError> {
    match active.as_ref().filter(|run| run.is_running()) {
        Some(run) => Err(ConduitError::SessionBusy {
            session_id: run.session_id.clone(),
        }),
        None => Ok(()),
    }
}
