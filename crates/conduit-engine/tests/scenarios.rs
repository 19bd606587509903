// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end forwarding runs against the mock platform and a real SQLite store.

use std::time::Duration;

use conduit_config::ConduitConfig;
use conduit_core::{
    ConduitError, ErrorKind, MessageRecord, PlatformError, ProgressStore, RecordStatus,
    SessionRequest, SessionStatus,
};
use conduit_engine::Controller;
use conduit_test_utils::{MockPlatform, Op, TestHarness};

fn request(from_id: i64, to_id: Option<i64>) -> SessionRequest {
    SessionRequest {
        source_chat: "@source".into(),
        target_chat: "@target".into(),
        from_id,
        to_id,
    }
}

async fn setup(platform: MockPlatform, config: ConduitConfig) -> (TestHarness, Controller) {
    let harness = TestHarness::builder()
        .with_platform(platform)
        .with_config(config)
        .build()
        .await
        .expect("harness");
    let controller = Controller::new(
        harness.platform.clone(),
        harness.store.clone(),
        harness.notifier.clone(),
        harness.config.clone(),
    )
    .await
    .expect("controller");
    (harness, controller)
}

async fn wait_for_call(platform: &MockPlatform, op: Op, id: i64) {
    while platform.calls(op, id) == 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn all_ids_forwarded_in_order() {
    let (h, controller) = setup(MockPlatform::with_text_range(1, 10), ConduitConfig::default()).await;

    let session = controller.start(request(1, Some(10))).await.expect("start");
    let status = controller.wait().await.expect("run");
    assert_eq!(status, Some(SessionStatus::Completed));

    let snapshot = controller.status().await.expect("status").expect("session");
    assert_eq!(snapshot.session_id, session.id);
    assert_eq!(snapshot.state, SessionStatus::Completed);
    assert_eq!(snapshot.counters.forwarded, 10);
    assert_eq!(snapshot.counters.fetched, 10);
    assert_eq!(snapshot.percentage, Some(100.0));
    assert_eq!(snapshot.current_id, 11);

    let sent = h.platform.sent();
    assert_eq!(sent.iter().map(|s| s.source_id).collect::<Vec<_>>(), (1..=10).collect::<Vec<_>>());
    assert!(sent.windows(2).all(|w| w[0].target_id < w[1].target_id));

    let last = h.notifier.last().expect("final snapshot");
    assert_eq!(last.state, SessionStatus::Completed);
    assert_eq!(last.counters.forwarded, 10);
}

#[tokio::test(start_paused = true)]
async fn deleted_message_is_recorded_and_skipped() {
    let platform = MockPlatform::with_text_range(1, 10);
    platform.remove(5);
    let (h, controller) = setup(platform, ConduitConfig::default()).await;

    let session = controller.start(request(1, Some(10))).await.expect("start");
    assert_eq!(controller.wait().await.expect("run"), Some(SessionStatus::Completed));

    let record = h
        .store
        .get_record(&session.id, 5)
        .await
        .expect("query")
        .expect("record for 5");
    assert_eq!(record.status, RecordStatus::Deleted);

    let stats = controller.stats().await.expect("stats");
    assert_eq!(stats.session.forwarded, 9);
    assert_eq!(stats.session.deleted, 1);
    assert!(!h.platform.sent_ids().contains(&5));
}

#[tokio::test(start_paused = true)]
async fn rate_limit_wait_is_honored_without_spending_retries() {
    let platform = MockPlatform::with_text_range(1, 10);
    platform.fail_once(
        Op::Forward,
        7,
        PlatformError::RateLimited {
            retry_after: Duration::from_secs(30),
        },
    );
    let (h, controller) = setup(platform, ConduitConfig::default()).await;

    let started = tokio::time::Instant::now();
    let session = controller.start(request(1, Some(10))).await.expect("start");
    assert_eq!(controller.wait().await.expect("run"), Some(SessionStatus::Completed));
    assert!(started.elapsed() >= Duration::from_secs(30));

    let record = h
        .store
        .get_record(&session.id, 7)
        .await
        .expect("query")
        .expect("record for 7");
    assert_eq!(record.status, RecordStatus::Forwarded);
    assert_eq!(record.retry_count, 0);
    assert_eq!(h.platform.calls(Op::Forward, 7), 2);
}

#[tokio::test(start_paused = true)]
async fn pause_stops_after_current_id_and_resume_continues() {
    let platform = MockPlatform::with_text_range(1, 10);
    platform.set_latency(Op::Forward, 4, Duration::from_secs(5));
    let (h, controller) = setup(platform, ConduitConfig::default()).await;

    let session = controller.start(request(1, Some(10))).await.expect("start");
    wait_for_call(&h.platform, Op::Forward, 4).await;
    controller.pause().await.expect("pause");
    assert_eq!(controller.wait().await.expect("run"), Some(SessionStatus::Paused));

    let stored = h
        .store
        .get_session(&session.id)
        .await
        .expect("query")
        .expect("session");
    assert_eq!(stored.status, SessionStatus::Paused);
    assert_eq!(stored.current_id, 5);
    assert_eq!(h.platform.sent_ids(), vec![1, 2, 3, 4]);

    let resumed = controller.resume(None).await.expect("resume");
    assert_eq!(resumed.current_id, 5);
    assert_eq!(controller.wait().await.expect("run"), Some(SessionStatus::Completed));
    assert_eq!(h.platform.sent_ids(), (1..=10).collect::<Vec<_>>());
    assert_eq!(h.platform.calls(Op::Fetch, 4), 1);

    let currents: Vec<i64> = h.notifier.snapshots().iter().map(|s| s.current_id).collect();
    assert!(currents.windows(2).all(|w| w[0] <= w[1]), "{currents:?}");
}

#[tokio::test(start_paused = true)]
async fn exhausted_strategies_record_failure_and_continue() {
    let platform = MockPlatform::with_text_range(1, 10);
    let transient = PlatformError::TransientNetwork("connection reset".into());
    platform.fail_always(Op::Forward, 3, transient.clone());
    platform.fail_always(Op::UploadAndSend, 3, transient);
    let mut config = ConduitConfig::default();
    config.retry.max_retries = 2;
    let (h, controller) = setup(platform, config).await;

    let session = controller.start(request(1, Some(10))).await.expect("start");
    assert_eq!(controller.wait().await.expect("run"), Some(SessionStatus::Completed));

    let failed = controller.failed(10).await.expect("failed");
    assert_eq!(failed.len(), 1);
    let entry = &failed[0];
    assert_eq!(entry.session_id, session.id);
    assert_eq!(entry.source_id, 3);
    assert_eq!(entry.error_kind, ErrorKind::TransientNetwork);
    // One fetch plus three attempts for each of the two strategies.
    assert_eq!(entry.attempt_count, 7);
    assert_eq!(entry.strategy_used, "reupload");

    let stats = controller.stats().await.expect("stats");
    assert_eq!(stats.session.failed, 1);
    assert_eq!(stats.session.forwarded, 9);
    assert_eq!(h.platform.sent_ids(), vec![1, 2, 4, 5, 6, 7, 8, 9, 10]);
}

#[tokio::test(start_paused = true)]
async fn retry_failed_moves_counter_and_clears_entry() {
    let platform = MockPlatform::with_text_range(1, 4);
    platform.fail_always(Op::Forward, 2, PlatformError::Forbidden("protected".into()));
    platform.fail_always(Op::UploadAndSend, 2, PlatformError::Unknown("boom".into()));
    let (h, controller) = setup(platform, ConduitConfig::default()).await;

    controller.start(request(1, Some(4))).await.expect("start");
    controller.wait().await.expect("run");
    assert_eq!(controller.failed(10).await.expect("failed").len(), 1);

    h.platform.clear_failures(Op::UploadAndSend, 2);
    let status = controller.retry_failed(2).await.expect("retry");
    assert_eq!(status, RecordStatus::Forwarded);

    assert!(controller.failed(10).await.expect("failed").is_empty());
    let stats = controller.stats().await.expect("stats");
    assert_eq!(stats.session.failed, 0);
    assert_eq!(stats.session.forwarded, 4);
    assert_eq!(stats.lifetime.counters.failed, 0);
    assert_eq!(stats.lifetime.counters.forwarded, 4);

    let err = controller.retry_failed(3).await.unwrap_err();
    assert!(matches!(err, ConduitError::Validation(_)));
}

#[tokio::test(start_paused = true)]
async fn crash_replay_restores_counters_without_resending() {
    let (h, controller) = setup(MockPlatform::with_text_range(1, 10), ConduitConfig::default()).await;

    // A previous process forwarded 1..=5 and died before checkpointing.
    let session = h.store.create_session(&request(1, Some(10))).await.expect("create");
    h.store.acquire_lease(&session.id).await.expect("lease");
    for id in 1..=5 {
        let record = MessageRecord {
            target_id: Some(500 + id),
            ..MessageRecord::new(&session.id, id, RecordStatus::Forwarded)
        };
        h.store.record_outcome(&record, None).await.expect("ledger");
    }

    let busy = controller.resume(Some(&session.id)).await.unwrap_err();
    assert!(matches!(busy, ConduitError::SessionBusy { .. }));

    let recovered = controller.recover_stale().await.expect("recover");
    assert_eq!(recovered, vec![session.id.clone()]);

    controller.resume(None).await.expect("resume");
    assert_eq!(controller.wait().await.expect("run"), Some(SessionStatus::Completed));

    assert_eq!(h.platform.sent_ids(), vec![6, 7, 8, 9, 10]);
    for id in 1..=5 {
        assert_eq!(h.platform.calls(Op::Fetch, id), 0, "id {id} was refetched");
    }
    let stats = controller.stats().await.expect("stats");
    assert_eq!(stats.session.forwarded, 10);
    assert_eq!(stats.session.fetched, 10);
}

#[tokio::test(start_paused = true)]
async fn overlapping_session_marks_duplicates() {
    let (h, controller) = setup(MockPlatform::with_text_range(1, 8), ConduitConfig::default()).await;

    controller.start(request(1, Some(5))).await.expect("first");
    controller.wait().await.expect("first run");

    let second = controller.start(request(3, Some(8))).await.expect("second");
    assert_eq!(controller.wait().await.expect("second run"), Some(SessionStatus::Completed));

    assert_eq!(h.platform.sent_ids(), (1..=8).collect::<Vec<_>>());
    let record = h
        .store
        .get_record(&second.id, 4)
        .await
        .expect("query")
        .expect("record");
    assert_eq!(record.status, RecordStatus::Duplicate);

    let stats = controller.stats().await.expect("stats");
    assert_eq!(stats.session.duplicate, 3);
    assert_eq!(stats.session.forwarded, 3);
    assert_eq!(stats.lifetime.counters.forwarded, 8);
    assert_eq!(stats.lifetime.sessions_started, 2);
}

#[tokio::test(start_paused = true)]
async fn lost_authorization_fails_session() {
    let platform = MockPlatform::with_text_range(1, 5);
    platform.fail_always(Op::Forward, 3, PlatformError::Unauthorized("session revoked".into()));
    let (h, controller) = setup(platform, ConduitConfig::default()).await;

    let session = controller.start(request(1, Some(5))).await.expect("start");
    let err = controller.wait().await.unwrap_err();
    assert!(matches!(err, ConduitError::Unauthorized(_)));

    let stored = h
        .store
        .get_session(&session.id)
        .await
        .expect("query")
        .expect("session");
    assert_eq!(stored.status, SessionStatus::Failed);
    assert_eq!(stored.current_id, 3);
    assert!(stored.last_error.as_deref().is_some_and(|e| e.contains("revoked")));

    // Failed sessions resume once the cause is fixed.
    h.platform.clear_failures(Op::Forward, 3);
    controller.resume(Some(&session.id)).await.expect("resume");
    assert_eq!(controller.wait().await.expect("run"), Some(SessionStatus::Completed));
    assert_eq!(h.platform.sent_ids(), vec![1, 2, 3, 4, 5]);
}

#[tokio::test(start_paused = true)]
async fn cancel_is_final() {
    let platform = MockPlatform::with_text_range(1, 10);
    platform.set_latency(Op::Forward, 2, Duration::from_secs(5));
    let (h, controller) = setup(platform, ConduitConfig::default()).await;

    let session = controller.start(request(1, Some(10))).await.expect("start");
    wait_for_call(&h.platform, Op::Forward, 2).await;
    controller.cancel(None).await.expect("cancel");
    assert_eq!(controller.wait().await.expect("run"), Some(SessionStatus::Cancelled));

    let stored = h
        .store
        .get_session(&session.id)
        .await
        .expect("query")
        .expect("session");
    assert_eq!(stored.current_id, 3);

    let err = controller.resume(None).await.unwrap_err();
    assert!(matches!(err, ConduitError::InvalidTransition { .. }));
}

#[tokio::test(start_paused = true)]
async fn open_range_stops_at_platform_horizon() {
    let (h, controller) = setup(MockPlatform::with_text_range(1, 6), ConduitConfig::default()).await;

    controller.start(request(2, None)).await.expect("start");
    assert_eq!(controller.wait().await.expect("run"), Some(SessionStatus::Completed));

    assert_eq!(h.platform.sent_ids(), vec![2, 3, 4, 5, 6]);
    assert_eq!(h.platform.total_calls(Op::LatestMessageId), 2);
    let snapshot = controller.status().await.expect("status").expect("session");
    assert_eq!(snapshot.percentage, None);
}

#[tokio::test(start_paused = true)]
async fn filtered_kinds_are_not_sent() {
    let platform = MockPlatform::with_text_range(1, 3);
    let mut service = MockPlatform::text_message(2);
    service.kind = conduit_core::ContentKind::Service;
    platform.add_message(service);
    let (h, controller) = setup(platform, ConduitConfig::default()).await;

    controller.start(request(1, Some(3))).await.expect("start");
    controller.wait().await.expect("run");

    assert_eq!(h.platform.sent_ids(), vec![1, 3]);
    let stats = controller.stats().await.expect("stats");
    assert_eq!(stats.session.filtered, 1);
    assert_eq!(stats.session.fetched, 3);
}

#[tokio::test(start_paused = true)]
async fn settings_are_validated_and_persisted() {
    let (h, controller) = setup(MockPlatform::new(), ConduitConfig::default()).await;

    let err = controller.set_setting("delay", "120").await.unwrap_err();
    assert!(matches!(err, ConduitError::Validation(_)));
    assert!(h.store.get_setting("delay").await.expect("query").is_none());

    controller.set_setting("delay", "0.5").await.expect("delay");
    assert_eq!(controller.settings().delay_seconds, Some(0.5));

    controller.set_setting("speed", "safe").await.expect("speed");
    let settings = controller.settings();
    assert_eq!(settings.delay_seconds, None);
    assert_eq!(settings.base_delay(), Duration::from_millis(2500));
    assert!(h.store.get_setting("delay").await.expect("query").is_none());

    let reloaded = Controller::new(
        h.platform.clone(),
        h.reopen_store().await.expect("reopen"),
        h.notifier.clone(),
        h.config.clone(),
    )
    .await
    .expect("controller");
    assert_eq!(*reloaded.settings(), *settings);
}

#[tokio::test(start_paused = true)]
async fn reset_requires_confirmation_and_keeps_lifetime() {
    let (h, controller) = setup(MockPlatform::with_text_range(1, 3), ConduitConfig::default()).await;
    controller.start(request(1, Some(3))).await.expect("start");
    controller.wait().await.expect("run");

    let err = controller.reset(false).await.unwrap_err();
    assert!(matches!(err, ConduitError::Validation(_)));
    assert!(h.store.latest_session().await.expect("query").is_some());

    controller.reset(true).await.expect("reset");
    assert!(h.store.latest_session().await.expect("query").is_none());
    assert!(controller.status().await.expect("status").is_none());

    let stats = controller.stats().await.expect("stats");
    assert_eq!(stats.session.forwarded, 0);
    assert_eq!(stats.lifetime.counters.forwarded, 3);
}

#[tokio::test(start_paused = true)]
async fn sessions_on_separate_store_handles_both_count_in_lifetime() {
    let (h, controller) = setup(MockPlatform::with_text_range(1, 10), ConduitConfig::default()).await;
    let mirror = Controller::new(
        h.platform.clone(),
        h.reopen_store().await.expect("second handle"),
        h.notifier.clone(),
        h.config.clone(),
    )
    .await
    .expect("mirror controller");

    controller.start(request(1, Some(10))).await.expect("start");
    mirror
        .start(SessionRequest {
            target_chat: "@mirror".into(),
            ..request(1, Some(10))
        })
        .await
        .expect("start mirror");

    let (a, b) = tokio::join!(controller.wait(), mirror.wait());
    assert_eq!(a.expect("run"), Some(SessionStatus::Completed));
    assert_eq!(b.expect("mirror run"), Some(SessionStatus::Completed));

    let lifetime = h.store.load_lifetime().await.expect("lifetime");
    assert_eq!(lifetime.counters.forwarded, 20);
    assert_eq!(lifetime.counters.fetched, 20);
    assert_eq!(lifetime.sessions_started, 2);
}

#[tokio::test(start_paused = true)]
async fn progress_is_persisted_every_n_ids() {
    let platform = MockPlatform::with_text_range(1, 25);
    platform.set_latency(Op::Forward, 15, Duration::from_secs(60));
    let mut config = ConduitConfig::default();
    config.engine.checkpoint_every = 10;
    config.engine.checkpoint_interval_secs = 3600;
    let (h, controller) = setup(platform, config).await;

    let session = controller.start(request(1, Some(25))).await.expect("start");
    wait_for_call(&h.platform, Op::Forward, 15).await;

    let stored = h
        .store
        .get_session(&session.id)
        .await
        .expect("query")
        .expect("session");
    assert_eq!(stored.current_id, 11);
    assert_eq!(h.store.load_counters(&session.id).await.expect("counters").forwarded, 10);

    assert_eq!(controller.wait().await.expect("run"), Some(SessionStatus::Completed));
    let stored = h
        .store
        .get_session(&session.id)
        .await
        .expect("query")
        .expect("session");
    assert_eq!(stored.current_id, 26);
    assert_eq!(h.store.load_counters(&session.id).await.expect("counters").forwarded, 25);
}

async fn elapsed_with_rate_limits(flood_protect: bool) -> Duration {
    let platform = MockPlatform::with_text_range(1, 10);
    for id in 2..=4 {
        platform.fail_once(
            Op::Forward,
            id,
            PlatformError::RateLimited {
                retry_after: Duration::from_secs(1),
            },
        );
    }
    let mut config = ConduitConfig::default();
    config.rate.flood_protect = flood_protect;
    let (_h, controller) = setup(platform, config).await;

    let started = tokio::time::Instant::now();
    controller.start(request(1, Some(10))).await.expect("start");
    assert_eq!(controller.wait().await.expect("run"), Some(SessionStatus::Completed));
    started.elapsed()
}

#[tokio::test(start_paused = true)]
async fn repeated_rate_limits_slow_the_pace() {
    let steady = elapsed_with_rate_limits(false).await;
    let protected = elapsed_with_rate_limits(true).await;
    assert!(
        protected >= steady + Duration::from_secs(20),
        "flood protection should stretch the run: {protected:?} vs {steady:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn range_ending_at_largest_id_is_refused() {
    let (h, controller) = setup(MockPlatform::with_text_range(1, 3), ConduitConfig::default()).await;

    let err = controller.start(request(1, Some(i64::MAX))).await.unwrap_err();
    assert!(matches!(err, ConduitError::Validation(_)));
    assert!(h.store.latest_session().await.expect("query").is_none());

    controller.start(request(1, Some(i64::MAX - 1))).await.expect("start");
    wait_for_call(&h.platform, Op::Fetch, 2).await;
    let snapshot = controller.status().await.expect("status").expect("session");
    assert!(snapshot.percentage.is_some_and(|p| p < 1.0));

    controller.pause().await.expect("pause");
    assert_eq!(controller.wait().await.expect("run"), Some(SessionStatus::Paused));
}
