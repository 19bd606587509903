// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exponential backoff and the per-call retry loop.
//!
//! Rate-limit waits are mandated by the platform and never consume the retry
//! budget. Transient errors back off exponentially until the budget runs out.
//! Everything else is returned to the caller immediately.

use std::future::Future;
use std::time::Duration;

use conduit_config::model::RetryConfig;
use conduit_core::PlatformError;
use tracing::{debug, warn};

use crate::rate::RateController;
use crate::recording;

/// Shortest wait honored for a rate limit, even when the platform reports zero.
pub const MIN_FLOOD_WAIT: Duration = Duration::from_millis(100);

/// Backoff schedule: `min(base * multiplier^attempt, max_delay)`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            multiplier: config.multiplier,
        }
    }

    /// Sleep before retry number `attempt` (0-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.min(64) as i32);
        let millis = self.base_delay.as_millis() as f64 * factor;
        if !millis.is_finite() || millis >= self.max_delay.as_millis() as f64 {
            self.max_delay
        } else {
            Duration::from_millis(millis as u64)
        }
    }

    /// Total backoff spent before giving up after `retries` transient errors.
    pub fn total_backoff(&self, retries: u32) -> Duration {
        (0..retries).map(|n| self.delay_for_attempt(n)).sum()
    }
}

/// Attempts spent on one source id, across fetch and every strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttemptTally {
    /// Platform calls made.
    pub attempts: u32,
    /// Transient retries consumed.
    pub retries: u32,
    /// Rate-limit waits honored.
    pub flood_waits: u32,
}

/// Run `op` until it succeeds, hits a non-retriable error, or exhausts `budget`.
///
/// `budget` is decremented for every transient retry so callers can share
/// it across several calls.
pub async fn with_retry<T, F, Fut>(
    label: &str,
    policy: &RetryPolicy,
    budget: &mut u32,
    tally: &mut AttemptTally,
    rate: &mut RateController,
    mut op: F,
) -> Result<T, PlatformError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PlatformError>>,
{
    let mut backoff_step = 0u32;
    loop {
        tally.attempts += 1;
        match op().await {
            Ok(value) => {
                rate.record_attempt(false);
                return Ok(value);
            }
            Err(PlatformError::RateLimited { retry_after }) => {
                rate.record_attempt(true);
                tally.flood_waits += 1;
                recording::record_flood_wait();
                let wait = retry_after.max(MIN_FLOOD_WAIT);
                warn!(
                    call = label,
                    wait_secs = wait.as_secs_f64(),
                    "rate limited, waiting"
                );
                tokio::time::sleep(wait).await;
            }
            Err(PlatformError::TransientNetwork(message)) if *budget > 0 => {
                rate.record_attempt(false);
                let delay = policy.delay_for_attempt(backoff_step);
                debug!(
                    call = label,
                    attempt = backoff_step + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %message,
                    "transient error, backing off"
                );
                *budget -= 1;
                tally.retries += 1;
                backoff_step += 1;
                tokio::time::sleep(delay).await;
            }
            Err(other) => {
                rate.record_attempt(false);
                return Err(other);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use conduit_config::model::RateConfig;
    use proptest::prelude::*;

    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::from_config(&RetryConfig::default())
    }

    #[test]
    fn exponential_schedule_with_cap() {
        let p = policy();
        assert_eq!(p.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(p.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(p.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(p.delay_for_attempt(6), Duration::from_secs(60));
        assert_eq!(p.delay_for_attempt(1000), Duration::from_secs(60));
        assert_eq!(p.total_backoff(3), Duration::from_secs(7));
    }

    proptest! {
        #[test]
        fn total_backoff_is_bounded(
            retries in 0u32..=10,
            base_ms in 1u64..5_000,
            cap_ms in 5_000u64..120_000,
            multiplier in 1.0f64..8.0,
        ) {
            let p = RetryPolicy {
                base_delay: Duration::from_millis(base_ms),
                max_delay: Duration::from_millis(cap_ms),
                multiplier,
            };
            let total = p.total_backoff(retries);
            prop_assert!(total <= Duration::from_millis(cap_ms) * retries);
            for n in 0..retries {
                prop_assert!(p.delay_for_attempt(n) <= p.max_delay);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_does_not_consume_budget() {
        let calls = AtomicU32::new(0);
        let mut budget = 0;
        let mut tally = AttemptTally::default();
        let mut rate = RateController::new(&RateConfig::default());
        let started = tokio::time::Instant::now();

        let result = with_retry("forward", &policy(), &mut budget, &mut tally, &mut rate, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(PlatformError::RateLimited {
                        retry_after: Duration::from_secs(30),
                    })
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert!(started.elapsed() >= Duration::from_secs(30));
        assert_eq!(tally.retries, 0);
        assert_eq!(tally.flood_waits, 1);
        assert_eq!(tally.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_rate_limit_wait_still_sleeps() {
        let calls = AtomicU32::new(0);
        let mut budget = 0;
        let mut tally = AttemptTally::default();
        let mut rate = RateController::new(&RateConfig::default());
        let started = tokio::time::Instant::now();

        let result = with_retry("forward", &policy(), &mut budget, &mut tally, &mut rate, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 3 {
                    Err(PlatformError::RateLimited {
                        retry_after: Duration::ZERO,
                    })
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert_eq!(result, Ok(()));
        assert_eq!(tally.flood_waits, 3);
        assert!(started.elapsed() >= MIN_FLOOD_WAIT * 3);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_exhaust_budget() {
        let mut budget = 2;
        let mut tally = AttemptTally::default();
        let mut rate = RateController::new(&RateConfig::default());
        let started = tokio::time::Instant::now();

        let result: Result<(), _> =
            with_retry("fetch", &policy(), &mut budget, &mut tally, &mut rate, || async {
                Err(PlatformError::TransientNetwork("reset".into()))
            })
            .await;

        assert!(matches!(result, Err(PlatformError::TransientNetwork(_))));
        assert_eq!(budget, 0);
        assert_eq!(tally.attempts, 3);
        assert_eq!(tally.retries, 2);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_return_immediately() {
        let mut budget = 5;
        let mut tally = AttemptTally::default();
        let mut rate = RateController::new(&RateConfig::default());

        let result: Result<(), _> =
            with_retry("forward", &policy(), &mut budget, &mut tally, &mut rate, || async {
                Err(PlatformError::Forbidden("restricted".into()))
            })
            .await;

        assert!(matches!(result, Err(PlatformError::Forbidden(_))));
        assert_eq!(budget, 5);
        assert_eq!(tally.attempts, 1);
    }
}
