// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inter-message delay with adaptive flood backoff.

use std::collections::VecDeque;
use std::time::Duration;

use conduit_config::model::RateConfig;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::settings::Settings;

/// Ceiling for the backoff multiplier; the delay cap applies on top.
const MAX_MULTIPLIER: f64 = 1024.0;

/// Computes the delay the engine sleeps between two messages.
///
/// Every platform call outcome is recorded. When the share of rate-limited
/// outcomes inside the window exceeds the threshold, each further flood
/// multiplies the delay by the backoff factor. Once the share drops back
/// under the threshold the multiplier resets.
#[derive(Debug)]
pub struct RateController {
    window: Duration,
    threshold: f64,
    factor: f64,
    max_delay: Duration,
    /// `(when, rate_limited)` for every recorded attempt inside the window.
    events: VecDeque<(Instant, bool)>,
    multiplier: f64,
}

impl RateController {
    pub fn new(config: &RateConfig) -> Self {
        Self {
            window: Duration::from_secs(config.flood_window_secs),
            threshold: config.flood_threshold,
            factor: config.flood_backoff_factor,
            max_delay: Duration::from_secs_f64(config.max_delay_secs),
            events: VecDeque::new(),
            multiplier: 1.0,
        }
    }

    /// Record the outcome of one platform call.
    pub fn record_attempt(&mut self, rate_limited: bool) {
        let now = Instant::now();
        self.events.push_back((now, rate_limited));
        self.prune(now);

        let ratio = self.flood_ratio();
        if ratio > self.threshold {
            if rate_limited {
                self.multiplier = (self.multiplier * self.factor).min(MAX_MULTIPLIER);
                info!(
                    ratio,
                    multiplier = self.multiplier,
                    "flood rate above threshold, backing off"
                );
            }
        } else if self.multiplier > 1.0 {
            debug!(ratio, "flood rate subsided, delay restored");
            self.multiplier = 1.0;
        }
    }

    /// Share of rate-limited outcomes in the window, 0.0 when empty.
    pub fn flood_ratio(&self) -> f64 {
        if self.events.is_empty() {
            return 0.0;
        }
        let floods = self.events.iter().filter(|(_, limited)| *limited).count();
        floods as f64 / self.events.len() as f64
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Delay to apply before the next message.
    pub fn current_delay(&self, settings: &Settings) -> Duration {
        let base = settings.base_delay();
        if !settings.flood_protect || self.multiplier <= 1.0 {
            return base;
        }
        base.mul_f64(self.multiplier).min(self.max_delay.max(base))
    }

    fn prune(&mut self, now: Instant) {
        while let Some((at, _)) = self.events.front() {
            if now.duration_since(*at) > self.window {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use conduit_config::ConduitConfig;
    use conduit_core::SpeedMode;
    use proptest::prelude::*;

    use super::*;

    fn settings(mode: SpeedMode, flood_protect: bool) -> Settings {
        let mut s = Settings::from_config(&ConduitConfig::default());
        s.speed_mode = mode;
        s.flood_protect = flood_protect;
        s
    }

    #[tokio::test(start_paused = true)]
    async fn speed_modes_map_to_base_delays() {
        let rate = RateController::new(&RateConfig::default());
        assert_eq!(
            rate.current_delay(&settings(SpeedMode::Fast, true)),
            Duration::from_millis(500)
        );
        assert_eq!(
            rate.current_delay(&settings(SpeedMode::Safe, true)),
            Duration::from_millis(2500)
        );

        let mut s = settings(SpeedMode::Safe, true);
        s.delay_seconds = Some(0.2);
        assert_eq!(rate.current_delay(&s), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn floods_above_threshold_multiply_delay() {
        let mut rate = RateController::new(&RateConfig::default());
        let s = settings(SpeedMode::Normal, true);

        for _ in 0..4 {
            rate.record_attempt(false);
        }
        rate.record_attempt(true);
        assert_eq!(rate.current_delay(&s), Duration::from_secs(2));
        rate.record_attempt(true);
        assert_eq!(rate.current_delay(&s), Duration::from_secs(4));

        // Disabling flood protection ignores the multiplier.
        let off = settings(SpeedMode::Normal, false);
        assert_eq!(rate.current_delay(&off), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_resets_after_window() {
        let mut rate = RateController::new(&RateConfig::default());
        let s = settings(SpeedMode::Normal, true);
        rate.record_attempt(true);
        assert!(rate.current_delay(&s) > Duration::from_secs(1));

        tokio::time::advance(Duration::from_secs(61)).await;
        rate.record_attempt(false);
        assert_eq!(rate.flood_ratio(), 0.0);
        assert_eq!(rate.current_delay(&s), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn delay_is_capped() {
        let config = RateConfig {
            max_delay_secs: 10.0,
            ..RateConfig::default()
        };
        let mut rate = RateController::new(&config);
        for _ in 0..20 {
            rate.record_attempt(true);
        }
        let s = settings(SpeedMode::Safe, true);
        assert_eq!(rate.current_delay(&s), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn delay_never_decreases_while_flooding() {
        let mut rate = RateController::new(&RateConfig::default());
        let s = settings(SpeedMode::Fast, true);
        let mut last = rate.current_delay(&s);
        for _ in 0..30 {
            rate.record_attempt(true);
            let now = rate.current_delay(&s);
            assert!(now >= last);
            last = now;
        }
    }

    proptest! {
        #[test]
        fn delay_stays_within_bounds(outcomes in proptest::collection::vec(any::<bool>(), 1..200)) {
            let config = RateConfig::default();
            let mut rate = RateController::new(&config);
            let s = settings(SpeedMode::Normal, true);
            let cap = Duration::from_secs_f64(config.max_delay_secs);
            let mut last = rate.current_delay(&s);
            for limited in outcomes {
                rate.record_attempt(limited);
                let now = rate.current_delay(&s);
                prop_assert!(now >= s.base_delay());
                prop_assert!(now <= cap.max(s.base_delay()));
                if limited && rate.flood_ratio() > config.flood_threshold {
                    prop_assert!(now >= last);
                }
                last = now;
            }
        }
    }
}
