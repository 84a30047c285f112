//! The refresh period and how it reacts to fresh data.

use std::time::Duration;

use tracing::debug;

use super::config::ScheduleConfig;

/// Owns the refresh period of one coordinator.
///
/// The period starts at the configured base cadence and is rewritten after
/// every successful fetch from the soonest arrival and the local hour.
/// Failed fetches never reach the scheduler, so the period stays frozen.
#[derive(Debug, Clone)]
pub struct AdaptiveScheduler {
    base: Duration,
    current: Duration,
    config: ScheduleConfig,
}

impl AdaptiveScheduler {
    /// Create a scheduler seeded with the configured base period.
    pub fn new(base: Duration, config: ScheduleConfig) -> Self {
        Self {
            base,
            current: base,
            config,
        }
    }

    /// The period the next sleep will use.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// The configured default cadence.
    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    /// Whether `hour` (0-23, local) falls in the night window.
    ///
    /// The window wraps midnight: with the defaults it is 22:00-05:59.
    pub fn is_night(&self, hour: u32) -> bool {
        hour >= self.config.night_start_hour || hour < self.config.night_end_hour
    }

    /// The period the current state of the world asks for.
    ///
    /// `soonest` is the minimum minutes-until across every group, `None`
    /// when the snapshot has no records.
    pub fn candidate(&self, soonest: Option<u32>, hour: u32) -> Duration {
        match soonest {
            None => self.config.idle_period(),
            Some(mins) if mins < self.config.approaching_mins => self.config.min_period(),
            Some(mins) if mins > self.config.far_away_mins => {
                if self.is_night(hour) {
                    self.config.night_far_period()
                } else {
                    self.config.day_far_period()
                }
            }
            Some(_) => self.base,
        }
    }

    /// Recompute after a successful fetch.
    ///
    /// Returns the new period when it changed. Candidates within the
    /// hysteresis band of the current period are ignored.
    pub fn recompute(&mut self, soonest: Option<u32>, hour: u32) -> Option<Duration> {
        let candidate = self.candidate(soonest, hour);

        if candidate.abs_diff(self.current) <= self.config.hysteresis() {
            return None;
        }

        debug!(
            old_secs = self.current.as_secs(),
            new_secs = candidate.as_secs(),
            soonest = ?soonest,
            hour,
            "Adjusting refresh period"
        );
        self.current = candidate;
        Some(candidate)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Moving the soonest arrival from far away to approaching never slows polling
        #[test]
        fn approaching_never_slower_than_far(
            base in 15u64..=600,
            far in 61u32..2000,
            near in 0u32..10,
            hour in 0u32..24,
        ) {
            let s = AdaptiveScheduler::new(Duration::from_secs(base), ScheduleConfig::default());
            prop_assert!(s.candidate(Some(near), hour) <= s.candidate(Some(far), hour));
        }

        /// The approaching candidate is the fastest of all tiers
        #[test]
        fn approaching_is_fastest(
            base in 15u64..=600,
            near in 0u32..10,
            other in prop::option::of(0u32..2000),
            hour in 0u32..24,
        ) {
            let s = AdaptiveScheduler::new(Duration::from_secs(base), ScheduleConfig::default());
            prop_assert!(s.candidate(Some(near), hour) <= s.candidate(other, hour));
        }

        /// Candidates within the hysteresis band leave the period unchanged
        #[test]
        fn hysteresis_holds(
            base in 15u64..=600,
            soonest in prop::option::of(0u32..2000),
            hour in 0u32..24,
        ) {
            let mut s = AdaptiveScheduler::new(Duration::from_secs(base), ScheduleConfig::default());
            let before = s.current();
            let candidate = s.candidate(soonest, hour);
            let changed = s.recompute(soonest, hour);

            if candidate.abs_diff(before) <= Duration::from_secs(5) {
                prop_assert_eq!(changed, None);
                prop_assert_eq!(s.current(), before);
            } else {
                prop_assert_eq!(changed, Some(candidate));
                prop_assert_eq!(s.current(), candidate);
            }
        }
    }
}
