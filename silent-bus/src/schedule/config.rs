//! Thresholds for adaptive polling.

use std::time::Duration;

/// Configuration parameters for the adaptive scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// Fastest allowed cadence (seconds). Used while a vehicle is approaching.
    pub min_period_secs: u64,

    /// Slowest allowed cadence (seconds).
    pub max_period_secs: u64,

    /// Arrivals sooner than this (minutes) count as approaching.
    pub approaching_mins: u32,

    /// Arrivals later than this (minutes) count as far away.
    pub far_away_mins: u32,

    /// Hour (local, 0-23) at which night begins.
    pub night_start_hour: u32,

    /// Hour (local, 0-23) at which night ends.
    pub night_end_hour: u32,

    /// Cadence when nothing is scheduled (seconds).
    pub idle_period_secs: u64,

    /// Cadence for far-away arrivals during the day (seconds).
    pub day_far_period_secs: u64,

    /// Cadence for far-away arrivals at night (seconds).
    pub night_far_period_secs: u64,

    /// Candidates closer than this to the current period are ignored (seconds).
    pub hysteresis_secs: u64,
}

impl ScheduleConfig {
    /// Returns the minimum period as a Duration.
    pub fn min_period(&self) -> Duration {
        Duration::from_secs(self.min_period_secs)
    }

    /// Returns the maximum period as a Duration.
    pub fn max_period(&self) -> Duration {
        Duration::from_secs(self.max_period_secs)
    }

    /// Returns the idle period as a Duration.
    pub fn idle_period(&self) -> Duration {
        Duration::from_secs(self.idle_period_secs)
    }

    /// Returns the daytime far-away period as a Duration.
    pub fn day_far_period(&self) -> Duration {
        Duration::from_secs(self.day_far_period_secs)
    }

    /// Returns the night far-away period as a Duration.
    pub fn night_far_period(&self) -> Duration {
        Duration::from_secs(self.night_far_period_secs)
    }

    /// Returns the hysteresis band as a Duration.
    pub fn hysteresis(&self) -> Duration {
        Duration::from_secs(self.hysteresis_secs)
    }

    /// Whether `secs` is an acceptable configured base period.
    pub fn period_in_bounds(&self, secs: u64) -> bool {
        (self.min_period_secs..=self.max_period_secs).contains(&secs)
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            min_period_secs: 15,
            max_period_secs: 600, // 10 minutes
            approaching_mins: 10,
            far_away_mins: 60,
            night_start_hour: 22,
            night_end_hour: 6,
            idle_period_secs: 300,
            day_far_period_secs: 120,
            night_far_period_secs: 300,
            hysteresis_secs: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ScheduleConfig::default();

        assert_eq!(config.min_period_secs, 15);
        assert_eq!(config.max_period_secs, 600);
        assert_eq!(config.approaching_mins, 10);
        assert_eq!(config.far_away_mins, 60);
        assert_eq!(config.night_start_hour, 22);
        assert_eq!(config.night_end_hour, 6);
        assert_eq!(config.hysteresis_secs, 5);
    }

    #[test]
    fn duration_methods() {
        let config = ScheduleConfig::default();

        assert_eq!(config.min_period(), Duration::from_secs(15));
        assert_eq!(config.max_period(), Duration::from_secs(600));
        assert_eq!(config.idle_period(), Duration::from_secs(300));
        assert_eq!(config.day_far_period(), Duration::from_secs(120));
        assert_eq!(config.night_far_period(), Duration::from_secs(300));
        assert_eq!(config.hysteresis(), Duration::from_secs(5));
    }

    #[test]
    fn period_bounds() {
        let config = ScheduleConfig::default();

        assert!(config.period_in_bounds(15));
        assert!(config.period_in_bounds(600));
        assert!(!config.period_in_bounds(14));
        assert!(!config.period_in_bounds(601));
    }
}
