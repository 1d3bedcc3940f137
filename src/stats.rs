//! Aggregate S/I/R counts and the sampled time series.
use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

use crate::agent::InfectionStatus;
use crate::error::OutbreakError;

/// Absorbs the rounding error accumulated by adding a fractional `dt` many times.
pub(crate) const TIME_TOLERANCE: f64 = 1e-9;

/// Live counts of agents by status.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub susceptible: usize,
    /// Includes the asymptomatic agents.
    pub infected: usize,
    pub asymptomatic: usize,
    pub recovered: usize,
}

impl StatusCounts {
    pub fn count(&mut self, status: InfectionStatus) {
        match status {
            InfectionStatus::Susceptible => self.susceptible += 1,
            InfectionStatus::Infected => self.infected += 1,
            InfectionStatus::AsymptomaticInfected => {
                self.infected += 1;
                self.asymptomatic += 1;
            }
            InfectionStatus::Recovered => self.recovered += 1,
        }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.susceptible + self.infected + self.recovered
    }
}

impl AddAssign for StatusCounts {
    fn add_assign(&mut self, rhs: StatusCounts) {
        self.susceptible += rhs.susceptible;
        self.infected += rhs.infected;
        self.asymptomatic += rhs.asymptomatic;
        self.recovered += rhs.recovered;
    }
}

impl FromIterator<InfectionStatus> for StatusCounts {
    fn from_iter<T: IntoIterator<Item = InfectionStatus>>(iter: T) -> Self {
        let mut counts = StatusCounts::default();
        for status in iter {
            counts.count(status);
        }
        counts
    }
}

/// Population counts at one sampled time. Asymptomatic agents count as infected.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatSnapshot {
    pub time: f64,
    pub susceptible_count: usize,
    pub infected_count: usize,
    pub recovered_count: usize,
}

impl StatSnapshot {
    #[must_use]
    pub fn new(time: f64, counts: StatusCounts) -> Self {
        StatSnapshot {
            time,
            susceptible_count: counts.susceptible,
            infected_count: counts.infected,
            recovered_count: counts.recovered,
        }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.susceptible_count + self.infected_count + self.recovered_count
    }

    /// The counts as fractions of the total population.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn averaged(&self) -> AveragedStats {
        let total = self.total();
        if total == 0 {
            return AveragedStats::default();
        }
        let total = total as f64;
        AveragedStats {
            time: self.time,
            susceptible: self.susceptible_count as f64 / total,
            infected: self.infected_count as f64 / total,
            recovered: self.recovered_count as f64 / total,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AveragedStats {
    pub time: f64,
    pub susceptible: f64,
    pub infected: f64,
    pub recovered: f64,
}

/// Appends a [`StatSnapshot`] to the time series whenever at least `interval` has passed since
/// the previous one. The first offered sample is always taken.
#[derive(Clone, Debug)]
pub struct StatsRecorder {
    interval: f64,
    last_sample_time: Option<f64>,
    time_series: Vec<StatSnapshot>,
}

impl StatsRecorder {
    #[must_use]
    pub fn new(interval: f64) -> Self {
        StatsRecorder {
            interval,
            last_sample_time: None,
            time_series: Vec::new(),
        }
    }

    #[must_use]
    pub fn interval(&self) -> f64 {
        self.interval
    }

    #[must_use]
    pub fn is_due(&self, time: f64) -> bool {
        self.last_sample_time
            .is_none_or(|last| time + TIME_TOLERANCE >= last + self.interval)
    }

    /// Records `counts` at `time` if a sample is due, returning the new snapshot.
    pub fn sample(&mut self, time: f64, counts: StatusCounts) -> Option<StatSnapshot> {
        if !self.is_due(time) {
            return None;
        }
        let snapshot = StatSnapshot::new(time, counts);
        self.last_sample_time = Some(time);
        self.time_series.push(snapshot);
        Some(snapshot)
    }

    pub fn latest(&self) -> Result<&StatSnapshot, OutbreakError> {
        self.time_series.last().ok_or(OutbreakError::NoStatistics)
    }

    pub fn averaged(&self) -> Result<AveragedStats, OutbreakError> {
        self.latest().map(StatSnapshot::averaged)
    }

    #[must_use]
    pub fn time_series(&self) -> &[StatSnapshot] {
        &self.time_series
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn counts(susceptible: usize, infected: usize, recovered: usize) -> StatusCounts {
        StatusCounts {
            susceptible,
            infected,
            asymptomatic: 0,
            recovered,
        }
    }

    #[test]
    fn counts_statuses() {
        let counts: StatusCounts = [
            InfectionStatus::Susceptible,
            InfectionStatus::Infected,
            InfectionStatus::AsymptomaticInfected,
            InfectionStatus::Recovered,
            InfectionStatus::Susceptible,
        ]
        .into_iter()
        .collect();
        assert_eq!(counts.susceptible, 2);
        assert_eq!(counts.infected, 2);
        assert_eq!(counts.asymptomatic, 1);
        assert_eq!(counts.recovered, 1);
        assert_eq!(counts.total(), 5);
    }

    #[test]
    fn no_statistics_before_first_sample() {
        let recorder = StatsRecorder::new(1.0);
        assert!(matches!(recorder.latest(), Err(OutbreakError::NoStatistics)));
        assert!(matches!(
            recorder.averaged(),
            Err(OutbreakError::NoStatistics)
        ));
    }

    #[test]
    fn samples_on_cadence() {
        let mut recorder = StatsRecorder::new(1.0);
        assert!(recorder.sample(0.5, counts(9, 1, 0)).is_some());
        assert!(recorder.sample(1.0, counts(8, 2, 0)).is_none());
        assert!(recorder.sample(1.5, counts(7, 3, 0)).is_some());
        assert_eq!(recorder.time_series().len(), 2);
        assert_eq!(recorder.latest().unwrap().infected_count, 3);
    }

    #[test]
    fn accumulated_rounding_does_not_skip_samples() {
        let dt = 1.0 / 15.0;
        let mut recorder = StatsRecorder::new(dt);
        let mut time = 0.0;
        for _ in 0..150 {
            time += dt;
            recorder.sample(time, counts(1, 0, 0));
        }
        assert_eq!(recorder.time_series().len(), 150);
    }

    #[test]
    fn averaged_stats_are_fractions() {
        let mut recorder = StatsRecorder::new(1.0);
        recorder.sample(2.0, counts(2, 1, 1));
        let averaged = recorder.averaged().unwrap();
        assert_eq!(averaged.time, 2.0);
        assert_approx_eq!(averaged.susceptible, 0.5);
        assert_approx_eq!(averaged.infected, 0.25);
        assert_approx_eq!(averaged.recovered, 0.25);
    }
}
