//! The configuration bundle a [`Simulation`](crate::simulation::Simulation) is built from.
//!
//! Every field has a default (the single-arena scenario), so a JSON file only needs to name the
//! values it changes:
//!
//! ```json
//! { "population": 400, "infection_radius": 0.3, "seed": 7 }
//! ```
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::agent::{probability, AgentParams};
use crate::error::{invalid_parameter, OutbreakError};
use crate::geometry::TravelPath;
use crate::virus::Virus;

/// What causes an [`Intervention`] to fire.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InterventionTrigger {
    /// At a fixed simulated time.
    AtTime { time: f64 },
    /// The first time the live infected count exceeds `count`.
    InfectedAbove { count: usize },
}

/// A social distancing policy change applied once during a run.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intervention {
    pub trigger: InterventionTrigger,
    pub social_distance_factor: f64,
    /// The chance that any one agent adopts the new factor.
    pub probability: f64,
}

impl Intervention {
    pub fn validate(&self) -> Result<(), OutbreakError> {
        if let InterventionTrigger::AtTime { time } = self.trigger {
            if !(time >= 0.0 && time.is_finite()) {
                return Err(invalid_parameter(
                    "intervention.trigger.time",
                    format!("must be non-negative and finite, got {time}"),
                ));
            }
        }
        if !(self.social_distance_factor >= 0.0 && self.social_distance_factor.is_finite()) {
            return Err(invalid_parameter(
                "intervention.social_distance_factor",
                format!(
                    "must be non-negative and finite, got {}",
                    self.social_distance_factor
                ),
            ));
        }
        probability("intervention.probability", self.probability)
    }
}

/// The named setups the runner can start from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Scenario {
    /// One arena of 100 agents.
    Simple,
    /// The simple setup with every agent distancing from the start.
    SimpleSocialDistancing,
    /// One crowded arena of 1000 smaller, slower agents.
    LargeCity,
    /// The simple setup; full distancing is switched on at t = 8.
    DelayedSocialDistancing,
    /// The large city with 900 agents; distancing starts once more than 50 are infected.
    DelayedSocialDistancingLargeCity,
    /// Four arenas with agents travelling between them.
    MultiCity,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Parameters {
    pub arena_count: usize,
    pub arena_size: f64,
    /// Spacing between neighboring arenas in the layout grid.
    pub arena_gap: f64,
    /// Agents created in each arena.
    pub population: usize,

    pub radius: f64,
    pub infection_radius: f64,
    pub wall_buffer: f64,
    pub wander_step_size: f64,
    pub wander_step_duration: f64,
    pub gravity_strength: f64,
    pub max_speed: f64,
    pub p_symptomatic_on_infection: f64,

    pub social_distance_factor: f64,
    pub repel_from_max_count: usize,
    pub limit_social_distancing_to_infectious: bool,

    pub infection_duration: f64,
    /// Applied once per tick, whatever the tick length.
    pub infection_probability_per_unit_time: f64,

    /// Expected departures per agent per unit time.
    pub travel_rate: f64,
    pub travel_duration: f64,
    pub travel_path: TravelPath,

    pub time_step: f64,
    pub stats_interval: f64,
    pub initial_infections: usize,
    pub seed: u64,

    pub intervention: Option<Intervention>,
    /// Stops the runner at this time even if the outbreak is still going.
    pub max_time: Option<f64>,
}

impl Default for Parameters {
    fn default() -> Self {
        let agent = AgentParams::default();
        Parameters {
            arena_count: 1,
            arena_size: 7.0,
            arena_gap: 1.0,
            population: 100,

            radius: agent.radius,
            infection_radius: agent.infection_radius,
            wall_buffer: agent.wall_buffer,
            wander_step_size: agent.wander_step_size,
            wander_step_duration: agent.wander_step_duration,
            gravity_strength: agent.gravity_strength,
            max_speed: agent.max_speed,
            p_symptomatic_on_infection: agent.p_symptomatic_on_infection,

            social_distance_factor: agent.social_distance_factor,
            repel_from_max_count: agent.repel_from_max_count,
            limit_social_distancing_to_infectious: false,

            infection_duration: 5.0,
            infection_probability_per_unit_time: 0.2,

            travel_rate: 0.0,
            travel_duration: 1.0,
            travel_path: TravelPath::default(),

            time_step: 1.0 / 15.0,
            stats_interval: 1.0 / 15.0,
            initial_infections: 1,
            seed: 0,

            intervention: None,
            max_time: None,
        }
    }
}

fn finite_at_least(name: &'static str, value: f64, min: f64) -> Result<(), OutbreakError> {
    if value >= min && value.is_finite() {
        Ok(())
    } else {
        Err(invalid_parameter(
            name,
            format!("must be finite and at least {min}, got {value}"),
        ))
    }
}

impl Parameters {
    #[must_use]
    pub fn preset(scenario: Scenario) -> Self {
        let simple = Parameters::default();
        let large_city = Parameters {
            population: 1000,
            radius: 0.2 / 3.0,
            infection_radius: 0.25,
            max_speed: 0.25,
            ..simple.clone()
        };
        match scenario {
            Scenario::Simple => simple,
            Scenario::SimpleSocialDistancing => Parameters {
                social_distance_factor: 2.0,
                ..simple
            },
            Scenario::LargeCity => large_city,
            Scenario::DelayedSocialDistancing => Parameters {
                intervention: Some(Intervention {
                    trigger: InterventionTrigger::AtTime { time: 8.0 },
                    social_distance_factor: 2.0,
                    probability: 1.0,
                }),
                ..simple
            },
            Scenario::DelayedSocialDistancingLargeCity => Parameters {
                population: 900,
                intervention: Some(Intervention {
                    trigger: InterventionTrigger::InfectedAbove { count: 50 },
                    social_distance_factor: 2.0,
                    probability: 1.0,
                }),
                ..large_city
            },
            Scenario::MultiCity => Parameters {
                arena_count: 4,
                arena_size: 5.0,
                population: 50,
                travel_rate: 0.02,
                ..simple
            },
        }
    }

    /// Loads parameters from a JSON file. Missing fields take their default values.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, OutbreakError> {
        let file = File::open(path)?;
        let parameters: Parameters = serde_json::from_reader(BufReader::new(file))?;
        parameters.validate()?;
        Ok(parameters)
    }

    /// The tunables every agent starts with.
    #[must_use]
    pub fn agent_params(&self) -> AgentParams {
        AgentParams {
            radius: self.radius,
            infection_radius: self.infection_radius,
            wall_buffer: self.wall_buffer,
            wander_step_size: self.wander_step_size,
            wander_step_duration: self.wander_step_duration,
            gravity_strength: self.gravity_strength,
            max_speed: self.max_speed,
            social_distance_factor: self.social_distance_factor,
            repel_from_max_count: self.repel_from_max_count,
            p_symptomatic_on_infection: self.p_symptomatic_on_infection,
        }
    }

    pub fn virus(&self) -> Result<Virus, OutbreakError> {
        Virus::new(
            self.infection_probability_per_unit_time,
            self.infection_duration,
        )
    }

    #[must_use]
    pub fn total_population(&self) -> usize {
        self.arena_count.saturating_mul(self.population)
    }

    /// Fails on the first tunable that is missing, non-finite or out of range.
    pub fn validate(&self) -> Result<(), OutbreakError> {
        if self.arena_count == 0 {
            return Err(invalid_parameter("arena_count", "must be at least 1"));
        }
        if self.population == 0 {
            return Err(invalid_parameter("population", "must be at least 1"));
        }

        let agent = self.agent_params();
        agent.validate()?;
        let min_size = 2.0 * agent.max_wall_clearance();
        if !(self.arena_size > min_size && self.arena_size.is_finite()) {
            return Err(invalid_parameter(
                "arena_size",
                format!(
                    "must be finite and larger than twice the wall clearance ({min_size}), got {}",
                    self.arena_size
                ),
            ));
        }
        finite_at_least("arena_gap", self.arena_gap, 0.0)?;

        self.virus()?;

        finite_at_least("travel_rate", self.travel_rate, 0.0)?;
        finite_at_least("travel_duration", self.travel_duration, 0.0)?;
        self.travel_path.validate()?;

        if !(self.time_step > 0.0 && self.time_step.is_finite()) {
            return Err(invalid_parameter(
                "time_step",
                format!("must be positive and finite, got {}", self.time_step),
            ));
        }
        finite_at_least("stats_interval", self.stats_interval, 0.0)?;

        if self.initial_infections > self.total_population() {
            return Err(invalid_parameter(
                "initial_infections",
                format!(
                    "cannot exceed the total population of {}, got {}",
                    self.total_population(),
                    self.initial_infections
                ),
            ));
        }
        if let Some(intervention) = &self.intervention {
            intervention.validate()?;
        }
        if let Some(max_time) = self.max_time {
            if !(max_time > 0.0 && max_time.is_finite()) {
                return Err(invalid_parameter(
                    "max_time",
                    format!("must be positive and finite, got {max_time}"),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_are_valid() {
        assert!(Parameters::default().validate().is_ok());
    }

    #[test]
    fn every_preset_is_valid() {
        for scenario in Scenario::value_variants() {
            assert!(
                Parameters::preset(*scenario).validate().is_ok(),
                "{scenario} is invalid"
            );
        }
    }

    #[test]
    fn large_city_overrides() {
        let parameters = Parameters::preset(Scenario::DelayedSocialDistancingLargeCity);
        assert_eq!(parameters.population, 900);
        assert!((parameters.infection_radius - 0.25).abs() < f64::EPSILON);
        assert_eq!(
            parameters.intervention.map(|i| i.trigger),
            Some(InterventionTrigger::InfectedAbove { count: 50 })
        );
    }

    #[test]
    fn rejects_bad_values() {
        let cases = [
            (
                Parameters {
                    population: 0,
                    ..Parameters::default()
                },
                "population",
            ),
            (
                Parameters {
                    max_speed: -0.5,
                    ..Parameters::default()
                },
                "max_speed",
            ),
            (
                Parameters {
                    arena_size: 1.0,
                    ..Parameters::default()
                },
                "arena_size",
            ),
            (
                Parameters {
                    infection_probability_per_unit_time: 0.0,
                    ..Parameters::default()
                },
                "infection_probability_per_unit_time",
            ),
            (
                Parameters {
                    time_step: f64::NAN,
                    ..Parameters::default()
                },
                "time_step",
            ),
            (
                Parameters {
                    initial_infections: 101,
                    ..Parameters::default()
                },
                "initial_infections",
            ),
            (
                Parameters {
                    travel_rate: -1.0,
                    ..Parameters::default()
                },
                "travel_rate",
            ),
        ];
        for (parameters, expected) in cases {
            match parameters.validate() {
                Err(OutbreakError::InvalidParameter { name, .. }) => assert_eq!(name, expected),
                other => panic!("expected {expected} to be rejected, got {other:?}"),
            }
        }
    }

    #[test]
    fn rejects_bad_intervention() {
        let parameters = Parameters {
            intervention: Some(Intervention {
                trigger: InterventionTrigger::AtTime { time: 1.0 },
                social_distance_factor: 1.0,
                probability: 2.0,
            }),
            ..Parameters::default()
        };
        assert!(matches!(
            parameters.validate(),
            Err(OutbreakError::InvalidParameter {
                name: "intervention.probability",
                ..
            })
        ));
    }

    #[test]
    fn loads_partial_json() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "population": 40,
                "seed": 12,
                "travel_path": {{"kind": "straight"}},
                "intervention": {{
                    "trigger": {{"kind": "at_time", "time": 3.0}},
                    "social_distance_factor": 1.5,
                    "probability": 0.5
                }}
            }}"#
        )
        .unwrap();

        let parameters = Parameters::from_json_file(file.path()).unwrap();
        assert_eq!(parameters.population, 40);
        assert_eq!(parameters.seed, 12);
        assert_eq!(parameters.travel_path, TravelPath::Straight);
        assert_eq!(
            parameters.intervention.unwrap().trigger,
            InterventionTrigger::AtTime { time: 3.0 }
        );
        assert_eq!(parameters.arena_count, 1);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"populaton": 40}}"#).unwrap();
        assert!(matches!(
            Parameters::from_json_file(file.path()),
            Err(OutbreakError::JsonError(_))
        ));
    }

    #[test]
    fn invalid_json_values_are_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"wall_buffer": 0.0}}"#).unwrap();
        assert!(matches!(
            Parameters::from_json_file(file.path()),
            Err(OutbreakError::InvalidParameter {
                name: "wall_buffer",
                ..
            })
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(matches!(
            Parameters::from_json_file("/definitely/not/here.json"),
            Err(OutbreakError::IoError(_))
        ));
    }
}
