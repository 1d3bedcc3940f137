use serde::{Deserialize, Serialize};

use crate::error::{invalid_parameter, OutbreakError};

/// The pathogen spreading through the population. Immutable once built.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Virus {
    infection_probability_per_unit_time: f64,
    infection_duration: f64,
}

impl Virus {
    /// `infection_probability_per_unit_time` must lie in `(0, 1]` and `infection_duration` must
    /// be positive and finite.
    pub fn new(
        infection_probability_per_unit_time: f64,
        infection_duration: f64,
    ) -> Result<Self, OutbreakError> {
        if !(infection_probability_per_unit_time > 0.0 && infection_probability_per_unit_time <= 1.0)
        {
            return Err(invalid_parameter(
                "infection_probability_per_unit_time",
                format!("must lie in (0, 1], got {infection_probability_per_unit_time}"),
            ));
        }
        if !(infection_duration > 0.0 && infection_duration.is_finite()) {
            return Err(invalid_parameter(
                "infection_duration",
                format!("must be positive and finite, got {infection_duration}"),
            ));
        }
        Ok(Virus {
            infection_probability_per_unit_time,
            infection_duration,
        })
    }

    /// The chance that one in-range infected/susceptible pair transmits during one tick.
    ///
    /// Note that this is applied once per tick regardless of the tick's length.
    #[must_use]
    pub fn infection_probability_per_unit_time(&self) -> f64 {
        self.infection_probability_per_unit_time
    }

    #[must_use]
    pub fn infection_duration(&self) -> f64 {
        self.infection_duration
    }
}
