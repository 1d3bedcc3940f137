//! A single mobile, infectable individual.
//!
//! An [`Agent`] is plain data owned by an [`Arena`](crate::arena::Arena). It knows how to move
//! itself for one tick and how to change its infection status; everything that involves other
//! agents (transmission, choosing repulsion neighbors, migration) is driven by the
//! [`Simulation`](crate::simulation::Simulation).
use std::fmt::{Display, Formatter};

use log::trace;
use serde::{Deserialize, Serialize};
use strum::{Display as StrumDisplay, EnumIter, IntoStaticStr};

use crate::error::{invalid_parameter, OutbreakError};
use crate::geometry::{Bounds, TravelPath, Vec2};
use crate::stats::TIME_TOLERANCE;

/// Clearance kept from the arena walls by agents that are not infected.
pub const MIN_WALL_CLEARANCE: f64 = 0.1;

/// A stable identifier assigned when the agent is created. It does not change when the agent
/// migrates to another arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub usize);

impl Display for AgentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    StrumDisplay,
    EnumIter,
    IntoStaticStr,
)]
pub enum InfectionStatus {
    Susceptible,
    Infected,
    /// Transmits and moves exactly like `Infected`; only the presentation differs.
    AsymptomaticInfected,
    Recovered,
}

impl InfectionStatus {
    #[must_use]
    pub fn is_infected(self) -> bool {
        matches!(
            self,
            InfectionStatus::Infected | InfectionStatus::AsymptomaticInfected
        )
    }

    /// Position along S -> {I, A} -> R.
    fn stage(self) -> u8 {
        match self {
            InfectionStatus::Susceptible => 0,
            InfectionStatus::Infected | InfectionStatus::AsymptomaticInfected => 1,
            InfectionStatus::Recovered => 2,
        }
    }

    /// Whether `next` is exactly one stage after `self`.
    #[must_use]
    pub fn can_transition_to(self, next: InfectionStatus) -> bool {
        next.stage() == self.stage() + 1
    }
}

/// Per-agent movement and epidemiology tunables.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentParams {
    pub radius: f64,
    pub infection_radius: f64,
    /// Distance from a wall beyond which the soft wall force vanishes.
    pub wall_buffer: f64,
    pub wander_step_size: f64,
    pub wander_step_duration: f64,
    pub gravity_strength: f64,
    pub max_speed: f64,
    pub social_distance_factor: f64,
    pub repel_from_max_count: usize,
    pub p_symptomatic_on_infection: f64,
}

impl Default for AgentParams {
    fn default() -> Self {
        AgentParams {
            radius: 0.1,
            infection_radius: 0.6,
            wall_buffer: 1.0 / 3.0,
            wander_step_size: 1.0,
            wander_step_duration: 1.0,
            gravity_strength: 0.2,
            max_speed: 0.5,
            social_distance_factor: 0.0,
            repel_from_max_count: 10,
            p_symptomatic_on_infection: 1.0,
        }
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<(), OutbreakError> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(invalid_parameter(
            name,
            format!("must be non-negative and finite, got {value}"),
        ))
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), OutbreakError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(invalid_parameter(
            name,
            format!("must be positive and finite, got {value}"),
        ))
    }
}

pub(crate) fn probability(name: &'static str, value: f64) -> Result<(), OutbreakError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid_parameter(
            name,
            format!("must lie in [0, 1], got {value}"),
        ))
    }
}

impl AgentParams {
    pub fn validate(&self) -> Result<(), OutbreakError> {
        positive("radius", self.radius)?;
        positive("infection_radius", self.infection_radius)?;
        positive("wall_buffer", self.wall_buffer)?;
        non_negative("wander_step_size", self.wander_step_size)?;
        non_negative("wander_step_duration", self.wander_step_duration)?;
        non_negative("gravity_strength", self.gravity_strength)?;
        non_negative("max_speed", self.max_speed)?;
        non_negative("social_distance_factor", self.social_distance_factor)?;
        probability(
            "p_symptomatic_on_infection",
            self.p_symptomatic_on_infection,
        )
    }

    /// The largest wall clearance any agent with these parameters can need.
    #[must_use]
    pub fn max_wall_clearance(&self) -> f64 {
        self.infection_radius.max(MIN_WALL_CLEARANCE)
    }
}

/// A status transition that actually happened.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct StatusChange {
    pub agent: AgentId,
    pub time: f64,
    pub previous: InfectionStatus,
    pub current: InfectionStatus,
}

/// The trip of an agent between two arenas.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Flight {
    pub origin: Vec2,
    pub destination: Vec2,
    pub departure_time: f64,
    pub duration: f64,
    pub path: TravelPath,
}

impl Flight {
    #[must_use]
    pub fn arrival_time(&self) -> f64 {
        self.departure_time + self.duration
    }

    #[must_use]
    pub fn position_at(&self, time: f64) -> Vec2 {
        let alpha = if self.duration > 0.0 {
            (time - self.departure_time) / self.duration
        } else {
            1.0
        };
        self.path.point_at(self.origin, self.destination, alpha)
    }
}

#[derive(Clone, Debug)]
pub struct Agent {
    id: AgentId,
    position: Vec2,
    velocity: Vec2,
    status: InfectionStatus,
    params: AgentParams,
    arena_bounds: Bounds,
    infection_start_time: Option<f64>,
    repel_from_positions: Vec<Vec2>,
    moving_to: Option<Vec2>,
    last_step_change_time: Option<f64>,
    flight: Option<Flight>,
}

impl Agent {
    #[must_use]
    pub fn new(id: AgentId, position: Vec2, arena_bounds: Bounds, params: AgentParams) -> Self {
        Agent {
            id,
            position,
            velocity: Vec2::ZERO,
            status: InfectionStatus::Susceptible,
            params,
            arena_bounds,
            infection_start_time: None,
            repel_from_positions: Vec::new(),
            moving_to: None,
            last_step_change_time: None,
            flight: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> AgentId {
        self.id
    }

    #[must_use]
    pub fn position(&self) -> Vec2 {
        self.position
    }

    /// Moves the agent without touching its velocity. Used for seeding and tests.
    pub fn set_position(&mut self, position: Vec2) {
        self.position = position;
    }

    #[must_use]
    pub fn velocity(&self) -> Vec2 {
        self.velocity
    }

    #[must_use]
    pub fn status(&self) -> InfectionStatus {
        self.status
    }

    #[must_use]
    pub fn params(&self) -> &AgentParams {
        &self.params
    }

    #[must_use]
    pub fn social_distance_factor(&self) -> f64 {
        self.params.social_distance_factor
    }

    /// Changes the strength of this agent's distancing. Takes effect on the next tick.
    pub fn set_social_distance_factor(&mut self, social_distance_factor: f64) {
        self.params.social_distance_factor = social_distance_factor;
    }

    #[must_use]
    pub fn arena_bounds(&self) -> Bounds {
        self.arena_bounds
    }

    pub fn set_arena_bounds(&mut self, bounds: Bounds) {
        self.arena_bounds = bounds;
    }

    #[must_use]
    pub fn infection_start_time(&self) -> Option<f64> {
        self.infection_start_time
    }

    #[must_use]
    pub fn repel_from_positions(&self) -> &[Vec2] {
        &self.repel_from_positions
    }

    pub fn set_repel_from_positions(&mut self, positions: Vec<Vec2>) {
        self.repel_from_positions = positions;
    }

    #[must_use]
    pub fn moving_to(&self) -> Option<Vec2> {
        self.moving_to
    }

    #[must_use]
    pub fn is_migrating(&self) -> bool {
        self.flight.is_some()
    }

    #[must_use]
    pub fn flight(&self) -> Option<&Flight> {
        self.flight.as_ref()
    }

    /// Clearance from the walls: the infection radius while infected, otherwise a small constant.
    #[must_use]
    pub fn effective_clearance(&self) -> f64 {
        if self.status.is_infected() {
            self.params.infection_radius
        } else {
            MIN_WALL_CLEARANCE
        }
    }

    /// The region the agent is confined to while not migrating.
    #[must_use]
    pub fn containment_bounds(&self) -> Bounds {
        self.arena_bounds.inset(self.effective_clearance())
    }

    /// Advances the agent by one tick ending at `time`.
    ///
    /// `draw_angle` is called exactly once per wander target refresh and must return an angle
    /// uniformly distributed in `[0, 2π)`.
    pub fn advance(&mut self, time: f64, dt: f64, draw_angle: impl FnOnce() -> f64) {
        if let Some(flight) = &self.flight {
            self.position = flight.position_at(time);
            return;
        }

        let mut force = self.wander_force(time, draw_angle);
        force += self.contain();
        force += self.repulsion_force();

        self.velocity += force * dt;
        self.velocity = self.velocity.clamp_length(self.params.max_speed);
        self.position += self.velocity * dt;

        // The soft wall force is finite, so integration can still carry the agent past the
        // inset boundary. Bounce it back so the containment region is never left.
        let inner = self.containment_bounds();
        bounce_axis(&mut self.position.x, &mut self.velocity.x, inner.min.x, inner.max.x);
        bounce_axis(&mut self.position.y, &mut self.velocity.y, inner.min.y, inner.max.y);
    }

    fn wander_force(&mut self, time: f64, draw_angle: impl FnOnce() -> f64) -> Vec2 {
        if self.params.wander_step_size != 0.0
            && self
                .last_step_change_time
                .is_none_or(|last| time - last > self.params.wander_step_duration)
        {
            let direction = Vec2::from_angle(draw_angle());
            self.moving_to = Some(self.position + direction * self.params.wander_step_size);
            self.last_step_change_time = Some(time);
        }

        match self.moving_to {
            Some(target) => {
                let to = target - self.position;
                let dist = to.norm();
                if dist > 0.0 {
                    to * (self.params.gravity_strength / dist.powi(3))
                } else {
                    Vec2::ZERO
                }
            }
            None => Vec2::ZERO,
        }
    }

    /// Bounces the agent back inside its containment bounds and returns the soft wall force.
    fn contain(&mut self) -> Vec2 {
        let inner = self.containment_bounds();
        let wall_buffer = self.params.wall_buffer;
        Vec2::new(
            wall_axis(
                &mut self.position.x,
                &mut self.velocity.x,
                inner.min.x,
                inner.max.x,
                wall_buffer,
            ),
            wall_axis(
                &mut self.position.y,
                &mut self.velocity.y,
                inner.min.y,
                inner.max.y,
                wall_buffer,
            ),
        )
    }

    fn repulsion_force(&self) -> Vec2 {
        let factor = self.params.social_distance_factor;
        if factor <= 0.0 {
            return Vec2::ZERO;
        }
        let mut force = Vec2::ZERO;
        for &neighbor in &self.repel_from_positions {
            let diff = self.position - neighbor;
            let dist = diff.norm();
            if dist > 0.0 {
                force += diff * (factor / dist.powi(3));
            }
        }
        force
    }

    /// Moves the agent to `status` at `time`.
    ///
    /// Entering an infected state calls `draw_symptomatic` once to choose between `Infected`
    /// (true) and `AsymptomaticInfected` (false); requesting either infected variant behaves the
    /// same. Requesting the stage the agent is already in is a no-op that returns `Ok(None)` and
    /// keeps the original infection start time. Backward or skipping transitions fail.
    pub fn set_status(
        &mut self,
        status: InfectionStatus,
        time: f64,
        draw_symptomatic: impl FnOnce() -> bool,
    ) -> Result<Option<StatusChange>, OutbreakError> {
        let previous = self.status;
        if previous.stage() == status.stage() {
            return Ok(None);
        }
        if !previous.can_transition_to(status) {
            return Err(OutbreakError::InvalidTransition {
                from: previous,
                to: status,
            });
        }

        let current = match status {
            InfectionStatus::Infected | InfectionStatus::AsymptomaticInfected => {
                self.infection_start_time = Some(time);
                if draw_symptomatic() {
                    InfectionStatus::Infected
                } else {
                    InfectionStatus::AsymptomaticInfected
                }
            }
            _ => {
                self.infection_start_time = None;
                status
            }
        };
        self.status = current;
        if current == InfectionStatus::Recovered {
            self.repel_from_positions.clear();
        }

        trace!(
            "agent {} {} -> {} at t={:.3}",
            self.id,
            previous,
            current,
            time
        );
        Ok(Some(StatusChange {
            agent: self.id,
            time,
            previous,
            current,
        }))
    }

    /// Whether the agent has been infected for strictly longer than `infection_duration`.
    /// Elapsed times within a nanosecond of the duration count as equal to it.
    #[must_use]
    pub fn recovery_due(&self, time: f64, infection_duration: f64) -> bool {
        self.infection_start_time
            .is_some_and(|start| time - start > infection_duration + TIME_TOLERANCE)
    }

    /// Starts a trip to another arena. Movement forces are suspended until [`Agent::land`].
    pub fn depart(&mut self, flight: Flight, destination_bounds: Bounds) {
        self.position = flight.origin;
        self.arena_bounds = destination_bounds;
        self.repel_from_positions.clear();
        self.flight = Some(flight);
    }

    /// Ends the current trip, placing the agent at `position` with no momentum and no wander
    /// target. Does nothing if the agent is not migrating.
    pub fn land(&mut self, position: Vec2) {
        if self.flight.take().is_some() {
            self.position = position;
            self.velocity = Vec2::ZERO;
            self.moving_to = None;
            self.last_step_change_time = None;
        }
    }
}

/// Clamps one coordinate into `[lower, upper]`, reflecting the velocity component inward.
fn bounce_axis(position: &mut f64, velocity: &mut f64, lower: f64, upper: f64) {
    if *position > upper {
        *velocity = -velocity.abs();
        *position = upper;
    }
    if *position < lower {
        *velocity = velocity.abs();
        *position = lower;
    }
}

/// Applies [`bounce_axis`] and returns the soft wall force along this axis, computed from the
/// distances to each wall before the bounce. A wall that was crossed exerts no force.
fn wall_axis(position: &mut f64, velocity: &mut f64, lower: f64, upper: f64, wall_buffer: f64) -> f64 {
    let to_lower = *position - lower;
    let to_upper = upper - *position;
    bounce_axis(position, velocity, lower, upper);

    let mut force = 0.0;
    if to_lower > 0.0 {
        force += (1.0 / to_lower - 1.0 / wall_buffer).max(0.0);
    }
    if to_upper > 0.0 {
        force -= (1.0 / to_upper - 1.0 / wall_buffer).max(0.0);
    }
    force
}
