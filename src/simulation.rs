//! The engine that owns every arena and advances them one tick at a time.
//!
//! Each call to [`Simulation::tick`] runs, in order:
//!
//! 1. plans that have come due,
//! 2. movement of every agent,
//! 3. the transmission scan (each arena on its own),
//! 4. recovery,
//! 5. the refresh of every agent's repulsion neighbors,
//! 6. migration between arenas,
//! 7. statistics sampling.
//!
//! All randomness comes from named streams seeded from [`Parameters::seed`], so a run is fully
//! reproducible. Within each stream, draws happen in arena order and then population order.
use std::f64::consts::TAU;

use log::{debug, info, trace, warn};

use crate::agent::{probability, Agent, AgentId, Flight, InfectionStatus, StatusChange};
use crate::arena::{grid_layout, Arena, ArenaId};
use crate::define_rng;
use crate::error::{invalid_parameter, OutbreakError};
use crate::events::{
    AgentMigrationEvent, AgentStatusChangeEvent, EventHub, OutbreakEvent, StatsSampledEvent,
};
use crate::geometry::{Bounds, Vec2};
use crate::parameters::Parameters;
use crate::plan::{ExecutionPhase, PlanId, Queue};
use crate::random::RngSource;
use crate::stats::{AveragedStats, StatSnapshot, StatsRecorder, StatusCounts, TIME_TOLERANCE};
use crate::virus::Virus;

define_rng!(PopulationRng);
define_rng!(SeedingRng);
define_rng!(MovementRng);
define_rng!(TransmissionRng);
define_rng!(SymptomsRng);
define_rng!(MigrationRng);
define_rng!(PolicyRng);

type Callback = dyn FnOnce(&mut Simulation);

pub struct Simulation {
    time: f64,
    parameters: Parameters,
    virus: Virus,
    arenas: Vec<Arena>,
    social_distance_factor: f64,
    travel_rate: f64,
    limit_social_distancing_to_infectious: bool,
    rng: RngSource,
    plan_queue: Queue<Box<Callback>, ExecutionPhase>,
    events: EventHub,
    stats: StatsRecorder,
}

impl Simulation {
    /// Validates `parameters`, lays out and populates the arenas and infects
    /// `parameters.initial_infections` randomly chosen agents at time zero.
    pub fn new(parameters: Parameters) -> Result<Self, OutbreakError> {
        parameters.validate()?;
        let virus = parameters.virus()?;
        let layout = grid_layout(
            parameters.arena_count,
            parameters.arena_size,
            parameters.arena_gap,
        )?;

        let rng = RngSource::new(parameters.seed);
        let agent_params = parameters.agent_params();
        let mut next_id = 0;
        let arenas = layout
            .into_iter()
            .enumerate()
            .map(|(index, bounds)| {
                let mut arena = Arena::new(ArenaId(index), bounds);
                next_id = rng.sample(PopulationRng, |rng| {
                    arena.populate(parameters.population, agent_params, next_id, rng)
                });
                arena
            })
            .collect::<Vec<_>>();

        if parameters.travel_rate > 0.0 && arenas.len() < 2 {
            warn!("travel_rate is set but there is only one arena; nobody will travel");
        }

        let mut simulation = Simulation {
            time: 0.0,
            virus,
            arenas,
            social_distance_factor: parameters.social_distance_factor,
            travel_rate: parameters.travel_rate,
            limit_social_distancing_to_infectious: parameters
                .limit_social_distancing_to_infectious,
            rng,
            plan_queue: Queue::new(),
            events: EventHub::new(),
            stats: StatsRecorder::new(parameters.stats_interval),
            parameters,
        };

        for _ in 0..simulation.parameters.initial_infections {
            simulation.infect_random_agent()?;
        }

        info!(
            "created simulation: {} arena(s), {} agents, seed {}",
            simulation.arenas.len(),
            simulation.parameters.total_population(),
            simulation.parameters.seed
        );
        Ok(simulation)
    }

    #[must_use]
    pub fn time(&self) -> f64 {
        self.time
    }

    #[must_use]
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    #[must_use]
    pub fn virus(&self) -> &Virus {
        &self.virus
    }

    #[must_use]
    pub fn arenas(&self) -> &[Arena] {
        &self.arenas
    }

    pub fn arena(&self, arena_id: ArenaId) -> Result<&Arena, OutbreakError> {
        self.arenas
            .get(arena_id.0)
            .ok_or(OutbreakError::UnknownArena(arena_id))
    }

    /// Moves an arena. Its occupants are contained by the new bounds from the next tick on.
    /// Fails with `InvalidParameter` when either side is no larger than twice the wall
    /// clearance of an infected agent.
    pub fn set_arena_bounds(
        &mut self,
        arena_id: ArenaId,
        bounds: Bounds,
    ) -> Result<(), OutbreakError> {
        let arena = self
            .arenas
            .get_mut(arena_id.0)
            .ok_or(OutbreakError::UnknownArena(arena_id))?;
        arena.set_bounds(bounds, self.parameters.agent_params().max_wall_clearance())
    }

    /// Every agent, arena by arena.
    pub fn agents(&self) -> impl Iterator<Item = &Agent> {
        self.arenas.iter().flat_map(Arena::agents)
    }

    #[must_use]
    pub fn population(&self) -> usize {
        self.arenas.iter().map(Arena::len).sum()
    }

    /// The arena an agent currently belongs to and its index in that arena's population.
    #[must_use]
    pub fn locate(&self, agent_id: AgentId) -> Option<(ArenaId, usize)> {
        self.arenas.iter().find_map(|arena| {
            arena
                .index_of(agent_id)
                .map(|index| (arena.id(), index))
        })
    }

    pub fn agent(&self, agent_id: AgentId) -> Result<&Agent, OutbreakError> {
        self.arenas
            .iter()
            .find_map(|arena| arena.get(agent_id))
            .ok_or(OutbreakError::UnknownAgent(agent_id))
    }

    /// Direct access to an agent, e.g. to place it for an experiment. Status changes must go
    /// through [`Simulation::set_status`] so that they are announced.
    pub fn agent_mut(&mut self, agent_id: AgentId) -> Result<&mut Agent, OutbreakError> {
        self.arenas
            .iter_mut()
            .find_map(|arena| arena.get_mut(agent_id))
            .ok_or(OutbreakError::UnknownAgent(agent_id))
    }

    #[must_use]
    pub fn social_distance_factor(&self) -> f64 {
        self.social_distance_factor
    }

    #[must_use]
    pub fn travel_rate(&self) -> f64 {
        self.travel_rate
    }

    pub fn set_travel_rate(&mut self, travel_rate: f64) -> Result<(), OutbreakError> {
        if !(travel_rate >= 0.0 && travel_rate.is_finite()) {
            return Err(invalid_parameter(
                "travel_rate",
                format!("must be non-negative and finite, got {travel_rate}"),
            ));
        }
        if travel_rate > 0.0 && self.arenas.len() < 2 {
            warn!("travel_rate is set but there is only one arena; nobody will travel");
        }
        self.travel_rate = travel_rate;
        Ok(())
    }

    #[must_use]
    pub fn limit_social_distancing_to_infectious(&self) -> bool {
        self.limit_social_distancing_to_infectious
    }

    pub fn set_limit_social_distancing_to_infectious(&mut self, limit: bool) {
        self.limit_social_distancing_to_infectious = limit;
    }

    #[must_use]
    pub fn random_source(&self) -> &RngSource {
        &self.rng
    }

    /// Schedules `callback` to run at the start of the first tick whose time reaches `time`.
    pub fn add_plan(
        &mut self,
        time: f64,
        callback: impl FnOnce(&mut Simulation) + 'static,
    ) -> Result<PlanId, OutbreakError> {
        self.add_plan_with_phase(time, callback, ExecutionPhase::Normal)
    }

    /// Like [`Simulation::add_plan`]; plans due at the same time run in phase order.
    pub fn add_plan_with_phase(
        &mut self,
        time: f64,
        callback: impl FnOnce(&mut Simulation) + 'static,
        phase: ExecutionPhase,
    ) -> Result<PlanId, OutbreakError> {
        if !time.is_finite() || time < self.time {
            return Err(OutbreakError::InvalidTime(time));
        }
        Ok(self.plan_queue.add_plan(time, Box::new(callback), phase))
    }

    /// Returns `false` if the plan already ran or was cancelled.
    pub fn cancel_plan(&mut self, plan_id: &PlanId) -> bool {
        self.plan_queue.cancel_plan(plan_id)
    }

    #[must_use]
    pub fn remaining_plan_count(&self) -> usize {
        self.plan_queue.remaining_plan_count()
    }

    pub fn subscribe_to_event<E: OutbreakEvent>(&mut self, handler: impl FnMut(&E) + 'static) {
        self.events.subscribe(handler);
    }

    /// Advances the simulation by `dt` using the configured time step.
    pub fn step(&mut self) -> Result<(), OutbreakError> {
        self.tick(self.parameters.time_step)
    }

    pub fn tick(&mut self, dt: f64) -> Result<(), OutbreakError> {
        if !(dt > 0.0 && dt.is_finite()) {
            return Err(invalid_parameter(
                "dt",
                format!("must be positive and finite, got {dt}"),
            ));
        }
        self.time += dt;

        self.run_due_plans();
        self.move_agents(dt);
        self.transmit()?;
        self.recover()?;
        self.refresh_repulsion();
        self.migrate(dt)?;
        self.sample_stats();
        Ok(())
    }

    fn run_due_plans(&mut self) {
        while let Some(plan) = self
            .plan_queue
            .get_next_plan_due(self.time + TIME_TOLERANCE)
        {
            (plan.data)(self);
        }
    }

    fn move_agents(&mut self, dt: f64) {
        let time = self.time;
        let rng = &self.rng;
        for arena in &mut self.arenas {
            for agent in arena.agents_mut() {
                agent.advance(time, dt, || rng.sample_range(MovementRng, 0.0..TAU));
            }
        }
    }

    /// Tests every infected/susceptible pair in each arena, travellers included at their
    /// position along the way. Agents infected during the scan do not infect others until the
    /// next tick, and each target is infected at most once.
    fn transmit(&mut self) -> Result<(), OutbreakError> {
        let p = self.virus.infection_probability_per_unit_time();
        for arena_index in 0..self.arenas.len() {
            let agents = self.arenas[arena_index].agents();
            let infectors: Vec<(Vec2, f64)> = agents
                .iter()
                .filter(|agent| agent.status().is_infected())
                .map(|agent| (agent.position(), agent.params().infection_radius))
                .collect();
            if infectors.is_empty() {
                continue;
            }
            let mut targets: Vec<(usize, Vec2, bool)> = agents
                .iter()
                .enumerate()
                .filter(|(_, agent)| agent.status() == InfectionStatus::Susceptible)
                .map(|(index, agent)| (index, agent.position(), false))
                .collect();

            for &(infector_position, infection_radius) in &infectors {
                for (_, position, infected) in &mut targets {
                    if !*infected
                        && position.distance(infector_position) < infection_radius
                        && self.rng.sample_bool(TransmissionRng, p)
                    {
                        *infected = true;
                    }
                }
            }

            for (index, _, infected) in targets {
                if infected {
                    self.set_status_at(arena_index, index, InfectionStatus::Infected)?;
                }
            }
        }
        Ok(())
    }

    fn recover(&mut self) -> Result<(), OutbreakError> {
        let duration = self.virus.infection_duration();
        for arena_index in 0..self.arenas.len() {
            for index in 0..self.arenas[arena_index].len() {
                if self.arenas[arena_index].agents()[index].recovery_due(self.time, duration) {
                    self.set_status_at(arena_index, index, InfectionStatus::Recovered)?;
                }
            }
        }
        Ok(())
    }

    /// Gives every distancing agent the positions of its nearest neighbors in the same arena.
    /// Recovered agents neither repel nor are repelled. Travellers repel others but feel no
    /// force until they land.
    fn refresh_repulsion(&mut self) {
        let limit = self.limit_social_distancing_to_infectious;
        let mut candidates: Vec<(f64, usize, Vec2)> = Vec::new();
        for arena in &mut self.arenas {
            let sources: Vec<(usize, Vec2)> = arena
                .agents()
                .iter()
                .enumerate()
                .filter(|(_, agent)| match agent.status() {
                    InfectionStatus::Susceptible => !limit,
                    InfectionStatus::Infected | InfectionStatus::AsymptomaticInfected => true,
                    InfectionStatus::Recovered => false,
                })
                .map(|(index, agent)| (index, agent.position()))
                .collect();

            for (index, agent) in arena.agents_mut().iter_mut().enumerate() {
                if agent.is_migrating()
                    || agent.status() == InfectionStatus::Recovered
                    || agent.social_distance_factor() <= 0.0
                {
                    if !agent.repel_from_positions().is_empty() {
                        agent.set_repel_from_positions(Vec::new());
                    }
                    continue;
                }

                let position = agent.position();
                candidates.clear();
                candidates.extend(
                    sources
                        .iter()
                        .filter(|(source, _)| *source != index)
                        .map(|&(source, point)| (point.distance(position), source, point)),
                );
                keep_nearest(&mut candidates, agent.params().repel_from_max_count);
                agent.set_repel_from_positions(
                    candidates.iter().map(|&(_, _, point)| point).collect(),
                );
            }
        }
    }

    fn migrate(&mut self, dt: f64) -> Result<(), OutbreakError> {
        if self.travel_rate <= 0.0 || self.arenas.len() < 2 {
            return Ok(());
        }
        let p = (self.travel_rate * dt).min(1.0);

        let mut departures = Vec::new();
        for (arena_index, arena) in self.arenas.iter().enumerate() {
            for agent in arena.agents() {
                if agent.is_migrating() || agent.status() == InfectionStatus::Recovered {
                    continue;
                }
                if self.rng.sample_bool(MigrationRng, p) {
                    let destination = self.pick_other_arena(arena_index);
                    departures.push((agent.id(), arena_index, destination));
                }
            }
        }

        for (agent_id, from, to) in departures {
            self.depart(agent_id, from, to)?;
        }
        Ok(())
    }

    fn pick_other_arena(&self, from: usize) -> usize {
        let other = self
            .rng
            .sample_range(MigrationRng, 0..self.arenas.len() - 1);
        if other >= from {
            other + 1
        } else {
            other
        }
    }

    /// Sends an agent to another arena. With no `destination`, one of the other arenas is
    /// picked at random.
    pub fn migrate_agent(
        &mut self,
        agent_id: AgentId,
        destination: Option<ArenaId>,
    ) -> Result<(), OutbreakError> {
        if self.arenas.len() < 2 {
            return Err(OutbreakError::SingleArena);
        }
        let (from, index) = self
            .locate(agent_id)
            .ok_or(OutbreakError::UnknownAgent(agent_id))?;
        if self.arenas[from.0].agents()[index].is_migrating() {
            return Err(format!("agent {agent_id} is already migrating").into());
        }
        let to = match destination {
            Some(to) if to == from => {
                return Err(invalid_parameter(
                    "destination",
                    format!("agent {agent_id} is already in arena {to}"),
                ));
            }
            Some(to) => {
                self.arena(to)?;
                to.0
            }
            None => self.pick_other_arena(from.0),
        };
        self.depart(agent_id, from.0, to)
    }

    /// Moves the agent into the destination population right away and schedules its arrival.
    fn depart(&mut self, agent_id: AgentId, from: usize, to: usize) -> Result<(), OutbreakError> {
        let mut agent = self.arenas[from]
            .remove(agent_id)
            .ok_or(OutbreakError::UnknownAgent(agent_id))?;
        let destination_bounds = self.arenas[to].bounds();
        let flight = Flight {
            origin: agent.position(),
            destination: destination_bounds.center(),
            departure_time: self.time,
            duration: self.parameters.travel_duration,
            path: self.parameters.travel_path,
        };
        agent.depart(flight, destination_bounds);
        self.arenas[to].insert(agent);

        let (from, to) = (ArenaId(from), ArenaId(to));
        debug!("agent {agent_id} leaves arena {from} for arena {to} at t={:.3}", self.time);
        self.events.emit(AgentMigrationEvent {
            time: self.time,
            agent: agent_id,
            from,
            to,
        });

        self.add_plan_with_phase(
            flight.arrival_time(),
            move |simulation| simulation.land(agent_id),
            ExecutionPhase::First,
        )?;
        Ok(())
    }

    fn land(&mut self, agent_id: AgentId) {
        for arena in &mut self.arenas {
            let center = arena.bounds().center();
            if let Some(agent) = arena.get_mut(agent_id) {
                agent.land(center);
                trace!("agent {agent_id} arrived in arena {}", arena.id());
                return;
            }
        }
    }

    /// Moves an agent to `status`, announcing the change. Requesting either infected status
    /// rolls for symptoms; see [`Agent::set_status`].
    pub fn set_status(
        &mut self,
        agent_id: AgentId,
        status: InfectionStatus,
    ) -> Result<Option<StatusChange>, OutbreakError> {
        let (arena_id, index) = self
            .locate(agent_id)
            .ok_or(OutbreakError::UnknownAgent(agent_id))?;
        self.set_status_at(arena_id.0, index, status)
    }

    fn set_status_at(
        &mut self,
        arena_index: usize,
        agent_index: usize,
        status: InfectionStatus,
    ) -> Result<Option<StatusChange>, OutbreakError> {
        let time = self.time;
        let rng = &self.rng;
        let arena = &mut self.arenas[arena_index];
        let arena_id = arena.id();
        let agent = &mut arena.agents_mut()[agent_index];
        let p_symptomatic = agent.params().p_symptomatic_on_infection;
        let change = agent.set_status(status, time, || {
            rng.sample_bool(SymptomsRng, p_symptomatic)
        })?;

        if let Some(change) = change {
            self.events.emit(AgentStatusChangeEvent {
                time,
                agent: change.agent,
                arena: arena_id,
                previous: change.previous,
                current: change.current,
            });
        }
        Ok(change)
    }

    /// Infects one susceptible agent in a randomly chosen arena. Returns `None` when nobody is
    /// left to infect.
    pub fn infect_random_agent(&mut self) -> Result<Option<AgentId>, OutbreakError> {
        let is_target =
            |agent: &Agent| !agent.is_migrating() && agent.status() == InfectionStatus::Susceptible;
        let arenas: Vec<usize> = self
            .arenas
            .iter()
            .enumerate()
            .filter(|(_, arena)| arena.agents().iter().any(is_target))
            .map(|(index, _)| index)
            .collect();
        if arenas.is_empty() {
            return Ok(None);
        }
        let arena_index = arenas[self.rng.sample_range(SeedingRng, 0..arenas.len())];

        let targets: Vec<usize> = self.arenas[arena_index]
            .agents()
            .iter()
            .enumerate()
            .filter(|(_, agent)| is_target(*agent))
            .map(|(index, _)| index)
            .collect();
        let agent_index = targets[self.rng.sample_range(SeedingRng, 0..targets.len())];

        let agent_id = self.arenas[arena_index].agents()[agent_index].id();
        self.set_status_at(arena_index, agent_index, InfectionStatus::Infected)?;
        Ok(Some(agent_id))
    }

    /// Sets each agent's social distance factor to `new_value` with probability `probability`,
    /// independently. Agents that are not selected keep their current factor.
    pub fn change_social_distance_factor(
        &mut self,
        new_value: f64,
        probability_of_adoption: f64,
    ) -> Result<(), OutbreakError> {
        if !(new_value >= 0.0 && new_value.is_finite()) {
            return Err(invalid_parameter(
                "social_distance_factor",
                format!("must be non-negative and finite, got {new_value}"),
            ));
        }
        probability("probability", probability_of_adoption)?;

        self.social_distance_factor = new_value;
        let rng = &self.rng;
        let mut adopted = 0_usize;
        for arena in &mut self.arenas {
            for agent in arena.agents_mut() {
                if rng.sample_bool(PolicyRng, probability_of_adoption) {
                    agent.set_social_distance_factor(new_value);
                    adopted += 1;
                }
            }
        }
        debug!(
            "social distance factor {new_value} adopted by {adopted} agents at t={:.3}",
            self.time
        );
        Ok(())
    }

    /// Counts agents by status across all arenas without recording anything.
    #[must_use]
    pub fn current_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for arena in &self.arenas {
            counts += arena.counts();
        }
        counts
    }

    fn sample_stats(&mut self) {
        if !self.stats.is_due(self.time) {
            return;
        }
        let counts = self.current_counts();
        if let Some(snapshot) = self.stats.sample(self.time, counts) {
            trace!(
                "t={:.3} S={} I={} R={}",
                snapshot.time,
                snapshot.susceptible_count,
                snapshot.infected_count,
                snapshot.recovered_count
            );
            self.events.emit(StatsSampledEvent(snapshot));
        }
    }

    pub fn get_latest_stats(&self) -> Result<&StatSnapshot, OutbreakError> {
        self.stats.latest()
    }

    pub fn get_averaged_stats(&self) -> Result<AveragedStats, OutbreakError> {
        self.stats.averaged()
    }

    #[must_use]
    pub fn time_series(&self) -> &[StatSnapshot] {
        self.stats.time_series()
    }
}

/// Keeps the `count` entries with the smallest distance, sorted by distance and then by index.
fn keep_nearest(candidates: &mut Vec<(f64, usize, Vec2)>, count: usize) {
    let by_distance =
        |a: &(f64, usize, Vec2), b: &(f64, usize, Vec2)| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1));
    if count == 0 {
        candidates.clear();
        return;
    }
    if count < candidates.len() {
        candidates.select_nth_unstable_by(count - 1, by_distance);
        candidates.truncate(count);
    }
    candidates.sort_unstable_by(by_distance);
}
