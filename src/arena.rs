//! A bounded region ("city") and the agents living in it.
use std::fmt::{Display, Formatter};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::agent::{Agent, AgentId, AgentParams};
use crate::error::{invalid_parameter, OutbreakError};
use crate::geometry::{Bounds, Vec2};
use crate::stats::StatusCounts;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArenaId(pub usize);

impl Display for ArenaId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A rectangle owning a population of agents. Population order is stable except that agents
/// arriving from elsewhere are appended and departing agents are removed in place.
#[derive(Clone, Debug)]
pub struct Arena {
    id: ArenaId,
    bounds: Bounds,
    population: Vec<Agent>,
}

impl Arena {
    #[must_use]
    pub fn new(id: ArenaId, bounds: Bounds) -> Self {
        Arena {
            id,
            bounds,
            population: Vec::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> ArenaId {
        self.id
    }

    #[must_use]
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// The side length of the arena (its width; arenas are laid out as squares).
    #[must_use]
    pub fn size(&self) -> f64 {
        self.bounds.width()
    }

    /// Repositions the arena. Every occupant, including agents still travelling here, is
    /// contained by the new bounds from the next tick on.
    ///
    /// Both sides must exceed twice `wall_clearance`, otherwise the containment region would be
    /// empty and the arena is left unchanged.
    pub fn set_bounds(&mut self, bounds: Bounds, wall_clearance: f64) -> Result<(), OutbreakError> {
        let min_size = 2.0 * wall_clearance;
        if !(bounds.width() > min_size && bounds.height() > min_size) {
            return Err(invalid_parameter(
                "bounds",
                format!(
                    "must be larger than twice the wall clearance ({min_size}) on both sides, \
                     got {} x {}",
                    bounds.width(),
                    bounds.height()
                ),
            ));
        }
        self.bounds = bounds;
        for agent in &mut self.population {
            agent.set_arena_bounds(bounds);
        }
        Ok(())
    }

    /// Adds `count` susceptible agents at uniformly random positions, with ids starting at
    /// `first_id`. Returns the next unused id.
    pub fn populate<R: Rng + ?Sized>(
        &mut self,
        count: usize,
        params: AgentParams,
        first_id: usize,
        rng: &mut R,
    ) -> usize {
        self.population.reserve(count);
        for offset in 0..count {
            let position = self.bounds.sample_uniform(rng);
            self.population.push(Agent::new(
                AgentId(first_id + offset),
                position,
                self.bounds,
                params,
            ));
        }
        first_id + count
    }

    #[must_use]
    pub fn agents(&self) -> &[Agent] {
        &self.population
    }

    pub fn agents_mut(&mut self) -> &mut [Agent] {
        &mut self.population
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.population.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.population.is_empty()
    }

    #[must_use]
    pub fn index_of(&self, agent_id: AgentId) -> Option<usize> {
        self.population.iter().position(|agent| agent.id() == agent_id)
    }

    #[must_use]
    pub fn get(&self, agent_id: AgentId) -> Option<&Agent> {
        self.population.iter().find(|agent| agent.id() == agent_id)
    }

    pub fn get_mut(&mut self, agent_id: AgentId) -> Option<&mut Agent> {
        self.population
            .iter_mut()
            .find(|agent| agent.id() == agent_id)
    }

    /// Takes the agent out of this arena's population.
    pub fn remove(&mut self, agent_id: AgentId) -> Option<Agent> {
        let index = self.index_of(agent_id)?;
        Some(self.population.remove(index))
    }

    /// Adds an agent to the population and points its containment at this arena.
    pub fn insert(&mut self, mut agent: Agent) {
        agent.set_arena_bounds(self.bounds);
        self.population.push(agent);
    }

    #[must_use]
    pub fn counts(&self) -> StatusCounts {
        self.population.iter().map(Agent::status).collect()
    }
}

/// Lays out `count` square arenas of side `size` in a near-square grid centered on the origin,
/// separated by `gap`. Rows fill left to right, top to bottom.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn grid_layout(count: usize, size: f64, gap: f64) -> Result<Vec<Bounds>, OutbreakError> {
    if count == 0 {
        return Err(invalid_parameter("arena_count", "must be at least 1"));
    }
    let columns = (count as f64).sqrt().ceil() as usize;
    let rows = count.div_ceil(columns);
    let pitch = size + gap;
    let x_offset = (columns - 1) as f64 / 2.0;
    let y_offset = (rows - 1) as f64 / 2.0;

    (0..count)
        .map(|index| {
            let (row, column) = (index / columns, index % columns);
            let center = Vec2::new(
                (column as f64 - x_offset) * pitch,
                (y_offset - row as f64) * pitch,
            );
            Bounds::square(center, size)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::InfectionStatus;
    use approx::assert_abs_diff_eq;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn arena() -> Arena {
        Arena::new(
            ArenaId(0),
            Bounds::square(Vec2::ZERO, 7.0).unwrap(),
        )
    }

    #[test]
    fn populate_places_agents_inside() {
        let mut arena = arena();
        let mut rng = SmallRng::seed_from_u64(1);
        let next = arena.populate(100, AgentParams::default(), 10, &mut rng);
        assert_eq!(next, 110);
        assert_eq!(arena.len(), 100);
        assert_eq!(arena.agents()[0].id(), AgentId(10));
        for agent in arena.agents() {
            assert!(arena.bounds().contains(agent.position()));
            assert_eq!(agent.status(), InfectionStatus::Susceptible);
            assert_eq!(agent.arena_bounds(), arena.bounds());
        }
        assert_eq!(arena.counts().susceptible, 100);
    }

    #[test]
    fn remove_and_insert() {
        let mut source = arena();
        let mut destination = Arena::new(
            ArenaId(1),
            Bounds::square(Vec2::new(10.0, 0.0), 7.0).unwrap(),
        );
        let mut rng = SmallRng::seed_from_u64(2);
        source.populate(3, AgentParams::default(), 0, &mut rng);

        let agent = source.remove(AgentId(1)).unwrap();
        assert!(source.remove(AgentId(1)).is_none());
        destination.insert(agent);

        assert_eq!(source.len(), 2);
        assert_eq!(destination.len(), 1);
        assert_eq!(
            destination.get(AgentId(1)).unwrap().arena_bounds(),
            destination.bounds()
        );
    }

    #[test]
    fn set_bounds_updates_occupants() {
        let mut arena = arena();
        let mut rng = SmallRng::seed_from_u64(3);
        arena.populate(5, AgentParams::default(), 0, &mut rng);
        let moved = Bounds::square(Vec2::new(1.0, 1.0), 5.0).unwrap();
        arena.set_bounds(moved, 0.6).unwrap();
        assert_abs_diff_eq!(arena.size(), 5.0);
        assert!(arena.agents().iter().all(|a| a.arena_bounds() == moved));
    }

    #[test]
    fn set_bounds_rejects_rectangles_without_room_inside() {
        let mut arena = arena();
        let mut rng = SmallRng::seed_from_u64(4);
        arena.populate(5, AgentParams::default(), 0, &mut rng);
        let original = arena.bounds();

        let narrow = Bounds::new(Vec2::ZERO, Vec2::new(5.0, 1.2)).unwrap();
        assert!(matches!(
            arena.set_bounds(narrow, 0.6),
            Err(OutbreakError::InvalidParameter { .. })
        ));
        assert_eq!(arena.bounds(), original);
        assert!(arena.agents().iter().all(|a| a.arena_bounds() == original));
    }

    #[test]
    fn single_arena_is_centered() {
        let layout = grid_layout(1, 7.0, 1.0).unwrap();
        assert_eq!(layout, vec![Bounds::square(Vec2::ZERO, 7.0).unwrap()]);
    }

    #[test]
    fn grid_is_near_square() {
        let layout = grid_layout(3, 2.0, 1.0).unwrap();
        let centers: Vec<Vec2> = layout.iter().map(Bounds::center).collect();
        assert_eq!(
            centers,
            vec![
                Vec2::new(-1.5, 1.5),
                Vec2::new(1.5, 1.5),
                Vec2::new(-1.5, -1.5)
            ]
        );
    }

    #[test]
    fn empty_grid_is_rejected() {
        assert!(grid_layout(0, 7.0, 1.0).is_err());
    }
}
