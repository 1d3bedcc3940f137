pub use crate::agent::{Agent, AgentId, AgentParams, InfectionStatus};
pub use crate::arena::{Arena, ArenaId};
pub use crate::error::OutbreakError;
pub use crate::events::{
    AgentMigrationEvent, AgentStatusChangeEvent, OutbreakEvent, StatsSampledEvent,
};
pub use crate::geometry::{Bounds, TravelPath, Vec2};
pub use crate::log::{debug, error, info, trace, warn};
pub use crate::parameters::{Intervention, InterventionTrigger, Parameters, Scenario};
pub use crate::plan::{ExecutionPhase, PlanId};
pub use crate::random::{RngId, RngSource};
pub use crate::simulation::Simulation;
pub use crate::stats::{AveragedStats, StatSnapshot, StatusCounts};
pub use crate::virus::Virus;
pub use crate::{define_report, define_rng};
