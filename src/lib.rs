//! A spatial outbreak simulation of mobile agents
//!
//! Agents wander inside rectangular arenas, push away from the walls and, when social
//! distancing is on, from their nearest neighbors. Infected agents pass the disease to
//! susceptible agents within their infection radius, recover after a fixed duration and may
//! travel to other arenas. The central object is the [`Simulation`], which owns every arena and
//! advances them one tick at a time:
//!
//! ```rust
//! use ixa_outbreak::{Parameters, Simulation};
//!
//! let mut simulation = Simulation::new(Parameters {
//!     population: 50,
//!     ..Parameters::default()
//! })
//! .unwrap();
//! for _ in 0..30 {
//!     simulation.step().unwrap();
//! }
//! let stats = simulation.get_latest_stats().unwrap();
//! assert_eq!(stats.total(), 50);
//! ```
//!
//! Around the engine sit the services a complete run needs:
//! * named, independently seeded random streams ([`random`]),
//! * plans scheduled for a future time ([`Simulation::add_plan`]),
//! * typed events observers can subscribe to ([`events`]),
//! * CSV reports ([`report`]),
//! * a command-line runner with scenario presets ([`runner`], [`parameters`]).
pub mod agent;
pub mod arena;
pub mod error;
pub mod events;
pub mod geometry;
pub mod hashing;
pub mod log;
pub mod parameters;
pub mod plan;
pub mod random;
pub mod report;
pub mod runner;
pub mod simulation;
pub mod stats;
pub mod virus;

pub mod prelude;

pub use agent::{Agent, AgentId, InfectionStatus};
pub use arena::{Arena, ArenaId};
pub use error::OutbreakError;
pub use parameters::{Parameters, Scenario};
pub use simulation::Simulation;

// Re-exports used by the exported macros
pub use csv;
pub use paste;
pub use rand;

pub use crate::log::{debug, error, info, trace, warn};
