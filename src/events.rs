/*!

Typed, synchronous notifications about what happens inside the simulation.

The engine emits an [`AgentStatusChangeEvent`] for every status transition, an
[`AgentMigrationEvent`] whenever an agent leaves for another arena and a [`StatsSampledEvent`]
for every recorded snapshot. Observers such as a rendering adapter or a report subscribe with
`Simulation::subscribe_to_event`:

```rust
use ixa_outbreak::events::AgentStatusChangeEvent;
use ixa_outbreak::{Parameters, Simulation};

let mut simulation = Simulation::new(Parameters::default()).unwrap();
simulation.subscribe_to_event(|event: &AgentStatusChangeEvent| {
    println!("agent {} is now {}", event.agent, event.current);
});
```

Handlers only observe: they receive the event by reference and cannot reach back into the
simulation. Nothing in the engine depends on a handler being registered.

*/
use std::any::{Any, TypeId};

use crate::agent::{AgentId, InfectionStatus};
use crate::arena::ArenaId;
use crate::hashing::HashMap;
use crate::stats::StatSnapshot;

/// Marker for types that can be emitted through an [`EventHub`].
pub trait OutbreakEvent: Copy + 'static {}

/// Emitted when an agent's status changes.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AgentStatusChangeEvent {
    pub time: f64,
    pub agent: AgentId,
    /// The arena the agent belongs to at the time of the change.
    pub arena: ArenaId,
    pub previous: InfectionStatus,
    pub current: InfectionStatus,
}
impl OutbreakEvent for AgentStatusChangeEvent {}

/// Emitted when an agent departs for another arena.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AgentMigrationEvent {
    pub time: f64,
    pub agent: AgentId,
    pub from: ArenaId,
    pub to: ArenaId,
}
impl OutbreakEvent for AgentMigrationEvent {}

/// Emitted after a snapshot is appended to the time series.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct StatsSampledEvent(pub StatSnapshot);
impl OutbreakEvent for StatsSampledEvent {}

type Handlers<E> = Vec<Box<dyn FnMut(&E)>>;

/// Handlers registered per event type, called in subscription order.
#[derive(Default)]
pub struct EventHub {
    handlers: HashMap<TypeId, Box<dyn Any>>,
}

impl EventHub {
    #[must_use]
    pub fn new() -> Self {
        EventHub::default()
    }

    pub fn subscribe<E: OutbreakEvent>(&mut self, handler: impl FnMut(&E) + 'static) {
        self.handlers
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Box::new(Handlers::<E>::new()) as Box<dyn Any>)
            .downcast_mut::<Handlers<E>>()
            .expect("handler list registered under the wrong event type")
            .push(Box::new(handler));
    }

    pub fn emit<E: OutbreakEvent>(&mut self, event: E) {
        if let Some(handlers) = self
            .handlers
            .get_mut(&TypeId::of::<E>())
            .and_then(|handlers| handlers.downcast_mut::<Handlers<E>>())
        {
            for handler in handlers.iter_mut() {
                handler(&event);
            }
        }
    }
}
