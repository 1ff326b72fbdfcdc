//! One node's copy of the simulation
//!
//! A [`World`] ties the registry, the action scheduler and a [`Simulation`]
//! to a logical clock. Server and client run the exact same world; they only
//! differ in where their actions come from.

use crate::arena::{Arena, Simulation};
use crate::codec::Counted;
use crate::entity::EntityId;
use crate::error::DesyncWarning;
use crate::protocol::WorldSnapshot;
use crate::registry::Registry;
use crate::scheduler::{Action, ActionScheduler, TickReport};
use log::info;
use std::cmp::Reverse;
use std::sync::Arc;

pub struct World<S: Simulation = Arena> {
    registry: Arc<Registry>,
    scheduler: Arc<ActionScheduler>,
    simulation: S,
    /// Next tick to be processed
    tick: u64,
    paused: bool,
}

impl World<Arena> {
    /// An empty world running the arcade rules
    pub fn new() -> Self {
        let registry = Arc::new(Registry::new());
        let arena = Arena::new(Arc::clone(&registry));
        Self::with_simulation(registry, arena)
    }
}

impl Default for World<Arena> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Simulation> World<S> {
    /// Wraps a simulation that operates on `registry`
    pub fn with_simulation(registry: Arc<Registry>, simulation: S) -> Self {
        Self {
            registry,
            scheduler: Arc::new(ActionScheduler::new()),
            simulation,
            tick: 0,
            paused: false,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn scheduler(&self) -> &Arc<ActionScheduler> {
        &self.scheduler
    }

    pub fn simulation(&self) -> &S {
        &self.simulation
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        if self.paused != paused {
            info!("Simulation {} at tick {}", if paused { "paused" } else { "resumed" }, self.tick);
        }
        self.paused = paused;
    }

    /// Schedules local input `lookahead` ticks ahead of the clock
    pub fn schedule_input(
        &self,
        actor: EntityId,
        command: i32,
        lookahead: u64,
    ) -> Result<Action, DesyncWarning> {
        let action = Action::new(actor, command, self.tick + lookahead);
        self.scheduler.schedule(action)?;
        Ok(action)
    }

    /// Processes one tick unless paused
    ///
    /// Due actions are applied first, then the simulation advances, then the
    /// clock moves on. Actions of one tick are applied per actor and key,
    /// press before release, so both nodes agree regardless of arrival order
    /// and a same-tick tap always ends released.
    pub fn step(&mut self) -> Option<TickReport> {
        if self.paused {
            return None;
        }

        let now = self.tick;
        let mut due = Vec::new();
        let report = self.scheduler.tick(now, |action| due.push(action));
        due.sort_unstable_by_key(|action| {
            (action.actor, action.command.abs(), Reverse(action.command.signum()))
        });
        for action in due {
            self.simulation.apply_action(action.command, action.actor);
        }
        self.simulation.tick(now);
        self.tick += 1;
        Some(report)
    }

    /// Captures everything a joining node needs
    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            tick: self.tick,
            paused: self.paused,
            next_id: self.registry.next_id(),
            entities: Counted(self.registry.entities()),
            actions: Counted(self.scheduler.pending()),
        }
    }

    /// Replaces the whole local state with a snapshot
    pub fn restore(&mut self, snapshot: WorldSnapshot) {
        let WorldSnapshot {
            tick,
            paused,
            next_id,
            entities: Counted(entities),
            actions: Counted(actions),
        } = snapshot;

        self.registry.replace(entities, next_id);
        self.scheduler.restore(tick, actions);
        self.tick = tick;
        self.paused = paused;
        info!(
            "World restored at tick {} with {} entities",
            tick,
            self.registry.len()
        );
    }
}
