//! Authoritative world and level setup
//!
//! Owns the seeded asteroid field, the optional host ship and the record of
//! which ship motions peers have already been told about.

use crate::config::ServerConfig;
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::entity::{Asteroid, BlackHole};
use shared::{ship_spawn, Body, Entity, EntityId, World, ARENA_HEIGHT, ARENA_WIDTH};
use std::collections::HashMap;

/// Authoritative world plus level setup and change tracking
pub struct Game {
    world: World,
    rng: StdRng,
    asteroids: usize,
    black_holes: usize,
    host_ship: Option<EntityId>,
    /// Motion last sent to peers, per ship
    broadcast_motion: HashMap<EntityId, Body>,
}

impl Game {
    pub fn new(config: &ServerConfig) -> Self {
        let mut game = Self {
            world: World::new(),
            rng: StdRng::seed_from_u64(config.seed),
            asteroids: config.asteroids,
            black_holes: config.black_holes,
            host_ship: None,
            broadcast_motion: HashMap::new(),
        };

        game.populate();
        if let Some(name) = &config.host_name {
            let id = game.spawn_ship(name);
            game.host_ship = Some(id);
            info!("Host ship '{}' spawned with id {}", name, id);
        }
        game
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn host_ship(&self) -> Option<EntityId> {
        self.host_ship
    }

    /// Creates a player ship under a fresh id
    pub fn spawn_ship(&mut self, name: &str) -> EntityId {
        let registry = self.world.registry();
        let id = registry.allocate_id();
        registry.add(ship_spawn(id, name));
        id
    }

    pub fn remove_ship(&mut self, id: EntityId) -> Option<Entity> {
        self.broadcast_motion.remove(&id);
        self.world.registry().remove(id)
    }

    /// Discards pending input and rebuilds the level
    ///
    /// Every ship keeps its id and name but goes back to its spawn point.
    pub fn reset(&mut self) {
        let registry = self.world.registry();
        let ships: Vec<(EntityId, String)> = registry
            .ships()
            .into_iter()
            .filter_map(|id| {
                registry
                    .get(id)
                    .and_then(|e| e.as_ship().map(|s| (id, s.name.clone())))
            })
            .collect();

        // Discard right away: input handled before the next tick is relayed
        // and must survive on this node too.
        self.world.scheduler().restore(self.world.tick(), Vec::new());
        registry.clear();
        for (id, name) in &ships {
            registry.add(ship_spawn(*id, name.as_str()));
        }
        self.broadcast_motion.clear();
        self.populate();

        info!(
            "Level reset at tick {}: {} ships, {} entities",
            self.world.tick(),
            ships.len(),
            self.world.registry().len()
        );
    }

    fn populate(&mut self) {
        let registry = self.world.registry();

        for _ in 0..self.black_holes {
            let id = registry.allocate_id();
            let x = self.rng.gen_range(0.0..ARENA_WIDTH);
            let y = self.rng.gen_range(0.0..ARENA_HEIGHT);
            registry.add(Entity::BlackHole(
                Body::new(id, x, y),
                BlackHole {
                    mass: self.rng.gen_range(300.0..800.0),
                    radius: 15.0,
                },
            ));
        }

        for _ in 0..self.asteroids {
            let id = registry.allocate_id();
            // Keep the spawn row clear.
            let x = self.rng.gen_range(0.0..ARENA_WIDTH);
            let y = if self.rng.gen_bool(0.5) {
                self.rng.gen_range(0.0..ARENA_HEIGHT * 0.3)
            } else {
                self.rng.gen_range(ARENA_HEIGHT * 0.7..ARENA_HEIGHT)
            };
            registry.add(Entity::Asteroid(
                Body::new(id, x, y).with_velocity(
                    self.rng.gen_range(-1.0..1.0),
                    self.rng.gen_range(-1.0..1.0),
                ),
                Asteroid {
                    radius: self.rng.gen_range(20.0..40.0),
                    spin: self.rng.gen_range(-0.05..0.05),
                },
            ));
        }
    }

    /// Ships whose motion differs from what peers were last told
    ///
    /// The returned motion is recorded as broadcast.
    pub fn changed_ships(&mut self) -> Vec<Body> {
        let registry = self.world.registry();
        let ships: Vec<Body> = registry
            .ships()
            .into_iter()
            .filter_map(|id| registry.get(id).map(|e| *e.body()))
            .collect();

        self.broadcast_motion
            .retain(|id, _| ships.iter().any(|body| body.id == *id));

        let mut changed = Vec::new();
        for body in ships {
            if self.broadcast_motion.insert(body.id, body) != Some(body) {
                changed.push(body);
            }
        }
        changed
    }
}
