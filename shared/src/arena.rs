//! Arcade rules driven by the synchronization core
//!
//! The arena is deliberately small: ships turn, thrust and shoot, stations
//! fire at the nearest foreign ship, missiles home in on a target, black holes
//! pull everything in range, and asteroids split when shot. It runs the same
//! way on every node, so only input (as actions) has to cross the network.
//!
//! Entities are always looked up through the registry by id. A target or
//! owner that has disappeared is simply treated as absent.

use crate::entity::{ship_spawn, Asteroid, Body, Bonus, Bullet, Entity, EntityId, Missile, Station};
use crate::registry::Registry;
use crate::{KEY_FIRE, KEY_LEFT, KEY_MISSILE, KEY_RIGHT, KEY_STATION, KEY_THRUST, SHIP_HULL};
use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet};
use std::f64::consts::TAU;
use std::sync::Arc;

const TURN_RATE: f64 = 0.08;
const THRUST: f64 = 0.15;
const MAX_SPEED: f64 = 6.0;
const DRAG: f64 = 0.99;
const FIRE_COOLDOWN: i32 = 8;
const BULLET_SPEED: f64 = 7.0;
const BULLET_TTL: i32 = 60;
const BULLET_DAMAGE: i32 = 10;
const MISSILE_SPEED: f64 = 4.0;
const MISSILE_TURN: f64 = 0.06;
const MISSILE_TTL: i32 = 150;
const MISSILE_DAMAGE: i32 = 35;
const STATION_COOLDOWN: i32 = 45;
const STATION_HULL: i32 = 60;
const STATION_RANGE: f64 = 250.0;
const GRAVITY_RANGE: f64 = 200.0;
const ASTEROID_DAMAGE: i32 = 25;
const MIN_ASTEROID_RADIUS: f64 = 10.0;
const BONUS_TTL: i32 = 400;
const ASTEROID_SCORE: i32 = 10;

/// Domain entry points the synchronization core drives
pub trait Simulation {
    /// Advances the domain by one tick
    fn tick(&mut self, timestep: u64);

    /// Applies one input command on behalf of `actor`
    fn apply_action(&mut self, code: i32, actor: EntityId);
}

/// The arcade rules operating on a shared registry
pub struct Arena {
    registry: Arc<Registry>,
}

impl Arena {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Inserts an entity under a freshly allocated id
    fn insert_new(&self, mut entity: Entity) -> EntityId {
        let id = self.registry.allocate_id();
        entity.body_mut().id = id;
        self.registry.add(entity);
        id
    }

    fn nearest_ship(&self, from: &Body, exclude: EntityId) -> Option<EntityId> {
        self.registry
            .ships()
            .into_iter()
            .filter(|id| *id != exclude)
            .filter_map(|id| self.registry.get(id))
            .map(|ship| (ship.id(), from.distance_squared(ship.body())))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    fn launch_missile(&self, actor: EntityId) {
        let Some(Entity::Ship(body, ship)) = self.registry.get(actor) else {
            return;
        };
        let target = self.nearest_ship(&body, actor);
        let (sin, cos) = ship.heading.sin_cos();
        let missile = Entity::Missile(
            Body::new(0, body.x, body.y).with_velocity(cos * MISSILE_SPEED, sin * MISSILE_SPEED),
            Missile {
                owner: actor,
                target,
                ttl: MISSILE_TTL,
            },
        );
        let id = self.insert_new(missile);
        debug!("Ship {} launched missile {} at {:?}", actor, id, target);
    }

    fn deploy_station(&self, actor: EntityId) {
        let already_deployed = self
            .registry
            .projectile_owners()
            .into_iter()
            .filter_map(|id| self.registry.get(id))
            .any(|entity| matches!(entity, Entity::Station(_, station) if station.owner == actor));
        if already_deployed {
            return;
        }
        let Some(ship) = self.registry.get(actor) else {
            return;
        };
        let body = ship.body();
        let id = self.insert_new(Entity::Station(
            Body::new(0, body.x, body.y),
            Station {
                owner: actor,
                cooldown: STATION_COOLDOWN,
                hull: STATION_HULL,
            },
        ));
        info!("Ship {} deployed station {}", actor, id);
    }

    /// Steering, weapons and timers; returns projectiles to spawn
    fn update_controls(&self) -> Vec<Entity> {
        let ships: BTreeMap<EntityId, Body> = self
            .registry
            .ships()
            .into_iter()
            .filter_map(|id| self.registry.get(id))
            .map(|ship| (ship.id(), *ship.body()))
            .collect();
        let mut spawns = Vec::new();

        self.registry.for_each_mut(|entity| match entity {
            Entity::Ship(body, ship) => {
                ship.heading = (ship.heading + f64::from(ship.turn) * TURN_RATE).rem_euclid(TAU);
                let (sin, cos) = ship.heading.sin_cos();
                if ship.thrust {
                    body.dx += cos * THRUST;
                    body.dy += sin * THRUST;
                }
                body.dx *= DRAG;
                body.dy *= DRAG;
                let speed = body.dx.hypot(body.dy);
                if speed > MAX_SPEED {
                    body.dx *= MAX_SPEED / speed;
                    body.dy *= MAX_SPEED / speed;
                }

                ship.cooldown = (ship.cooldown - 1).max(0);
                if ship.firing && ship.cooldown == 0 {
                    ship.cooldown = FIRE_COOLDOWN;
                    spawns.push(bullet(body, body.id, cos, sin));
                }
            }
            Entity::Station(body, station) => {
                station.cooldown = (station.cooldown - 1).max(0);
                if station.cooldown > 0 {
                    return;
                }
                let target = ships
                    .iter()
                    .filter(|(id, _)| **id != station.owner)
                    .map(|(_, ship)| (ship, body.distance_squared(ship)))
                    .filter(|(_, d2)| *d2 <= STATION_RANGE * STATION_RANGE)
                    .min_by(|a, b| a.1.total_cmp(&b.1));
                if let Some((ship, d2)) = target {
                    let distance = d2.sqrt().max(f64::EPSILON);
                    let cos = (ship.x - body.x) / distance;
                    let sin = (ship.y - body.y) / distance;
                    station.cooldown = STATION_COOLDOWN;
                    spawns.push(bullet(body, body.id, cos, sin));
                }
            }
            Entity::Missile(body, missile) => {
                missile.ttl -= 1;
                match missile.target.and_then(|id| ships.get(&id)) {
                    Some(target) => {
                        let wanted = (target.y - body.y).atan2(target.x - body.x);
                        let current = body.dy.atan2(body.dx);
                        let delta = (wanted - current + TAU / 2.0).rem_euclid(TAU) - TAU / 2.0;
                        let heading = current + delta.clamp(-MISSILE_TURN, MISSILE_TURN);
                        let (sin, cos) = heading.sin_cos();
                        body.dx = cos * MISSILE_SPEED;
                        body.dy = sin * MISSILE_SPEED;
                    }
                    None => missile.target = None,
                }
            }
            Entity::Bullet(_, bullet) => bullet.ttl -= 1,
            Entity::Bonus(_, bonus) => bonus.ttl -= 1,
            Entity::Asteroid(..) | Entity::BlackHole(..) => {}
        });

        spawns
    }

    fn apply_gravity(&self) {
        let holes: Vec<(Body, f64)> = self
            .registry
            .black_holes()
            .into_iter()
            .filter_map(|id| self.registry.get(id))
            .filter_map(|entity| match entity {
                Entity::BlackHole(body, hole) => Some((body, hole.mass)),
                _ => None,
            })
            .collect();
        if holes.is_empty() {
            return;
        }

        self.registry.for_each_mut(|entity| {
            if matches!(entity, Entity::BlackHole(..)) {
                return;
            }
            let body = entity.body_mut();
            for (hole, mass) in &holes {
                let d2 = body.distance_squared(hole);
                if d2 > GRAVITY_RANGE * GRAVITY_RANGE || d2 < 1.0 {
                    continue;
                }
                let distance = d2.sqrt();
                let pull = mass / d2;
                body.dx += (hole.x - body.x) / distance * pull;
                body.dy += (hole.y - body.y) / distance * pull;
            }
        });
    }

    /// Resolves contacts on the freshly integrated state
    fn resolve_collisions(&self, spawns: &mut Vec<Entity>) {
        let entities = self.registry.entities();
        let mut removed: BTreeSet<EntityId> = BTreeSet::new();
        let mut damage: BTreeMap<EntityId, i32> = BTreeMap::new();
        let mut score: BTreeMap<EntityId, i32> = BTreeMap::new();

        for entity in &entities {
            let expired = match entity {
                Entity::Bullet(_, b) => b.ttl <= 0,
                Entity::Missile(_, m) => m.ttl <= 0,
                Entity::Bonus(_, b) => b.ttl <= 0,
                _ => false,
            };
            if expired {
                removed.insert(entity.id());
            }
        }

        for (i, a) in entities.iter().enumerate() {
            for b in &entities[i + 1..] {
                if removed.contains(&a.id()) || removed.contains(&b.id()) {
                    continue;
                }
                let reach = a.radius() + b.radius();
                if a.body().distance_squared(b.body()) > reach * reach {
                    continue;
                }
                self.contact(a, b, &mut removed, &mut damage, &mut score, spawns);
                if !removed.contains(&a.id()) && !removed.contains(&b.id()) {
                    self.contact(b, a, &mut removed, &mut damage, &mut score, spawns);
                }
            }
        }

        for id in &removed {
            self.registry.remove(*id);
        }
        for (id, amount) in damage {
            self.registry.update(id, |entity| match entity {
                Entity::Ship(body, ship) => {
                    ship.hull = (ship.hull - amount).min(SHIP_HULL);
                    if ship.hull <= 0 {
                        info!("Ship {} destroyed, respawning", body.id);
                        let fresh = ship_spawn(body.id, ship.name.clone());
                        *body = *fresh.body();
                        ship.hull = SHIP_HULL;
                        ship.score = (ship.score - ASTEROID_SCORE).max(0);
                    }
                }
                Entity::Station(_, station) => station.hull -= amount,
                _ => {}
            });
        }
        for (id, points) in score {
            self.registry.update(id, |entity| {
                if let Some(ship) = entity.as_ship_mut() {
                    ship.score += points;
                }
            });
        }

        let wrecked: Vec<EntityId> = self
            .registry
            .projectile_owners()
            .into_iter()
            .filter(|id| {
                matches!(self.registry.get(*id), Some(Entity::Station(_, station)) if station.hull <= 0)
            })
            .collect();
        for id in wrecked {
            self.registry.remove(id);
        }
    }

    /// Effect of `a` touching `b`, seen from `a`'s side
    fn contact(
        &self,
        a: &Entity,
        b: &Entity,
        removed: &mut BTreeSet<EntityId>,
        damage: &mut BTreeMap<EntityId, i32>,
        score: &mut BTreeMap<EntityId, i32>,
        spawns: &mut Vec<Entity>,
    ) {
        let shooter = match a {
            Entity::Bullet(_, bullet) => Some((bullet.owner, BULLET_DAMAGE)),
            Entity::Missile(_, missile) => Some((missile.owner, MISSILE_DAMAGE)),
            _ => None,
        };

        match (a, b) {
            (_, Entity::BlackHole(..)) if !matches!(a, Entity::Ship(..) | Entity::BlackHole(..)) => {
                removed.insert(a.id());
            }
            (Entity::Bullet(..) | Entity::Missile(..), Entity::Asteroid(body, asteroid)) => {
                removed.insert(a.id());
                removed.insert(b.id());
                if let Some((owner, _)) = shooter {
                    *score.entry(owner).or_default() += ASTEROID_SCORE;
                }
                spawns.extend(split(body, asteroid));
            }
            (Entity::Bullet(..) | Entity::Missile(..), Entity::Ship(..) | Entity::Station(..)) => {
                if let Some((owner, amount)) = shooter {
                    if owner != b.id() && b.owner() != Some(owner) {
                        removed.insert(a.id());
                        *damage.entry(b.id()).or_default() += amount;
                    }
                }
            }
            (Entity::Ship(..), Entity::Asteroid(body, asteroid)) => {
                removed.insert(b.id());
                *damage.entry(a.id()).or_default() += ASTEROID_DAMAGE;
                spawns.extend(split(body, asteroid));
            }
            (Entity::Ship(..), Entity::Bonus(_, bonus)) => {
                removed.insert(b.id());
                *score.entry(a.id()).or_default() += bonus.kind * ASTEROID_SCORE;
                *damage.entry(a.id()).or_default() -= bonus.kind * 5;
            }
            _ => {}
        }
    }
}

fn bullet(from: &Body, owner: EntityId, cos: f64, sin: f64) -> Entity {
    Entity::Bullet(
        Body::new(0, from.x, from.y).with_velocity(
            from.dx + cos * BULLET_SPEED,
            from.dy + sin * BULLET_SPEED,
        ),
        Bullet {
            owner,
            ttl: BULLET_TTL,
        },
    )
}

/// Fragments of a destroyed asteroid, plus a bonus now and then
fn split(body: &Body, asteroid: &Asteroid) -> Vec<Entity> {
    let mut pieces = Vec::new();
    let radius = asteroid.radius / 2.0;
    if radius >= MIN_ASTEROID_RADIUS {
        for sign in [-1.0, 1.0] {
            pieces.push(Entity::Asteroid(
                Body::new(0, body.x, body.y).with_velocity(body.dy * sign, -body.dx * sign),
                Asteroid {
                    radius,
                    spin: -asteroid.spin,
                },
            ));
        }
    }
    if body.id % 5 == 0 {
        pieces.push(Entity::Bonus(
            Body::new(0, body.x, body.y),
            Bonus {
                kind: 1 + (body.id % 3) as i32,
                ttl: BONUS_TTL,
            },
        ));
    }
    pieces
}

impl Simulation for Arena {
    fn tick(&mut self, timestep: u64) {
        let mut spawns = self.update_controls();
        self.apply_gravity();
        self.registry.for_each_mut(|entity| entity.body_mut().integrate());
        self.resolve_collisions(&mut spawns);

        for entity in spawns {
            self.insert_new(entity);
        }

        if timestep % 600 == 0 {
            debug!("Tick {}: {} entities", timestep, self.registry.len());
        }
    }

    fn apply_action(&mut self, code: i32, actor: EntityId) {
        let pressed = code > 0;
        let key = code.abs();

        if !self.registry.contains(actor) {
            debug!("Action {} for unknown entity {} ignored", code, actor);
            return;
        }

        match key {
            KEY_MISSILE if pressed => self.launch_missile(actor),
            KEY_STATION if pressed => self.deploy_station(actor),
            KEY_LEFT | KEY_RIGHT | KEY_THRUST | KEY_FIRE => {
                self.registry.update(actor, |entity| {
                    let Some(ship) = entity.as_ship_mut() else {
                        return;
                    };
                    let direction = if key == KEY_LEFT { -1 } else { 1 };
                    match key {
                        KEY_THRUST => ship.thrust = pressed,
                        KEY_FIRE => ship.firing = pressed,
                        _ if pressed => ship.turn = direction,
                        _ if ship.turn == direction => ship.turn = 0,
                        _ => {}
                    }
                });
            }
            _ => {}
        }
    }
}
