//! Replicable simulation entities
//!
//! Every entity shares a common [`Body`] (id, position, velocity) followed by
//! fields specific to its kind. The kinds form a closed sum type; the variant
//! index doubles as the `type_tag` written in front of every record, so the
//! wire layout of a record is `{type_tag, id, x, y, dx, dy, kind fields...}`.
//!
//! Entities never hold references to each other. Owners, targets and the like
//! are stored as [`EntityId`] and resolved through the registry when needed.

use crate::{ARENA_HEIGHT, ARENA_WIDTH, SHIP_HULL};
use serde::{Deserialize, Serialize};

/// Process-wide unique entity identifier, never reused while referenced
pub type EntityId = u32;

/// Position and velocity shared by every entity kind
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Body {
    pub id: EntityId,
    pub x: f64,
    pub y: f64,
    pub dx: f64,
    pub dy: f64,
}

impl Body {
    pub fn new(id: EntityId, x: f64, y: f64) -> Self {
        Self {
            id,
            x,
            y,
            dx: 0.0,
            dy: 0.0,
        }
    }

    pub fn with_velocity(mut self, dx: f64, dy: f64) -> Self {
        self.dx = dx;
        self.dy = dy;
        self
    }

    /// Overwrites position and velocity, keeping the id
    pub fn set_motion(&mut self, x: f64, y: f64, dx: f64, dy: f64) {
        self.x = x;
        self.y = y;
        self.dx = dx;
        self.dy = dy;
    }

    /// Advances one step and wraps around the arena edges
    pub fn integrate(&mut self) {
        self.x = (self.x + self.dx).rem_euclid(ARENA_WIDTH);
        self.y = (self.y + self.dy).rem_euclid(ARENA_HEIGHT);
    }

    pub fn distance_squared(&self, other: &Body) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        dx * dx + dy * dy
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ship {
    pub name: String,
    pub heading: f64,
    pub thrust: bool,
    /// -1 turning left, 1 turning right, 0 steady
    pub turn: i32,
    pub firing: bool,
    pub cooldown: i32,
    pub hull: i32,
    pub score: i32,
}

impl Ship {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            heading: -std::f64::consts::FRAC_PI_2,
            thrust: false,
            turn: 0,
            firing: false,
            cooldown: 0,
            hull: SHIP_HULL,
            score: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Asteroid {
    pub radius: f64,
    pub spin: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bullet {
    pub owner: EntityId,
    pub ttl: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Missile {
    pub owner: EntityId,
    pub target: Option<EntityId>,
    pub ttl: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub owner: EntityId,
    pub cooldown: i32,
    pub hull: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlackHole {
    pub mass: f64,
    pub radius: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bonus {
    pub kind: i32,
    pub ttl: i32,
}

/// Type tags as written on the wire, in variant order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum EntityType {
    Ship = 0,
    Asteroid = 1,
    Bullet = 2,
    Missile = 3,
    Station = 4,
    BlackHole = 5,
    Bonus = 6,
}

/// A replicable simulation entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Entity {
    Ship(Body, Ship),
    Asteroid(Body, Asteroid),
    Bullet(Body, Bullet),
    Missile(Body, Missile),
    Station(Body, Station),
    BlackHole(Body, BlackHole),
    Bonus(Body, Bonus),
}

impl Entity {
    pub fn body(&self) -> &Body {
        match self {
            Entity::Ship(body, _)
            | Entity::Asteroid(body, _)
            | Entity::Bullet(body, _)
            | Entity::Missile(body, _)
            | Entity::Station(body, _)
            | Entity::BlackHole(body, _)
            | Entity::Bonus(body, _) => body,
        }
    }

    pub fn body_mut(&mut self) -> &mut Body {
        match self {
            Entity::Ship(body, _)
            | Entity::Asteroid(body, _)
            | Entity::Bullet(body, _)
            | Entity::Missile(body, _)
            | Entity::Station(body, _)
            | Entity::BlackHole(body, _)
            | Entity::Bonus(body, _) => body,
        }
    }

    pub fn id(&self) -> EntityId {
        self.body().id
    }

    pub fn entity_type(&self) -> EntityType {
        match self {
            Entity::Ship(..) => EntityType::Ship,
            Entity::Asteroid(..) => EntityType::Asteroid,
            Entity::Bullet(..) => EntityType::Bullet,
            Entity::Missile(..) => EntityType::Missile,
            Entity::Station(..) => EntityType::Station,
            Entity::BlackHole(..) => EntityType::BlackHole,
            Entity::Bonus(..) => EntityType::Bonus,
        }
    }

    pub fn type_tag(&self) -> i32 {
        self.entity_type() as i32
    }

    /// Whether this entity can spawn projectiles of its own
    pub fn fires_projectiles(&self) -> bool {
        matches!(self, Entity::Ship(..) | Entity::Station(..))
    }

    /// The entity that fired this one, if it is a projectile
    pub fn owner(&self) -> Option<EntityId> {
        match self {
            Entity::Bullet(_, bullet) => Some(bullet.owner),
            Entity::Missile(_, missile) => Some(missile.owner),
            Entity::Station(_, station) => Some(station.owner),
            _ => None,
        }
    }

    /// Collision radius used by the arena rules
    pub fn radius(&self) -> f64 {
        match self {
            Entity::Ship(..) => 12.0,
            Entity::Asteroid(_, asteroid) => asteroid.radius,
            Entity::Bullet(..) => 2.0,
            Entity::Missile(..) => 4.0,
            Entity::Station(..) => 20.0,
            Entity::BlackHole(_, hole) => hole.radius,
            Entity::Bonus(..) => 8.0,
        }
    }

    pub fn as_ship(&self) -> Option<&Ship> {
        match self {
            Entity::Ship(_, ship) => Some(ship),
            _ => None,
        }
    }

    pub fn as_ship_mut(&mut self) -> Option<&mut Ship> {
        match self {
            Entity::Ship(_, ship) => Some(ship),
            _ => None,
        }
    }
}

/// Deterministic spawn point for a player ship
///
/// Both nodes derive the same position from the id alone, so a joining ship
/// can be materialised locally without shipping its record.
pub fn ship_spawn(id: EntityId, name: impl Into<String>) -> Entity {
    let x = 100.0 + (f64::from(id) * 160.0) % (ARENA_WIDTH - 200.0);
    let y = ARENA_HEIGHT / 2.0;
    Entity::Ship(Body::new(id, x, y), Ship::new(name))
}
