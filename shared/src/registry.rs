//! Canonical id-keyed table of every live entity
//!
//! The registry is shared between the tick loop and the network receive
//! context, so all access goes through a short-lived lock. Iteration order is
//! by id on every node, which keeps the arena rules deterministic.
//!
//! Besides the primary table it keeps derived indices (ships, asteroids,
//! black holes, projectile owners). These are maintained on every add and
//! remove and are never consulted as a source of truth.

use crate::codec::{self, Counted};
use crate::entity::{Entity, EntityId, EntityType};
use crate::error::FramingError;
use log::debug;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default)]
struct Tables {
    by_id: BTreeMap<EntityId, Entity>,
    ships: BTreeSet<EntityId>,
    asteroids: BTreeSet<EntityId>,
    black_holes: BTreeSet<EntityId>,
    projectile_owners: BTreeSet<EntityId>,
    next_id: EntityId,
}

impl Tables {
    fn index(&mut self, entity: &Entity) {
        let id = entity.id();
        match entity.entity_type() {
            EntityType::Ship => {
                self.ships.insert(id);
            }
            EntityType::Asteroid => {
                self.asteroids.insert(id);
            }
            EntityType::BlackHole => {
                self.black_holes.insert(id);
            }
            _ => {}
        }
        if entity.fires_projectiles() {
            self.projectile_owners.insert(id);
        }
    }

    fn unindex(&mut self, id: EntityId) {
        self.ships.remove(&id);
        self.asteroids.remove(&id);
        self.black_holes.remove(&id);
        self.projectile_owners.remove(&id);
    }

    fn insert(&mut self, entity: Entity) -> Option<Entity> {
        let id = entity.id();
        // The replaced entity may have been of another kind.
        self.unindex(id);
        self.index(&entity);
        self.next_id = self.next_id.max(id.saturating_add(1));
        self.by_id.insert(id, entity)
    }
}

/// Thread-safe entity table with categorized views
#[derive(Debug)]
pub struct Registry {
    tables: RwLock<Tables>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Creates an empty registry; the first allocated id is 1
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables {
                next_id: 1,
                ..Tables::default()
            }),
        }
    }

    /// Reserves a fresh id
    pub fn allocate_id(&self) -> EntityId {
        let mut tables = self.tables.write();
        let id = tables.next_id;
        tables.next_id += 1;
        id
    }

    /// The id the next call to [`Registry::allocate_id`] will return
    pub fn next_id(&self) -> EntityId {
        self.tables.read().next_id
    }

    /// Inserts an entity, returning whatever previously held its id
    pub fn add(&self, entity: Entity) -> Option<Entity> {
        self.tables.write().insert(entity)
    }

    pub fn remove(&self, id: EntityId) -> Option<Entity> {
        let mut tables = self.tables.write();
        let removed = tables.by_id.remove(&id);
        if removed.is_some() {
            tables.unindex(id);
        }
        removed
    }

    pub fn get(&self, id: EntityId) -> Option<Entity> {
        self.tables.read().by_id.get(&id).cloned()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.tables.read().by_id.contains_key(&id)
    }

    /// Runs `f` against the entity with the given id, if present
    ///
    /// Only the entity's fields can change here; its id and kind are fixed
    /// once it is in the table.
    pub fn update<R>(&self, id: EntityId, f: impl FnOnce(&mut Entity) -> R) -> Option<R> {
        let mut tables = self.tables.write();
        let entity = tables.by_id.get_mut(&id)?;
        let before = (entity.id(), entity.entity_type());
        let result = f(entity);
        debug_assert_eq!(before, (entity.id(), entity.entity_type()));
        Some(result)
    }

    /// Runs `f` against every entity in id order
    pub fn for_each_mut(&self, mut f: impl FnMut(&mut Entity)) {
        let mut tables = self.tables.write();
        for entity in tables.by_id.values_mut() {
            f(entity);
        }
    }

    pub fn len(&self) -> usize {
        self.tables.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.read().by_id.is_empty()
    }

    pub fn ids(&self) -> Vec<EntityId> {
        self.tables.read().by_id.keys().copied().collect()
    }

    pub fn ships(&self) -> Vec<EntityId> {
        self.tables.read().ships.iter().copied().collect()
    }

    pub fn asteroids(&self) -> Vec<EntityId> {
        self.tables.read().asteroids.iter().copied().collect()
    }

    pub fn black_holes(&self) -> Vec<EntityId> {
        self.tables.read().black_holes.iter().copied().collect()
    }

    /// Every entity able to fire projectiles (ships and stations)
    pub fn projectile_owners(&self) -> Vec<EntityId> {
        self.tables.read().projectile_owners.iter().copied().collect()
    }

    /// All entities cloned out in id order
    pub fn entities(&self) -> Vec<Entity> {
        self.tables.read().by_id.values().cloned().collect()
    }

    /// Drops every entity and resets id allocation
    pub fn clear(&self) {
        let mut tables = self.tables.write();
        *tables = Tables {
            next_id: 1,
            ..Tables::default()
        };
    }

    /// Replaces the whole content with `entities`
    ///
    /// `next_id` is raised past the largest id present if needed.
    pub fn replace(&self, entities: Vec<Entity>, next_id: EntityId) {
        let mut tables = self.tables.write();
        *tables = Tables {
            next_id: next_id.max(1),
            ..Tables::default()
        };
        for entity in entities {
            tables.insert(entity);
        }
        debug!(
            "Registry rebuilt with {} entities, next id {}",
            tables.by_id.len(),
            tables.next_id
        );
    }

    /// Serializes every entity as `count:i32` followed by the records
    pub fn serialize(&self) -> Result<Vec<u8>, FramingError> {
        codec::encode(&Counted(self.entities()))
    }

    /// Rebuilds a registry from bytes produced by [`Registry::serialize`]
    pub fn deserialize(bytes: &[u8]) -> Result<Registry, FramingError> {
        let Counted(entities) = codec::decode::<Counted<Entity>>(bytes)?;
        let registry = Registry::new();
        registry.replace(entities, 1);
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{ship_spawn, Asteroid, BlackHole, Body, Bullet, Station};

    fn asteroid(id: EntityId) -> Entity {
        Entity::Asteroid(
            Body::new(id, 10.0, 10.0),
            Asteroid {
                radius: 20.0,
                spin: 0.0,
            },
        )
    }

    #[test]
    fn test_allocate_ids_are_sequential() {
        let registry = Registry::new();
        assert_eq!(registry.allocate_id(), 1);
        assert_eq!(registry.allocate_id(), 2);
        assert_eq!(registry.next_id(), 3);
    }

    #[test]
    fn test_add_lookup_remove() {
        let registry = Registry::new();
        let ship = ship_spawn(1, "Nova");

        assert!(registry.add(ship.clone()).is_none());
        assert_eq!(registry.get(1), Some(ship.clone()));
        assert_eq!(registry.ships(), vec![1]);
        assert_eq!(registry.projectile_owners(), vec![1]);

        assert_eq!(registry.remove(1), Some(ship));
        assert_eq!(registry.get(1), None);
        assert!(registry.ships().is_empty());
        assert!(registry.projectile_owners().is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_clears_every_index() {
        let registry = Registry::new();
        registry.add(asteroid(1));
        registry.add(Entity::BlackHole(
            Body::new(2, 0.0, 0.0),
            BlackHole {
                mass: 1.0,
                radius: 1.0,
            },
        ));
        registry.add(Entity::Station(
            Body::new(3, 0.0, 0.0),
            Station {
                owner: 9,
                cooldown: 0,
                hull: 10,
            },
        ));

        for id in [1, 2, 3] {
            registry.remove(id);
            assert!(!registry.ids().contains(&id));
            assert!(!registry.asteroids().contains(&id));
            assert!(!registry.black_holes().contains(&id));
            assert!(!registry.projectile_owners().contains(&id));
        }
    }

    #[test]
    fn test_remove_missing_is_none() {
        let registry = Registry::new();
        assert!(registry.remove(77).is_none());
    }

    #[test]
    fn test_add_raises_next_id() {
        let registry = Registry::new();
        registry.add(asteroid(10));
        assert_eq!(registry.allocate_id(), 11);
    }

    #[test]
    fn test_replace_same_id_reindexes() {
        let registry = Registry::new();
        registry.add(asteroid(4));
        registry.add(ship_spawn(4, "swap"));

        assert!(registry.asteroids().is_empty());
        assert_eq!(registry.ships(), vec![4]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_update_changes_fields() {
        let registry = Registry::new();
        registry.add(ship_spawn(1, "Nova"));

        let applied = registry.update(1, |entity| entity.body_mut().set_motion(1.0, 2.0, 3.0, 4.0));
        assert!(applied.is_some());
        assert!(registry.update(2, |_| ()).is_none());

        let body = *registry.get(1).unwrap().body();
        assert_eq!((body.x, body.y, body.dx, body.dy), (1.0, 2.0, 3.0, 4.0));
    }

    #[test]
    fn test_serialize_round_trip() {
        let registry = Registry::new();
        registry.add(ship_spawn(1, "Nova"));
        registry.add(asteroid(2));
        registry.add(Entity::Bullet(
            Body::new(3, 1.0, 1.0).with_velocity(2.0, 2.0),
            Bullet { owner: 1, ttl: 5 },
        ));

        let bytes = registry.serialize().unwrap();
        assert_eq!(&bytes[0..4], &3i32.to_be_bytes());

        let copy = Registry::deserialize(&bytes).unwrap();
        assert_eq!(copy.entities(), registry.entities());
        assert_eq!(copy.ships(), vec![1]);
        assert_eq!(copy.asteroids(), vec![2]);
        assert_eq!(copy.next_id(), 4);
    }

    #[test]
    fn test_empty_registry_serializes_to_zero_count() {
        let bytes = Registry::new().serialize().unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_deserialize_garbage_fails() {
        let registry = Registry::new();
        registry.add(asteroid(2));
        let mut bytes = registry.serialize().unwrap();
        bytes[4..8].copy_from_slice(&99i32.to_be_bytes());

        assert!(Registry::deserialize(&bytes).is_err());
        assert!(Registry::deserialize(&bytes[..6]).is_err());
    }

    #[test]
    fn test_clear_resets() {
        let registry = Registry::new();
        registry.add(asteroid(5));
        registry.clear();

        assert!(registry.is_empty());
        assert!(registry.asteroids().is_empty());
        assert_eq!(registry.next_id(), 1);
    }
}
