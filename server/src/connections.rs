//! Connection records for every remote endpoint the server has heard from
//!
//! A record is created the first time an unknown endpoint sends anything
//! (`Registered`) and becomes `InGame` once its CONNECT has been answered and a
//! ship is bound to it. Records go away on QUIT, on liveness timeout and on
//! shutdown.
//!
//! The table is owned by the server's tick loop and never shared.

use log::info;
use shared::{Endpoint, EntityId};
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Registered,
    InGame(EntityId),
}

/// One remote endpoint
#[derive(Debug)]
pub struct Connection {
    pub endpoint: Endpoint,
    /// Ship controlled from this endpoint, once joined
    pub bound_entity: Option<EntityId>,
    pub name: Option<String>,
    /// Last time any datagram arrived from this endpoint
    pub last_seen: Instant,
}

impl Connection {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            bound_entity: None,
            name: None,
            last_seen: Instant::now(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        match self.bound_entity {
            Some(id) => ConnectionState::InGame(id),
            None => ConnectionState::Registered,
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Returns true if nothing has been heard within `timeout`
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// All known endpoints plus the player capacity limit
pub struct ConnectionTable {
    connections: HashMap<Endpoint, Connection>,
    max_players: usize,
}

impl ConnectionTable {
    pub fn new(max_players: usize) -> Self {
        Self {
            connections: HashMap::new(),
            max_players,
        }
    }

    /// Records activity from `endpoint`, creating a record if it is new
    ///
    /// Returns true when the endpoint was unknown until now.
    pub fn register(&mut self, endpoint: Endpoint) -> bool {
        match self.connections.get_mut(&endpoint) {
            Some(connection) => {
                connection.touch();
                false
            }
            None => {
                info!("Registered new endpoint {}", endpoint);
                self.connections.insert(endpoint, Connection::new(endpoint));
                true
            }
        }
    }

    pub fn get(&self, endpoint: &Endpoint) -> Option<&Connection> {
        self.connections.get(endpoint)
    }

    pub fn state(&self, endpoint: &Endpoint) -> Option<ConnectionState> {
        self.connections.get(endpoint).map(Connection::state)
    }

    /// Whether another player may join
    ///
    /// `joining` is not counted against the limit when it already holds a
    /// ship, so a reconnect from the same endpoint is always admitted.
    pub fn has_capacity(&self, joining: &Endpoint) -> bool {
        let others = self
            .connections
            .values()
            .filter(|c| c.bound_entity.is_some() && c.endpoint != *joining)
            .count();
        others < self.max_players
    }

    /// Binds a ship to a registered endpoint, moving it to `InGame`
    pub fn bind(&mut self, endpoint: &Endpoint, entity: EntityId, name: &str) -> bool {
        match self.connections.get_mut(endpoint) {
            Some(connection) => {
                connection.bound_entity = Some(entity);
                connection.name = Some(name.to_string());
                info!("{} joined as '{}' with ship {}", endpoint, name, entity);
                true
            }
            None => false,
        }
    }

    /// Releases the bound ship, returning the record to `Registered`
    pub fn unbind(&mut self, endpoint: &Endpoint) -> Option<EntityId> {
        self.connections
            .get_mut(endpoint)
            .and_then(|connection| connection.bound_entity.take())
    }

    pub fn remove(&mut self, endpoint: &Endpoint) -> Option<Connection> {
        let removed = self.connections.remove(endpoint);
        if let Some(connection) = &removed {
            info!(
                "Dropped connection {} (ship {:?})",
                connection.endpoint, connection.bound_entity
            );
        }
        removed
    }

    pub fn find_by_entity(&self, entity: EntityId) -> Option<Endpoint> {
        self.connections
            .values()
            .find(|c| c.bound_entity == Some(entity))
            .map(|c| c.endpoint)
    }

    /// Endpoints of every `InGame` record with their ship ids
    pub fn in_game(&self) -> Vec<(Endpoint, EntityId)> {
        let mut peers: Vec<(Endpoint, EntityId)> = self
            .connections
            .values()
            .filter_map(|c| c.bound_entity.map(|id| (c.endpoint, id)))
            .collect();
        peers.sort_by_key(|(_, id)| *id);
        peers
    }

    /// Removes records silent for longer than `timeout`
    ///
    /// The removed records are returned so their ships can be cleaned up.
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<Connection> {
        let timed_out: Vec<Endpoint> = self
            .connections
            .values()
            .filter(|c| c.is_timed_out(timeout))
            .map(|c| c.endpoint)
            .collect();

        timed_out
            .iter()
            .filter_map(|endpoint| self.remove(endpoint))
            .collect()
    }

    /// Empties the table, returning every record
    pub fn drain(&mut self) -> Vec<Connection> {
        self.connections.drain().map(|(_, c)| c).collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn endpoint(port: u16) -> Endpoint {
        Endpoint::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    #[test]
    fn test_register_creates_once() {
        let mut table = ConnectionTable::new(1);

        assert!(table.register(endpoint(9000)));
        assert!(!table.register(endpoint(9000)));
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.state(&endpoint(9000)),
            Some(ConnectionState::Registered)
        );
    }

    #[test]
    fn test_bind_and_unbind() {
        let mut table = ConnectionTable::new(1);
        table.register(endpoint(9000));

        assert!(table.bind(&endpoint(9000), 1, "Nova"));
        assert_eq!(table.state(&endpoint(9000)), Some(ConnectionState::InGame(1)));
        assert_eq!(table.find_by_entity(1), Some(endpoint(9000)));
        assert_eq!(table.get(&endpoint(9000)).unwrap().name.as_deref(), Some("Nova"));

        assert_eq!(table.unbind(&endpoint(9000)), Some(1));
        assert_eq!(
            table.state(&endpoint(9000)),
            Some(ConnectionState::Registered)
        );
        assert_eq!(table.find_by_entity(1), None);
    }

    #[test]
    fn test_bind_unknown_endpoint_fails() {
        let mut table = ConnectionTable::new(1);
        assert!(!table.bind(&endpoint(9000), 1, "Nova"));
        assert!(table.is_empty());
    }

    #[test]
    fn test_capacity_counts_only_players() {
        let mut table = ConnectionTable::new(1);
        table.register(endpoint(9000));
        table.register(endpoint(9001));
        assert!(table.has_capacity(&endpoint(9000)));

        table.bind(&endpoint(9000), 1, "Nova");
        assert!(!table.has_capacity(&endpoint(9001)));
        assert!(table.has_capacity(&endpoint(9000)));
    }

    #[test]
    fn test_in_game_sorted_by_ship() {
        let mut table = ConnectionTable::new(4);
        for (port, id) in [(9002, 7), (9000, 3), (9001, 5)] {
            table.register(endpoint(port));
            table.bind(&endpoint(port), id, "p");
        }
        table.register(endpoint(9003));

        let ids: Vec<EntityId> = table.in_game().into_iter().map(|(_, id)| id).collect();
        assert_eq!(ids, vec![3, 5, 7]);
    }

    #[test]
    fn test_timeouts_remove_silent_records() {
        let mut table = ConnectionTable::new(2);
        table.register(endpoint(9000));
        table.register(endpoint(9001));
        table.bind(&endpoint(9000), 1, "Nova");

        table
            .connections
            .get_mut(&endpoint(9000))
            .unwrap()
            .last_seen = Instant::now() - Duration::from_secs(10);

        let removed = table.check_timeouts(Duration::from_secs(5));
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].bound_entity, Some(1));
        assert_eq!(table.len(), 1);
        assert!(table.get(&endpoint(9001)).is_some());
    }

    #[test]
    fn test_connection_timeout() {
        let mut connection = Connection::new(endpoint(9000));
        assert!(!connection.is_timed_out(Duration::from_secs(1)));

        connection.last_seen = Instant::now() - Duration::from_secs(2);
        assert!(connection.is_timed_out(Duration::from_secs(1)));

        connection.touch();
        assert!(!connection.is_timed_out(Duration::from_secs(1)));
    }
}
