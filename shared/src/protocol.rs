//! Datagram opcodes and payloads
//!
//! Every datagram starts with a 4-byte big-endian opcode. Client-to-server and
//! server-to-client opcodes are separate enumerations that share numbering, so
//! a datagram must always be decoded with the enumeration for its direction.
//!
//! Decoding is all-or-nothing: a datagram either yields a complete message or
//! a [`FramingError`], and nothing is touched in between.

use crate::codec::{self, Counted};
use crate::entity::{Entity, EntityId};
use crate::error::FramingError;
use crate::scheduler::Action;
use serde::{Deserialize, Serialize};

/// Messages a client sends to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// 0: join the game under `name`
    Connect { name: String },
    /// 1: key press (positive) or release (negative)
    Keystroke { code: i32 },
    /// 2: leave the game
    Quit,
    /// 3: the client's current tick, sent while it waits for the server
    Clock { tick: u64 },
}

impl ClientMessage {
    pub const OPCODE_COUNT: i32 = 4;

    pub fn encode(&self) -> Result<Vec<u8>, FramingError> {
        codec::encode(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, FramingError> {
        check_opcode(bytes, Self::OPCODE_COUNT)?;
        codec::decode(bytes)
    }
}

/// Messages the server sends to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// 0: complete world state plus the id of the receiver's new ship
    FullUpdate {
        snapshot: WorldSnapshot,
        assigned_id: EntityId,
    },
    /// 1: authoritative position and velocity of one entity
    PlayerUpdatePosition {
        id: EntityId,
        x: f64,
        y: f64,
        dx: f64,
        dy: f64,
    },
    /// 2: a new player ship, tagged and serialized like any registry record
    PlayerJoined { entity: Entity },
    /// 3: a player's ship left the game
    PlayerQuit { id: EntityId },
    /// 4: simulation paused or resumed
    Pause { paused: bool },
    /// 5: the server is shutting down
    ServerQuitting,
    /// 6: input originating on another node, already bound to its tick
    Action { action: Action },
    /// 7: the server's current tick
    Clock { tick: u64 },
}

impl ServerMessage {
    pub const OPCODE_COUNT: i32 = 8;

    pub fn encode(&self) -> Result<Vec<u8>, FramingError> {
        codec::encode(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, FramingError> {
        check_opcode(bytes, Self::OPCODE_COUNT)?;
        codec::decode(bytes)
    }
}

/// Reads the leading opcode without decoding the payload
pub fn opcode(bytes: &[u8]) -> Result<i32, FramingError> {
    let head: [u8; 4] = bytes
        .get(..4)
        .and_then(|head| head.try_into().ok())
        .ok_or(FramingError::Truncated)?;
    Ok(i32::from_be_bytes(head))
}

fn check_opcode(bytes: &[u8], count: i32) -> Result<i32, FramingError> {
    let op = opcode(bytes)?;
    if (0..count).contains(&op) {
        Ok(op)
    } else {
        Err(FramingError::UnknownOpcode(op))
    }
}

/// Everything a joining node needs to resume the simulation
///
/// Layout: `tick, paused, next_id`, then the entities and the pending
/// actions, each as an `i32` count followed by records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub tick: u64,
    pub paused: bool,
    pub next_id: EntityId,
    pub entities: Counted<Entity>,
    pub actions: Counted<Action>,
}

impl WorldSnapshot {
    pub fn empty() -> Self {
        Self {
            tick: 0,
            paused: false,
            next_id: 1,
            entities: Counted::default(),
            actions: Counted::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::ship_spawn;

    #[test]
    fn test_connect_layout() {
        let bytes = ClientMessage::Connect {
            name: "Nova".to_string(),
        }
        .encode()
        .unwrap();

        assert_eq!(&bytes[0..4], &0i32.to_be_bytes());
        assert_eq!(&bytes[4..12], &4u64.to_be_bytes());
        assert_eq!(&bytes[12..], b"Nova");
    }

    #[test]
    fn test_keystroke_layout() {
        let bytes = ClientMessage::Keystroke { code: -37 }.encode().unwrap();
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[0..4], &1i32.to_be_bytes());
        assert_eq!(&bytes[4..8], &(-37i32).to_be_bytes());
    }

    #[test]
    fn test_position_update_layout() {
        let bytes = ServerMessage::PlayerUpdatePosition {
            id: 1,
            x: 1.0,
            y: 2.0,
            dx: 3.0,
            dy: 4.0,
        }
        .encode()
        .unwrap();

        assert_eq!(bytes.len(), 4 + 4 + 32);
        assert_eq!(&bytes[0..4], &1i32.to_be_bytes());
        assert_eq!(&bytes[4..8], &1i32.to_be_bytes());
        assert_eq!(&bytes[32..40], &4.0f64.to_be_bytes());
    }

    #[test]
    fn test_control_messages_layout() {
        let pause = ServerMessage::Pause { paused: true }.encode().unwrap();
        assert_eq!(pause, vec![0, 0, 0, 4, 1]);

        let quitting = ServerMessage::ServerQuitting.encode().unwrap();
        assert_eq!(quitting, vec![0, 0, 0, 5]);

        let quit = ServerMessage::PlayerQuit { id: 1 }.encode().unwrap();
        assert_eq!(quit, vec![0, 0, 0, 3, 0, 0, 0, 1]);
    }

    #[test]
    fn test_player_joined_carries_type_tag() {
        let bytes = ServerMessage::PlayerJoined {
            entity: ship_spawn(2, "Vega"),
        }
        .encode()
        .unwrap();

        assert_eq!(&bytes[0..4], &2i32.to_be_bytes());
        assert_eq!(&bytes[4..8], &0i32.to_be_bytes());
        assert_eq!(&bytes[8..12], &2i32.to_be_bytes());
    }

    #[test]
    fn test_full_update_empty_registry() {
        let message = ServerMessage::FullUpdate {
            snapshot: WorldSnapshot::empty(),
            assigned_id: 1,
        };
        let bytes = message.encode().unwrap();

        // opcode, tick, paused, next_id, entity count, action count, id
        assert_eq!(bytes.len(), 4 + 8 + 1 + 4 + 4 + 4 + 4);
        assert_eq!(&bytes[17..21], &0i32.to_be_bytes());
        assert_eq!(&bytes[25..29], &1i32.to_be_bytes());
        assert_eq!(ServerMessage::decode(&bytes).unwrap(), message);
    }

    #[test]
    fn test_full_update_with_state() {
        let message = ServerMessage::FullUpdate {
            snapshot: WorldSnapshot {
                tick: 600,
                paused: true,
                next_id: 3,
                entities: Counted(vec![ship_spawn(1, "Host"), ship_spawn(2, "Vega")]),
                actions: Counted(vec![Action::new(1, 38, 601)]),
            },
            assigned_id: 2,
        };

        let bytes = message.encode().unwrap();
        assert_eq!(ServerMessage::decode(&bytes).unwrap(), message);
    }

    #[test]
    fn test_unknown_opcode_rejected() {
        let mut bytes = ClientMessage::Keystroke { code: 37 }.encode().unwrap();
        bytes[0..4].copy_from_slice(&9i32.to_be_bytes());
        assert_eq!(
            ClientMessage::decode(&bytes).unwrap_err(),
            FramingError::UnknownOpcode(9)
        );

        bytes[0..4].copy_from_slice(&(-1i32).to_be_bytes());
        assert_eq!(
            ClientMessage::decode(&bytes).unwrap_err(),
            FramingError::UnknownOpcode(-1)
        );
    }

    #[test]
    fn test_directions_are_not_interchangeable() {
        let bytes = ServerMessage::Clock { tick: 5 }.encode().unwrap();
        assert_eq!(
            ClientMessage::decode(&bytes).unwrap_err(),
            FramingError::UnknownOpcode(7)
        );
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let bytes = ClientMessage::Keystroke { code: 37 }.encode().unwrap();
        assert_eq!(
            ClientMessage::decode(&bytes[..6]).unwrap_err(),
            FramingError::Truncated
        );
        assert_eq!(
            ClientMessage::decode(&bytes[..2]).unwrap_err(),
            FramingError::Truncated
        );
        assert_eq!(ClientMessage::decode(&[]).unwrap_err(), FramingError::Truncated);
    }

    #[test]
    fn test_invalid_utf8_name_rejected() {
        let mut bytes = ClientMessage::Connect {
            name: "ab".to_string(),
        }
        .encode()
        .unwrap();
        bytes[12] = 0xFF;
        assert!(matches!(
            ClientMessage::decode(&bytes),
            Err(FramingError::Malformed(_))
        ));
    }
}
