//! Error taxonomy shared by the transport, protocol and session layers

use crate::entity::EntityId;
use crate::scheduler::Action;
use std::fmt;
use std::io;
use thiserror::Error;

/// Failures surfaced by the networking layer
#[derive(Debug, Error)]
pub enum NetError {
    /// The socket could not be bound; fatal to this node's networking
    #[error("port {port} unavailable: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    /// A datagram could not be decoded; the datagram is dropped
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// A message referenced an entity the local registry does not hold
    #[error("no entity with id {0}")]
    UnknownPeer(EntityId),

    /// Nothing has been heard from the remote node within the liveness window
    #[error("host unreachable")]
    HostUnreachable,

    /// The server announced it is shutting down
    #[error("host left the game")]
    HostLeft,

    /// The receive loop hit a socket error and stopped
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
}

/// Reasons a datagram or snapshot failed to decode
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FramingError {
    #[error("datagram truncated")]
    Truncated,

    #[error("unknown opcode {0}")]
    UnknownOpcode(i32),

    #[error("malformed payload: {0}")]
    Malformed(String),
}

impl From<bincode::Error> for FramingError {
    fn from(err: bincode::Error) -> Self {
        match *err {
            bincode::ErrorKind::Io(ref io_err) if io_err.kind() == io::ErrorKind::UnexpectedEof => {
                FramingError::Truncated
            }
            other => FramingError::Malformed(other.to_string()),
        }
    }
}

/// An action whose due tick had already passed when it was looked at
///
/// The action is never applied. Receiving one means the two nodes have
/// diverged for at least that input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DesyncWarning {
    pub action: Action,
    pub now: u64,
}

impl fmt::Display for DesyncWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "action {} for entity {} was due at tick {} but clock is at {}",
            self.action.command, self.action.actor, self.action.due_tick, self.now
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_mentions_port() {
        let err = NetError::Bind {
            port: 8080,
            source: io::Error::new(io::ErrorKind::AddrInUse, "address in use"),
        };

        assert!(err.to_string().contains("port 8080 unavailable"));
    }

    #[test]
    fn test_eof_maps_to_truncated() {
        let eof: bincode::Error = Box::new(bincode::ErrorKind::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "eof",
        )));
        assert_eq!(FramingError::from(eof), FramingError::Truncated);

        let other: bincode::Error = Box::new(bincode::ErrorKind::InvalidBoolEncoding(7));
        assert!(matches!(FramingError::from(other), FramingError::Malformed(_)));
    }

    #[test]
    fn test_desync_display() {
        let warning = DesyncWarning {
            action: Action::new(3, 37, 10),
            now: 12,
        };

        assert_eq!(
            warning.to_string(),
            "action 37 for entity 3 was due at tick 10 but clock is at 12"
        );
    }
}
