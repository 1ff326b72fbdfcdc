//! Synchronization core shared by the server and client nodes
//!
//! Two nodes run the same deterministic simulation and only exchange input.
//! Input becomes an [`Action`] bound to a future tick, travels over UDP, and is
//! replayed by each node's [`ActionScheduler`] on that tick. A node joining a
//! running game is bootstrapped from a [`WorldSnapshot`].

pub mod arena;
pub mod codec;
pub mod endpoint;
pub mod entity;
pub mod error;
pub mod input;
pub mod protocol;
pub mod registry;
pub mod scheduler;
pub mod transport;
pub mod world;

use std::time::Duration;

pub use arena::{Arena, Simulation};
pub use endpoint::Endpoint;
pub use entity::{ship_spawn, Body, Entity, EntityId, EntityType};
pub use error::{DesyncWarning, FramingError, NetError};
pub use input::{Command, InputManager};
pub use protocol::{ClientMessage, ServerMessage, WorldSnapshot};
pub use registry::Registry;
pub use scheduler::{Action, ActionScheduler, TickReport};
pub use transport::Transport;
pub use world::World;

/// Ticks between an input happening and it being applied
pub const LOOKAHEAD: u64 = 2;
/// How far a client may run ahead of the last server tick it heard
pub const MAX_CLOCK_DRIFT: u64 = 2;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_TICK_RATE: u32 = 60;
/// Silence after which the remote node is considered gone
pub const LIVENESS_WINDOW: Duration = Duration::from_secs(5);

pub const ARENA_WIDTH: f64 = 800.0;
pub const ARENA_HEIGHT: f64 = 600.0;
pub const SHIP_HULL: i32 = 100;

pub const KEY_FIRE: i32 = 32;
pub const KEY_LEFT: i32 = 37;
pub const KEY_THRUST: i32 = 38;
pub const KEY_RIGHT: i32 = 39;
pub const KEY_MISSILE: i32 = 77;
pub const KEY_STATION: i32 = 83;
