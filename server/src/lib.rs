//! # Arcade Server Library
//!
//! The authoritative node of a two-party arcade game. It owns the canonical
//! world, admits a remote player, and keeps that player's simulation in step
//! with its own by exchanging input rather than state.
//!
//! ## Core Responsibilities
//!
//! ### Bootstrapping
//! A joining client receives one FULL_UPDATE: the whole world (entities,
//! pending actions, clock, pause flag) plus the id of its new ship. The
//! snapshot is taken before that ship is created; both sides then spawn it
//! from the id alone.
//!
//! ### Input Relay
//! Keystrokes from a client become actions due `LOOKAHEAD` ticks after the
//! server's clock. The host's own input and every client's input are relayed
//! to the other peers as ACTION messages so each node replays them on the
//! same tick.
//!
//! ### Corrections and Control
//! Ships whose motion changed are broadcast periodically, the clock goes out
//! every tick for admission control and liveness, and pause, reset and
//! shutdown are announced to every peer.
//!
//! ## Module Organization
//!
//! - `config`: runtime settings with defaults for a dedicated two-party server
//! - `connections`: per-endpoint records and the `Registered`/`InGame` states
//! - `game`: the world, level generation and motion change tracking
//! - `network`: the protocol handler and the tick loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::bind(ServerConfig {
//!         host_name: Some("Host".to_string()),
//!         asteroids: 6,
//!         ..ServerConfig::default()
//!     })
//!     .await?;
//!
//!     let (_console, commands) = mpsc::unbounded_channel();
//!     server.run(commands).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connections;
pub mod game;
pub mod network;
