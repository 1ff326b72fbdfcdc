//! # Arcade Client Library
//!
//! The joining node of a two-party arcade game. It holds a full local copy of
//! the world and simulates it itself; the only things that cross the wire
//! during play are inputs, clocks and the occasional position correction.
//!
//! ## Lifecycle
//!
//! A client starts `Disconnected`, sends CONNECT and waits in `Connecting`
//! until the server's FULL_UPDATE arrives. That snapshot replaces the local
//! world wholesale and names the ship the client controls. From then on the
//! session is `Synchronized` until the host quits or goes silent for longer
//! than the liveness window.
//!
//! ### Deterministic Replay
//! Local input is scheduled `LOOKAHEAD` ticks ahead and sent upstream as a
//! KEYSTROKE. Everyone else's input comes back as ACTION messages carrying
//! their due tick, so both nodes apply the same inputs on the same tick.
//!
//! ### Admission Control
//! The local clock may run at most `MAX_CLOCK_DRIFT` ticks ahead of the last
//! clock the server reported. Past that the client stalls and asks for the
//! server's clock instead of advancing.
//!
//! ## Module Organization
//!
//! - `config`: server address, player name and timing settings
//! - `game`: the session state machine around the local world
//! - `network`: the receive loop, outgoing messages and the tick loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::config::ClientConfig;
//! use client::network::Client;
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::bind(ClientConfig {
//!         name: "Nova".to_string(),
//!         ..ClientConfig::default()
//!     })
//!     .await?;
//!
//!     let (_console, commands) = mpsc::unbounded_channel();
//!     client.run(commands).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod game;
pub mod network;
