//! Server runtime settings
//!
//! Defaults describe a dedicated two-party server on the standard port.

use shared::{DEFAULT_PORT, DEFAULT_TICK_RATE, LIVENESS_WINDOW, LOOKAHEAD};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `None` binds any free port
    pub port: Option<u16>,
    pub tick_rate: u32,
    pub lookahead: u64,
    /// Remote players admitted besides the host
    pub max_players: usize,
    pub liveness_window: Duration,
    /// Ticks between position broadcasts
    pub position_interval: u64,
    /// Name of the server's own ship; `None` runs a dedicated server
    pub host_name: Option<String>,
    pub asteroids: usize,
    pub black_holes: usize,
    pub seed: u64,
}

impl ServerConfig {
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate.max(1)))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: Some(DEFAULT_PORT),
            tick_rate: DEFAULT_TICK_RATE,
            lookahead: LOOKAHEAD,
            max_players: 1,
            liveness_window: LIVENESS_WINDOW,
            position_interval: 6,
            host_name: None,
            asteroids: 0,
            black_holes: 0,
            seed: 0,
        }
    }
}
