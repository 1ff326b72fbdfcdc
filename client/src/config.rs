//! Client runtime settings

use shared::{Endpoint, DEFAULT_PORT, DEFAULT_TICK_RATE, LIVENESS_WINDOW, LOOKAHEAD, MAX_CLOCK_DRIFT};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server: Endpoint,
    pub name: String,
    pub tick_rate: u32,
    pub lookahead: u64,
    /// Ticks the client may run ahead of the last server clock it heard
    pub max_clock_drift: u64,
    pub liveness_window: Duration,
}

impl ClientConfig {
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate.max(1)))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: Endpoint::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT),
            name: "Player".to_string(),
            tick_rate: DEFAULT_TICK_RATE,
            lookahead: LOOKAHEAD,
            max_clock_drift: MAX_CLOCK_DRIFT,
            liveness_window: LIVENESS_WINDOW,
        }
    }
}
