use clap::Parser;
use client::config::ClientConfig;
use client::network::Client;
use log::{error, info};
use shared::{Endpoint, InputManager, NetError, DEFAULT_TICK_RATE, LOOKAHEAD, MAX_CLOCK_DRIFT};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    server: SocketAddr,

    /// Name shown for this player's ship
    #[arg(short, long, default_value = "Player")]
    name: String,

    /// Simulation ticks per second
    #[arg(short, long, default_value_t = DEFAULT_TICK_RATE)]
    tick_rate: u32,

    #[arg(long, default_value_t = LOOKAHEAD)]
    lookahead: u64,

    /// Ticks the local clock may run ahead of the server's
    #[arg(long, default_value_t = MAX_CLOCK_DRIFT)]
    max_clock_drift: u64,

    /// Seconds of server silence before giving up
    #[arg(long, default_value_t = 5)]
    liveness_secs: u64,
}

impl From<Args> for ClientConfig {
    fn from(args: Args) -> Self {
        Self {
            server: Endpoint::from(args.server),
            name: args.name,
            tick_rate: args.tick_rate,
            lookahead: args.lookahead,
            max_clock_drift: args.max_clock_drift,
            liveness_window: Duration::from_secs(args.liveness_secs),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let config = ClientConfig::from(Args::parse());
    info!("Joining {} as '{}'", config.server, config.name);
    info!("Console: +left/-left, +right, +thrust, fire, missile, station, q (quit)");

    let mut client = Client::bind(config).await?;

    let (console_tx, console_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut input = InputManager::new();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        while let Ok(Some(line)) = lines.next_line().await {
            for command in input.parse_line(&line) {
                if console_tx.send(command).is_err() {
                    return;
                }
            }
        }
    });

    match client.run(console_rx).await {
        Ok(()) => Ok(()),
        Err(e @ (NetError::HostUnreachable | NetError::HostLeft)) => {
            error!("Session ended: {}", e);
            eprintln!("Host disconnected: {}", e);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
