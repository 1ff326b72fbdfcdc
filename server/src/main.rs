use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::network::Server;
use shared::{Command, InputManager, NetError, DEFAULT_PORT, DEFAULT_TICK_RATE, LOOKAHEAD};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// UDP port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Simulation ticks per second
    #[arg(short, long, default_value_t = DEFAULT_TICK_RATE)]
    tick_rate: u32,

    /// Ticks between an input and its application
    #[arg(long, default_value_t = LOOKAHEAD)]
    lookahead: u64,

    /// Remote players admitted besides the host
    #[arg(long, default_value_t = 1)]
    max_players: usize,

    /// Seconds of silence before a peer is dropped
    #[arg(long, default_value_t = 5)]
    liveness_secs: u64,

    /// Ticks between position corrections
    #[arg(long, default_value_t = 6)]
    position_interval: u64,

    /// Play on the server under this name; omit for a dedicated server
    #[arg(short, long)]
    name: Option<String>,

    #[arg(long, default_value_t = 6)]
    asteroids: usize,

    #[arg(long, default_value_t = 1)]
    black_holes: usize,

    /// Level generation seed
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            port: Some(args.port),
            tick_rate: args.tick_rate,
            lookahead: args.lookahead,
            max_players: args.max_players,
            liveness_window: Duration::from_secs(args.liveness_secs),
            position_interval: args.position_interval,
            host_name: args.name,
            asteroids: args.asteroids,
            black_holes: args.black_holes,
            seed: args.seed,
        }
    }
}

/// Reads console commands from stdin until it closes or `q` is entered
fn spawn_console(commands: mpsc::UnboundedSender<Command>) {
    tokio::spawn(async move {
        let mut input = InputManager::new();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        while let Ok(Some(line)) = lines.next_line().await {
            for command in input.parse_line(&line) {
                if commands.send(command).is_err() {
                    return;
                }
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let config = ServerConfig::from(Args::parse());
    let port = config.port.unwrap_or(DEFAULT_PORT);

    let mut server = match Server::bind(config).await {
        Ok(server) => server,
        Err(e @ NetError::Bind { .. }) => {
            error!("{}", e);
            eprintln!("Port {} unavailable", port);
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    info!("Starting server on port {}", port);
    info!("Console: +left/-left, +right, +thrust, fire, missile, station, p (pause), r (reset), q (quit)");

    let (console_tx, console_rx) = mpsc::unbounded_channel();
    spawn_console(console_tx);

    server.run(console_rx).await?;

    Ok(())
}
