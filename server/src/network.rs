//! Server protocol handler coordinating the transport and the tick loop
//!
//! The receive loop only decodes datagrams and forwards them over a channel;
//! every state change happens on the tick loop. Replies are queued as
//! [`Outgoing`] and written to the socket by [`Server::flush`], once per loop
//! iteration.

use crate::config::ServerConfig;
use crate::connections::{ConnectionState, ConnectionTable};
use crate::game::Game;
use log::{debug, error, info, warn};
use shared::{ClientMessage, Command, Endpoint, EntityId, NetError, ServerMessage, Transport};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// A decoded datagram on its way from the receive loop to the tick loop
#[derive(Debug)]
pub struct Inbound {
    pub from: Endpoint,
    pub message: ClientMessage,
}

/// Messages waiting for the next flush
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    Send {
        to: Endpoint,
        message: ServerMessage,
    },
    /// Sent to every in-game peer except `exclude`
    Broadcast {
        message: ServerMessage,
        exclude: Option<Endpoint>,
    },
}

/// Authoritative node: owns the socket, the world and the connection table
pub struct Server {
    transport: Transport,
    config: ServerConfig,
    game: Game,
    connections: ConnectionTable,
    outbox: Vec<Outgoing>,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: mpsc::UnboundedReceiver<Inbound>,
}

impl Server {
    /// Binds the configured port and builds the level
    pub async fn bind(config: ServerConfig) -> Result<Self, NetError> {
        let transport = Transport::bind(config.port).await?;
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        info!(
            "Server listening on {} ({} Hz, max {} players)",
            transport.local_endpoint(),
            config.tick_rate,
            config.max_players
        );

        Ok(Self {
            transport,
            game: Game::new(&config),
            connections: ConnectionTable::new(config.max_players),
            config,
            outbox: Vec::new(),
            inbound_tx,
            inbound_rx,
        })
    }

    pub fn local_endpoint(&self) -> Endpoint {
        self.transport.local_endpoint()
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    pub fn connections(&self) -> &ConnectionTable {
        &self.connections
    }

    pub fn outbox(&self) -> &[Outgoing] {
        &self.outbox
    }

    pub fn take_outbox(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outbox)
    }

    /// Starts the receive loop; decoded messages land on the inbound channel
    pub fn start_receiving(&self) -> JoinHandle<Result<(), NetError>> {
        let inbound_tx = self.inbound_tx.clone();
        self.transport
            .start_receiving(move |from, bytes| match ClientMessage::decode(bytes) {
                Ok(message) => {
                    if inbound_tx.send(Inbound { from, message }).is_err() {
                        debug!("Tick loop gone, dropping datagram from {}", from);
                    }
                }
                Err(e) => warn!("Dropped datagram from {}: {}", from, e),
            })
    }

    /// Handles every message already waiting on the inbound channel
    pub fn drain_inbound(&mut self) {
        while let Ok(inbound) = self.inbound_rx.try_recv() {
            self.handle_message(inbound.from, inbound.message);
        }
    }

    /// Processes one decoded client message
    pub fn handle_message(&mut self, from: Endpoint, message: ClientMessage) {
        self.connections.register(from);

        match message {
            ClientMessage::Connect { name } => self.handle_connect(from, &name),
            ClientMessage::Keystroke { code } => self.handle_keystroke(from, code),
            ClientMessage::Quit => self.handle_quit(from),
            ClientMessage::Clock { tick } => {
                let now = self.game.world().tick();
                debug!("{} waiting at tick {}, server at {}", from, tick, now);
                self.outbox.push(Outgoing::Send {
                    to: from,
                    message: ServerMessage::Clock { tick: now },
                });
            }
        }
    }

    fn handle_connect(&mut self, from: Endpoint, name: &str) {
        if let Some(ConnectionState::InGame(old)) = self.connections.state(&from) {
            info!("{} reconnected, replacing ship {}", from, old);
            self.connections.unbind(&from);
            self.remove_ship(old, Some(from));
        }

        if !self.connections.has_capacity(&from) {
            warn!("Ignoring CONNECT from {} ('{}'): server full", from, name);
            return;
        }

        // The joiner spawns its own ship from the id, so the snapshot is
        // taken before the ship exists.
        let snapshot = self.game.world().snapshot();
        let id = self.game.spawn_ship(name);
        self.connections.bind(&from, id, name);

        self.outbox.push(Outgoing::Send {
            to: from,
            message: ServerMessage::FullUpdate {
                snapshot,
                assigned_id: id,
            },
        });

        if let Some(entity) = self.game.world().registry().get(id) {
            self.broadcast(ServerMessage::PlayerJoined { entity }, Some(from));
        }
    }

    fn handle_keystroke(&mut self, from: Endpoint, code: i32) {
        match self.connections.state(&from) {
            Some(ConnectionState::InGame(actor)) => self.schedule_and_relay(actor, code, Some(from)),
            _ => debug!("Keystroke {} from {} ignored: not in game", code, from),
        }
    }

    fn handle_quit(&mut self, from: Endpoint) {
        if let Some(connection) = self.connections.remove(&from) {
            if let Some(id) = connection.bound_entity {
                self.remove_ship(id, None);
            }
        }
    }

    fn remove_ship(&mut self, id: EntityId, exclude: Option<Endpoint>) {
        if self.game.remove_ship(id).is_some() {
            self.broadcast(ServerMessage::PlayerQuit { id }, exclude);
        }
    }

    /// Schedules input for `actor` and relays it to the other peers
    fn schedule_and_relay(&mut self, actor: EntityId, code: i32, exclude: Option<Endpoint>) {
        // A rejected action is already logged by the scheduler.
        if let Ok(action) = self
            .game
            .world()
            .schedule_input(actor, code, self.config.lookahead)
        {
            self.broadcast(ServerMessage::Action { action }, exclude);
        }
    }

    /// Applies a console command from the host
    pub fn handle_command(&mut self, command: Command) {
        match command {
            Command::Key(code) => match self.game.host_ship() {
                Some(host) => self.schedule_and_relay(host, code, None),
                None => debug!("No host ship, key {} ignored", code),
            },
            Command::TogglePause => self.toggle_pause(),
            Command::Reset => self.reset_level(),
            Command::Quit => {}
        }
    }

    pub fn toggle_pause(&mut self) {
        let paused = !self.game.world().is_paused();
        self.game.world_mut().set_paused(paused);
        self.broadcast(ServerMessage::Pause { paused }, None);
    }

    /// Rebuilds the level and resynchronizes every peer
    pub fn reset_level(&mut self) {
        self.game.reset();
        for (endpoint, id) in self.connections.in_game() {
            self.outbox.push(Outgoing::Send {
                to: endpoint,
                message: ServerMessage::FullUpdate {
                    snapshot: self.game.world().snapshot(),
                    assigned_id: id,
                },
            });
        }
    }

    /// One iteration of the fixed-period loop
    pub fn tick(&mut self) {
        self.drain_inbound();
        for connection in self.connections.check_timeouts(self.config.liveness_window) {
            warn!("{} went silent, dropping it", connection.endpoint);
            if let Some(id) = connection.bound_entity {
                self.remove_ship(id, None);
            }
        }

        if let Some(report) = self.game.world_mut().step() {
            if !report.desyncs.is_empty() {
                warn!(
                    "{} late actions dropped at tick {}",
                    report.desyncs.len(),
                    self.game.world().tick().saturating_sub(1)
                );
            }
        }

        let tick = self.game.world().tick();
        if tick % self.config.position_interval.max(1) == 0 {
            for body in self.game.changed_ships() {
                self.broadcast(
                    ServerMessage::PlayerUpdatePosition {
                        id: body.id,
                        x: body.x,
                        y: body.y,
                        dx: body.dx,
                        dy: body.dy,
                    },
                    None,
                );
            }
        }

        self.broadcast(ServerMessage::Clock { tick }, None);
    }

    fn recipients(&self, exclude: Option<Endpoint>) -> Vec<Endpoint> {
        self.connections
            .in_game()
            .into_iter()
            .map(|(endpoint, _)| endpoint)
            .filter(|endpoint| Some(*endpoint) != exclude)
            .collect()
    }

    /// Queues a broadcast, unless nobody would receive it
    fn broadcast(&mut self, message: ServerMessage, exclude: Option<Endpoint>) {
        if !self.recipients(exclude).is_empty() {
            self.outbox.push(Outgoing::Broadcast { message, exclude });
        }
    }

    /// Writes every queued message to the socket
    pub async fn flush(&mut self) {
        for outgoing in std::mem::take(&mut self.outbox) {
            let (message, recipients) = match outgoing {
                Outgoing::Send { to, message } => (message, vec![to]),
                Outgoing::Broadcast { message, exclude } => {
                    let recipients = self.recipients(exclude);
                    (message, recipients)
                }
            };

            let bytes = match message.encode() {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!("Failed to encode {:?}: {}", message, e);
                    continue;
                }
            };
            for to in recipients {
                self.transport.send(to, &bytes).await;
            }
        }
    }

    /// Tells every peer the server is leaving, then stops the transport
    pub async fn shutdown(&mut self) {
        info!("Server shutting down");
        self.broadcast(ServerMessage::ServerQuitting, None);
        self.flush().await;
        self.connections.drain();
        self.transport.stop();
    }

    /// Runs until Ctrl+C, a `Quit` console command, or a socket failure
    pub async fn run(&mut self, mut console: mpsc::UnboundedReceiver<Command>) -> Result<(), NetError> {
        let mut receiver = self.start_receiving();
        let mut ticker = interval(self.config.tick_duration());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut console_open = true;

        info!("Server started at tick {}", self.game.world().tick());

        let result = loop {
            tokio::select! {
                Some(inbound) = self.inbound_rx.recv() => {
                    self.handle_message(inbound.from, inbound.message);
                }
                _ = ticker.tick() => {
                    self.tick();
                }
                command = console.recv(), if console_open => match command {
                    Some(Command::Quit) => break Ok(()),
                    Some(command) => self.handle_command(command),
                    None => console_open = false,
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C");
                    break Ok(());
                }
                joined = &mut receiver => {
                    break match joined {
                        Ok(result) => result,
                        Err(e) => Err(NetError::Io(e.into())),
                    };
                }
            }
            self.flush().await;
        };

        self.shutdown().await;
        result
    }
}
