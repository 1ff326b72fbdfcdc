//! Client protocol handler
//!
//! The receive loop drops anything not coming from the server, records CLOCK
//! reports, and forwards every other message to the tick loop over a channel.
//! ACTIONs go through the channel too, so one relayed after a FULL_UPDATE is
//! never overwritten by that snapshot's pending set.

use crate::config::ClientConfig;
use crate::game::{Session, SessionState, StepOutcome};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use shared::{ClientMessage, Command, Endpoint, NetError, ServerMessage, Transport};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

pub struct Client {
    transport: Transport,
    config: ClientConfig,
    session: Session,
    /// Last time a valid datagram arrived from the server
    last_heard: Arc<Mutex<Instant>>,
    inbound_tx: mpsc::UnboundedSender<ServerMessage>,
    inbound_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Client {
    /// Binds a local socket on any free port
    pub async fn bind(config: ClientConfig) -> Result<Self, NetError> {
        let transport = Transport::bind(None).await?;
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let session = Session::new(
            config.name.clone(),
            config.lookahead,
            config.max_clock_drift,
        );

        Ok(Self {
            transport,
            config,
            session,
            last_heard: Arc::new(Mutex::new(Instant::now())),
            inbound_tx,
            inbound_rx,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn local_endpoint(&self) -> Endpoint {
        self.transport.local_endpoint()
    }

    pub fn server(&self) -> Endpoint {
        self.config.server
    }

    /// Starts the receive loop
    pub fn start_receiving(&self) -> JoinHandle<Result<(), NetError>> {
        let server = self.config.server;
        let server_tick = self.session.server_tick();
        let last_heard = Arc::clone(&self.last_heard);
        let inbound_tx = self.inbound_tx.clone();

        self.transport.start_receiving(move |from, bytes| {
            if from != server {
                debug!("Ignoring datagram from {}", from);
                return;
            }
            let message = match ServerMessage::decode(bytes) {
                Ok(message) => message,
                Err(e) => {
                    warn!("Dropped datagram from server: {}", e);
                    return;
                }
            };
            *last_heard.lock() = Instant::now();

            match message {
                ServerMessage::Clock { tick } => {
                    server_tick.fetch_max(tick, Ordering::AcqRel);
                }
                other => {
                    if inbound_tx.send(other).is_err() {
                        debug!("Tick loop gone, dropping server message");
                    }
                }
            }
        })
    }

    async fn send(&self, message: &ClientMessage) {
        match message.encode() {
            Ok(bytes) => self.transport.send(self.config.server, &bytes).await,
            Err(e) => error!("Failed to encode {:?}: {}", message, e),
        }
    }

    /// Sends CONNECT and waits for the snapshot in the background
    pub async fn connect(&mut self) {
        self.session.begin_connect();
        *self.last_heard.lock() = Instant::now();
        info!("Connecting to {}", self.config.server);
        self.send(&ClientMessage::Connect {
            name: self.config.name.clone(),
        })
        .await;
    }

    /// Applies one message forwarded by the receive loop
    pub fn handle_message(&mut self, message: ServerMessage) {
        match self.session.apply(message) {
            Ok(()) => {}
            Err(NetError::UnknownPeer(id)) => debug!("Message for unknown entity {} ignored", id),
            Err(e) => warn!("Failed to apply server message: {}", e),
        }
    }

    /// Applies any messages already waiting on the channel
    pub fn drain_inbound(&mut self) {
        while let Ok(message) = self.inbound_rx.try_recv() {
            self.handle_message(message);
        }
    }

    /// Schedules local input and forwards it to the server
    pub async fn input(&mut self, code: i32) {
        if self.session.input(code).is_some() {
            self.send(&ClientMessage::Keystroke { code }).await;
        } else {
            debug!("Input {} dropped: not synchronized", code);
        }
    }

    /// One iteration of the fixed-period loop
    ///
    /// Fails with [`NetError::HostUnreachable`] once the server has been
    /// silent for longer than the liveness window; the session is closed.
    pub async fn tick(&mut self) -> Result<StepOutcome, NetError> {
        if self.session.state() != SessionState::Disconnected
            && self.last_heard.lock().elapsed() > self.config.liveness_window
        {
            self.session.disconnect();
            return Err(NetError::HostUnreachable);
        }

        self.drain_inbound();
        let outcome = self.session.step();
        if outcome == StepOutcome::Stalled {
            let tick = self.session.world().tick();
            debug!("Waiting for server clock at tick {}", tick);
            self.send(&ClientMessage::Clock { tick }).await;
        }
        Ok(outcome)
    }

    /// Leaves the game and stops receiving
    pub async fn quit(&mut self) {
        if self.session.state() != SessionState::Disconnected {
            self.send(&ClientMessage::Quit).await;
            self.session.disconnect();
        }
        self.transport.stop();
    }

    /// Connects and plays until the host leaves, goes silent, or `Quit`
    ///
    /// A host shutdown ends with [`NetError::HostLeft`], silence with
    /// [`NetError::HostUnreachable`]; a local quit returns `Ok`.
    pub async fn run(&mut self, mut console: mpsc::UnboundedReceiver<Command>) -> Result<(), NetError> {
        let mut receiver = self.start_receiving();
        self.connect().await;

        let mut ticker = interval(self.config.tick_duration());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut console_open = true;

        let result = loop {
            tokio::select! {
                Some(message) = self.inbound_rx.recv() => {
                    self.handle_message(message);
                    if self.session.state() == SessionState::Disconnected {
                        break Err(NetError::HostLeft);
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        break Err(e);
                    }
                    if self.session.state() == SessionState::Disconnected {
                        break Err(NetError::HostLeft);
                    }
                }
                command = console.recv(), if console_open => match command {
                    Some(Command::Key(code)) => self.input(code).await,
                    Some(Command::Quit) => break Ok(()),
                    Some(other) => info!("{:?} is only available on the server", other),
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
        };

        self.quit().await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{WorldSnapshot, KEY_LEFT, KEY_THRUST};
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;
    use tokio::time::timeout;

    async fn loopback() -> Transport {
        Transport::bind_to(IpAddr::V4(Ipv4Addr::LOCALHOST), None)
            .await
            .unwrap()
    }

    async fn client_for(server: &Transport, window: Duration) -> Client {
        Client::bind(ClientConfig {
            server: server.local_endpoint(),
            name: "Nova".to_string(),
            liveness_window: window,
            ..ClientConfig::default()
        })
        .await
        .unwrap()
    }

    async fn recv_client_message(server: &Transport) -> ClientMessage {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = server.start_receiving(move |_, bytes| {
            let _ = tx.send(ClientMessage::decode(bytes).unwrap());
        });
        let message = timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        server.stop();
        message
    }

    /// A bare server socket that reports who sent what
    async fn fake_server() -> (Transport, mpsc::UnboundedReceiver<(Endpoint, ClientMessage)>) {
        let server = loopback().await;
        let (tx, rx) = mpsc::unbounded_channel();
        let _handle = server.start_receiving(move |from, bytes| {
            if let Ok(message) = ClientMessage::decode(bytes) {
                let _ = tx.send((from, message));
            }
        });
        (server, rx)
    }

    async fn reply(server: &Transport, to: Endpoint, message: ServerMessage) {
        server.send(to, &message.encode().unwrap()).await;
    }

    #[tokio::test]
    async fn test_action_right_after_full_update_is_kept() {
        let (server, mut heard) = fake_server().await;
        let mut client = client_for(&server, Duration::from_secs(5)).await;
        let _receiver = client.start_receiving();
        client.connect().await;

        let (peer, _) = timeout(Duration::from_secs(2), heard.recv())
            .await
            .unwrap()
            .unwrap();
        let mut snapshot = WorldSnapshot::empty();
        snapshot.tick = 3;
        let action = shared::Action::new(1, KEY_THRUST, 5);
        reply(&server, peer, ServerMessage::FullUpdate { snapshot, assigned_id: 1 }).await;
        reply(&server, peer, ServerMessage::Action { action }).await;

        timeout(Duration::from_secs(2), async {
            while client.session().world().scheduler().is_empty() {
                client.drain_inbound();
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(client.session().state(), SessionState::Synchronized);
        assert_eq!(client.session().world().tick(), 3);
        assert_eq!(client.session().world().scheduler().pending(), vec![action]);
        server.stop();
    }

    #[tokio::test]
    async fn test_run_reports_host_left() {
        let (server, mut heard) = fake_server().await;
        let mut client = client_for(&server, Duration::from_secs(5)).await;
        let (_console, commands) = mpsc::unbounded_channel();
        let running = tokio::spawn(async move { client.run(commands).await });

        let (peer, message) = timeout(Duration::from_secs(2), heard.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(message, ClientMessage::Connect { .. }));
        reply(
            &server,
            peer,
            ServerMessage::FullUpdate {
                snapshot: WorldSnapshot::empty(),
                assigned_id: 1,
            },
        )
        .await;
        reply(&server, peer, ServerMessage::ServerQuitting).await;

        let result = timeout(Duration::from_secs(2), running).await.unwrap().unwrap();
        assert!(matches!(result, Err(NetError::HostLeft)));
        server.stop();
    }

    #[tokio::test]
    async fn test_connect_sends_name() {
        let server = loopback().await;
        let mut client = client_for(&server, Duration::from_secs(5)).await;

        let receiving = recv_client_message(&server);
        client.connect().await;

        assert_eq!(
            receiving.await,
            ClientMessage::Connect {
                name: "Nova".to_string()
            }
        );
        assert_eq!(client.session().state(), SessionState::Connecting);
    }

    #[tokio::test]
    async fn test_silent_server_is_unreachable() {
        let server = loopback().await;
        let mut client = client_for(&server, Duration::from_millis(10)).await;
        client.connect().await;

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(matches!(client.tick().await, Err(NetError::HostUnreachable)));
        assert_eq!(client.session().state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_input_ignored_until_synchronized() {
        let server = loopback().await;
        let mut client = client_for(&server, Duration::from_secs(5)).await;
        client.connect().await;
        client.input(KEY_LEFT).await;
        assert!(client.session().world().scheduler().is_empty());

        client.handle_message(ServerMessage::FullUpdate {
            snapshot: WorldSnapshot::empty(),
            assigned_id: 1,
        });
        client.input(KEY_LEFT).await;
        assert_eq!(client.session().world().scheduler().len(), 1);
    }
}
