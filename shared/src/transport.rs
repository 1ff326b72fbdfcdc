//! UDP socket ownership and the background receive loop
//!
//! The transport never interprets payloads. Each inbound datagram is handed
//! to the owner's callback together with the sender's [`Endpoint`].

use crate::codec::MAX_DATAGRAM_SIZE;
use crate::endpoint::Endpoint;
use crate::error::NetError;
use log::{debug, error, info, warn};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// How long a single receive may block before the enabled flag is rechecked
pub const RECEIVE_TIMEOUT: Duration = Duration::from_millis(100);

/// One UDP socket plus at most one receive loop
pub struct Transport {
    socket: Arc<UdpSocket>,
    local: Endpoint,
    enabled: Arc<AtomicBool>,
    receiving: Arc<AtomicBool>,
}

impl Transport {
    /// Binds all interfaces on `port`, or on any free port for `None`
    pub async fn bind(port: Option<u16>) -> Result<Self, NetError> {
        Self::bind_to(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port).await
    }

    /// Binds a specific local address
    pub async fn bind_to(address: IpAddr, port: Option<u16>) -> Result<Self, NetError> {
        let requested = port.unwrap_or(0);
        let socket = UdpSocket::bind(SocketAddr::new(address, requested))
            .await
            .map_err(|source| NetError::Bind {
                port: requested,
                source,
            })?;
        let local = Endpoint::from(socket.local_addr().map_err(|source| NetError::Bind {
            port: requested,
            source,
        })?);

        info!("Transport bound to {}", local);

        Ok(Self {
            socket: Arc::new(socket),
            local,
            enabled: Arc::new(AtomicBool::new(false)),
            receiving: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_endpoint(&self) -> Endpoint {
        self.local
    }

    /// Sends one datagram, best effort
    ///
    /// Failures are logged and otherwise ignored; callers must already cope
    /// with the datagram being lost in flight.
    pub async fn send(&self, to: Endpoint, bytes: &[u8]) {
        match self.socket.send_to(bytes, to.socket_addr()).await {
            Ok(sent) if sent < bytes.len() => {
                warn!("Short send to {}: {} of {} bytes", to, sent, bytes.len());
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to send {} bytes to {}: {}", bytes.len(), to, e),
        }
    }

    /// Spawns the receive loop
    ///
    /// `on_packet` runs on the loop's task for every datagram. The loop ends
    /// when [`Transport::stop`] is called or when the socket reports an error;
    /// in the latter case the handle resolves to that error and
    /// [`Transport::is_receiving`] turns false.
    pub fn start_receiving<F>(&self, on_packet: F) -> JoinHandle<Result<(), NetError>>
    where
        F: Fn(Endpoint, &[u8]) + Send + Sync + 'static,
    {
        let socket = Arc::clone(&self.socket);
        let enabled = Arc::clone(&self.enabled);
        let receiving = Arc::clone(&self.receiving);
        let local = self.local;

        enabled.store(true, Ordering::Release);
        receiving.store(true, Ordering::Release);

        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

            let result = loop {
                if !enabled.load(Ordering::Acquire) {
                    break Ok(());
                }

                match timeout(RECEIVE_TIMEOUT, socket.recv_from(&mut buffer)).await {
                    Err(_elapsed) => continue,
                    Ok(Ok((len, addr))) => {
                        if !enabled.load(Ordering::Acquire) {
                            break Ok(());
                        }
                        on_packet(Endpoint::from(addr), &buffer[..len]);
                    }
                    Ok(Err(e)) => {
                        error!("Receive loop on {} failed: {}", local, e);
                        break Err(NetError::Io(e));
                    }
                }
            };

            receiving.store(false, Ordering::Release);
            debug!("Receive loop on {} stopped", local);
            result
        })
    }

    /// Asks the receive loop to exit after its current read
    pub fn stop(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    /// Whether the receive loop is still running
    pub fn is_receiving(&self) -> bool {
        self.receiving.load(Ordering::Acquire)
    }
}
