//! UDP transport for simulated buses and bench setups
//!
//! Binds a local address and sends outgoing bytes either to a fixed peer or,
//! when none is configured, to the last address that sent data.
//!
//! Uses async tokio tasks for I/O:
//! - RX task: receives datagrams, tracks sender address, sends to channel
//! - TX task: receives from channel, sends to the peer

use super::{Transport, TransportChannels};
use crate::config::PortConfig;
use crate::constants::{
    CHANNEL_CAPACITY, MAX_SOCKET_RETRY_ATTEMPTS, RETRY_BASE_DELAY_MS, SHUTDOWN_CHECK_MS,
    UDP_BUFFER_SIZE,
};
use crate::error::{NodeError, Result};
use bytes::Bytes;
use parking_lot::RwLock;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// UDP transport for one port
pub struct UdpTransport {
    bind: SocketAddr,
    peer: Option<SocketAddr>,
}

impl UdpTransport {
    pub fn new(bind: SocketAddr, peer: Option<SocketAddr>) -> Self {
        Self { bind, peer }
    }

    /// Parse the addresses of a `transport = "udp"` port section
    ///
    /// # Errors
    ///
    /// `ConfigValidation` if either address does not parse.
    pub fn from_config(config: &PortConfig) -> Result<Self> {
        let bind = parse_addr("udp_bind", &config.udp_bind)?;
        let peer = config
            .udp_peer
            .as_deref()
            .map(|p| parse_addr("udp_peer", p))
            .transpose()?;
        Ok(Self::new(bind, peer))
    }
}

pub(crate) fn parse_addr(field: &'static str, value: &str) -> Result<SocketAddr> {
    value.parse().map_err(|_| NodeError::ConfigValidation {
        field,
        reason: format!("'{}' is not a socket address", value),
    })
}

impl Transport for UdpTransport {
    fn spawn(self, shutdown: Arc<AtomicBool>) -> Result<TransportChannels> {
        let (in_tx, in_rx) = mpsc::channel::<Bytes>(CHANNEL_CAPACITY);
        let (out_tx, mut out_rx) = mpsc::channel::<Bytes>(CHANNEL_CAPACITY);
        let channels = TransportChannels::new(in_rx, out_tx);

        let socket = create_reusable_udp_socket(self.bind)?;
        debug!(bind = %self.bind, peer = ?self.peer, "udp socket bound");

        // Fixed peer, or whoever spoke last
        let peer_addr: Arc<RwLock<Option<SocketAddr>>> = Arc::new(RwLock::new(self.peer));
        let track_sender = self.peer.is_none();

        // RX task
        let socket_rx = socket.clone();
        let addr_store = peer_addr.clone();
        let shutdown_rx = shutdown.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; UDP_BUFFER_SIZE];

            while !shutdown_rx.load(Ordering::Relaxed) {
                match tokio::time::timeout(
                    Duration::from_millis(SHUTDOWN_CHECK_MS),
                    socket_rx.recv_from(&mut buf),
                )
                .await
                {
                    Ok(Ok((len, addr))) => {
                        if track_sender {
                            *addr_store.write() = Some(addr);
                        }
                        if in_tx
                            .send(Bytes::copy_from_slice(&buf[..len]))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Ok(Err(e)) => trace!(error = %e, "udp recv error"),
                    Err(_) => {
                        // Timeout, re-check shutdown
                    }
                }
            }
        });

        // TX task
        let socket_tx = socket;
        let addr_read = peer_addr;
        let failures = channels.send_failures.clone();
        tokio::spawn(async move {
            while !shutdown.load(Ordering::Relaxed) {
                match tokio::time::timeout(Duration::from_millis(SHUTDOWN_CHECK_MS), out_rx.recv())
                    .await
                {
                    Ok(Some(data)) => {
                        // Copy the address out before awaiting
                        let addr = *addr_read.read();
                        let sent = match addr {
                            Some(addr) => socket_tx
                                .send_to(&data, addr)
                                .await
                                .map_err(|e| debug!(%addr, error = %e, "udp send failed"))
                                .is_ok(),
                            None => {
                                trace!(len = data.len(), "no udp peer yet, dropping");
                                false
                            }
                        };
                        if !sent {
                            failures.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    Ok(None) => break,
                    Err(_) => {}
                }
            }
        });

        Ok(channels)
    }
}

/// Create a UDP socket with SO_REUSEADDR for quick rebind after restart
///
/// Retries a few times if the address is still in use.
fn create_reusable_udp_socket(addr: SocketAddr) -> Result<Arc<UdpSocket>> {
    let map_err = |e| NodeError::UdpBind {
        addr: addr.to_string(),
        source: e,
    };
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    for attempt in 0..MAX_SOCKET_RETRY_ATTEMPTS {
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP)).map_err(map_err)?;
        socket.set_reuse_address(true).map_err(map_err)?;
        socket.set_nonblocking(true).map_err(map_err)?;

        match socket.bind(&addr.into()) {
            Ok(()) => {
                let std_socket: std::net::UdpSocket = socket.into();
                let tokio_socket = UdpSocket::from_std(std_socket).map_err(map_err)?;
                return Ok(Arc::new(tokio_socket));
            }
            Err(_) if attempt < MAX_SOCKET_RETRY_ATTEMPTS - 1 => {
                // Exponential backoff: 200ms, 400ms, 800ms, 1600ms
                std::thread::sleep(Duration::from_millis(RETRY_BASE_DELAY_MS * (1 << attempt)));
            }
            Err(e) => return Err(map_err(e)),
        }
    }

    Err(NodeError::UdpBind {
        addr: addr.to_string(),
        source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "failed after retries"),
    })
}
