//! Transport abstraction for byte-level I/O
//!
//! Separates I/O concerns from the data link:
//! - **Transport**: how bytes flow (RS-485 serial, UDP)
//! - **Link**: how frames are found in those bytes (handled by `link`)
//!
//! Each transport manages its own execution model internally:
//! - Serial: blocking threads for low latency
//! - UDP: async tokio tasks

pub mod serial;
pub mod udp;

pub use serial::SerialTransport;
pub use udp::UdpTransport;

use crate::config::{PortConfig, TransportKind};
use crate::error::Result;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Channels for bidirectional communication with a transport
///
/// The transport owns the underlying I/O and communicates via these
/// channels. When the transport stops (shutdown or error), it closes them.
pub struct TransportChannels {
    /// Raw bytes received from the wire; `None` once the transport stopped
    pub rx: mpsc::Receiver<Bytes>,
    /// Raw bytes to write to the wire
    pub tx: mpsc::Sender<Bytes>,
    /// Frames taken from `tx` that the transport failed to write
    pub send_failures: Arc<AtomicU64>,
}

impl TransportChannels {
    pub fn new(rx: mpsc::Receiver<Bytes>, tx: mpsc::Sender<Bytes>) -> Self {
        Self {
            rx,
            tx,
            send_failures: Arc::new(AtomicU64::new(0)),
        }
    }
}

/// Trait for spawnable transports
///
/// A transport moves raw bytes. It does NOT find frames, count decode
/// errors, or route anything; that is the node's job.
///
/// # Lifecycle
///
/// 1. Create transport with configuration
/// 2. Call `spawn()` to start I/O in background
/// 3. Use returned channels for communication
/// 4. Transport runs until `shutdown` is set or a fatal error occurs,
///    then closes its channels
pub trait Transport: Send + 'static {
    /// Spawn the transport in background
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be initialized
    /// (port not found, bind failed).
    fn spawn(self, shutdown: Arc<AtomicBool>) -> Result<TransportChannels>;
}

/// Open the transport described by a port section
///
/// # Errors
///
/// Any error from the selected transport's `spawn`, or a malformed UDP
/// address.
pub fn open(config: &PortConfig, shutdown: Arc<AtomicBool>) -> Result<TransportChannels> {
    match config.transport {
        TransportKind::Serial => {
            SerialTransport::new(&config.serial_port, config.baud_rate).spawn(shutdown)
        }
        TransportKind::Udp => UdpTransport::from_config(config)?.spawn(shutdown),
    }
}
