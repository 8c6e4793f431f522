//! Serial transport for RS-485 buses
//!
//! Uses blocking threads for low-latency I/O:
//! - Reader thread: reads from the serial port, sends to channel
//! - Writer thread: receives from channel, writes to the serial port
//!
//! The transport stops when:
//! - `shutdown` flag is set
//! - Serial port disconnects (detected via consecutive empty reads)
//! - Write error occurs

use super::{Transport, TransportChannels};
use crate::constants::{
    CHANNEL_CAPACITY, SERIAL_DISCONNECT_THRESHOLD, SERIAL_READ_CHUNK, SERIAL_TIMEOUT_MS,
};
use crate::error::{NodeError, Result};
use bytes::Bytes;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Serial transport for one bus
///
/// ```ignore
/// let transport = SerialTransport::new("/dev/ttyUSB0", 2_000_000);
/// let channels = transport.spawn(shutdown)?;
/// ```
pub struct SerialTransport {
    port_name: String,
    baud_rate: u32,
}

impl SerialTransport {
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
        }
    }

    /// Open the serial port with a short read timeout
    pub fn open(port_name: &str, baud_rate: u32) -> Result<Box<dyn serialport::SerialPort>> {
        serialport::new(port_name, baud_rate)
            .timeout(Duration::from_millis(SERIAL_TIMEOUT_MS))
            .open()
            .map_err(|e| NodeError::SerialOpen {
                port: port_name.to_string(),
                source: std::io::Error::other(e.to_string()),
            })
    }
}

impl Transport for SerialTransport {
    fn spawn(self, shutdown: Arc<AtomicBool>) -> Result<TransportChannels> {
        let (in_tx, in_rx) = mpsc::channel::<Bytes>(CHANNEL_CAPACITY);
        let (out_tx, mut out_rx) = mpsc::channel::<Bytes>(CHANNEL_CAPACITY);

        let port_read = Self::open(&self.port_name, self.baud_rate)?;
        let port_write = port_read.try_clone().map_err(|e| NodeError::SerialOpen {
            port: self.port_name.clone(),
            source: std::io::Error::other(e.to_string()),
        })?;
        debug!(port = %self.port_name, baud = self.baud_rate, "serial port opened");

        // Reader thread (blocking)
        let shutdown_reader = shutdown.clone();
        let name = self.port_name.clone();
        std::thread::spawn(move || {
            let mut port = port_read;
            let mut buf = [0u8; SERIAL_READ_CHUNK];
            let mut consecutive_empty = 0u32;

            while !shutdown_reader.load(Ordering::Relaxed) {
                match port.read(&mut buf) {
                    Ok(n) if n > 0 => {
                        consecutive_empty = 0;
                        if in_tx
                            .blocking_send(Bytes::copy_from_slice(&buf[..n]))
                            .is_err()
                        {
                            break;
                        }
                    }
                    Ok(_) => {
                        consecutive_empty += 1;
                        if consecutive_empty > SERIAL_DISCONNECT_THRESHOLD {
                            warn!(port = %name, "serial port stopped returning data");
                            break;
                        }
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {
                        consecutive_empty = 0;
                    }
                    Err(e) => {
                        warn!(port = %name, error = %e, "serial read failed");
                        break;
                    }
                }
            }
            // Dropping in_tx closes the channel
        });

        let channels = TransportChannels::new(in_rx, out_tx);

        // Writer thread (blocking)
        let shutdown_writer = shutdown;
        let failures = channels.send_failures.clone();
        let name = self.port_name;
        std::thread::spawn(move || {
            let mut port = port_write;
            while !shutdown_writer.load(Ordering::Relaxed) {
                let Some(data) = out_rx.blocking_recv() else {
                    break;
                };
                if let Err(e) = port.write_all(&data) {
                    failures.fetch_add(1, Ordering::Relaxed);
                    warn!(port = %name, error = %e, "serial write failed");
                    break;
                }
            }
        });

        Ok(channels)
    }
}
