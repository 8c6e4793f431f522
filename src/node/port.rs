//! One physical port: receive window, decode counters and critical section
//!
//! Bytes arrive from the transport reader (the interrupt side) while the poll
//! loop decodes. The buffer lock is the critical section and is held only to
//! push, to snapshot, or to consume matched regions; the scan itself runs
//! on the snapshot without the lock. A second lock serializes decode passes
//! so two pollers never match the same bytes.

use crate::constants::RX_BUF_LEN;
use crate::error::LinkError;
use crate::link::{DecodeReport, DecodeStats, FrameCodec, ReceiveBuffer};
use crate::route::Destination;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, trace, warn};

/// Which link a port serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortRole {
    /// Upstream link towards the network root
    Parent,
    /// Downstream bus #1
    SubBus1,
    /// Downstream bus #2
    SubBus2,
}

impl PortRole {
    pub const ALL: [PortRole; 3] = [PortRole::Parent, PortRole::SubBus1, PortRole::SubBus2];

    /// Routing destination served by this port's outbound side
    pub fn destination(self) -> Destination {
        match self {
            Self::Parent => Destination::Parent,
            Self::SubBus1 => Destination::SubBus1,
            Self::SubBus2 => Destination::SubBus2,
        }
    }
}

impl fmt::Display for PortRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Parent => "parent",
            Self::SubBus1 => "sub_bus_1",
            Self::SubBus2 => "sub_bus_2",
        };
        f.write_str(name)
    }
}

/// Receive side of one port
#[derive(Debug)]
pub struct Port<const N: usize = RX_BUF_LEN> {
    role: PortRole,
    buffer: Mutex<ReceiveBuffer<N>>,
    decoding: Mutex<()>,
    stats: DecodeStats,
    codec: FrameCodec,
}

impl<const N: usize> Port<N> {
    pub fn new(role: PortRole, codec: FrameCodec) -> Self {
        Self {
            role,
            buffer: Mutex::new(ReceiveBuffer::new()),
            decoding: Mutex::new(()),
            stats: DecodeStats::new(),
            codec,
        }
    }

    pub fn role(&self) -> PortRole {
        self.role
    }

    pub fn stats(&self) -> &DecodeStats {
        &self.stats
    }

    pub fn fill_count(&self) -> usize {
        self.buffer.lock().fill_count()
    }

    /// Feed received bytes into the window
    pub fn ingest(&self, bytes: &[u8]) {
        self.buffer.lock().push_bytes(bytes);
        trace!(port = %self.role, len = bytes.len(), "bytes received");
    }

    pub fn ingest_byte(&self, byte: u8) {
        self.buffer.lock().push_byte(byte);
    }

    /// Bytes that can be pushed between two decode passes without evicting
    /// the start of a frame that completes in them
    pub fn ingest_slice(&self) -> usize {
        (N - self.codec.frame_capacity().min(N)).max(1)
    }

    /// Feed a read of any size, decoding between slices so no complete
    /// frame is evicted before a pass sees it
    ///
    /// Each pass that extracted payloads is handed to `deliver` before the
    /// next slice is pushed, so payloads keep stream order. The last slice is
    /// left for the poll loop.
    pub fn ingest_and_poll(&self, bytes: &[u8], mut deliver: impl FnMut(DecodeReport)) {
        let mut slices = bytes.chunks(self.ingest_slice()).peekable();
        while let Some(slice) = slices.next() {
            self.ingest(slice);
            if slices.peek().is_none() {
                break;
            }
            let report = self.poll();
            if report.decoded_count() > 0 {
                deliver(report);
            }
        }
    }

    /// Run one decode pass over the current window
    pub fn poll(&self) -> DecodeReport {
        let _pass = self.decoding.lock();
        let snapshot = self.buffer.lock().snapshot();
        let report = self.codec.scan_within(snapshot.as_slice(), N);

        if !report.consumed().is_empty() {
            let mut buffer = self.buffer.lock();
            report.consume_from(&mut buffer, &snapshot);
        }
        report.record(&self.stats);

        for fault in report.faults() {
            match fault {
                LinkError::FooterMismatch { offset } => {
                    debug!(port = %self.role, offset, "footer mismatch, resyncing");
                }
                LinkError::LengthOverflow { offset, declared } => {
                    debug!(port = %self.role, offset, declared, "impossible length, resyncing");
                }
                other => warn!(port = %self.role, error = %other, "frame rejected"),
            }
        }
        if report.decoded_count() > 0 {
            debug!(port = %self.role, frames = report.decoded_count(), "frames decoded");
        }
        report
    }
}
