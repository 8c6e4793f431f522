//! Data-link diagnostics
//!
//! Lock-free counters, readable from any thread for telemetry while the
//! owning port keeps decoding.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Decode counters for one port. Monotonic for the process lifetime.
#[derive(Debug, Default)]
pub struct DecodeStats {
    /// Frames that passed checksum verification
    valid: AtomicU64,
    /// Well-framed messages rejected for bad checksum
    bad_checksum: AtomicU64,
}

impl DecodeStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn add_valid(&self) {
        self.valid.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_bad_checksum(&self) {
        self.bad_checksum.fetch_add(1, Ordering::Relaxed);
    }

    pub fn valid(&self) -> u64 {
        self.valid.load(Ordering::Relaxed)
    }

    pub fn bad_checksum(&self) -> u64 {
        self.bad_checksum.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> DecodeCounts {
        DecodeCounts {
            valid: self.valid(),
            bad_checksum: self.bad_checksum(),
        }
    }
}

/// Point-in-time copy of `DecodeStats`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DecodeCounts {
    pub valid: u64,
    pub bad_checksum: u64,
}

/// What the last encode did, for debugging a link from the outside
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct EncodeTrace {
    /// Payload bytes handed to the encoder
    pub payload_len: usize,
    /// Escape bytes inserted
    pub escapes: usize,
    /// Payload plus escapes
    pub stuffed_len: usize,
    /// Checksum written (0 when the encode was refused)
    pub checksum: u8,
    /// Frame bytes emitted (0 when the encode was refused)
    pub frame_len: usize,
}
