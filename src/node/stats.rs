//! Byte-level traffic counters for one node
//!
//! Lock-free: transport tasks add, the stats logger reads rates.

use crate::constants::RATE_UPDATE_MIN_INTERVAL_SECS;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Traffic statistics with rate calculation
#[derive(Debug)]
pub struct TrafficStats {
    /// Bytes handed to transports
    tx_total: AtomicU64,
    /// Bytes received from transports
    rx_total: AtomicU64,
    /// Frames dropped because a transport channel was full or closed, or the
    /// transport failed to send them
    tx_dropped: AtomicU64,
    tx_snapshot: AtomicU64,
    rx_snapshot: AtomicU64,
    start_time: Instant,
    /// Nanoseconds since start_time at last rate calculation
    last_calc_nanos: AtomicU64,
    /// Cached rates in KB/s (f64 bits)
    tx_rate: AtomicU64,
    rx_rate: AtomicU64,
}

/// Point-in-time view for logs and JSON output
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrafficSnapshot {
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    pub tx_dropped: u64,
    pub tx_kb_s: f64,
    pub rx_kb_s: f64,
}

impl TrafficStats {
    pub fn new() -> Self {
        Self {
            tx_total: AtomicU64::new(0),
            rx_total: AtomicU64::new(0),
            tx_dropped: AtomicU64::new(0),
            tx_snapshot: AtomicU64::new(0),
            rx_snapshot: AtomicU64::new(0),
            start_time: Instant::now(),
            last_calc_nanos: AtomicU64::new(0),
            tx_rate: AtomicU64::new(0),
            rx_rate: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn add_tx(&self, bytes: usize) {
        self.tx_total.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_rx(&self, bytes: usize) {
        self.rx_total.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_tx_dropped(&self, frames: u64) {
        self.tx_dropped.fetch_add(frames, Ordering::Relaxed);
    }

    pub fn tx_bytes(&self) -> u64 {
        self.tx_total.load(Ordering::Relaxed)
    }

    pub fn rx_bytes(&self) -> u64 {
        self.rx_total.load(Ordering::Relaxed)
    }

    pub fn tx_dropped(&self) -> u64 {
        self.tx_dropped.load(Ordering::Relaxed)
    }

    fn cached_rates(&self) -> (f64, f64) {
        let tx = f64::from_bits(self.tx_rate.load(Ordering::Relaxed));
        let rx = f64::from_bits(self.rx_rate.load(Ordering::Relaxed));
        (tx, rx)
    }

    /// Update rate calculations and return (tx_kb_s, rx_kb_s)
    pub fn update_rates(&self) -> (f64, f64) {
        let now_nanos = self.start_time.elapsed().as_nanos() as u64;
        let last_nanos = self.last_calc_nanos.load(Ordering::Relaxed);
        let elapsed = now_nanos.saturating_sub(last_nanos) as f64 / 1_000_000_000.0;

        if elapsed < RATE_UPDATE_MIN_INTERVAL_SECS {
            return self.cached_rates();
        }

        // Claim the update so concurrent callers don't double count
        if self
            .last_calc_nanos
            .compare_exchange(last_nanos, now_nanos, Ordering::SeqCst, Ordering::Relaxed)
            .is_err()
        {
            return self.cached_rates();
        }

        let tx_now = self.tx_total.load(Ordering::Relaxed);
        let rx_now = self.rx_total.load(Ordering::Relaxed);
        let tx_prev = self.tx_snapshot.swap(tx_now, Ordering::Relaxed);
        let rx_prev = self.rx_snapshot.swap(rx_now, Ordering::Relaxed);

        let tx_rate = tx_now.saturating_sub(tx_prev) as f64 / elapsed / 1024.0;
        let rx_rate = rx_now.saturating_sub(rx_prev) as f64 / elapsed / 1024.0;

        self.tx_rate.store(tx_rate.to_bits(), Ordering::Relaxed);
        self.rx_rate.store(rx_rate.to_bits(), Ordering::Relaxed);

        (tx_rate, rx_rate)
    }

    pub fn snapshot(&self) -> TrafficSnapshot {
        let (tx_kb_s, rx_kb_s) = self.update_rates();
        TrafficSnapshot {
            tx_bytes: self.tx_bytes(),
            rx_bytes: self.rx_bytes(),
            tx_dropped: self.tx_dropped(),
            tx_kb_s,
            rx_kb_s,
        }
    }
}

impl Default for TrafficStats {
    fn default() -> Self {
        Self::new()
    }
}
