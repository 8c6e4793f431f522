//! Fixed-capacity FIFO receive window
//!
//! Circular storage with a saturating fill count: pushing is O(1) per byte
//! regardless of fill state, and once full every new byte evicts exactly one
//! oldest byte.
//!
//! Every byte also gets an absolute stream offset (count of bytes pushed
//! before it). Snapshots remember the offset of their first byte, so a region
//! matched in a snapshot can be consumed later even if new bytes arrived and
//! shifted the window in between.

use crate::constants::RX_BUF_LEN;
use std::ops::Range;

/// Value written over consumed bytes. Never a valid header.
pub const CONSUMED_FILL: u8 = 0x00;

/// Per-port receive window
#[derive(Debug, Clone)]
pub struct ReceiveBuffer<const N: usize = RX_BUF_LEN> {
    data: [u8; N],
    /// Physical index of the next write
    head: usize,
    /// Logical fill count, saturates at N
    fill: usize,
    /// Total bytes ever pushed (stream offset of the next byte)
    pushed: u64,
}

impl<const N: usize> ReceiveBuffer<N> {
    const NON_EMPTY: () = assert!(N > 0, "receive buffer capacity must be non-zero");

    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::NON_EMPTY;
        Self {
            data: [0; N],
            head: 0,
            fill: 0,
            pushed: 0,
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of valid bytes in the window, never above capacity
    pub fn fill_count(&self) -> usize {
        self.fill
    }

    pub fn is_empty(&self) -> bool {
        self.fill == 0
    }

    pub fn is_full(&self) -> bool {
        self.fill == N
    }

    /// Stream offset of the oldest byte still in the window
    pub fn window_start(&self) -> u64 {
        self.pushed - self.fill as u64
    }

    /// Stream offset the next pushed byte will get
    pub fn stream_end(&self) -> u64 {
        self.pushed
    }

    /// Add one byte, evicting the oldest when full
    #[inline]
    pub fn push_byte(&mut self, byte: u8) {
        self.data[self.head] = byte;
        self.head = (self.head + 1) % N;
        if self.fill < N {
            self.fill += 1;
        }
        self.pushed += 1;
    }

    /// Add a slice of bytes
    ///
    /// Same observable result as pushing each byte in turn, done with at most
    /// two copies. Only the last `N` bytes of an oversized slice can survive,
    /// so the rest is skipped outright.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        let skip = bytes.len().saturating_sub(N);
        let tail = &bytes[skip..];

        self.head = (self.head + skip % N) % N;
        self.pushed += skip as u64;

        let first = tail.len().min(N - self.head);
        self.data[self.head..self.head + first].copy_from_slice(&tail[..first]);
        let rest = tail.len() - first;
        self.data[..rest].copy_from_slice(&tail[first..]);

        self.head = (self.head + tail.len()) % N;
        self.fill = (self.fill + bytes.len()).min(N);
        self.pushed += tail.len() as u64;
    }

    /// Byte at logical index (0 = oldest)
    pub fn get(&self, index: usize) -> Option<u8> {
        (index < self.fill).then(|| self.data[self.physical(index)])
    }

    /// Iterate over the window, oldest first
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..self.fill).map(move |i| self.data[self.physical(i)])
    }

    /// Copy the window into a contiguous read-only view
    pub fn snapshot(&self) -> Snapshot<N> {
        let mut bytes = [0u8; N];
        let start = self.physical(0);
        let first = self.fill.min(N - start);
        bytes[..first].copy_from_slice(&self.data[start..start + first]);
        bytes[first..self.fill].copy_from_slice(&self.data[..self.fill - first]);
        Snapshot {
            start: self.window_start(),
            len: self.fill,
            bytes,
        }
    }

    /// Overwrite a region (absolute stream offsets) so it cannot match again
    ///
    /// Parts of the range already evicted or not yet received are ignored.
    /// Returns the number of bytes overwritten.
    pub fn consume(&mut self, range: Range<u64>) -> usize {
        let from = range.start.max(self.window_start());
        let to = range.end.min(self.pushed);
        if from >= to {
            return 0;
        }
        let base = self.window_start();
        for offset in from..to {
            let index = self.physical((offset - base) as usize);
            self.data[index] = CONSUMED_FILL;
        }
        (to - from) as usize
    }

    /// Drop all buffered bytes (stream offsets keep counting)
    pub fn clear(&mut self) {
        self.data = [0; N];
        self.fill = 0;
    }

    #[inline]
    fn physical(&self, index: usize) -> usize {
        (self.head + N - self.fill + index) % N
    }
}

impl<const N: usize> Default for ReceiveBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Contiguous copy of a receive window
#[derive(Debug, Clone)]
pub struct Snapshot<const N: usize = RX_BUF_LEN> {
    start: u64,
    len: usize,
    bytes: [u8; N],
}

impl<const N: usize> Snapshot<N> {
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// Stream offset of the first byte
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Translate a range within this snapshot to stream offsets
    pub fn stream_range(&self, local: Range<usize>) -> Range<u64> {
        self.start + local.start as u64..self.start + local.end as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents<const N: usize>(buf: &ReceiveBuffer<N>) -> Vec<u8> {
        buf.iter().collect()
    }

    #[test]
    fn test_fill_without_eviction() {
        let mut buf = ReceiveBuffer::<4>::new();
        buf.push_byte(1);
        buf.push_byte(2);
        assert_eq!(buf.fill_count(), 2);
        assert_eq!(contents(&buf), vec![1, 2]);
        assert!(!buf.is_full());
    }

    #[test]
    fn test_evicts_oldest_when_full() {
        let mut buf = ReceiveBuffer::<4>::new();
        for b in 1..=6 {
            buf.push_byte(b);
        }
        assert_eq!(buf.fill_count(), 4);
        assert_eq!(contents(&buf), vec![3, 4, 5, 6]);
        assert_eq!(buf.window_start(), 2);
    }

    #[test]
    fn test_push_bytes_wraps() {
        let mut buf = ReceiveBuffer::<4>::new();
        buf.push_bytes(&[1, 2, 3]);
        buf.push_bytes(&[4, 5]);
        assert_eq!(contents(&buf), vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_push_bytes_longer_than_capacity() {
        let mut buf = ReceiveBuffer::<4>::new();
        buf.push_byte(9);
        buf.push_bytes(&[1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(contents(&buf), vec![4, 5, 6, 7]);
        assert_eq!(buf.stream_end(), 8);
    }

    #[test]
    fn test_push_empty_slice() {
        let mut buf = ReceiveBuffer::<4>::new();
        buf.push_bytes(&[]);
        assert!(buf.is_empty());
        assert_eq!(buf.stream_end(), 0);
    }

    #[test]
    fn test_snapshot_is_ordered() {
        let mut buf = ReceiveBuffer::<4>::new();
        buf.push_bytes(&[1, 2, 3, 4, 5, 6]);
        let snap = buf.snapshot();
        assert_eq!(snap.as_slice(), &[3, 4, 5, 6]);
        assert_eq!(snap.start(), 2);
    }

    #[test]
    fn test_consume_zeroes_region() {
        let mut buf = ReceiveBuffer::<8>::new();
        buf.push_bytes(&[1, 2, 3, 4, 5]);
        let snap = buf.snapshot();
        assert_eq!(buf.consume(snap.stream_range(1..3)), 2);
        assert_eq!(contents(&buf), vec![1, 0, 0, 4, 5]);
        assert_eq!(buf.fill_count(), 5);
    }

    #[test]
    fn test_consume_after_window_moved() {
        let mut buf = ReceiveBuffer::<4>::new();
        buf.push_bytes(&[1, 2, 3, 4]);
        let snap = buf.snapshot();

        // Two new bytes evict 1 and 2 before the consume lands
        buf.push_bytes(&[5, 6]);
        let consumed = buf.consume(snap.stream_range(1..4));

        // Byte 2 is already gone, 3 and 4 are overwritten
        assert_eq!(consumed, 2);
        assert_eq!(contents(&buf), vec![0, 0, 5, 6]);
    }

    #[test]
    fn test_consume_out_of_window_is_noop() {
        let mut buf = ReceiveBuffer::<4>::new();
        buf.push_bytes(&[1, 2]);
        assert_eq!(buf.consume(10..20), 0);
        assert_eq!(contents(&buf), vec![1, 2]);
    }

    #[test]
    fn test_get_and_clear() {
        let mut buf = ReceiveBuffer::<4>::new();
        buf.push_bytes(&[7, 8]);
        assert_eq!(buf.get(1), Some(8));
        assert_eq!(buf.get(2), None);
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.stream_end(), 2);
    }
}
