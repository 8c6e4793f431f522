//! Outbound frame queues
//!
//! The router fills these; the node poll loop drains them into transports.
//! A pending flag lets the poll loop skip queues with nothing to send without
//! taking the lock.

use super::Destination;
use crate::constants::OUTBOUND_QUEUE_CAPACITY;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// A frame waiting for its transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedFrame {
    pub frame: Bytes,
    /// Command byte of the forwarded payload, for labelling and priority
    pub cmd: u8,
}

/// Bounded frame queue for one outbound path
#[derive(Debug)]
pub struct OutboundQueue {
    frames: Mutex<VecDeque<QueuedFrame>>,
    pending: AtomicBool,
    capacity: usize,
    dropped: AtomicU64,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::with_capacity(OUTBOUND_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity)),
            pending: AtomicBool::new(false),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
        }
    }

    /// Queue a frame and raise the pending flag. When full the oldest frame
    /// is dropped.
    pub fn push(&self, entry: QueuedFrame) {
        let mut frames = self.frames.lock();
        if frames.len() >= self.capacity {
            frames.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(capacity = self.capacity, "outbound queue full, dropped oldest frame");
        }
        frames.push_back(entry);
        self.pending.store(true, Ordering::Release);
    }

    /// Work queued since the last drain
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Take every queued frame, oldest first, and clear the pending flag
    pub fn drain(&self) -> Vec<QueuedFrame> {
        if !self.is_pending() {
            return Vec::new();
        }
        let mut frames = self.frames.lock();
        self.pending.store(false, Ordering::Release);
        frames.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frames lost to overflow
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// The outbound paths wired on this board
#[derive(Debug, Clone, Default)]
pub struct Outbound {
    pub parent: Option<Arc<OutboundQueue>>,
    pub sub_bus_1: Option<Arc<OutboundQueue>>,
    pub sub_bus_2: Option<Arc<OutboundQueue>>,
}

impl Outbound {
    pub fn queue_for(&self, destination: Destination) -> Option<&Arc<OutboundQueue>> {
        match destination {
            Destination::Parent => self.parent.as_ref(),
            Destination::SubBus1 => self.sub_bus_1.as_ref(),
            Destination::SubBus2 => self.sub_bus_2.as_ref(),
            Destination::Local | Destination::Unknown => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(byte: u8) -> QueuedFrame {
        QueuedFrame {
            frame: Bytes::copy_from_slice(&[byte]),
            cmd: byte,
        }
    }

    #[test]
    fn test_push_sets_pending() {
        let queue = OutboundQueue::new();
        assert!(!queue.is_pending());
        queue.push(entry(1));
        assert!(queue.is_pending());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_drain_clears_pending() {
        let queue = OutboundQueue::new();
        queue.push(entry(1));
        queue.push(entry(2));
        let drained = queue.drain();
        assert_eq!(drained, vec![entry(1), entry(2)]);
        assert!(!queue.is_pending());
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let queue = OutboundQueue::with_capacity(2);
        queue.push(entry(1));
        queue.push(entry(2));
        queue.push(entry(3));
        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.drain(), vec![entry(2), entry(3)]);
    }

    #[test]
    fn test_queue_for_destination() {
        let sub1 = Arc::new(OutboundQueue::new());
        let outbound = Outbound {
            sub_bus_1: Some(sub1.clone()),
            ..Outbound::default()
        };
        assert!(outbound.queue_for(Destination::SubBus1).is_some());
        assert!(outbound.queue_for(Destination::SubBus2).is_none());
        assert!(outbound.queue_for(Destination::Local).is_none());
    }
}
