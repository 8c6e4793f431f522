//! Framing, byte stuffing and checksum
//!
//! Wire format:
//!
//! ```text
//! [HEADER][LEN][stuffed payload ...][CHECKSUM][FOOTER]
//! ```
//!
//! - Every payload byte equal to HEADER, FOOTER or ESCAPE is preceded by ESCAPE.
//! - LEN counts the stuffed bytes (payload + escapes), so it fits in one byte.
//! - CHECKSUM is the wrapping sum of the stuffed bytes only.
//!
//! Decoding scans a whole receive window, extracts every verified frame in it
//! and reports which regions to consume so they are never matched twice.

use super::buffer::{ReceiveBuffer, Snapshot, CONSUMED_FILL};
use super::payload::Payload;
use super::stats::{DecodeStats, EncodeTrace};
use crate::constants::{
    DEFAULT_ESCAPE, DEFAULT_FOOTER, DEFAULT_HEADER, FRAME_BUF_LEN, FRAME_OVERHEAD,
    MAX_STUFFED_LEN, PACKAGED_PAYLOAD_LEN,
};
use crate::error::{LinkError, LinkResult};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// The three reserved framing values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentinels {
    pub header: u8,
    pub footer: u8,
    pub escape: u8,
}

impl Sentinels {
    pub const DEFAULT: Sentinels = Sentinels {
        header: DEFAULT_HEADER,
        footer: DEFAULT_FOOTER,
        escape: DEFAULT_ESCAPE,
    };

    /// Validate a sentinel set
    ///
    /// # Errors
    ///
    /// `InvalidSentinels` when two values coincide, or when the header equals
    /// the fill written over consumed bytes.
    pub fn new(header: u8, footer: u8, escape: u8) -> LinkResult<Self> {
        let sentinels = Self {
            header,
            footer,
            escape,
        };
        sentinels.validate()?;
        Ok(sentinels)
    }

    pub fn validate(&self) -> LinkResult<()> {
        if self.header == self.footer || self.header == self.escape || self.footer == self.escape
        {
            return Err(LinkError::InvalidSentinels {
                reason: "header, footer and escape must be distinct",
            });
        }
        if self.header == CONSUMED_FILL {
            return Err(LinkError::InvalidSentinels {
                reason: "header cannot be 0x00",
            });
        }
        Ok(())
    }

    #[inline]
    pub fn is_reserved(&self, byte: u8) -> bool {
        byte == self.header || byte == self.footer || byte == self.escape
    }
}

impl Default for Sentinels {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A complete wire frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    bytes: Bytes,
    stuffed_len: usize,
}

impl EncodedFrame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    /// Total bytes on the wire
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Payload plus inserted escapes
    pub fn stuffed_len(&self) -> usize {
        self.stuffed_len
    }

    /// Index of the footer byte (`3 + stuffed_len`)
    pub fn last_index(&self) -> usize {
        self.bytes.len() - 1
    }

    pub fn checksum(&self) -> u8 {
        self.bytes[self.bytes.len() - 2]
    }
}

/// One verified frame found by a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Position of the frame in the scanned window, header to footer
    pub range: Range<usize>,
    pub payload: Payload,
}

/// Everything one decode pass found
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeReport {
    frames: Vec<DecodedFrame>,
    /// Footer mismatches, checksum mismatches and oversized payloads, in scan order
    faults: Vec<LinkError>,
    /// Regions to overwrite: verified frames and checksum failures
    consumed: Vec<Range<usize>>,
    /// Why the scan stopped early, or that it never saw a header
    tail: Option<LinkError>,
}

impl DecodeReport {
    pub fn frames(&self) -> &[DecodedFrame] {
        &self.frames
    }

    pub fn payloads(&self) -> impl Iterator<Item = &Payload> {
        self.frames.iter().map(|f| &f.payload)
    }

    pub fn into_payloads(self) -> Vec<Payload> {
        self.frames.into_iter().map(|f| f.payload).collect()
    }

    pub fn decoded_count(&self) -> usize {
        self.frames.len()
    }

    pub fn faults(&self) -> &[LinkError] {
        &self.faults
    }

    /// `HeaderNotFound` or `FrameIncomplete`, if either ended the scan
    pub fn tail(&self) -> Option<&LinkError> {
        self.tail.as_ref()
    }

    /// Window regions this pass matched
    pub fn consumed(&self) -> &[Range<usize>] {
        &self.consumed
    }

    pub fn checksum_errors(&self) -> usize {
        self.faults
            .iter()
            .filter(|f| matches!(f, LinkError::ChecksumMismatch { .. }))
            .count()
    }

    /// Summary of the pass: number of payloads extracted, or the last
    /// classification when none were.
    pub fn status(&self) -> LinkResult<usize> {
        if !self.frames.is_empty() {
            return Ok(self.frames.len());
        }
        match self.tail.clone().or_else(|| self.faults.last().cloned()) {
            Some(err) => Err(err),
            None => Ok(0),
        }
    }

    /// Overwrite matched regions of the buffer the window was taken from
    pub fn consume_from<const N: usize>(
        &self,
        buffer: &mut ReceiveBuffer<N>,
        snapshot: &Snapshot<N>,
    ) -> usize {
        self.consumed
            .iter()
            .map(|range| buffer.consume(snapshot.stream_range(range.clone())))
            .sum()
    }

    /// Fold this pass into the port counters
    pub fn record(&self, stats: &DecodeStats) {
        for _ in &self.frames {
            stats.add_valid();
        }
        for _ in 0..self.checksum_errors() {
            stats.add_bad_checksum();
        }
    }
}

/// Stateless frame encoder/decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodec {
    sentinels: Sentinels,
    frame_capacity: usize,
    max_payload: usize,
}

impl FrameCodec {
    /// Codec with the default frame and payload limits
    pub const fn new(sentinels: Sentinels) -> Self {
        Self {
            sentinels,
            frame_capacity: FRAME_BUF_LEN,
            max_payload: PACKAGED_PAYLOAD_LEN,
        }
    }

    /// Override the frame buffer capacity (header to footer)
    pub const fn with_frame_capacity(mut self, capacity: usize) -> Self {
        self.frame_capacity = capacity;
        self
    }

    pub fn sentinels(&self) -> Sentinels {
        self.sentinels
    }

    pub fn frame_capacity(&self) -> usize {
        self.frame_capacity
    }

    /// Largest stuffed length a frame can carry with this capacity
    fn max_stuffed(&self, capacity: usize) -> usize {
        capacity.saturating_sub(FRAME_OVERHEAD).min(MAX_STUFFED_LEN)
    }

    fn stuffed<'a>(&'a self, payload: &'a [u8]) -> impl Iterator<Item = u8> + 'a {
        let escape = self.sentinels.escape;
        payload.iter().flat_map(move |&byte| {
            let prefix = self.sentinels.is_reserved(byte).then_some(escape);
            prefix.into_iter().chain(std::iter::once(byte))
        })
    }

    fn escape_count(&self, payload: &[u8]) -> usize {
        payload
            .iter()
            .filter(|&&b| self.sentinels.is_reserved(b))
            .count()
    }

    /// Check a payload fits, returning its stuffed length
    fn plan(&self, payload: &[u8], capacity: usize) -> LinkResult<usize> {
        if payload.len() > self.max_payload {
            return Err(LinkError::PayloadTooLong {
                len: payload.len(),
                max: self.max_payload,
            });
        }
        let stuffed = payload.len() + self.escape_count(payload);
        if stuffed > MAX_STUFFED_LEN || stuffed + FRAME_OVERHEAD > capacity {
            return Err(LinkError::FrameTooLong {
                stuffed,
                max: self.max_stuffed(capacity),
            });
        }
        Ok(stuffed)
    }

    /// Frame a payload
    ///
    /// # Errors
    ///
    /// `PayloadTooLong` or `FrameTooLong`; no partial frame is produced.
    pub fn encode(&self, payload: &[u8]) -> LinkResult<EncodedFrame> {
        let stuffed_len = self.plan(payload, self.frame_capacity)?;

        let mut out = BytesMut::with_capacity(stuffed_len + FRAME_OVERHEAD);
        out.put_u8(self.sentinels.header);
        out.put_u8(stuffed_len as u8);
        let mut checksum = 0u8;
        for byte in self.stuffed(payload) {
            checksum = checksum.wrapping_add(byte);
            out.put_u8(byte);
        }
        out.put_u8(checksum);
        out.put_u8(self.sentinels.footer);

        Ok(EncodedFrame {
            bytes: out.freeze(),
            stuffed_len,
        })
    }

    /// `encode`, also filling in what happened for diagnostics
    pub fn encode_traced(
        &self,
        payload: &[u8],
        trace: &mut EncodeTrace,
    ) -> LinkResult<EncodedFrame> {
        let escapes = self.escape_count(payload);
        *trace = EncodeTrace {
            payload_len: payload.len(),
            escapes,
            stuffed_len: payload.len() + escapes,
            checksum: 0,
            frame_len: 0,
        };
        let frame = self.encode(payload)?;
        trace.checksum = frame.checksum();
        trace.frame_len = frame.len();
        Ok(frame)
    }

    /// Frame a payload into a caller-provided buffer
    ///
    /// The usable capacity is the smaller of `out.len()` and the codec's frame
    /// capacity. Returns the number of bytes written; on error `out` is left
    /// untouched.
    pub fn encode_into(&self, payload: &[u8], out: &mut [u8]) -> LinkResult<usize> {
        let stuffed_len = self.plan(payload, out.len().min(self.frame_capacity))?;

        out[0] = self.sentinels.header;
        out[1] = stuffed_len as u8;
        let mut checksum = 0u8;
        for (slot, byte) in out[2..].iter_mut().zip(self.stuffed(payload)) {
            checksum = checksum.wrapping_add(byte);
            *slot = byte;
        }
        out[2 + stuffed_len] = checksum;
        out[3 + stuffed_len] = self.sentinels.footer;
        Ok(stuffed_len + FRAME_OVERHEAD)
    }

    /// Remove byte stuffing from a verified frame body
    ///
    /// A trailing ESCAPE with nothing after it is dropped.
    fn unstuff(&self, stuffed: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(stuffed.len());
        let mut escaped = false;
        for &byte in stuffed {
            if byte == self.sentinels.escape && !escaped {
                escaped = true;
            } else {
                escaped = false;
                out.push(byte);
            }
        }
        out
    }

    /// Scan a window for frames without touching any buffer
    ///
    /// A frame cut off by the end of `window` is reported as incomplete.
    pub fn scan(&self, window: &[u8]) -> DecodeReport {
        self.scan_within(window, usize::MAX)
    }

    /// Scan a snapshot of a receive window holding at most `capacity` bytes
    ///
    /// A header whose declared frame cannot fit in `capacity` bytes is a
    /// desynchronization, not a frame to wait for: it is reported as
    /// `LengthOverflow` and the scan moves on by one byte.
    pub fn scan_within(&self, window: &[u8], capacity: usize) -> DecodeReport {
        let mut report = DecodeReport::default();
        let mut seen_header = false;
        let mut pos = 0;

        while pos < window.len() {
            if window[pos] != self.sentinels.header {
                pos += 1;
                continue;
            }
            seen_header = true;

            let Some(&declared) = window.get(pos + 1) else {
                report.tail = Some(LinkError::FrameIncomplete { offset: pos });
                break;
            };
            let n = declared as usize;
            if n + FRAME_OVERHEAD > capacity {
                report.faults.push(LinkError::LengthOverflow {
                    offset: pos,
                    declared,
                });
                pos += 1;
                continue;
            }
            let footer_at = pos + 3 + n;
            if footer_at >= window.len() {
                report.tail = Some(LinkError::FrameIncomplete { offset: pos });
                break;
            }

            if window[footer_at] != self.sentinels.footer {
                // Not a frame start; a real one may begin on the next byte
                report.faults.push(LinkError::FooterMismatch { offset: pos });
                pos += 1;
                continue;
            }

            let body = &window[pos + 2..pos + 2 + n];
            let expected = window[pos + 2 + n];
            let actual = body.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
            let range = pos..footer_at + 1;

            if actual != expected {
                report.faults.push(LinkError::ChecksumMismatch {
                    offset: pos,
                    expected,
                    actual,
                });
            } else {
                match Payload::new(self.unstuff(body)) {
                    Ok(payload) => report.frames.push(DecodedFrame {
                        range: range.clone(),
                        payload,
                    }),
                    Err(err) => report.faults.push(err),
                }
            }
            report.consumed.push(range);
            pos = footer_at + 1;
        }

        if !seen_header {
            report.tail = Some(LinkError::HeaderNotFound);
        }
        report
    }

    /// Decode a buffer owned by the caller: scan, consume matches, count
    pub fn decode<const N: usize>(
        &self,
        buffer: &mut ReceiveBuffer<N>,
        stats: &DecodeStats,
    ) -> DecodeReport {
        let snapshot = buffer.snapshot();
        let report = self.scan_within(snapshot.as_slice(), N);
        report.consume_from(buffer, &snapshot);
        report.record(stats);
        report
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(Sentinels::DEFAULT)
    }
}
