//! Application payloads
//!
//! Fixed layout: `[XID, RID, CMD, data...]`, at most `PACKAGED_PAYLOAD_LEN`
//! bytes. The command byte packs a 7-bit code with a read/write flag in bit 7.

use crate::constants::{CMD_WRITE_BIT, PACKAGED_PAYLOAD_LEN, P_CMD, P_DATA, P_RID, P_XID};
use crate::error::{LinkError, LinkResult};
use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

/// Whether a command reads from or writes to the recipient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    Read,
    Write,
}

/// Command byte: 7-bit code plus read/write flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Command {
    code: u8,
    access: Access,
}

impl Command {
    /// Build a command, rejecting codes that need more than 7 bits
    pub fn new(code: u8, access: Access) -> LinkResult<Self> {
        if code & CMD_WRITE_BIT != 0 {
            return Err(LinkError::InvalidCommandCode { code });
        }
        Ok(Self { code, access })
    }

    pub fn read(code: u8) -> LinkResult<Self> {
        Self::new(code, Access::Read)
    }

    pub fn write(code: u8) -> LinkResult<Self> {
        Self::new(code, Access::Write)
    }

    /// Split a wire command byte
    pub fn from_byte(byte: u8) -> Self {
        let access = if byte & CMD_WRITE_BIT != 0 {
            Access::Write
        } else {
            Access::Read
        };
        Self {
            code: byte & !CMD_WRITE_BIT,
            access,
        }
    }

    /// Wire representation
    pub fn to_byte(self) -> u8 {
        match self.access {
            Access::Read => self.code,
            Access::Write => self.code | CMD_WRITE_BIT,
        }
    }

    /// 7-bit command code, used as the dispatch key
    pub fn code(self) -> u8 {
        self.code
    }

    pub fn access(self) -> Access {
        self.access
    }
}

/// Address and command fields every routable payload starts with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PayloadHeader {
    /// Sender board id
    pub xid: u8,
    /// Recipient board id
    pub rid: u8,
    pub command: Command,
}

impl PayloadHeader {
    /// Board ids grow with distance from the root, so a sender with a higher
    /// id than its recipient is below it in the tree.
    pub fn sent_from_slave(&self) -> bool {
        self.xid > self.rid
    }
}

/// A verified application message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    bytes: Bytes,
}

impl Payload {
    /// Wrap raw payload bytes
    ///
    /// # Errors
    ///
    /// `PayloadTooLong` when `bytes` exceeds `PACKAGED_PAYLOAD_LEN`.
    pub fn new(bytes: impl Into<Bytes>) -> LinkResult<Self> {
        let bytes = bytes.into();
        if bytes.len() > PACKAGED_PAYLOAD_LEN {
            return Err(LinkError::PayloadTooLong {
                len: bytes.len(),
                max: PACKAGED_PAYLOAD_LEN,
            });
        }
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_bytes(&self) -> Bytes {
        self.bytes.clone()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Parse the address header
    ///
    /// # Errors
    ///
    /// `TruncatedPayload` when fewer than three bytes are present.
    pub fn header(&self) -> LinkResult<PayloadHeader> {
        if self.bytes.len() < P_DATA {
            return Err(LinkError::TruncatedPayload {
                len: self.bytes.len(),
            });
        }
        Ok(PayloadHeader {
            xid: self.bytes[P_XID],
            rid: self.bytes[P_RID],
            command: Command::from_byte(self.bytes[P_CMD]),
        })
    }

    /// Raw command byte, including the read/write flag
    pub fn command_byte(&self) -> Option<u8> {
        self.bytes.get(P_CMD).copied()
    }

    /// Command-specific data after the header
    pub fn data(&self) -> &[u8] {
        self.bytes.get(P_DATA..).unwrap_or_default()
    }
}

/// True iff the payload travels up the tree (sender id > recipient id).
/// Truncated payloads carry no direction and report `false`.
pub fn sent_from_slave(payload: &Payload) -> bool {
    payload
        .header()
        .map(|h| h.sent_from_slave())
        .unwrap_or(false)
}

/// Incremental payload construction
///
/// ```ignore
/// let mut builder = PayloadBuilder::new(2, 5, Command::write(0x10)?);
/// builder.append(&[0x01, 0x02])?;
/// let payload = builder.finish();
/// ```
#[derive(Debug, Clone)]
pub struct PayloadBuilder {
    buf: BytesMut,
}

impl PayloadBuilder {
    /// Start a payload addressed `from` -> `to`
    pub fn new(from: u8, to: u8, command: Command) -> Self {
        let mut buf = BytesMut::with_capacity(PACKAGED_PAYLOAD_LEN);
        buf.put_u8(from);
        buf.put_u8(to);
        buf.put_u8(command.to_byte());
        Self { buf }
    }

    /// Append command data, returning the index of the next free byte
    ///
    /// # Errors
    ///
    /// `PayloadTooLong` if the data would overflow the payload; nothing is
    /// appended in that case.
    pub fn append(&mut self, data: &[u8]) -> LinkResult<usize> {
        let len = self.buf.len() + data.len();
        if len > PACKAGED_PAYLOAD_LEN {
            return Err(LinkError::PayloadTooLong {
                len,
                max: PACKAGED_PAYLOAD_LEN,
            });
        }
        self.buf.put_slice(data);
        Ok(self.buf.len())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Payload {
        // append() keeps the length within bounds
        Payload {
            bytes: self.buf.freeze(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_byte_split() {
        let cmd = Command::from_byte(0x90);
        assert_eq!(cmd.code(), 0x10);
        assert_eq!(cmd.access(), Access::Write);
        assert_eq!(cmd.to_byte(), 0x90);

        let cmd = Command::from_byte(0x10);
        assert_eq!(cmd.code(), 0x10);
        assert_eq!(cmd.access(), Access::Read);
    }

    #[test]
    fn test_command_rejects_eight_bit_code() {
        assert_eq!(
            Command::read(0x80),
            Err(LinkError::InvalidCommandCode { code: 0x80 })
        );
        assert!(Command::write(0x7F).is_ok());
    }

    #[test]
    fn test_header_parse() {
        let payload = Payload::new(vec![0x02, 0x01, 0x90, 0xAA]).unwrap();
        let header = payload.header().unwrap();
        assert_eq!(header.xid, 0x02);
        assert_eq!(header.rid, 0x01);
        assert_eq!(header.command, Command::write(0x10).unwrap());
        assert_eq!(payload.data(), &[0xAA]);
    }

    #[test]
    fn test_truncated_header() {
        let payload = Payload::new(vec![0x02, 0x01]).unwrap();
        assert_eq!(
            payload.header(),
            Err(LinkError::TruncatedPayload { len: 2 })
        );
        assert!(payload.data().is_empty());
        assert!(!sent_from_slave(&payload));
    }

    #[test]
    fn test_payload_too_long() {
        let result = Payload::new(vec![0u8; PACKAGED_PAYLOAD_LEN + 1]);
        assert!(matches!(result, Err(LinkError::PayloadTooLong { .. })));
        assert!(Payload::new(vec![0u8; PACKAGED_PAYLOAD_LEN]).is_ok());
    }

    #[test]
    fn test_sent_from_slave() {
        let up = Payload::new(vec![5, 2, 0x01]).unwrap();
        let down = Payload::new(vec![2, 5, 0x01]).unwrap();
        assert!(sent_from_slave(&up));
        assert!(!sent_from_slave(&down));
    }

    #[test]
    fn test_builder_append() {
        let mut builder = PayloadBuilder::new(1, 3, Command::read(0x22).unwrap());
        assert_eq!(builder.append(&[0xDE, 0xAD]).unwrap(), 5);
        assert_eq!(builder.append(&[0xBE]).unwrap(), 6);
        let payload = builder.finish();
        assert_eq!(payload.as_bytes(), &[1, 3, 0x22, 0xDE, 0xAD, 0xBE]);
    }

    #[test]
    fn test_builder_overflow_leaves_payload_intact() {
        let mut builder = PayloadBuilder::new(1, 3, Command::read(0x22).unwrap());
        let too_much = vec![0u8; PACKAGED_PAYLOAD_LEN];
        assert!(builder.append(&too_much).is_err());
        assert_eq!(builder.len(), 3);
    }
}
