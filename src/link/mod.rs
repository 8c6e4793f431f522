//! Data-link core
//!
//! - **buffer**: per-port FIFO window absorbing raw bytes
//! - **codec**: framing, byte stuffing and checksum (encode / decode)
//! - **payload**: the application message carried inside a frame
//! - **stats**: decode counters and encode traces

pub mod buffer;
pub mod codec;
pub mod payload;
pub mod stats;

pub use buffer::{ReceiveBuffer, Snapshot};
pub use codec::{DecodeReport, DecodedFrame, EncodedFrame, FrameCodec, Sentinels};
pub use payload::{sent_from_slave, Access, Command, Payload, PayloadBuilder, PayloadHeader};
pub use stats::{DecodeCounts, DecodeStats, EncodeTrace};
