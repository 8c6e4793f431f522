//! Centralized error types
//!
//! Data-link conditions are represented by `LinkError`; everything the node
//! runtime can hit (I/O, configuration, transports) by `NodeError`.
//! Use `Result<T>` as shorthand for `std::result::Result<T, NodeError>`.

use crate::route::Destination;
use std::path::PathBuf;

/// Data-link errors
///
/// None of these are fatal: encode refuses to emit a partial frame, decode
/// classifies and keeps scanning, routing reports and drops.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    // === Encode ===
    /// Stuffed payload does not fit in a frame
    #[error("frame too long: {stuffed} stuffed bytes (max {max})")]
    FrameTooLong { stuffed: usize, max: usize },
    /// Payload larger than the packaged payload size
    #[error("payload too long: {len} bytes (max {max})")]
    PayloadTooLong { len: usize, max: usize },

    // === Decode ===
    /// Window holds no header byte at all
    #[error("no header found")]
    HeaderNotFound,
    /// Header found but the frame is not complete yet
    #[error("frame at offset {offset} incomplete, waiting for more data")]
    FrameIncomplete { offset: usize },
    /// Declared length does not land on a footer (desynchronization)
    #[error("footer mismatch for header at offset {offset}")]
    FooterMismatch { offset: usize },
    /// Declared length could never fit the receive window (desynchronization)
    #[error("declared length {declared} at offset {offset} cannot fit the receive window")]
    LengthOverflow { offset: usize, declared: u8 },
    /// Well-framed message with corrupted contents
    #[error("checksum mismatch at offset {offset}: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch {
        offset: usize,
        expected: u8,
        actual: u8,
    },

    // === Routing ===
    /// Recipient matches no known board
    #[error("unknown recipient {rid}")]
    UnknownRecipient { rid: u8 },
    /// Payload too short to carry XID, RID and CMD
    #[error("truncated payload: {len} bytes")]
    TruncatedPayload { len: usize },
    /// Local command code without a registered handler
    #[error("no handler registered for command {code}")]
    NoHandler { code: u8 },
    /// Destination has no outbound queue on this board
    #[error("no outbound path to {destination:?}")]
    NoOutboundPath { destination: Destination },
    /// Command code outside 0..=127
    #[error("invalid command code {code}")]
    InvalidCommandCode { code: u8 },

    // === Configuration ===
    /// Framing sentinels are not usable
    #[error("invalid sentinels: {reason}")]
    InvalidSentinels { reason: &'static str },
}

/// All node runtime errors
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    // === Transport ===
    /// Failed to open serial port
    #[error("Cannot open serial port: {port}")]
    SerialOpen {
        port: String,
        #[source]
        source: std::io::Error,
    },
    /// Failed to bind UDP socket
    #[error("Cannot bind UDP address {addr}")]
    UdpBind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    // === IO ===
    /// Config file could not be read
    #[error("Cannot read config: {}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Config file is not valid TOML for the schema
    #[error("Cannot parse config {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    /// Invalid config value
    #[error("Invalid {field}: {reason}")]
    ConfigValidation { field: &'static str, reason: String },

    // === Runtime ===
    /// Tokio runtime creation failed
    #[error("Failed to create runtime")]
    Runtime {
        #[source]
        source: std::io::Error,
    },
    /// Malformed command line input
    #[error("Invalid input: {0}")]
    Input(String),
    /// JSON output could not be produced
    #[error("Cannot serialize output")]
    Json(#[from] serde_json::Error),

    // === Link ===
    #[error(transparent)]
    Link(#[from] LinkError),
}

/// Alias for Result with NodeError
pub type Result<T> = std::result::Result<T, NodeError>;

/// Alias for Result with LinkError
pub type LinkResult<T> = std::result::Result<T, LinkError>;
