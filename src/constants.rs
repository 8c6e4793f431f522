//! Application-wide constants
//!
//! Centralized constants to avoid duplication and ensure consistency.

// =============================================================================
// Framing
// =============================================================================

/// Default frame start sentinel
pub const DEFAULT_HEADER: u8 = 0x7E;

/// Default frame end sentinel
pub const DEFAULT_FOOTER: u8 = 0x7F;

/// Default escape sentinel (byte stuffing)
pub const DEFAULT_ESCAPE: u8 = 0x7D;

/// Bytes a frame adds around its stuffed payload: header, length, checksum, footer
pub const FRAME_OVERHEAD: usize = 4;

/// Largest stuffed payload the single length byte can describe
pub const MAX_STUFFED_LEN: usize = u8::MAX as usize;

// =============================================================================
// Buffers
// =============================================================================

/// Maximum size of a logical payload (XID, RID, CMD and command data)
pub const PACKAGED_PAYLOAD_LEN: usize = 48;

/// Frame buffer capacity: worst case is every payload byte escaped
pub const FRAME_BUF_LEN: usize = 2 * PACKAGED_PAYLOAD_LEN + FRAME_OVERHEAD;

/// Receive window per port
pub const RX_BUF_LEN: usize = 128;

/// Serial read chunk size
pub const SERIAL_READ_CHUNK: usize = 256;

/// UDP receive buffer size
pub const UDP_BUFFER_SIZE: usize = 4096;

/// Channel capacity for async message passing
pub const CHANNEL_CAPACITY: usize = 256;

/// Frames held per outbound queue before the oldest is dropped
pub const OUTBOUND_QUEUE_CAPACITY: usize = 32;

// =============================================================================
// Payload layout
// =============================================================================

/// Offset of the sender id
pub const P_XID: usize = 0;

/// Offset of the recipient id
pub const P_RID: usize = 1;

/// Offset of the command byte
pub const P_CMD: usize = 2;

/// Offset of the first command data byte
pub const P_DATA: usize = 3;

/// Number of addressable command codes (7 bits)
pub const COMMAND_CODES: usize = 128;

/// Read/write flag inside the command byte
pub const CMD_WRITE_BIT: u8 = 0x80;

// =============================================================================
// Timing
// =============================================================================

/// Poll loop tick when no bytes arrive (milliseconds)
pub const POLL_INTERVAL_MS: u64 = 5;

/// Default interval between diagnostic stats log lines (seconds)
pub const DEFAULT_STATS_INTERVAL_SECS: u64 = 10;

/// Default serial baud rate for RS-485 sub-buses
pub const DEFAULT_BAUD_RATE: u32 = 2_000_000;

/// Serial read timeout (milliseconds)
pub const SERIAL_TIMEOUT_MS: u64 = 1;

/// Async transport tasks wake at least this often to check shutdown (milliseconds)
pub const SHUTDOWN_CHECK_MS: u64 = 100;

/// Minimum interval between traffic rate calculations (seconds)
pub const RATE_UPDATE_MIN_INTERVAL_SECS: f64 = 0.1;

// =============================================================================
// Retry
// =============================================================================

/// Maximum socket bind retry attempts
pub const MAX_SOCKET_RETRY_ATTEMPTS: u32 = 5;

/// Base delay between retry attempts (milliseconds)
pub const RETRY_BASE_DELAY_MS: u64 = 200;

// =============================================================================
// Serial
// =============================================================================

/// Consecutive zero-byte reads before assuming port disconnected
pub const SERIAL_DISCONNECT_THRESHOLD: u32 = 10;
