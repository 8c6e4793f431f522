//! Data-link layer for tree-topology board networks
//!
//! Boards exchange byte-stuffed, checksummed frames over serial buses. Each
//! board buffers the raw bytes it receives per port, extracts verified
//! payloads, and either handles them locally or forwards them towards the
//! parent or one of its two sub-buses.
//!
//! - [`link`]: framing codec, receive window, payload types
//! - [`route`]: address table, command dispatch, outbound queues
//! - [`node`]: ports, poll loop and traffic counters
//! - [`transport`]: serial and UDP byte transports

pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod link;
pub mod logging;
pub mod node;
pub mod route;
pub mod transport;

pub use error::{LinkError, LinkResult, NodeError, Result};
pub use link::{FrameCodec, Payload, ReceiveBuffer, Sentinels};
pub use route::{Destination, PayloadRouter};
