//! Address-based routing
//!
//! Every decoded payload is addressed to this board, its parent, or a board
//! on one of the two sub-buses. Local payloads go to the command table;
//! everything else is re-framed and queued on the matching outbound path.

pub mod address;
pub mod dispatch;
pub mod outbound;

pub use address::BoardAddress;
pub use dispatch::{CommandHandler, CommandTable};
pub use outbound::{Outbound, OutboundQueue, QueuedFrame};

use crate::error::{LinkError, LinkResult};
use crate::link::{FrameCodec, Payload};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Where a payload is headed relative to this board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    Local,
    Parent,
    SubBus1,
    SubBus2,
    Unknown,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Local => "local",
            Self::Parent => "parent",
            Self::SubBus1 => "sub-bus 1",
            Self::SubBus2 => "sub-bus 2",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Routes payloads using a read-only address table, an injected command
/// table and the board's outbound queues.
#[derive(Debug, Clone)]
pub struct PayloadRouter {
    address: Arc<BoardAddress>,
    commands: Arc<CommandTable>,
    outbound: Outbound,
    codec: FrameCodec,
}

impl PayloadRouter {
    pub fn new(
        address: Arc<BoardAddress>,
        commands: Arc<CommandTable>,
        outbound: Outbound,
        codec: FrameCodec,
    ) -> Self {
        Self {
            address,
            commands,
            outbound,
            codec,
        }
    }

    pub fn address(&self) -> &BoardAddress {
        &self.address
    }

    pub fn outbound(&self) -> &Outbound {
        &self.outbound
    }

    /// Destination of a payload
    ///
    /// # Errors
    ///
    /// `TruncatedPayload` when there is no recipient id to look at.
    pub fn classify(&self, payload: &Payload) -> LinkResult<Destination> {
        let header = payload.header()?;
        Ok(self.address.classify(header.rid))
    }

    /// Deliver a payload locally or queue it for forwarding
    ///
    /// Returns the destination acted on.
    ///
    /// # Errors
    ///
    /// `UnknownRecipient`, `NoHandler`, `NoOutboundPath`, `TruncatedPayload`,
    /// or an encode failure. Nothing is delivered or queued on error.
    pub fn route(&self, payload: &Payload) -> LinkResult<Destination> {
        let header = payload.header()?;
        let destination = self.address.classify(header.rid);

        match destination {
            Destination::Local => {
                let code = header.command.code();
                let handler = self
                    .commands
                    .handler_for(code)
                    .ok_or(LinkError::NoHandler { code })?;
                debug!(xid = header.xid, code, "dispatching local command");
                handler.handle(payload);
            }
            Destination::Parent | Destination::SubBus1 | Destination::SubBus2 => {
                let queue = self
                    .outbound
                    .queue_for(destination)
                    .ok_or(LinkError::NoOutboundPath { destination })?;
                let frame = self.codec.encode(payload.as_bytes())?;
                debug!(
                    xid = header.xid,
                    rid = header.rid,
                    %destination,
                    len = frame.len(),
                    "forwarding payload"
                );
                queue.push(QueuedFrame {
                    frame: frame.into_bytes(),
                    cmd: header.command.to_byte(),
                });
            }
            Destination::Unknown => {
                warn!(xid = header.xid, rid = header.rid, "no route for recipient");
                return Err(LinkError::UnknownRecipient { rid: header.rid });
            }
        }

        Ok(destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{Command, PayloadBuilder};
    use parking_lot::Mutex;

    const L: u8 = 10;
    const P: u8 = 3;

    struct Fixture {
        router: PayloadRouter,
        seen: Arc<Mutex<Vec<Payload>>>,
        parent: Arc<OutboundQueue>,
        sub1: Arc<OutboundQueue>,
        sub2: Arc<OutboundQueue>,
    }

    fn fixture() -> Fixture {
        let address = BoardAddress::new(L)
            .with_parent(P)
            .with_sub_bus_1([20, 21])
            .with_sub_bus_2([30]);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut commands = CommandTable::new();
        commands
            .register(0x05, move |p: &Payload| sink.lock().push(p.clone()))
            .unwrap();

        let parent = Arc::new(OutboundQueue::new());
        let sub1 = Arc::new(OutboundQueue::new());
        let sub2 = Arc::new(OutboundQueue::new());
        let outbound = Outbound {
            parent: Some(parent.clone()),
            sub_bus_1: Some(sub1.clone()),
            sub_bus_2: Some(sub2.clone()),
        };

        Fixture {
            router: PayloadRouter::new(
                Arc::new(address),
                Arc::new(commands),
                outbound,
                FrameCodec::default(),
            ),
            seen,
            parent,
            sub1,
            sub2,
        }
    }

    fn payload(xid: u8, rid: u8, command: Command) -> Payload {
        let mut builder = PayloadBuilder::new(xid, rid, command);
        builder.append(&[0xAB]).unwrap();
        builder.finish()
    }

    #[test]
    fn test_local_dispatch_ignores_rw_bit() {
        let fx = fixture();
        let p = payload(P, L, Command::write(0x05).unwrap());
        assert_eq!(fx.router.route(&p), Ok(Destination::Local));
        assert_eq!(fx.seen.lock().as_slice(), &[p]);
        assert!(!fx.sub1.is_pending());
    }

    #[test]
    fn test_local_without_handler() {
        let fx = fixture();
        let p = payload(P, L, Command::read(0x06).unwrap());
        assert_eq!(fx.router.route(&p), Err(LinkError::NoHandler { code: 0x06 }));
    }

    #[test]
    fn test_forward_to_sub_bus_tags_command() {
        let fx = fixture();
        let cmd = Command::write(0x07).unwrap();
        let p = payload(L, 21, cmd);
        assert_eq!(fx.router.route(&p), Ok(Destination::SubBus1));
        assert!(fx.sub1.is_pending());

        let queued = fx.sub1.drain();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].cmd, cmd.to_byte());
        let expected = FrameCodec::default().encode(p.as_bytes()).unwrap();
        assert_eq!(queued[0].frame.as_ref(), expected.as_bytes());
    }

    #[test]
    fn test_forward_to_sub_bus_two() {
        let fx = fixture();
        let p = payload(L, 30, Command::read(0x01).unwrap());
        assert_eq!(fx.router.route(&p), Ok(Destination::SubBus2));
        assert_eq!(fx.sub2.len(), 1);
        assert!(fx.sub1.is_empty());
    }

    #[test]
    fn test_forward_to_parent() {
        let fx = fixture();
        let p = payload(20, P, Command::read(0x01).unwrap());
        assert_eq!(fx.router.route(&p), Ok(Destination::Parent));
        assert_eq!(fx.parent.len(), 1);
    }

    #[test]
    fn test_unknown_recipient_is_reported() {
        let fx = fixture();
        let p = payload(L, 99, Command::read(0x01).unwrap());
        assert_eq!(
            fx.router.route(&p),
            Err(LinkError::UnknownRecipient { rid: 99 })
        );
        assert!(fx.parent.is_empty() && fx.sub1.is_empty() && fx.sub2.is_empty());
    }

    #[test]
    fn test_missing_outbound_path() {
        let address = BoardAddress::new(L).with_sub_bus_1([20]);
        let router = PayloadRouter::new(
            Arc::new(address),
            Arc::new(CommandTable::new()),
            Outbound::default(),
            FrameCodec::default(),
        );
        let p = payload(L, 20, Command::read(0x01).unwrap());
        assert_eq!(
            router.route(&p),
            Err(LinkError::NoOutboundPath {
                destination: Destination::SubBus1
            })
        );
    }

    #[test]
    fn test_truncated_payload() {
        let fx = fixture();
        let p = Payload::new(vec![1, 2]).unwrap();
        assert_eq!(
            fx.router.route(&p),
            Err(LinkError::TruncatedPayload { len: 2 })
        );
        assert!(fx.router.classify(&p).is_err());
    }
}
