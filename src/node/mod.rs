//! Board node: ports, router and outbound queues wired to transports
//!
//! - **port**: receive window + decode counters per physical link
//! - **runner**: async poll loop (ingest, decode, route, flush)
//! - **stats**: byte-level traffic counters

pub mod port;
mod runner;
pub mod stats;

pub use port::{Port, PortRole};
pub use stats::{TrafficSnapshot, TrafficStats};

use crate::config::Config;
use crate::constants::DEFAULT_STATS_INTERVAL_SECS;
use crate::error::Result;
use crate::link::FrameCodec;
use crate::route::{BoardAddress, CommandTable, Outbound, OutboundQueue, PayloadRouter};
use crate::transport::{self, TransportChannels};
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// One wired port: receive side, transport and outbound queue
struct PortLink {
    port: Arc<Port>,
    tx: mpsc::Sender<Bytes>,
    rx: Option<mpsc::Receiver<Bytes>>,
    send_failures: Arc<AtomicU64>,
    outbound: Arc<OutboundQueue>,
}

/// A running board on the network
pub struct Node {
    links: Vec<PortLink>,
    router: PayloadRouter,
    traffic: Arc<TrafficStats>,
    stats_interval: Duration,
}

impl Node {
    pub fn builder(address: BoardAddress) -> NodeBuilder {
        NodeBuilder::new(address)
    }

    /// Build a node from configuration, opening every configured transport
    ///
    /// # Errors
    ///
    /// Configuration errors, or the first transport that fails to open.
    pub fn from_config(
        config: &Config,
        commands: CommandTable,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self> {
        let mut builder = NodeBuilder::new(config.board.clone())
            .codec(FrameCodec::new(config.link.sentinels()?))
            .commands(commands)
            .stats_interval(Duration::from_secs(config.logs.stats_interval_secs));

        for (role, port) in config.ports.configured() {
            let channels = transport::open(port, shutdown.clone())?;
            tracing::info!(port = %role, transport = %port.describe(), "port opened");
            builder = builder.port(role, channels);
        }
        Ok(builder.build())
    }

    pub fn router(&self) -> &PayloadRouter {
        &self.router
    }

    pub fn traffic(&self) -> &TrafficStats {
        &self.traffic
    }

    pub fn ports(&self) -> impl Iterator<Item = &Arc<Port>> {
        self.links.iter().map(|l| &l.port)
    }

    pub fn port(&self, role: PortRole) -> Option<&Arc<Port>> {
        self.ports().find(|p| p.role() == role)
    }
}

/// Assembles a `Node` from its parts
pub struct NodeBuilder {
    address: BoardAddress,
    codec: FrameCodec,
    commands: CommandTable,
    ports: Vec<(PortRole, TransportChannels)>,
    stats_interval: Duration,
}

impl NodeBuilder {
    pub fn new(address: BoardAddress) -> Self {
        Self {
            address,
            codec: FrameCodec::default(),
            commands: CommandTable::new(),
            ports: Vec::new(),
            stats_interval: Duration::from_secs(DEFAULT_STATS_INTERVAL_SECS),
        }
    }

    pub fn codec(mut self, codec: FrameCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn commands(mut self, commands: CommandTable) -> Self {
        self.commands = commands;
        self
    }

    pub fn stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval.max(Duration::from_secs(1));
        self
    }

    /// Attach a transport to a port role, replacing any earlier one
    pub fn port(mut self, role: PortRole, channels: TransportChannels) -> Self {
        self.ports.retain(|(r, _)| *r != role);
        self.ports.push((role, channels));
        self
    }

    pub fn build(self) -> Node {
        let mut outbound = Outbound::default();
        let mut links = Vec::with_capacity(self.ports.len());

        for (role, channels) in self.ports {
            let queue = Arc::new(OutboundQueue::new());
            let slot = match role {
                PortRole::Parent => &mut outbound.parent,
                PortRole::SubBus1 => &mut outbound.sub_bus_1,
                PortRole::SubBus2 => &mut outbound.sub_bus_2,
            };
            *slot = Some(queue.clone());

            links.push(PortLink {
                port: Arc::new(Port::new(role, self.codec)),
                tx: channels.tx,
                rx: Some(channels.rx),
                send_failures: channels.send_failures,
                outbound: queue,
            });
        }

        let router = PayloadRouter::new(
            Arc::new(self.address),
            Arc::new(self.commands),
            outbound,
            self.codec,
        );

        Node {
            links,
            router,
            traffic: Arc::new(TrafficStats::new()),
            stats_interval: self.stats_interval,
        }
    }
}
