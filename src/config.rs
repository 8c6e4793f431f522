//! Configuration management
//!
//! One TOML file describes a board: its address table, the framing
//! sentinels, how each port reaches the wire, and log settings.

use crate::constants::{
    DEFAULT_BAUD_RATE, DEFAULT_ESCAPE, DEFAULT_FOOTER, DEFAULT_HEADER,
    DEFAULT_STATS_INTERVAL_SECS,
};
use crate::error::{LinkResult, NodeError, Result};
use crate::link::Sentinels;
use crate::node::PortRole;
use crate::route::BoardAddress;
use crate::transport::udp::parse_addr;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::warn;

// =============================================================================
// Application Configuration
// =============================================================================

/// Node configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub board: BoardAddress,
    pub link: LinkConfig,
    pub ports: PortsConfig,
    pub logs: LogsConfig,
}

// =============================================================================
// Link Configuration
// =============================================================================

/// Framing sentinels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub header: u8,
    pub footer: u8,
    pub escape: u8,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            header: DEFAULT_HEADER,
            footer: DEFAULT_FOOTER,
            escape: DEFAULT_ESCAPE,
        }
    }
}

impl LinkConfig {
    /// Validated sentinels for the codec
    pub fn sentinels(&self) -> LinkResult<Sentinels> {
        Sentinels::new(self.header, self.footer, self.escape)
    }
}

// =============================================================================
// Port Configuration
// =============================================================================

/// How a port reaches the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// RS-485 through a serial adapter
    #[default]
    Serial,
    /// UDP datagrams (simulation, bench tests)
    Udp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    pub transport: TransportKind,

    /// Serial device path, used when transport = "serial"
    pub serial_port: String,
    pub baud_rate: u32,

    /// Local address, used when transport = "udp"
    pub udp_bind: String,
    /// Fixed remote address; when absent replies go to the last sender
    pub udp_peer: Option<String>,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Serial,
            serial_port: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            udp_bind: String::new(),
            udp_peer: None,
        }
    }
}

impl PortConfig {
    /// Short human-readable endpoint
    pub fn describe(&self) -> String {
        match self.transport {
            TransportKind::Serial => format!("serial:{}@{}", self.serial_port, self.baud_rate),
            TransportKind::Udp => match &self.udp_peer {
                Some(peer) => format!("udp:{}->{}", self.udp_bind, peer),
                None => format!("udp:{}", self.udp_bind),
            },
        }
    }

    fn validate(&self, field: &'static str) -> Result<()> {
        match self.transport {
            TransportKind::Serial => {
                if self.serial_port.is_empty() {
                    return Err(NodeError::ConfigValidation {
                        field,
                        reason: "serial transport needs serial_port".into(),
                    });
                }
                if self.baud_rate == 0 {
                    return Err(NodeError::ConfigValidation {
                        field,
                        reason: "baud_rate must be positive".into(),
                    });
                }
            }
            TransportKind::Udp => {
                parse_addr("udp_bind", &self.udp_bind)?;
                if let Some(peer) = &self.udp_peer {
                    parse_addr("udp_peer", peer)?;
                }
            }
        }
        Ok(())
    }
}

/// The three physical ports; absent sections are not wired
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PortsConfig {
    pub parent: Option<PortConfig>,
    pub sub_bus_1: Option<PortConfig>,
    pub sub_bus_2: Option<PortConfig>,
}

impl PortsConfig {
    pub fn get(&self, role: PortRole) -> Option<&PortConfig> {
        match role {
            PortRole::Parent => self.parent.as_ref(),
            PortRole::SubBus1 => self.sub_bus_1.as_ref(),
            PortRole::SubBus2 => self.sub_bus_2.as_ref(),
        }
    }

    /// Wired ports in role order
    pub fn configured(&self) -> impl Iterator<Item = (PortRole, &PortConfig)> {
        PortRole::ALL
            .into_iter()
            .filter_map(move |role| self.get(role).map(|cfg| (role, cfg)))
    }
}

// =============================================================================
// Logs Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogsConfig {
    /// Debug-level output (same as `-v`)
    pub verbose: bool,
    /// Seconds between periodic stats lines
    pub stats_interval_secs: u64,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            stats_interval_secs: DEFAULT_STATS_INTERVAL_SECS,
        }
    }
}

// =============================================================================
// Validation
// =============================================================================

impl Config {
    /// Reject configurations the node cannot run with
    ///
    /// Sub-bus overlap and ids without a wired port are only warned about.
    pub fn validate(&self) -> Result<()> {
        self.link.sentinels()?;
        self.board.validate()?;

        if self.logs.stats_interval_secs == 0 {
            return Err(NodeError::ConfigValidation {
                field: "logs.stats_interval_secs",
                reason: "must be at least 1".into(),
            });
        }

        for (role, port) in self.ports.configured() {
            let field = match role {
                PortRole::Parent => "ports.parent",
                PortRole::SubBus1 => "ports.sub_bus_1",
                PortRole::SubBus2 => "ports.sub_bus_2",
            };
            port.validate(field)?;
        }

        let overlap = self.board.overlapping_ids();
        if !overlap.is_empty() {
            warn!(ids = ?overlap, "ids listed on both sub-buses, sub-bus 1 wins");
        }
        if self.board.parent_id.is_some() && self.ports.parent.is_none() {
            warn!("parent_id set but no parent port configured");
        }
        if !self.board.sub_bus_1.is_empty() && self.ports.sub_bus_1.is_none() {
            warn!("sub_bus_1 ids listed but no sub_bus_1 port configured");
        }
        if !self.board.sub_bus_2.is_empty() && self.ports.sub_bus_2.is_none() {
            warn!("sub_bus_2 ids listed but no sub_bus_2 port configured");
        }
        Ok(())
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "board {}", self.board.local_id)?;
        if let Some(parent) = self.board.parent_id {
            write!(f, " (parent {})", parent)?;
        }
        for (role, port) in self.ports.configured() {
            write!(f, ", {}={}", role, port.describe())?;
        }
        Ok(())
    }
}

/// Deserialize configuration text without validating it; `path` is only
/// used in errors
pub fn parse_unchecked(content: &str, path: &Path) -> Result<Config> {
    toml::from_str(content).map_err(|e| NodeError::ConfigParse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Parse and validate configuration text
pub fn parse(content: &str, path: &Path) -> Result<Config> {
    let config = parse_unchecked(content, path)?;
    config.validate()?;
    Ok(config)
}

/// Read a config file without validating it
///
/// Lets the caller set up logging from `[logs]` before validation warnings
/// are emitted.
pub fn read(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path).map_err(|e| NodeError::ConfigRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_unchecked(&content, path)
}

/// Load and validate a config file
pub fn load(path: &Path) -> Result<Config> {
    let config = read(path)?;
    config.validate()?;
    Ok(config)
}

// ============================================================================
// Tests
// ============================================================================
