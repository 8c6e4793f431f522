//! Command-line interface definition using clap
//!
//! Provides structured argument parsing with automatic help generation,
//! plus the hex helpers the subcommands share.

use crate::error::{NodeError, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

// =============================================================================
// CLI Definition
// =============================================================================

/// Data-link node for tree-topology board networks
#[derive(Parser, Debug)]
#[command(name = "boardlink")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the node: open ports, decode, route and forward
    Run {
        /// Node configuration file
        #[arg(short, long, value_name = "FILE", default_value = "boardlink.toml")]
        config: PathBuf,
    },

    /// Build a payload and print its frame as hex
    Encode {
        /// Sender board id
        #[arg(long, value_parser = parse_u8)]
        xid: u8,
        /// Recipient board id
        #[arg(long, value_parser = parse_u8)]
        rid: u8,
        /// Command code (0-127)
        #[arg(long, value_parser = parse_u8)]
        cmd: u8,
        /// Set the write flag on the command byte
        #[arg(long)]
        write: bool,
        /// Command data bytes in hex ("0a ff" or "0aff")
        #[arg(value_name = "DATA_HEX")]
        data: Vec<String>,
    },

    /// Feed hex bytes through a receive window and print what decodes
    Decode {
        /// Raw bytes in hex
        #[arg(value_name = "HEX", required = true)]
        hex: Vec<String>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print where a recipient id is routed from this board
    Classify {
        #[arg(short, long, value_name = "FILE", default_value = "boardlink.toml")]
        config: PathBuf,
        /// Recipient board id
        #[arg(long, value_parser = parse_u8)]
        rid: u8,
    },
}

// =============================================================================
// Hex helpers
// =============================================================================

/// Parse a byte given in decimal or `0x` hex
pub fn parse_u8(s: &str) -> std::result::Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|_| format!("'{}' is not a byte (0-255 or 0x00-0xFF)", s))
}

/// Parse hex bytes; tokens may be separated by whitespace or commas and
/// carry an optional `0x` prefix.
pub fn parse_hex<S: AsRef<str>>(parts: &[S]) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    for part in parts {
        for token in part
            .as_ref()
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
        {
            let digits = token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .unwrap_or(token);
            if digits.len() % 2 != 0 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(NodeError::Input(format!("invalid hex '{}'", token)));
            }
            for pair in digits.as_bytes().chunks(2) {
                let text = std::str::from_utf8(pair)
                    .map_err(|_| NodeError::Input(format!("invalid hex '{}'", token)))?;
                let byte = u8::from_str_radix(text, 16)
                    .map_err(|_| NodeError::Input(format!("invalid hex '{}'", token)))?;
                bytes.push(byte);
            }
        }
    }
    Ok(bytes)
}

/// Space-separated uppercase hex
pub fn format_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_run() {
        let cli = Cli::parse_from(["boardlink", "run"]);
        assert!(!cli.verbose);
        match cli.command {
            Command::Run { config } => assert_eq!(config, PathBuf::from("boardlink.toml")),
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_parse_verbose() {
        let cli = Cli::parse_from(["boardlink", "-v", "run", "--config", "a.toml"]);
        assert!(cli.verbose);

        let cli = Cli::parse_from(["boardlink", "run", "--verbose"]);
        assert!(cli.verbose);
    }

    #[test]
    fn test_cli_parse_encode() {
        let cli = Cli::parse_from([
            "boardlink", "encode", "--xid", "2", "--rid", "0x01", "--cmd", "16", "--write", "7e",
            "ff",
        ]);
        match cli.command {
            Command::Encode {
                xid,
                rid,
                cmd,
                write,
                data,
            } => {
                assert_eq!((xid, rid, cmd), (2, 1, 16));
                assert!(write);
                assert_eq!(data, vec!["7e".to_string(), "ff".to_string()]);
            }
            _ => panic!("Expected Encode command"),
        }
    }

    #[test]
    fn test_cli_parse_decode_json() {
        let cli = Cli::parse_from(["boardlink", "decode", "7E 05", "--json"]);
        assert!(matches!(cli.command, Command::Decode { json: true, .. }));
    }

    #[test]
    fn test_cli_rejects_bad_byte() {
        let result = Cli::try_parse_from(["boardlink", "classify", "--rid", "300"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_u8() {
        assert_eq!(parse_u8("0x7E"), Ok(0x7E));
        assert_eq!(parse_u8("255"), Ok(255));
        assert!(parse_u8("256").is_err());
        assert!(parse_u8("0xZZ").is_err());
    }

    #[test]
    fn test_parse_hex_forms() {
        assert_eq!(parse_hex(&["7E 05", "0x02,01"]).unwrap(), vec![0x7E, 0x05, 0x02, 0x01]);
        assert_eq!(parse_hex(&["7e050201"]).unwrap(), vec![0x7E, 0x05, 0x02, 0x01]);
        assert!(parse_hex::<&str>(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_parse_hex_rejects_odd_or_invalid() {
        assert!(matches!(parse_hex(&["7E0"]), Err(NodeError::Input(_))));
        assert!(matches!(parse_hex(&["zz"]), Err(NodeError::Input(_))));
    }

    #[test]
    fn test_format_hex() {
        assert_eq!(format_hex(&[0x7E, 0x05, 0x0e]), "7E 05 0E");
        assert_eq!(format_hex(&[]), "");
    }
}
