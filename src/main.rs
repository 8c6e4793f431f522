//! boardlink - data-link node for tree-topology board networks
//!
//! Usage:
//!   boardlink run --config node.toml        Run a node
//!   boardlink encode --xid 2 --rid 5 --cmd 16 0a 0b
//!   boardlink decode "7E 05 02 01 10 7D 7E 0E 7F" [--json]
//!   boardlink classify --config node.toml --rid 12

use boardlink::cli::{format_hex, parse_hex, Cli, Command};
use boardlink::config::{self, Config};
use boardlink::error::{NodeError, Result};
use boardlink::link::{
    Access, Command as CommandByte, DecodeCounts, DecodeStats, EncodeTrace, FrameCodec, Payload,
    PayloadBuilder, PayloadHeader, ReceiveBuffer,
};
use boardlink::logging;
use boardlink::node::Node;
use boardlink::route::{CommandHandler, CommandTable};
use clap::Parser;
use serde::Serialize;
use std::path::Path;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Receive window for the `decode` subcommand, larger than a port's so a
/// pasted capture decodes in one pass
const DECODE_WINDOW: usize = 1024;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            let mut source = std::error::Error::source(&e);
            while let Some(cause) = source {
                eprintln!("  caused by: {}", cause);
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run { config: path } => run_node(&path, cli.verbose),
        Command::Encode {
            xid,
            rid,
            cmd,
            write,
            data,
        } => {
            logging::init_tracing(cli.verbose);
            encode(xid, rid, cmd, write, &data)
        }
        Command::Decode { hex, json } => {
            logging::init_tracing(cli.verbose);
            decode(&hex, json)
        }
        Command::Classify { config: path, rid } => {
            logging::init_tracing(cli.verbose);
            let config = config::load(&path)?;
            println!("{}", config.board.classify(rid));
            Ok(())
        }
    }
}

// =============================================================================
// run
// =============================================================================

fn run_node(path: &Path, verbose: bool) -> Result<()> {
    let config = config::read(path)?;
    logging::init_tracing(verbose || config.logs.verbose);
    config.validate()?;
    info!(%config, "starting node");

    let rt = tokio::runtime::Runtime::new().map_err(|e| NodeError::Runtime { source: e })?;
    rt.block_on(serve(&config))
}

async fn serve(config: &Config) -> Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));
    spawn_signal_handler(shutdown.clone());

    let node = Node::from_config(config, log_commands()?, shutdown.clone())?;
    node.run(shutdown).await
}

/// Logs every command addressed to this board
struct LogCommand;

impl CommandHandler for LogCommand {
    fn handle(&self, payload: &Payload) {
        if let Ok(header) = payload.header() {
            info!(
                xid = header.xid,
                code = header.command.code(),
                access = ?header.command.access(),
                data = %format_hex(payload.data()),
                "command received"
            );
        }
    }
}

fn log_commands() -> Result<CommandTable> {
    let handler: Arc<dyn CommandHandler> = Arc::new(LogCommand);
    let mut table = CommandTable::new();
    for code in 0..=0x7F {
        table.register_shared(code, handler.clone())?;
    }
    Ok(table)
}

fn spawn_signal_handler(shutdown: Arc<AtomicBool>) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown requested");
        shutdown.store(true, Ordering::SeqCst);
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {},
                _ = sigint.recv() => {},
            }
        }
        _ => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

// =============================================================================
// encode
// =============================================================================

fn encode(xid: u8, rid: u8, cmd: u8, write: bool, data: &[String]) -> Result<()> {
    let access = if write { Access::Write } else { Access::Read };
    let mut builder = PayloadBuilder::new(xid, rid, CommandByte::new(cmd, access)?);
    builder.append(&parse_hex(data)?)?;
    let payload = builder.finish();

    let mut trace = EncodeTrace::default();
    let frame = FrameCodec::default().encode_traced(payload.as_bytes(), &mut trace)?;
    debug!(?trace, "encoded");
    println!("{}", format_hex(frame.as_bytes()));
    Ok(())
}

// =============================================================================
// decode
// =============================================================================

#[derive(Serialize)]
struct DecodeOutput {
    payloads: Vec<PayloadView>,
    counts: DecodeCounts,
    status: String,
}

#[derive(Serialize)]
struct PayloadView {
    hex: String,
    header: Option<PayloadHeader>,
    from_slave: bool,
}

fn decode(hex: &[String], json: bool) -> Result<()> {
    let bytes = parse_hex(hex)?;
    let codec = FrameCodec::default();
    let stats = DecodeStats::new();
    let mut buffer = ReceiveBuffer::<DECODE_WINDOW>::new();

    let mut payloads = Vec::new();
    let mut status = Ok(0);
    // Half-window chunks leave room for a frame straddling two chunks
    for chunk in bytes.chunks(DECODE_WINDOW / 2) {
        buffer.push_bytes(chunk);
        let report = codec.decode(&mut buffer, &stats);
        status = report.status();
        payloads.extend(report.into_payloads());
    }
    if bytes.is_empty() {
        status = codec.decode(&mut buffer, &stats).status();
    }

    let output = DecodeOutput {
        payloads: payloads
            .iter()
            .map(|p| {
                let header = p.header().ok();
                PayloadView {
                    hex: format_hex(p.as_bytes()),
                    header,
                    from_slave: header.is_some_and(|h| h.sent_from_slave()),
                }
            })
            .collect(),
        counts: stats.snapshot(),
        status: match status {
            Ok(n) => format!("ok: {} decoded", n),
            Err(e) => e.to_string(),
        },
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    for view in &output.payloads {
        match &view.header {
            Some(h) => println!(
                "{}  xid={} rid={} cmd={} {:?}",
                view.hex,
                h.xid,
                h.rid,
                h.command.code(),
                h.command.access()
            ),
            None => println!("{}  (truncated)", view.hex),
        }
    }
    println!(
        "valid={} bad_checksum={} status={}",
        output.counts.valid, output.counts.bad_checksum, output.status
    );
    Ok(())
}
