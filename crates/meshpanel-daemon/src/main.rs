//! Meshpanel Daemon -- headless topology panel for a mesh radio host.
//!
//! Usage:
//!
//!   meshpanel-daemon [OPTIONS] < events.jsonl
//!
//! Raw host events arrive on stdin, one JSON object per line:
//!
//!   {"event_type": "EventType.RX_LOG_DATA", "payload": {"parsed": {"path_nodes": ["ab", "cd"]}}}
//!
//! Message activity is reported with `EventType.CONTACT_MSG_RECV`
//! carrying `payload.pubkey_prefix`. Outbound host calls are written to
//! stdout; logs go to stderr.
//!
//! The daemon runs until interrupted with Ctrl+C or until stdin closes.

use std::sync::Arc;

use clap::Parser;
use meshpanel_node::{HostHandles, Node, NodeCommand, OutputPaths};
use meshpanel_types::{NodeIdentity, RawEvent};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

mod config;
mod host_io;

use host_io::{FileHost, StdoutSink};

/// Event tag the host uses for received direct messages.
const EVENT_CONTACT_MSG_RECV: &str = "EventType.CONTACT_MSG_RECV";

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    // Logs go to stderr so stdout stays a clean host-call stream.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = config::Cli::parse();

    let daemon_config = match &cli.config {
        Some(path) => match config::DaemonConfig::load(path) {
            Ok(cfg) => cfg.merge_cli(&cli),
            Err(e) => {
                tracing::error!("failed to load config file: {e}");
                std::process::exit(1);
            }
        },
        None => config::DaemonConfig::from_cli(&cli),
    };

    if let Err(e) = run_daemon(daemon_config).await {
        tracing::error!("daemon error: {e}");
        std::process::exit(1);
    }
}

// ---------------------------------------------------------------------------
// Daemon main logic
// ---------------------------------------------------------------------------

async fn run_daemon(cfg: config::DaemonConfig) -> Result<(), String> {
    for dir in [&cfg.data_dir, &cfg.output_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| format!("failed to create {}: {e}", dir.display()))?;
    }

    tracing::info!(
        data_dir = %cfg.data_dir.display(),
        output_dir = %cfg.output_dir.display(),
        host_dir = %cfg.host_dir.display(),
        greet = cfg.panel.greet_enabled,
        cleanup = cfg.panel.cleanup_enabled,
        "directories ready"
    );

    // -----------------------------------------------------------------------
    // 1. Host adapter
    // -----------------------------------------------------------------------

    let file_host = Arc::new(FileHost::new(&cfg.host_dir));
    let host = HostHandles::new(
        file_host.clone(),
        file_host,
        Arc::new(StdoutSink::stdout()),
    );

    // -----------------------------------------------------------------------
    // 2. Start node
    // -----------------------------------------------------------------------

    let paths = OutputPaths {
        artifacts: cfg.output_dir.clone(),
        snapshots: cfg.data_dir.clone(),
    };

    let mut node = Node::new(cfg.panel, host, paths)
        .await
        .map_err(|e| format!("node creation failed: {e}"))?;

    let event_tx = node.event_sender();
    let command_tx = node.command_sender();

    let mut node_handle = node
        .start()
        .map_err(|e| format!("node start failed: {e}"))?;

    tracing::info!("node started");

    // -----------------------------------------------------------------------
    // 3. Stdin pump
    // -----------------------------------------------------------------------

    let mut pump = tokio::spawn(pump_stdin(event_tx, command_tx));

    // -----------------------------------------------------------------------
    // 4. Wait for shutdown signal
    // -----------------------------------------------------------------------

    let mut loop_exited = false;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received Ctrl+C, shutting down...");
        }
        _ = &mut pump => {
            tracing::info!("stdin closed, shutting down...");
        }
        result = &mut node_handle => {
            loop_exited = true;
            match result {
                Ok(()) => tracing::error!("node event loop exited unexpectedly"),
                Err(e) => tracing::error!(%e, "node event loop panicked"),
            }
        }
    }

    pump.abort();

    if !loop_exited {
        node.shutdown()
            .map_err(|e| format!("shutdown failed: {e}"))?;
        node_handle
            .await
            .map_err(|e| format!("node event loop panicked: {e}"))?;
    }

    tracing::info!("daemon stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Forwards stdin JSON lines to the node until stdin closes or the
/// node stops accepting input.
async fn pump_stdin(events: mpsc::Sender<RawEvent>, commands: mpsc::Sender<NodeCommand>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(%e, "stdin read failed");
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let raw: RawEvent = match serde_json::from_str(&line) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(%e, "skipping malformed event line");
                continue;
            }
        };

        let delivered = if raw.event_type == EVENT_CONTACT_MSG_RECV {
            match activity_command(&raw) {
                Some(cmd) => commands.send(cmd).await.is_ok(),
                None => {
                    tracing::debug!("message event without a usable sender prefix");
                    true
                }
            }
        } else {
            events.send(raw).await.is_ok()
        };

        if !delivered {
            tracing::debug!("node stopped accepting input");
            return;
        }
    }
}

/// Maps a received-message event to an activity record for its sender.
/// The node stamps it with its own clock on receipt.
fn activity_command(raw: &RawEvent) -> Option<NodeCommand> {
    let prefix = raw.payload.get("pubkey_prefix")?.as_str()?;
    let identity = NodeIdentity::new(prefix).ok()?;
    Some(NodeCommand::RecordActivity { identity, at: None })
}
