// src/server/worker_process.rs

//! Worker mode: the binary re-executed by the coordinator.

use crate::core::pool::StartupDescriptor;
use crate::core::worker;
use anyhow::{Context, Result, anyhow};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal::unix::{SignalKind, signal};
use tracing::info;

/// Reads the startup descriptor from stdin and serves the coordinator until
/// it hangs up or a signal arrives.
pub async fn run() -> Result<()> {
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("Failed to read the startup descriptor")?;
    let descriptor: StartupDescriptor = serde_json::from_str(line.trim())
        .context("Malformed startup descriptor on stdin")?;

    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow!("Failed to register SIGINT handler: {}", e))?;
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow!("Failed to register SIGTERM handler: {}", e))?;

    tokio::select! {
        res = worker::run(descriptor) => res.context("Worker failed"),
        _ = sigint.recv() => {
            info!("SIGINT received, worker exiting.");
            Ok(())
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received, worker exiting.");
            Ok(())
        }
    }
}
