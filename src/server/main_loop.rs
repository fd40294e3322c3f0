// src/server/main_loop.rs

//! Runs the coordinator until a signal or a fatal routing failure, then shuts
//! everything down in order.

use super::context::ServerContext;
use anyhow::{Result, anyhow};
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, warn};

/// Waits for SIGINT, SIGTERM, or the failure of any routing or console task.
///
/// Returns an error if the router failed, so a supervisor can restart the run.
pub async fn run(mut ctx: ServerContext) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow!("Failed to register SIGINT handler: {}", e))?;
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow!("Failed to register SIGTERM handler: {}", e))?;

    let mut failure = None;
    loop {
        tokio::select! {
            biased;

            _ = sigint.recv() => {
                info!("SIGINT received, initiating graceful shutdown.");
                break;
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received, initiating graceful shutdown.");
                break;
            }

            res = ctx.router.wait() => {
                match res {
                    Ok(()) => warn!("Routing stopped without an error."),
                    Err(e) => {
                        error!("CRITICAL: Routing failed: {}. Shutting down.", e);
                        failure = Some(anyhow::Error::new(e));
                    }
                }
                break;
            }

            Some(res) = ctx.background_tasks.join_next() => {
                match res {
                    Ok(Ok(())) => warn!("A background task finished unexpectedly without an error."),
                    Ok(Err(e)) => { error!("CRITICAL: Background task failed: {}. Shutting down.", e); break; }
                    Err(e) => { error!("CRITICAL: Background task panicked: {e:?}. Shutting down."); break; }
                }
            },
        }
    }

    info!("Shutting down. Closing {} sessions.", ctx.sessions.len());
    ctx.shutdown.cancel();

    let sessions = std::mem::take(&mut ctx.sessions);
    if tokio::time::timeout(Duration::from_secs(5), async {
        for session in sessions {
            session.close().await;
        }
    })
    .await
    .is_err()
    {
        warn!("Timed out closing sessions; the remaining ones are abandoned.");
    }

    if tokio::time::timeout(Duration::from_secs(5), async {
        while ctx.background_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for background tasks to finish cleanly.");
        ctx.background_tasks.shutdown().await;
    }

    ctx.router.shutdown().await;
    info!("Shutdown complete.");

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
