// src/server/console.rs

//! The console front-end: JSON lines on stdin become room traffic, and every
//! publication the router makes is echoed to stdout as a JSON line.

use super::context::ServerContext;
use crate::core::events::Event;
use crate::core::room::RoomId;
use crate::core::transport::{JsonStanzaAdapter, LocalRoomTransport, StanzaAdapter};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The member name console input is published under.
pub const CONSOLE_SENDER: &str = "console";

/// One line of console input or output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleLine {
    pub room: String,
    pub event: Event,
}

/// Spawns the stdin reader and the stdout printer.
pub fn spawn_all(ctx: &mut ServerContext) {
    let transport = ctx.transport.clone();
    let shutdown = ctx.shutdown.clone();
    ctx.background_tasks.spawn(async move {
        read_input(tokio::io::stdin(), &transport, &shutdown).await
    });

    let transport = ctx.transport.clone();
    let shutdown = ctx.shutdown.clone();
    let bot_name = ctx.bot_name.clone();
    ctx.background_tasks.spawn(async move {
        print_publications(tokio::io::stdout(), &transport, &bot_name, &shutdown).await
    });
}

/// Publishes every well-formed input line into its room. After the input
/// ends this waits for shutdown, so a closed stdin does not stop the router.
pub async fn read_input<R>(
    input: R,
    transport: &LocalRoomTransport,
    shutdown: &CancellationToken,
) -> Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = BufReader::new(input).lines();
    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            line = lines.next_line() => line.context("Failed to read console input")?,
        };
        let Some(line) = line else {
            info!("Console input closed.");
            shutdown.cancelled().await;
            return Ok(());
        };
        publish_line(transport, &line);
    }
}

/// Handles one input line. Returns whether it was published.
pub fn publish_line(transport: &LocalRoomTransport, line: &str) -> bool {
    let line = line.trim();
    if line.is_empty() {
        return false;
    }
    let parsed: ConsoleLine = match serde_json::from_str(line) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("Skipping malformed console line: {}", e);
            return false;
        }
    };
    let room = match RoomId::parse(&parsed.room) {
        Ok(room) => room,
        Err(e) => {
            warn!("Skipping console line: {}", e);
            return false;
        }
    };
    match transport.publish_event(&room, CONSOLE_SENDER, &parsed.event) {
        Ok(reached) => {
            debug!("Console event for '{}' reached {} members.", room, reached);
            true
        }
        Err(e) => {
            warn!("Skipping console line: {}", e);
            false
        }
    }
}

/// Writes each publication made under `bot_name` to `output`.
pub async fn print_publications<W>(
    mut output: W,
    transport: &LocalRoomTransport,
    bot_name: &str,
    shutdown: &CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut tap = transport.tap();
    let adapter = JsonStanzaAdapter;
    loop {
        let stanza = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            received = tap.recv() => match received {
                Ok(stanza) => stanza,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Console output lagged; {} publications not printed.", skipped);
                    continue;
                }
                Err(RecvError::Closed) => return Ok(()),
            },
        };
        if stanza.sender != bot_name {
            continue;
        }
        let Some(event) = adapter.to_event(&stanza) else {
            continue;
        };

        let mut line = serde_json::to_vec(&ConsoleLine {
            room: stanza.room.to_string(),
            event,
        })?;
        line.push(b'\n');
        output.write_all(&line).await?;
        output.flush().await?;
    }
}
