// src/core/dispatch/collector.rs

//! Reads classification results from every worker connection.

use super::TaskResult;
use crate::core::RoomGraphError;
use crate::core::events::Event;
use crate::core::protocol::{FrameCodec, WireMessage};
use crate::core::room::RoomId;
use futures::StreamExt;
use std::collections::BTreeSet;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::codec::FramedRead;
use tracing::warn;

/// A classified event and the rooms it must be published to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub event: Event,
    pub destinations: BTreeSet<RoomId>,
}

/// Spawns one reader task per connection, all feeding `results`.
pub fn spawn_readers<R>(
    connections: Vec<R>,
    codec: FrameCodec,
    results: mpsc::Sender<Classified>,
    tasks: &mut JoinSet<TaskResult>,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    for (index, connection) in connections.into_iter().enumerate() {
        tasks.spawn(run_reader(index, connection, codec, results.clone()));
    }
}

/// Any failure here, including the worker closing its end, is fatal to the run.
async fn run_reader<R>(
    index: usize,
    connection: R,
    codec: FrameCodec,
    results: mpsc::Sender<Classified>,
) -> TaskResult
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut frames = FramedRead::new(connection, codec);

    while let Some(frame) = frames.next().await {
        match frame? {
            WireMessage::Result {
                event,
                destinations,
            } => {
                if results
                    .send(Classified {
                        event,
                        destinations,
                    })
                    .await
                    .is_err()
                {
                    // The forwarder is gone; the run is shutting down.
                    return Ok(());
                }
            }
            other => {
                return Err(RoomGraphError::UnknownMessageKind(other.kind().to_string()));
            }
        }
    }

    warn!("Worker {} closed its connection.", index);
    Err(RoomGraphError::WorkerDisconnected)
}
