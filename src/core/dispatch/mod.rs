// src/core/dispatch/mod.rs

//! Dispatch and collection over the set of worker connections.
//!
//! Outbound, every connection gets a writer task fed by its own FIFO queue.
//! Broadcasts are queued to every writer. Non-broadcast messages go to one
//! idle worker: each writer owns a single "idle token" that it puts on a
//! shared ready queue when it has nothing of its own in flight, and a sender
//! takes a token off that queue (waiting if none is available) to pick its
//! worker. Inbound, one reader task per connection forwards decoded results
//! to the forwarder, which publishes them to destination rooms.

use crate::core::RoomGraphError;
use crate::core::protocol::{FrameCodec, WireMessage};
use bytes::Bytes;
use futures::SinkExt;
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::codec::{BytesCodec, FramedWrite};
use tracing::{debug, trace};

pub mod collector;
pub mod forwarder;

pub use collector::{Classified, spawn_readers};
pub use forwarder::Forwarder;

/// The result type of every routing task.
pub type TaskResult = Result<(), RoomGraphError>;

/// One pre-encoded frame queued for a writer.
struct Outbound {
    frame: Bytes,
    /// Set for non-broadcast messages: the writer hands its idle token back
    /// once this frame is on the wire.
    returns_token: bool,
}

struct DispatcherInner {
    codec: FrameCodec,
    writers: Vec<mpsc::Sender<Outbound>>,
    idle: Mutex<mpsc::Receiver<usize>>,
}

/// The outbound half of the worker connection set. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    /// Starts one writer task per connection in `tasks` and returns the handle
    /// used to submit messages to them.
    pub fn start<W>(
        connections: Vec<W>,
        codec: FrameCodec,
        queue_capacity: usize,
        tasks: &mut JoinSet<TaskResult>,
    ) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (idle_tx, idle_rx) = mpsc::channel(connections.len().max(1));
        let mut writers = Vec::with_capacity(connections.len());

        for (index, connection) in connections.into_iter().enumerate() {
            let (tx, rx) = mpsc::channel(queue_capacity.max(1));
            writers.push(tx);
            tasks.spawn(run_writer(index, connection, rx, idle_tx.clone()));
        }

        Self {
            inner: Arc::new(DispatcherInner {
                codec,
                writers,
                idle: Mutex::new(idle_rx),
            }),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.inner.writers.len()
    }

    /// Queues `message` for every worker (`broadcast`) or for one idle worker.
    ///
    /// A broadcast completes once the frame sits in every connection's write
    /// queue, not once it is on the wire. Each queue is written in order, so
    /// anything submitted afterwards still reaches each worker after it.
    ///
    /// Queue space is reserved on every connection before anything is queued:
    /// a broadcast whose future is dropped reaches either every worker or none.
    pub async fn send(&self, broadcast: bool, message: &WireMessage) -> Result<(), RoomGraphError> {
        let frame = self.inner.codec.encode_frame(message)?;

        if broadcast {
            let mut permits = Vec::with_capacity(self.inner.writers.len());
            for writer in &self.inner.writers {
                let permit = writer
                    .reserve()
                    .await
                    .map_err(|_| RoomGraphError::WorkerDisconnected)?;
                permits.push(permit);
            }
            for permit in permits {
                permit.send(Outbound {
                    frame: frame.clone(),
                    returns_token: false,
                });
            }
            trace!("Broadcast {} to {} workers.", message.kind(), self.worker_count());
            return Ok(());
        }

        let index = {
            let mut idle = self.inner.idle.lock().await;
            idle.recv().await.ok_or(RoomGraphError::WorkerDisconnected)?
        };
        self.inner.writers[index]
            .send(Outbound {
                frame,
                returns_token: true,
            })
            .await
            .map_err(|_| RoomGraphError::WorkerDisconnected)
    }

    pub async fn broadcast(&self, message: &WireMessage) -> Result<(), RoomGraphError> {
        self.send(true, message).await
    }

    pub async fn submit(&self, message: &WireMessage) -> Result<(), RoomGraphError> {
        self.send(false, message).await
    }
}

/// Writes queued frames to one worker connection, in queue order.
async fn run_writer<W>(
    index: usize,
    connection: W,
    mut queue: mpsc::Receiver<Outbound>,
    idle: mpsc::Sender<usize>,
) -> TaskResult
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut sink = FramedWrite::new(connection, BytesCodec::new());
    // The ready queue holds one slot per writer, so returning a token never
    // waits. A closed ready queue only means no more submissions will come.
    let _ = idle.send(index).await;

    while let Some(outbound) = queue.recv().await {
        sink.send(outbound.frame).await?;
        if outbound.returns_token {
            let _ = idle.send(index).await;
        }
    }

    debug!("Writer for worker {} stopped.", index);
    Ok(())
}
