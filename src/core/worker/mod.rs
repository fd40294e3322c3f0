// src/core/worker/mod.rs

//! The worker side of the pool.
//!
//! A worker connects to the rendezvous socket, presents its identity, and then
//! decodes messages, applies them to its `RouteTable`, and encodes any replies,
//! strictly one message at a time, until the coordinator closes the connection.

use crate::core::RoomGraphError;
use crate::core::pool::{StartupDescriptor, WorkerEntry, send_identity};
use crate::core::protocol::FrameCodec;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixStream;
use tokio_util::codec::Framed;
use tracing::{Instrument, debug, info_span};

pub mod route_table;

pub use route_table::RouteTable;

/// Runs a worker for `descriptor` until the coordinator hangs up.
pub async fn run(descriptor: StartupDescriptor) -> Result<(), RoomGraphError> {
    let span = info_span!("worker", identity = %descriptor.identity);
    async move {
        let mut stream = UnixStream::connect(&descriptor.socket_path).await?;
        send_identity(&mut stream, &descriptor.identity).await?;
        debug!("Connected to coordinator at {}", descriptor.socket_path.display());

        let framed = Framed::new(stream, FrameCodec::new(descriptor.max_frame_size));
        match descriptor.entry {
            WorkerEntry::RoomGraph => serve(framed, RouteTable::new()).await,
        }
    }
    .instrument(span)
    .await
}

/// The decode -> route table -> encode pipeline over one connection.
pub async fn serve<T>(mut framed: Framed<T, FrameCodec>, mut table: RouteTable) -> Result<(), RoomGraphError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(message) = framed.next().await {
        if let Some(reply) = table.handle(message?)? {
            framed.send(reply).await?;
        }
    }
    debug!(
        "Coordinator closed the connection; {} sources still had rules.",
        table.source_count()
    );
    Ok(())
}
