// src/core/transport/mod.rs

//! The boundary to the room transport: joining, leaving, sending to, and
//! receiving from named rooms, plus the stanza <-> event adapter.

use crate::core::RoomGraphError;
use crate::core::events::Event;
use crate::core::room::RoomId;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

pub mod adapter;
pub mod local;

pub use adapter::JsonStanzaAdapter;
pub use local::LocalRoomTransport;

/// One raw message observed in (or published to) a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stanza {
    pub room: RoomId,
    /// The member name of the publisher.
    pub sender: String,
    pub body: Bytes,
}

/// Identifies one membership of one room.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomHandle {
    pub room: RoomId,
    pub member: String,
    pub id: u64,
}

/// The result of joining a room: the handle to send with and the incoming traffic.
///
/// `incoming` is lazy, unbounded in length, and cannot be restarted; it ends
/// only when the membership goes away.
pub struct RoomSubscription {
    pub handle: RoomHandle,
    pub incoming: BoxStream<'static, Stanza>,
}

impl std::fmt::Debug for RoomSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomSubscription")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait RoomTransport: Send + Sync + 'static {
    /// Turns a user-supplied room name into the identifier used everywhere else.
    async fn resolve(&self, name: &str) -> Result<RoomId, RoomGraphError> {
        RoomId::parse(name)
    }

    async fn join(&self, room: &RoomId, identity: &str) -> Result<RoomSubscription, RoomGraphError>;

    async fn leave(&self, handle: RoomHandle);

    async fn send(&self, handle: &RoomHandle, event: &Event) -> Result<(), RoomGraphError>;
}

/// Converts between raw stanzas and structured events.
pub trait StanzaAdapter: Send + Sync + 'static {
    /// Extracts the event carried by a stanza, if it carries one.
    fn to_event(&self, stanza: &Stanza) -> Option<Event>;

    fn to_body(&self, event: &Event) -> Result<Bytes, RoomGraphError>;
}
