// src/core/transport/local.rs

//! An in-process room hub built on broadcast channels.

use super::{RoomHandle, RoomSubscription, RoomTransport, Stanza, StanzaAdapter};
use crate::core::RoomGraphError;
use crate::core::events::Event;
use crate::core::room::RoomId;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast::{self, Receiver, Sender};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, warn};

/// The capacity of each room's broadcast channel.
const ROOM_CAPACITY: usize = 1024;
/// The capacity of the channel that mirrors every publication.
const TAP_CAPACITY: usize = 4096;

/// Rooms live in this process. Members receive everything published to a
/// room except what they published themselves.
pub struct LocalRoomTransport {
    rooms: DashMap<RoomId, Arc<Sender<Stanza>>>,
    members: DashMap<u64, RoomHandle>,
    tap: Sender<Stanza>,
    adapter: Arc<dyn StanzaAdapter>,
    next_id: AtomicU64,
}

impl LocalRoomTransport {
    pub fn new(adapter: Arc<dyn StanzaAdapter>) -> Self {
        Self {
            rooms: DashMap::new(),
            members: DashMap::new(),
            tap: broadcast::channel(TAP_CAPACITY).0,
            adapter,
            next_id: AtomicU64::new(1),
        }
    }

    fn channel(&self, room: &RoomId) -> Arc<Sender<Stanza>> {
        self.rooms
            .entry(room.clone())
            .or_insert_with(|| Arc::new(broadcast::channel(ROOM_CAPACITY).0))
            .value()
            .clone()
    }

    /// Publishes a raw stanza. Returns the number of room receivers it reached.
    pub fn publish(&self, stanza: Stanza) -> usize {
        let _ = self.tap.send(stanza.clone());
        match self.rooms.get(&stanza.room) {
            Some(channel) => channel.send(stanza).unwrap_or(0),
            None => 0,
        }
    }

    /// Publishes an event as `sender`, as an external producer would.
    pub fn publish_event(&self, room: &RoomId, sender: &str, event: &Event) -> Result<usize, RoomGraphError> {
        let body = self.adapter.to_body(event)?;
        Ok(self.publish(Stanza {
            room: room.clone(),
            sender: sender.to_string(),
            body,
        }))
    }

    /// Receives a copy of every publication in every room.
    pub fn tap(&self) -> Receiver<Stanza> {
        self.tap.subscribe()
    }

    /// The number of live memberships of `room`.
    pub fn member_count(&self, room: &RoomId) -> usize {
        self.members
            .iter()
            .filter(|entry| &entry.value().room == room)
            .count()
    }

    pub fn is_joined(&self, room: &RoomId) -> bool {
        self.member_count(room) > 0
    }

    /// Drops the channels of rooms nobody listens to anymore.
    pub fn purge_empty_rooms(&self) -> usize {
        let mut purged = 0;
        self.rooms.retain(|_, sender| {
            if sender.receiver_count() == 0 {
                purged += 1;
                false
            } else {
                true
            }
        });
        if purged > 0 {
            debug!("Purged {} empty rooms.", purged);
        }
        purged
    }
}

#[async_trait]
impl RoomTransport for LocalRoomTransport {
    async fn join(&self, room: &RoomId, identity: &str) -> Result<RoomSubscription, RoomGraphError> {
        let receiver = self.channel(room).subscribe();
        let handle = RoomHandle {
            room: room.clone(),
            member: identity.to_string(),
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };
        self.members.insert(handle.id, handle.clone());

        let member = handle.member.clone();
        let room_name = room.clone();
        let incoming = BroadcastStream::new(receiver)
            .filter_map(move |item| {
                let stanza = match item {
                    Ok(stanza) if stanza.sender != member => Some(stanza),
                    Ok(_) => None,
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!("Member of '{}' lagged and skipped {} stanzas.", room_name, skipped);
                        None
                    }
                };
                futures::future::ready(stanza)
            })
            .boxed();

        Ok(RoomSubscription { handle, incoming })
    }

    async fn leave(&self, handle: RoomHandle) {
        self.members.remove(&handle.id);
        self.purge_empty_rooms();
    }

    async fn send(&self, handle: &RoomHandle, event: &Event) -> Result<(), RoomGraphError> {
        if !self.members.contains_key(&handle.id) {
            return Err(RoomGraphError::Transport(format!(
                "not a member of '{}'",
                handle.room
            )));
        }
        let body = self.adapter.to_body(event)?;
        self.publish(Stanza {
            room: handle.room.clone(),
            sender: handle.member.clone(),
            body,
        });
        Ok(())
    }
}
