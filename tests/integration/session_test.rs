// tests/integration/session_test.rs

use super::test_helpers::{
    DELIVERY_TIMEOUT, QUIET_PERIOD, TestContext, eventually, next_event, room,
};
use async_trait::async_trait;
use roomgraph::core::events::Event;
use roomgraph::core::room::RoomId;
use roomgraph::core::rules::Rule;
use roomgraph::core::transport::{
    JsonStanzaAdapter, LocalRoomTransport, RoomHandle, RoomSubscription, RoomTransport,
};
use roomgraph::core::RoomGraphError;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_close_stops_routing_and_leaves_rooms() {
    let ctx = TestContext::new(2).await;
    let mut dst = ctx.observe("dst").await;
    let sessions = ctx.graph.sessions();
    let session = sessions
        .open_session("src", "dst", None, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(session.source(), Some(&room("src")));
    assert_eq!(session.destination(), Some(&room("dst")));
    assert_eq!(session.rule(), Some(&Rule::Anything));
    assert_eq!(sessions.active_sessions(), 1);
    assert_eq!(ctx.graph.rooms().len(), 2);

    ctx.publish("src", &Event::new().with("n", "1"));
    assert!(next_event(&mut dst, DELIVERY_TIMEOUT).await.is_some());

    sessions.close_session(session).await;
    assert_eq!(sessions.active_sessions(), 0);
    assert!(ctx.graph.rooms().is_empty());
    let hub = ctx.hub.clone();
    eventually(|| {
        let hub = hub.clone();
        async move { !hub.is_joined(&room("src")) }
    })
    .await;

    ctx.publish("src", &Event::new().with("n", "2"));
    assert_eq!(next_event(&mut dst, QUIET_PERIOD).await, None);
}

#[tokio::test]
async fn test_shared_rooms_are_reference_counted() {
    let ctx = TestContext::new(2).await;
    let mut dst = ctx.observe("dst").await;
    let sessions = ctx.graph.sessions();
    let cancel = CancellationToken::new();
    let spam = Rule::parse("type=spam").unwrap();

    let first = sessions
        .open_session("src", "dst", Some(spam.clone()), &cancel)
        .await
        .unwrap();
    let second = sessions
        .open_session("SRC", "Dst", Some(spam), &cancel)
        .await
        .unwrap();
    assert_eq!(sessions.active_sessions(), 2);
    assert_eq!(ctx.graph.rooms().subscribers(&room("src")), 2);
    assert_eq!(ctx.graph.rooms().subscribers(&room("dst")), 2);

    first.close().await;
    assert_eq!(ctx.graph.rooms().subscribers(&room("src")), 1);

    let event = Event::new().with("type", "spam");
    ctx.publish("src", &event);
    assert_eq!(next_event(&mut dst, DELIVERY_TIMEOUT).await, Some(event));
    assert_eq!(next_event(&mut dst, QUIET_PERIOD).await, None);

    second.close().await;
    assert!(ctx.graph.rooms().is_empty());
}

#[tokio::test]
async fn test_destination_only_room_is_not_classified() {
    let ctx = TestContext::new(1).await;
    let mut c = ctx.observe("c").await;
    let cancel = CancellationToken::new();
    let _ab = ctx.graph.sessions().open_session("a", "b", None, &cancel).await.unwrap();
    let _bc = ctx.graph.sessions().open_session("b", "c", None, &cancel).await.unwrap();
    let cb = ctx.graph.sessions().open_session("c", "b", None, &cancel).await.unwrap();

    // `c` is a source only through `cb`; once it closes, traffic in `c`
    // stops being routed even though the router stays joined to `c`.
    cb.close().await;
    assert_eq!(ctx.graph.rooms().subscribers(&room("c")), 1);

    let mut b = ctx.observe("b").await;
    ctx.publish("c", &Event::new().with("x", "1"));
    assert!(next_event(&mut c, DELIVERY_TIMEOUT).await.is_some());
    assert_eq!(next_event(&mut b, QUIET_PERIOD).await, None);
}

#[tokio::test]
async fn test_dropped_handle_is_closed_in_background() {
    let ctx = TestContext::new(1).await;
    let session = ctx
        .graph
        .sessions()
        .open_session("src", "dst", None, &CancellationToken::new())
        .await
        .unwrap();
    drop(session);

    let sessions = ctx.graph.sessions().clone();
    eventually(|| {
        let sessions = sessions.clone();
        async move { sessions.active_sessions() == 0 }
    })
    .await;
    let rooms = ctx.graph.rooms().clone();
    eventually(|| {
        let rooms = rooms.clone();
        async move { rooms.is_empty() }
    })
    .await;
}

#[tokio::test]
async fn test_invalid_room_acquires_nothing() {
    let ctx = TestContext::new(1).await;
    let err = ctx
        .graph
        .sessions()
        .open_session("src", "  ", None, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RoomGraphError::InvalidRoom(_)));
    assert_eq!(ctx.graph.sessions().active_sessions(), 0);
    assert!(ctx.graph.rooms().is_empty());
}

#[tokio::test]
async fn test_cancelled_before_start_returns_stopped() {
    let ctx = TestContext::new(1).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = ctx
        .graph
        .sessions()
        .open_session("src", "dst", None, &cancel)
        .await
        .unwrap_err();
    assert_eq!(err, RoomGraphError::Stopped);
    assert_eq!(ctx.graph.sessions().active_sessions(), 0);
    assert!(ctx.graph.rooms().is_empty());
}

/// Joining the room named `blackhole` never completes.
struct StuckJoinTransport {
    inner: Arc<LocalRoomTransport>,
}

#[async_trait]
impl RoomTransport for StuckJoinTransport {
    async fn join(&self, room: &RoomId, identity: &str) -> Result<RoomSubscription, RoomGraphError> {
        if room.as_str() == "blackhole" {
            futures::future::pending::<()>().await;
        }
        self.inner.join(room, identity).await
    }

    async fn leave(&self, handle: RoomHandle) {
        self.inner.leave(handle).await
    }

    async fn send(&self, handle: &RoomHandle, event: &Event) -> Result<(), RoomGraphError> {
        self.inner.send(handle, event).await
    }
}

#[tokio::test]
async fn test_cancellation_during_join_rolls_back() {
    let hub = Arc::new(LocalRoomTransport::new(Arc::new(JsonStanzaAdapter)));
    let stuck = Arc::new(StuckJoinTransport { inner: hub.clone() });
    let ctx = TestContext::with_transport(1, stuck, hub).await;
    let sessions = ctx.graph.sessions().clone();
    let cancel = CancellationToken::new();

    let opening = {
        let sessions = sessions.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { sessions.open_session("src", "blackhole", None, &cancel).await })
    };

    let rooms = ctx.graph.rooms().clone();
    eventually(|| {
        let rooms = rooms.clone();
        async move { rooms.subscribers(&RoomId::parse("src").unwrap()) == 1 }
    })
    .await;

    cancel.cancel();
    let outcome = tokio::time::timeout(Duration::from_secs(2), opening)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome.unwrap_err(), RoomGraphError::Stopped);
    assert_eq!(sessions.active_sessions(), 0);
    assert!(ctx.graph.rooms().is_empty());
    assert!(!ctx.hub.is_joined(&room("blackhole")));
}

#[tokio::test]
async fn test_abandoned_open_rolls_back() {
    let hub = Arc::new(LocalRoomTransport::new(Arc::new(JsonStanzaAdapter)));
    let stuck = Arc::new(StuckJoinTransport { inner: hub.clone() });
    let ctx = TestContext::with_transport(1, stuck, hub).await;
    let sessions = ctx.graph.sessions();

    // The token never fires; the caller gives up by dropping the future.
    let cancel = CancellationToken::new();
    let opening = sessions.open_session("src", "blackhole", None, &cancel);
    assert!(
        tokio::time::timeout(Duration::from_millis(200), opening)
            .await
            .is_err()
    );

    assert_eq!(ctx.graph.rooms().subscribers(&room("src")), 0);
    assert!(ctx.graph.rooms().is_empty());
    assert_eq!(sessions.active_sessions(), 0);
    let hub = ctx.hub.clone();
    eventually(|| {
        let hub = hub.clone();
        async move { !hub.is_joined(&room("src")) }
    })
    .await;
}

#[tokio::test]
async fn test_abandoned_open_leaves_no_rule_behind() {
    let ctx = TestContext::new(2).await;
    let mut dst = ctx.observe("dst").await;
    let sessions = ctx.graph.sessions();
    let cancel = CancellationToken::new();

    // Give up on the first open as soon as it has had one chance to run.
    let opening = sessions.open_session("src", "dst", None, &cancel);
    let _ = tokio::time::timeout(Duration::ZERO, opening).await;

    let rooms = ctx.graph.rooms().clone();
    eventually(|| {
        let rooms = rooms.clone();
        async move { rooms.is_empty() }
    })
    .await;

    // A narrower session on the same rooms must route only what it matches.
    let spam = Rule::parse("type=spam").unwrap();
    let _session = sessions
        .open_session("src", "dst", Some(spam), &cancel)
        .await
        .unwrap();
    ctx.publish("src", &Event::new().with("type", "ham"));
    assert_eq!(next_event(&mut dst, QUIET_PERIOD).await, None);
}
