//! In-process event channel client.
//!
//! Registers a [`ConnectionActor`] writing into an in-memory sink, so
//! tests see exactly the frames a WebSocket client would receive.

use axum::extract::ws::Message;
use futures::channel::mpsc::{unbounded, UnboundedReceiver};
use futures::StreamExt;
use race_controller::actors::{ConnectionActor, ConnectionActorHandle, RaceSessionHandle};
use race_controller::hub::{ConnectionId, Envelope, RoleSet};
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How long `next_event` waits before giving up.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct MockClient {
    id: ConnectionId,
    session: RaceSessionHandle,
    handle: ConnectionActorHandle,
    frames: UnboundedReceiver<Message>,
}

impl MockClient {
    /// Connect with `roles` already granted.
    pub async fn connect(session: &RaceSessionHandle, roles: RoleSet) -> Self {
        let (sink, frames) = unbounded::<Message>();
        let id = ConnectionId::new();
        let (handle, _task) = ConnectionActor::spawn(id, sink, CancellationToken::new());
        session
            .connect(handle.clone(), roles)
            .await
            .expect("session should accept the connection");

        Self {
            id,
            session: session.clone(),
            handle,
            frames,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Whether the hub has closed this connection.
    pub fn is_closed(&self) -> bool {
        self.handle.is_cancelled()
    }

    pub async fn send(&self, event: &str, data: Option<Value>) {
        let text = serde_json::to_string(&Envelope::new(event, data)).unwrap();
        self.send_raw(&text).await;
    }

    pub async fn send_raw(&self, text: &str) {
        self.session
            .inbound(self.id, text.to_string())
            .await
            .expect("session should accept the frame");
    }

    /// Next event, or `None` on close or timeout.
    pub async fn next_event(&mut self) -> Option<Envelope> {
        self.next_event_within(EVENT_TIMEOUT).await
    }

    pub async fn next_event_within(&mut self, window: Duration) -> Option<Envelope> {
        match tokio::time::timeout(window, self.frames.next()).await {
            Ok(Some(Message::Text(text))) => {
                Some(Envelope::parse(&text).expect("server frames are envelopes"))
            }
            _ => None,
        }
    }

    /// Next event, which must be `event`.
    pub async fn expect_event(&mut self, event: &str) -> Envelope {
        let envelope = self
            .next_event()
            .await
            .unwrap_or_else(|| panic!("expected `{event}`, got nothing"));
        assert_eq!(envelope.event, event, "unexpected event order");
        envelope
    }

    /// Skip events until `event` arrives.
    pub async fn wait_for(&mut self, event: &str) -> Envelope {
        loop {
            let envelope = self
                .next_event()
                .await
                .unwrap_or_else(|| panic!("`{event}` never arrived"));
            if envelope.event == event {
                return envelope;
            }
        }
    }

    /// Assert nothing arrives within `window`.
    pub async fn expect_silence(&mut self, window: Duration) {
        if let Some(envelope) = self.next_event_within(window).await {
            panic!("expected silence, got `{}`", envelope.event);
        }
    }

    pub async fn disconnect(self) {
        self.session.disconnect(self.id).await.unwrap();
    }
}
