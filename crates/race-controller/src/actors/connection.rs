//! `ConnectionActor` - one per WebSocket client.
//!
//! The actor owns the write half of the socket and an outbound mailbox of
//! already-encoded text frames. The session actor fans events out by
//! queueing onto each mailbox with [`ConnectionActorHandle::try_deliver`],
//! so frames reach a client in the order they were queued.
//!
//! The read half stays with the WebSocket handler, which forwards inbound
//! frames to the session actor.

use super::metrics::{ActorType, MailboxMonitor};
use crate::hub::ConnectionId;

use axum::extract::ws::Message;
use futures::{Sink, SinkExt};
use std::fmt::Display;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Outbound mailbox capacity per connection.
pub const CONNECTION_MAILBOX_CAPACITY: usize = 256;

/// Why a frame could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The client is not draining its mailbox.
    #[error("connection mailbox full")]
    Full,
    /// The actor has stopped.
    #[error("connection closed")]
    Closed,
}

/// Handle to a `ConnectionActor`.
#[derive(Clone, Debug)]
pub struct ConnectionActorHandle {
    sender: mpsc::Sender<Arc<str>>,
    cancel_token: CancellationToken,
    connection_id: ConnectionId,
    mailbox: Arc<MailboxMonitor>,
}

impl ConnectionActorHandle {
    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Queue an encoded frame without waiting.
    ///
    /// # Errors
    ///
    /// `DeliveryError::Full` if the mailbox is at capacity,
    /// `DeliveryError::Closed` if the actor has stopped.
    pub fn try_deliver(&self, frame: Arc<str>) -> Result<(), DeliveryError> {
        match self.sender.try_send(frame) {
            Ok(()) => {
                self.mailbox.record_enqueue();
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.mailbox.record_drop();
                Err(DeliveryError::Full)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(DeliveryError::Closed),
        }
    }

    /// Close the connection. Queued frames are discarded.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// Writes queued frames to one client.
pub struct ConnectionActor<S> {
    connection_id: ConnectionId,
    receiver: mpsc::Receiver<Arc<str>>,
    sink: S,
    cancel_token: CancellationToken,
    mailbox: Arc<MailboxMonitor>,
}

impl<S> ConnectionActor<S>
where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: Display + Send,
{
    /// Spawn an actor writing to `sink`.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        connection_id: ConnectionId,
        sink: S,
        cancel_token: CancellationToken,
    ) -> (ConnectionActorHandle, JoinHandle<()>) {
        Self::spawn_with_capacity(connection_id, sink, cancel_token, CONNECTION_MAILBOX_CAPACITY)
    }

    /// Spawn with an explicit mailbox capacity.
    pub fn spawn_with_capacity(
        connection_id: ConnectionId,
        sink: S,
        cancel_token: CancellationToken,
        capacity: usize,
    ) -> (ConnectionActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(capacity);
        let mailbox = Arc::new(MailboxMonitor::new(
            ActorType::Connection,
            connection_id.to_string(),
        ));

        let actor = Self {
            connection_id,
            receiver,
            sink,
            cancel_token: cancel_token.clone(),
            mailbox: Arc::clone(&mailbox),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = ConnectionActorHandle {
            sender,
            cancel_token,
            connection_id,
            mailbox,
        };

        (handle, task_handle)
    }

    #[instrument(skip_all, name = "rc.actor.connection", fields(connection_id = %self.connection_id))]
    async fn run(mut self) {
        debug!(
            target: "rc.actor.connection",
            connection_id = %self.connection_id,
            "ConnectionActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "rc.actor.connection",
                        connection_id = %self.connection_id,
                        "ConnectionActor received cancellation signal"
                    );
                    let _ = self.sink.send(Message::Close(None)).await;
                    break;
                }

                frame = self.receiver.recv() => {
                    let Some(frame) = frame else {
                        debug!(
                            target: "rc.actor.connection",
                            connection_id = %self.connection_id,
                            "ConnectionActor channel closed, exiting"
                        );
                        break;
                    };
                    self.mailbox.record_dequeue();

                    if let Err(e) = self.sink.send(Message::Text(frame.to_string())).await {
                        debug!(
                            target: "rc.actor.connection",
                            connection_id = %self.connection_id,
                            error = %e,
                            "Write failed, closing connection"
                        );
                        break;
                    }
                }
            }
        }

        info!(
            target: "rc.actor.connection",
            connection_id = %self.connection_id,
            messages_processed = self.mailbox.messages_processed(),
            messages_dropped = self.mailbox.messages_dropped(),
            peak_depth = self.mailbox.peak_depth(),
            "ConnectionActor stopped"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use futures::channel::mpsc as fmpsc;
    use futures::StreamExt;

    fn text(message: Message) -> String {
        match message {
            Message::Text(t) => t,
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_frames_written_in_queue_order() {
        let (sink, mut written) = fmpsc::unbounded::<Message>();
        let (handle, _task) =
            ConnectionActor::spawn(ConnectionId::new(), sink, CancellationToken::new());

        for n in 0..5 {
            handle.try_deliver(Arc::from(format!("frame-{n}"))).unwrap();
        }

        for n in 0..5 {
            let message = written.next().await.unwrap();
            assert_eq!(text(message), format!("frame-{n}"));
        }
    }

    #[tokio::test]
    async fn test_cancel_sends_close_and_stops() {
        let (sink, mut written) = fmpsc::unbounded::<Message>();
        let (handle, task) =
            ConnectionActor::spawn(ConnectionId::new(), sink, CancellationToken::new());

        handle.cancel();
        task.await.unwrap();

        assert!(matches!(written.next().await, Some(Message::Close(None))));
        assert!(handle.is_cancelled());
        assert_eq!(
            handle.try_deliver(Arc::from("late")),
            Err(DeliveryError::Closed)
        );
    }

    #[tokio::test]
    async fn test_write_failure_stops_actor() {
        let (sink, written) = fmpsc::unbounded::<Message>();
        drop(written);

        let (handle, task) =
            ConnectionActor::spawn(ConnectionId::new(), sink, CancellationToken::new());
        handle.try_deliver(Arc::from("hello")).unwrap();
        task.await.unwrap();

        assert_eq!(
            handle.try_deliver(Arc::from("again")),
            Err(DeliveryError::Closed)
        );
    }

    #[tokio::test]
    async fn test_parent_cancellation_propagates() {
        let parent = CancellationToken::new();
        let (sink, _written) = fmpsc::unbounded::<Message>();
        let (handle, task) = ConnectionActor::spawn(ConnectionId::new(), sink, parent.child_token());

        parent.cancel();
        task.await.unwrap();
        assert!(handle.is_cancelled());
    }
}
