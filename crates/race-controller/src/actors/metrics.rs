//! Mailbox depth monitoring for the session and connection actors.
//!
//! | Actor      | Normal | Warning | Critical |
//! |------------|--------|---------|----------|
//! | Session    | < 64   | 64-256  | > 256    |
//! | Connection | < 32   | 32-128  | > 128    |
//!
//! The sending side calls [`MailboxMonitor::record_enqueue`], the actor
//! calls [`MailboxMonitor::record_dequeue`] after taking a message.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, warn};

pub const SESSION_MAILBOX_NORMAL: usize = 64;
pub const SESSION_MAILBOX_WARNING: usize = 256;

pub const CONNECTION_MAILBOX_NORMAL: usize = 32;
pub const CONNECTION_MAILBOX_WARNING: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorType {
    /// The race session run-loop (singleton).
    Session,
    /// One per WebSocket client.
    Connection,
}

impl ActorType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ActorType::Session => "session",
            ActorType::Connection => "connection",
        }
    }

    const fn thresholds(self) -> (usize, usize) {
        match self {
            ActorType::Session => (SESSION_MAILBOX_NORMAL, SESSION_MAILBOX_WARNING),
            ActorType::Connection => (CONNECTION_MAILBOX_NORMAL, CONNECTION_MAILBOX_WARNING),
        }
    }
}

/// Queue depth tracker shared between an actor and its handles.
#[derive(Debug)]
pub struct MailboxMonitor {
    actor_type: ActorType,
    actor_id: String,
    depth: AtomicUsize,
    peak_depth: AtomicUsize,
    messages_processed: AtomicU64,
    messages_dropped: AtomicU64,
}

impl MailboxMonitor {
    #[must_use]
    pub fn new(actor_type: ActorType, actor_id: impl Into<String>) -> Self {
        Self {
            actor_type,
            actor_id: actor_id.into(),
            depth: AtomicUsize::new(0),
            peak_depth: AtomicUsize::new(0),
            messages_processed: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
        }
    }

    pub fn record_enqueue(&self) {
        let depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_depth.fetch_max(depth, Ordering::Relaxed);

        let (normal, warning) = self.actor_type.thresholds();
        if depth > warning {
            warn!(
                target: "rc.actor.mailbox",
                actor_type = self.actor_type.as_str(),
                actor_id = %self.actor_id,
                depth = depth,
                threshold = warning,
                "Mailbox depth critical"
            );
        } else if depth == normal {
            debug!(
                target: "rc.actor.mailbox",
                actor_type = self.actor_type.as_str(),
                actor_id = %self.actor_id,
                depth = depth,
                "Mailbox depth elevated"
            );
        }
    }

    pub fn record_dequeue(&self) {
        // Saturate: a dequeue can race ahead of a handle that has not yet
        // recorded its enqueue.
        let _ = self
            .depth
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |d| {
                Some(d.saturating_sub(1))
            });
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// A message could not be queued (mailbox full).
    pub fn record_drop(&self) {
        let dropped = self.messages_dropped.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(
            target: "rc.actor.mailbox",
            actor_type = self.actor_type.as_str(),
            actor_id = %self.actor_id,
            dropped = dropped,
            "Message dropped, mailbox full"
        );
    }

    #[must_use]
    pub fn current_depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn peak_depth(&self) -> usize {
        self.peak_depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_and_peak_tracking() {
        let monitor = MailboxMonitor::new(ActorType::Connection, "conn-1");
        for _ in 0..5 {
            monitor.record_enqueue();
        }
        for _ in 0..3 {
            monitor.record_dequeue();
        }

        assert_eq!(monitor.current_depth(), 2);
        assert_eq!(monitor.peak_depth(), 5);
        assert_eq!(monitor.messages_processed(), 3);
    }

    #[test]
    fn test_dequeue_never_underflows() {
        let monitor = MailboxMonitor::new(ActorType::Session, "session");
        monitor.record_dequeue();
        assert_eq!(monitor.current_depth(), 0);
        assert_eq!(monitor.messages_processed(), 1);
    }

    #[test]
    fn test_record_drop_counts() {
        let monitor = MailboxMonitor::new(ActorType::Connection, "conn-3");
        monitor.record_drop();
        monitor.record_drop();
        assert_eq!(monitor.messages_dropped(), 2);
    }
}
