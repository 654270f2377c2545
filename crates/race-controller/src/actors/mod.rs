//! Actor model for the race controller.
//!
//! ```text
//! RaceSessionActor (singleton)
//! ├── owns EventHub, RaceDirectory, Countdown
//! └── fans out to N ConnectionActors
//!     └── ConnectionActor (one per WebSocket client, owns the write half)
//! ```
//!
//! Every mutation of session state is a message on the session mailbox.
//! Connection actors only write frames.

pub mod connection;
pub mod messages;
pub mod metrics;
pub mod session;

pub use connection::{ConnectionActor, ConnectionActorHandle, DeliveryError};
pub use messages::{SessionMessage, SessionState};
pub use metrics::{ActorType, MailboxMonitor};
pub use session::{RaceSessionActor, RaceSessionHandle, SessionSettings};
