//! Race Controller library.
//!
//! Coordinates a live race event across several stations: the front desk
//! registers races and drivers, race control starts and finishes races and
//! swaps flags, the lap-line tracker records laps, and public displays
//! follow along. Every station connects to one WebSocket event channel.
//!
//! # Architecture
//!
//! ```text
//! HTTP (axum)                     RaceSessionActor (single run-loop)
//! ├── /races, /drivers  ───────►  ├── RaceDirectory ──► RaceStore (memory | sqlite)
//! ├── /login, views               ├── Countdown (generation-fenced ticks)
//! └── /ws ── ConnectionActor ◄──  └── EventHub (roles, fan-out)
//! ```
//!
//! All state changes, whether from HTTP, a WebSocket event or a countdown
//! tick, are messages on the session actor's mailbox and are handled one
//! at a time.
//!
//! # Modules
//!
//! - [`roster`] - per-race driver/car assignment rules
//! - [`store`] - persistence collaborator
//! - [`directory`] - next pending race and roster snapshots
//! - [`countdown`] - countdown state machine
//! - [`hub`] - wire envelope, roles and fan-out
//! - [`actors`] - session and connection actors
//! - [`routes`], [`handlers`], [`middleware`] - HTTP surface
//! - [`config`], [`errors`], [`observability`] - ambient concerns

pub mod actors;
pub mod config;
pub mod countdown;
pub mod directory;
pub mod errors;
pub mod handlers;
pub mod hub;
pub mod middleware;
pub mod observability;
pub mod roster;
pub mod routes;
pub mod store;
