//! Common utilities and types shared across Paddock components.

#![warn(clippy::pedantic)]

/// Module for identifiers and value types shared by the controller and its tests
pub mod types;

/// Module for secret types that prevent accidental logging
pub mod secret;
