//! Observability for the Race Controller.
//!
//! - [`health`] - liveness/readiness router
//! - [`metrics`] - Prometheus recorder and metric helpers

pub mod health;
pub mod metrics;
