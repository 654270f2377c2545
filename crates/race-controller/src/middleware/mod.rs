//! HTTP middleware for the race controller.
//!
//! - `http_metrics` - request metrics for every response
//! - `session` - cookie sessions and the role gate on station views

pub mod http_metrics;
pub mod session;

pub use http_metrics::http_metrics_middleware;
pub use session::{attach_session, require_role, SessionContext, SessionStore, ViewGate};
