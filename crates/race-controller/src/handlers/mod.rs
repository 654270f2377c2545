//! HTTP request handlers for the race controller.

pub mod drivers;
pub mod login;
pub mod metrics;
pub mod races;
pub mod state;
pub mod views;
pub mod ws;

pub use drivers::{create_driver, delete_driver, list_drivers, update_driver};
pub use login::login;
pub use metrics::metrics_handler;
pub use races::{create_race, delete_race, list_races};
pub use state::get_state;
pub use views::view_routes;
pub use ws::ws_handler;

use crate::errors::RcError;
use serde::de::DeserializeOwned;

/// Decode a JSON body, answering 400 rather than axum's default 422.
fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, RcError> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(target: "rc.http", error = %e, "Invalid request body");
        RcError::BadRequest("Invalid request body".to_string())
    })
}
