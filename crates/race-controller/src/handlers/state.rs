//! Session snapshot endpoint.

use crate::actors::SessionState;
use crate::errors::RcError;
use crate::routes::AppState;
use axum::{extract::State, Json};
use std::sync::Arc;
use tracing::instrument;

/// Handler for `GET /state`.
///
/// Returns connection count, countdown status, current flag and the race
/// on track, so a display that reconnects mid-race can catch up.
#[instrument(skip_all, name = "rc.http.state")]
pub async fn get_state(State(state): State<Arc<AppState>>) -> Result<Json<SessionState>, RcError> {
    Ok(Json(state.session.state().await?))
}
