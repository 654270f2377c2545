//! Race registration endpoints.
//!
//! - `GET /races` - pending races, smallest id first
//! - `POST /races` - register `{id}`
//! - `DELETE /races` - remove `{id}` and its drivers

use super::parse_json;
use crate::errors::RcError;
use crate::routes::AppState;
use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use common::types::RaceId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

#[derive(Debug, Deserialize)]
pub struct RaceRequest {
    pub id: RaceId,
}

#[derive(Debug, Serialize)]
pub struct RaceSummary {
    pub id: RaceId,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub deleted: bool,
}

/// Handler for `GET /races`.
#[instrument(skip_all, name = "rc.http.races.list")]
pub async fn list_races(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<RaceSummary>>, RcError> {
    let races = state.session.list_races().await?;
    Ok(Json(races.into_iter().map(|id| RaceSummary { id }).collect()))
}

/// Handler for `POST /races`.
///
/// # Response
///
/// - 201 Created
/// - 400 Bad Request: body is not `{id}`
/// - 409 Conflict: the id is already pending
#[instrument(skip_all, name = "rc.http.races.create")]
pub async fn create_race(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<RaceSummary>), RcError> {
    let request: RaceRequest = parse_json(&body)?;
    state.session.register_race(request.id).await?;

    info!(target: "rc.http", race_id = %request.id, "Race registered");
    Ok((StatusCode::CREATED, Json(RaceSummary { id: request.id })))
}

/// Handler for `DELETE /races`. Deleting an unknown id is not an error.
#[instrument(skip_all, name = "rc.http.races.delete")]
pub async fn delete_race(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<DeletedResponse>, RcError> {
    let request: RaceRequest = parse_json(&body)?;
    let deleted = state.session.delete_race(request.id).await?;

    info!(target: "rc.http", race_id = %request.id, deleted, "Race deleted");
    Ok(Json(DeletedResponse { deleted }))
}
