//! Driver roster endpoints.
//!
//! - `GET /drivers/{race_id}` - roster in registration order
//! - `POST /drivers` - `{race_id, name, car?}`; omitting `car` takes the
//!   highest free car
//! - `PUT /drivers` - `{race_id, name, car}` reassigns a car
//! - `DELETE /drivers` - `{race_id, name}`
//!
//! Roster validation failures answer 400 with the roster error code.

use super::parse_json;
use super::races::DeletedResponse;
use crate::errors::RcError;
use crate::roster::Driver;
use crate::routes::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use common::types::{CarNumber, RaceId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

#[derive(Debug, Deserialize)]
pub struct CreateDriverRequest {
    pub race_id: RaceId,
    pub name: String,
    #[serde(default)]
    pub car: Option<u8>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDriverRequest {
    pub race_id: RaceId,
    pub name: String,
    pub car: u8,
}

#[derive(Debug, Deserialize)]
pub struct DeleteDriverRequest {
    pub race_id: RaceId,
    pub name: String,
}

/// A driver's assignment after a create or update.
#[derive(Debug, Serialize)]
pub struct DriverResponse {
    pub name: String,
    pub car: CarNumber,
}

/// Handler for `GET /drivers/{race_id}`.
#[instrument(skip_all, name = "rc.http.drivers.list", fields(race_id = %race_id))]
pub async fn list_drivers(
    State(state): State<Arc<AppState>>,
    Path(race_id): Path<RaceId>,
) -> Result<Json<Vec<Driver>>, RcError> {
    Ok(Json(state.session.roster(race_id).await?))
}

/// Handler for `POST /drivers`.
#[instrument(skip_all, name = "rc.http.drivers.create")]
pub async fn create_driver(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<DriverResponse>), RcError> {
    let request: CreateDriverRequest = parse_json(&body)?;
    let car = state
        .session
        .add_driver(request.race_id, request.name.clone(), request.car)
        .await?;

    info!(target: "rc.http", race_id = %request.race_id, car = %car, "Driver added");
    Ok((
        StatusCode::CREATED,
        Json(DriverResponse {
            name: request.name,
            car,
        }),
    ))
}

/// Handler for `PUT /drivers`.
#[instrument(skip_all, name = "rc.http.drivers.update")]
pub async fn update_driver(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<DriverResponse>, RcError> {
    let request: UpdateDriverRequest = parse_json(&body)?;
    let car = state
        .session
        .update_driver(request.race_id, request.name.clone(), request.car)
        .await?;

    info!(target: "rc.http", race_id = %request.race_id, car = %car, "Driver car updated");
    Ok(Json(DriverResponse {
        name: request.name,
        car,
    }))
}

/// Handler for `DELETE /drivers`.
#[instrument(skip_all, name = "rc.http.drivers.delete")]
pub async fn delete_driver(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<DeletedResponse>, RcError> {
    let request: DeleteDriverRequest = parse_json(&body)?;
    let deleted = state
        .session
        .remove_driver(request.race_id, request.name)
        .await?;

    info!(target: "rc.http", race_id = %request.race_id, deleted, "Driver removed");
    Ok(Json(DeletedResponse { deleted }))
}
