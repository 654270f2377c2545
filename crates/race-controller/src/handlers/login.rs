//! Station login.
//!
//! `POST /login/{role}` with `{code}` as JSON or a urlencoded form. A match
//! grants the role to the caller's session (creating the session and its
//! cookie on first login). A mismatch, or an unknown role, is answered
//! after `RC_LOGIN_FAILURE_DELAY_MS` with the same body.

use crate::errors::RcError;
use crate::middleware::session::{session_cookie, SessionContext};
use crate::routes::AppState;
use axum::{
    extract::{FromRequest, Path, Request, State},
    http::header,
    response::{AppendHeaders, IntoResponse, Response},
    Form, Json,
};
use common::secret::{ExposeSecret, SecretString};
use common::types::Role;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Message returned for every failed login.
pub const INVALID_ACCESS_KEY: &str = "Invalid access key";

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub code: SecretString,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Handler for `POST /login/{role}`.
#[instrument(skip_all, name = "rc.http.login", fields(role = %role))]
pub async fn login(
    State(state): State<Arc<AppState>>,
    Path(role): Path<String>,
    req: Request,
) -> Result<Response, RcError> {
    let context = req
        .extensions()
        .get::<SessionContext>()
        .copied()
        .unwrap_or_default();
    let request = read_login(req).await?;

    let granted = role
        .parse::<Role>()
        .ok()
        .filter(|r| {
            state
                .config
                .access_codes
                .verify(*r, request.code.expose_secret())
        });

    let Some(role) = granted else {
        warn!(target: "rc.http", role = %role, "Login failed");
        tokio::time::sleep(state.config.login_failure_delay).await;
        return Ok(Json(LoginResponse {
            success: false,
            redirect_to: None,
            message: Some(INVALID_ACCESS_KEY.to_string()),
        })
        .into_response());
    };

    let (session_id, created) = state.sessions.grant(context.id, role).await;
    info!(target: "rc.http", role = %role, new_session = created, "Login succeeded");

    let body = Json(LoginResponse {
        success: true,
        redirect_to: Some(format!("/{}", role.as_str())),
        message: None,
    });

    if created {
        Ok((
            AppendHeaders([(header::SET_COOKIE, session_cookie(session_id))]),
            body,
        )
            .into_response())
    } else {
        Ok(body.into_response())
    }
}

async fn read_login(req: Request) -> Result<LoginRequest, RcError> {
    let is_json = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));

    let parsed = if is_json {
        Json::<LoginRequest>::from_request(req, &())
            .await
            .map(|Json(body)| body)
            .map_err(|e| e.body_text())
    } else {
        Form::<LoginRequest>::from_request(req, &())
            .await
            .map(|Form(body)| body)
            .map_err(|e| e.body_text())
    };

    parsed.map_err(|e| {
        tracing::debug!(target: "rc.http", error = %e, "Invalid login body");
        RcError::BadRequest("Invalid request body".to_string())
    })
}
