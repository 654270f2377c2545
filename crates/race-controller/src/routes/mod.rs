//! HTTP routes for the race controller.
//!
//! Defines the Axum router and application state.

use crate::actors::RaceSessionHandle;
use crate::config::Config;
use crate::handlers;
use crate::middleware::{attach_session, http_metrics_middleware, SessionStore};
use crate::observability::health::{health_router, HealthState};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Request timeout for everything except the WebSocket channel.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Handle to the race session actor.
    pub session: RaceSessionHandle,

    /// Login sessions for the station views.
    pub sessions: Arc<SessionStore>,

    /// Parent token of every WebSocket connection.
    pub cancel_token: CancellationToken,
}

/// Build the application routes.
///
/// - `/health`, `/ready` - liveness and readiness
/// - `/metrics` - Prometheus text
/// - `/ws` - event channel (no request timeout)
/// - `/state` - session snapshot
/// - `/races`, `/drivers` - roster CRUD
/// - `/login/{role}` - login page and login
/// - station and display pages from the static directory
///
/// The session middleware runs on every route. `TraceLayer` and the HTTP
/// metrics middleware wrap everything, metrics outermost.
pub fn build_routes(
    state: Arc<AppState>,
    metrics_handle: PrometheusHandle,
    health_state: Arc<HealthState>,
) -> Router {
    let api_routes = Router::new()
        .route("/state", get(handlers::get_state))
        .route(
            "/races",
            get(handlers::list_races)
                .post(handlers::create_race)
                .delete(handlers::delete_race),
        )
        .route("/drivers/:race_id", get(handlers::list_drivers))
        .route(
            "/drivers",
            post(handlers::create_driver)
                .put(handlers::update_driver)
                .delete(handlers::delete_driver),
        )
        .merge(handlers::view_routes(
            &state.config.static_dir,
            state.config.dev_mode,
        ))
        .with_state(Arc::clone(&state))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT));

    let ws_routes = Router::new()
        .route("/ws", get(handlers::ws_handler))
        .with_state(Arc::clone(&state));

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    api_routes
        .merge(ws_routes)
        .merge(metrics_routes)
        .merge(health_router(health_state))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.sessions),
            attach_session,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(http_metrics_middleware))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }
}
