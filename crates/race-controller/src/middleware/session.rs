//! Cookie sessions for the station views.
//!
//! A session is created only by a successful login, so health checks and public
//! displays never allocate one. The `rc_session` cookie carries an opaque
//! v4 uuid; the granted roles live in [`SessionStore`].
//!
//! [`attach_session`] runs on every request and inserts a
//! [`SessionContext`] into the request extensions. [`require_role`] guards a
//! single view and redirects to `/login/{role}` when the role is missing.

use crate::hub::RoleSet;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use common::types::Role;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "rc_session";

/// In-memory session map.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, RoleSet>>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Roles granted to a session, `None` if the session is unknown.
    pub async fn roles(&self, id: Uuid) -> Option<RoleSet> {
        self.sessions.read().await.get(&id).copied()
    }

    /// Grant `role` to `session`, creating a session when `session` is
    /// absent or unknown.
    ///
    /// Returns the session id and whether it was newly created.
    pub async fn grant(&self, session: Option<Uuid>, role: Role) -> (Uuid, bool) {
        let mut sessions = self.sessions.write().await;

        if let Some(id) = session {
            if let Some(roles) = sessions.get_mut(&id) {
                roles.insert(role);
                return (id, false);
            }
        }

        let id = Uuid::new_v4();
        sessions.insert(id, RoleSet::from_iter([role]));
        (id, true)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

/// Session attached to the current request.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionContext {
    /// Known session id, `None` for anonymous requests.
    pub id: Option<Uuid>,
    pub roles: RoleSet,
}

/// Role gate for one station view.
#[derive(Debug, Clone, Copy)]
pub struct ViewGate {
    pub role: Role,
    /// Dev mode opens every view.
    pub dev_mode: bool,
}

/// Resolve the session cookie and insert a [`SessionContext`].
pub async fn attach_session(
    State(store): State<Arc<SessionStore>>,
    mut req: Request,
    next: Next,
) -> Response {
    let mut context = SessionContext::default();

    if let Some(id) = session_id(req.headers()) {
        if let Some(roles) = store.roles(id).await {
            context = SessionContext {
                id: Some(id),
                roles,
            };
        }
    }

    req.extensions_mut().insert(context);
    next.run(req).await
}

/// Let the request through only if its session holds the gate's role.
pub async fn require_role(State(gate): State<ViewGate>, req: Request, next: Next) -> Response {
    let allowed = gate.dev_mode
        || req
            .extensions()
            .get::<SessionContext>()
            .is_some_and(|ctx| ctx.roles.contains(gate.role));

    if allowed {
        return next.run(req).await;
    }

    debug!(target: "rc.http", role = %gate.role, "View requires login");
    Redirect::to(&format!("/login/{}", gate.role.as_str())).into_response()
}

/// Session id from the `Cookie` header(s).
#[must_use]
pub fn session_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value.trim()).ok())
}

/// `Set-Cookie` value for a session.
#[must_use]
pub fn session_cookie(id: Uuid) -> String {
    format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Router};
    use tower::ServiceExt;

    fn gated_app(store: Arc<SessionStore>, dev_mode: bool) -> Router {
        let gate = ViewGate {
            role: Role::RaceControl,
            dev_mode,
        };
        Router::new()
            .route(
                "/race-control",
                get(|| async { "race control" })
                    .route_layer(middleware::from_fn_with_state(gate, require_role)),
            )
            .layer(middleware::from_fn_with_state(store, attach_session))
    }

    fn request(cookie: Option<String>) -> axum::http::Request<Body> {
        let mut builder = axum::http::Request::builder().uri("/race-control");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_session_id_parsed_among_other_cookies() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            format!("theme=dark; {SESSION_COOKIE}={id}; lang=en")
                .parse()
                .unwrap(),
        );
        assert_eq!(session_id(&headers), Some(id));
    }

    #[test]
    fn test_session_id_rejects_garbage() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, "rc_session=not-a-uuid".parse().unwrap());
        assert_eq!(session_id(&headers), None);
        assert_eq!(session_id(&HeaderMap::new()), None);
    }

    #[test]
    fn test_cookie_attributes() {
        let cookie = session_cookie(Uuid::nil());
        assert!(cookie.starts_with("rc_session=00000000-0000-0000-0000-000000000000"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Path=/"));
    }

    #[tokio::test]
    async fn test_grant_creates_then_extends_session() {
        let store = SessionStore::new();
        let (id, created) = store.grant(None, Role::FrontDesk).await;
        assert!(created);

        let (same, created) = store.grant(Some(id), Role::RaceControl).await;
        assert_eq!(same, id);
        assert!(!created);

        let roles = store.roles(id).await.unwrap();
        assert!(roles.contains(Role::FrontDesk));
        assert!(roles.contains(Role::RaceControl));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_session_gets_a_new_one() {
        let store = SessionStore::new();
        let (id, created) = store.grant(Some(Uuid::new_v4()), Role::FrontDesk).await;
        assert!(created);
        assert!(store.roles(id).await.is_some());
    }

    #[tokio::test]
    async fn test_gate_redirects_without_role() {
        let store = Arc::new(SessionStore::new());
        let response = gated_app(Arc::clone(&store), false)
            .oneshot(request(None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/login/race-control"
        );

        let (id, _) = store.grant(None, Role::FrontDesk).await;
        let response = gated_app(store, false)
            .oneshot(request(Some(format!("{SESSION_COOKIE}={id}"))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn test_gate_admits_granted_session() {
        let store = Arc::new(SessionStore::new());
        let (id, _) = store.grant(None, Role::RaceControl).await;

        let response = gated_app(store, false)
            .oneshot(request(Some(format!("{SESSION_COOKIE}={id}"))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_dev_mode_opens_views() {
        let response = gated_app(Arc::new(SessionStore::new()), true)
            .oneshot(request(None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
