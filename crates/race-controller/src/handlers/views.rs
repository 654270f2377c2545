//! Static station pages.
//!
//! Public displays are served as-is. The three station views sit behind
//! [`require_role`] and redirect to `/login/{role}` without the role.
//! `GET /login/{role}` serves the shared login page; the `POST` on the same
//! path is the login handler itself.

use crate::middleware::session::{require_role, ViewGate};
use crate::routes::AppState;
use axum::{
    middleware,
    routing::{get_service, MethodRouter},
    Router,
};
use common::types::Role;
use std::path::Path;
use std::sync::Arc;
use tower_http::services::{ServeDir, ServeFile};

/// Public pages: route and file under the static directory.
pub const PUBLIC_VIEWS: [(&str, &str); 5] = [
    ("/", "glossary.html"),
    ("/race-flags", "flag.html"),
    ("/race-countdown", "race-countdown.html"),
    ("/leader-board", "leader-board.html"),
    ("/next-race", "next-race.html"),
];

/// Login page served for every `/login/{role}`.
pub const LOGIN_PAGE: &str = "login.html";

/// Page routes for the static directory.
pub fn view_routes(static_dir: &Path, dev_mode: bool) -> Router<Arc<AppState>> {
    let mut router = Router::new()
        .route(
            "/login/:role",
            page(static_dir, LOGIN_PAGE).post(super::login),
        )
        .nest_service("/static", ServeDir::new(static_dir));

    for (route, file) in PUBLIC_VIEWS {
        router = router.route(route, page(static_dir, file));
    }

    for role in Role::ALL {
        let gate = ViewGate { role, dev_mode };
        router = router.route(
            &format!("/{}", role.as_str()),
            page(static_dir, &format!("{}.html", role.as_str()))
                .route_layer(middleware::from_fn_with_state(gate, require_role)),
        );
    }

    router
}

fn page(static_dir: &Path, file: &str) -> MethodRouter<Arc<AppState>> {
    get_service(ServeFile::new(static_dir.join(file)))
}
