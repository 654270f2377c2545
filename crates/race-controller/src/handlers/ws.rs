//! WebSocket event channel.
//!
//! Each upgraded socket is split. The write half goes to a
//! [`ConnectionActor`]; this task keeps the read half and forwards text
//! frames to the session actor until the client leaves, the connection is
//! pruned, or the service shuts down.

use crate::actors::ConnectionActor;
use crate::hub::{ConnectionId, RoleSet};
use crate::middleware::session::SessionContext;
use crate::routes::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Request, State,
    },
    response::Response,
};
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Handler for `GET /ws`.
///
/// Roles already granted to the HTTP session carry over to the connection.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
    req: Request,
) -> Response {
    let roles = req
        .extensions()
        .get::<SessionContext>()
        .map(|ctx| ctx.roles)
        .unwrap_or_default();

    ws.on_upgrade(move |socket| handle_socket(socket, state, roles))
}

#[instrument(skip_all, name = "rc.ws.connection", fields(connection_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, roles: RoleSet) {
    let connection_id = ConnectionId::new();
    tracing::Span::current().record("connection_id", tracing::field::display(connection_id));

    let (sink, mut stream) = socket.split();
    let token = state.cancel_token.child_token();
    let (connection, _task) = ConnectionActor::spawn(connection_id, sink, token.clone());

    if let Err(e) = state.session.connect(connection, roles).await {
        warn!(target: "rc.http", connection_id = %connection_id, error = %e, "Session unavailable, closing socket");
        token.cancel();
        return;
    }

    loop {
        tokio::select! {
            () = token.cancelled() => break,

            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Err(e) = state.session.inbound(connection_id, text).await {
                        warn!(target: "rc.http", connection_id = %connection_id, error = %e, "Failed to forward frame");
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(target: "rc.http", connection_id = %connection_id, error = %e, "Socket read failed");
                    break;
                }
            }
        }
    }

    let _ = state.session.disconnect(connection_id).await;
    token.cancel();
}
