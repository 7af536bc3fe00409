//! Chat routes: message history and the streaming WebSocket.
//!
//! WebSocket protocol, one turn per client message:
//! - client sends one raw text message;
//! - server streams back plain-text reply fragments;
//! - a failed turn produces one `[ERROR] ...` fragment instead;
//! - every turn ends with the `[END_OF_STREAM]` terminator.
//!
//! Close codes: 1000 normal, 4404 companion not found / not owned,
//! 1011 unexpected server error.

use crate::auth::{CurrentUser, user_from_token};
use crate::companions::{Pagination, owned_companion};
use crate::error::ApiError;
use crate::SharedState;
use axum::Json;
use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use kindred_core::message::{ChatMessage, MessageOrder};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

/// Close code for a companion that doesn't exist or isn't the caller's.
pub const CLOSE_NOT_FOUND: u16 = 4404;
/// Close code for unexpected server errors.
pub const CLOSE_INTERNAL: u16 = 1011;

/// `GET /api/v1/messages/{companion_id}` — history replay, oldest first.
pub async fn history_handler(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(companion_id): Path<Uuid>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    owned_companion(&state, companion_id, user.id).await?;

    let messages = state
        .storage
        .list_messages(
            companion_id,
            user.id,
            MessageOrder::OldestFirst,
            page.skip,
            page.limit,
        )
        .await?;
    Ok(Json(messages))
}

#[derive(Deserialize)]
pub struct WsAuth {
    /// Browsers can't set headers on a WebSocket handshake, so the bearer
    /// token travels as a query parameter.
    pub token: String,
}

/// `GET /api/v1/ws/{companion_id}?token=...`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
    Path(companion_id): Path<Uuid>,
    Query(auth): Query<WsAuth>,
) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, state, companion_id, auth.token))
}

async fn close_with(mut socket: WebSocket, code: u16, reason: &str) {
    let _ = socket
        .send(WsMessage::Close(Some(CloseFrame {
            code,
            reason: reason.to_string().into(),
        })))
        .await;
}

async fn handle_connection(
    socket: WebSocket,
    state: SharedState,
    companion_id: Uuid,
    token: String,
) {
    // Authenticate and authorize before accepting any turns.
    let user = match user_from_token(&state, &token).await {
        Ok(user) => user,
        Err(_) => {
            close_with(socket, CLOSE_NOT_FOUND, "companion not found or access denied").await;
            return;
        }
    };

    let companion = match state.storage.get_companion(companion_id).await {
        Ok(Some(companion)) if companion.owner_id == user.id => companion,
        Ok(_) => {
            close_with(socket, CLOSE_NOT_FOUND, "companion not found or access denied").await;
            return;
        }
        Err(e) => {
            warn!(companion_id = %companion_id, error = %e, "Companion lookup failed on connect");
            close_with(socket, CLOSE_INTERNAL, "internal error").await;
            return;
        }
    };

    // Copied up front: after a disconnect these are the only safe values to
    // log — never re-read from connection-scoped state.
    let user_id_for_log = user.id;
    let companion_name_for_log = companion.name.clone();

    info!(
        companion_id = %companion_id,
        user_id = %user_id_for_log,
        "Chat session opened"
    );

    let mut socket = socket;
    loop {
        let inbound = match socket.recv().await {
            Some(Ok(WsMessage::Text(text))) => text.to_string(),
            Some(Ok(WsMessage::Close(_))) | None => break,
            Some(Ok(_)) => continue, // ignore binary, ping, pong
            Some(Err(_)) => break,
        };

        // One turn: forward engine events as plain-text frames. A send
        // failure means the client went away; dropping the receiver aborts
        // the turn inside the engine.
        let mut events = state
            .engine
            .clone()
            .process_message(companion_id, user_id_for_log, inbound);

        while let Some(event) = events.recv().await {
            if socket
                .send(WsMessage::Text(event.to_frame().into()))
                .await
                .is_err()
            {
                info!(
                    user_id = %user_id_for_log,
                    companion = %companion_name_for_log,
                    "Client disconnected mid-turn"
                );
                return;
            }
        }
    }

    info!(
        user_id = %user_id_for_log,
        companion = %companion_name_for_log,
        "Chat session closed"
    );
}
