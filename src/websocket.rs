// src/websocket.rs

use crate::{
    models::ConnectQuery,
    presence::ConnectionId,
    state::AppState,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::{
    sink::SinkExt,
    stream::{SplitSink, SplitStream, StreamExt},
};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use uuid::Uuid;

/// How long the writer may take to flush the close reply once the reader is done.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// The handler for `GET /ws?userId=...`.
///
/// Browser requests from origins outside the allowlist are refused before the upgrade.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<ConnectQuery>,
    headers: HeaderMap,
) -> Response {
    let origin = headers.get(header::ORIGIN);
    if !state.origin_allowed(origin) {
        tracing::warn!(?origin, "rejecting connection from disallowed origin");
        return StatusCode::FORBIDDEN.into_response();
    }

    let user_id = query.tracked_user().map(str::to_owned);
    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
}

/// Manages the lifecycle of one connection: register, serve, deregister.
///
/// A writer task owns the socket sink and drains the connection's outbound
/// queue, so broadcasts never wait on this socket's network I/O.
async fn handle_socket(socket: WebSocket, state: AppState, user_id: Option<String>) {
    let connection_id = Uuid::new_v4();
    let (sender, receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel();

    tracing::info!(
        connection = %connection_id,
        user_id = user_id.as_deref().unwrap_or("-"),
        "client connected"
    );

    let mut write_task = tokio::spawn(write_to_client(sender, rx));
    state
        .presence
        .register_connection(user_id.as_deref(), connection_id, tx)
        .await;
    let mut read_task = tokio::spawn(read_from_client(receiver, connection_id));

    // Whichever half finishes first means the connection is gone.
    let reader_done = tokio::select! {
        _ = &mut read_task => true,
        _ = &mut write_task => {
            read_task.abort();
            false
        }
    };

    // Deregistering drops the queue's sender, which lets the writer close the sink.
    state
        .presence
        .deregister_connection(user_id.as_deref(), connection_id)
        .await;
    if reader_done && tokio::time::timeout(CLOSE_GRACE, &mut write_task).await.is_err() {
        tracing::debug!(connection = %connection_id, "writer did not finish closing");
        write_task.abort();
    }
    tracing::info!(
        connection = %connection_id,
        user_id = user_id.as_deref().unwrap_or("-"),
        "client disconnected"
    );
}

/// Forwards queued messages to the socket until the queue or the socket closes,
/// then closes the sink so a pending close reply reaches the client.
async fn write_to_client(
    mut sender: SplitSink<WebSocket, Message>,
    mut rx: UnboundedReceiver<Message>,
) {
    while let Some(message) = rx.recv().await {
        let closing = matches!(message, Message::Close(_));
        if sender.send(message).await.is_err() || closing {
            break;
        }
    }
    let _ = sender.close().await;
}

/// Reads until the client closes the connection or the transport fails.
/// Clients have nothing to say to the presence layer, so text is only logged.
async fn read_from_client(mut receiver: SplitStream<WebSocket>, connection_id: ConnectionId) {
    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                tracing::debug!(
                    connection = %connection_id,
                    text = text.as_str(),
                    "ignoring client message"
                );
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(connection = %connection_id, error = %e, "connection error");
                break;
            }
        }
    }
}
