//! WebSocket push channel.
//!
//! The first frame opens a session (`auth`) or reattaches one (`resume`).
//! After that the socket carries store requests and their replies, plus
//! notifications for changes made by other sessions. Requests on one socket
//! are handled one at a time.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::{stream::SplitSink, FutureExt, SinkExt, Stream, StreamExt};
use tether_core::{ConnectionHandle, Reply, SessionId, SyncError};
use tether_proto::{ClientMessage, ErrorKind, Operation, ServerMessage, StoreRequest};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use crate::AppState;

/// WebSocket routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/ws", get(upgrade))
}

async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sink, mut frames) = socket.split();
    let (handle, outbound) = ConnectionHandle::channel();
    let writer = tokio::spawn(write_frames(sink, outbound));

    drive(&state, &mut frames, &handle).await;

    // The writer drains what is left once the last sender is gone.
    drop(handle);
    join_writer(writer).await;
}

/// Wait for the writer task. Returns false if it panicked or was cancelled.
async fn join_writer(writer: JoinHandle<()>) -> bool {
    match writer.await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, panicked = e.is_panic(), "websocket writer task failed");
            false
        }
    }
}

/// Forward outbound messages to the socket until every sender is dropped.
async fn write_frames(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: UnboundedReceiver<ServerMessage>,
) {
    while let Some(message) = outbound.recv().await {
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode frame");
                continue;
            }
        };
        if sink.send(Message::Text(text)).await.is_err() {
            break;
        }
    }
    let _ = sink.close().await;
}

/// Run the protocol for one connection: open a session, serve requests,
/// then detach.
pub async fn drive<S>(state: &AppState, frames: &mut S, handle: &ConnectionHandle)
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin + Send,
{
    let Some(id) = open_session(state, frames, handle).await else {
        return;
    };

    tracing::debug!(
        user = %id.user,
        session = %id,
        connection_id = handle.id(),
        "websocket opened"
    );
    serve_requests(state, &id, frames, handle).await;
    state.registry.detach(&id, handle.id());
    tracing::debug!(user = %id.user, session = %id, "websocket closed");
}

async fn next_text<S>(frames: &mut S) -> Option<String>
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    while let Some(frame) = frames.next().await {
        match frame {
            Ok(Message::Text(text)) => return Some(text),
            Ok(Message::Close(_)) => return None,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(error = %e, "websocket error");
                return None;
            }
        }
    }
    None
}

fn auth_error(handle: &ConnectionHandle, message: impl Into<String>) {
    handle.send(ServerMessage::AuthError {
        message: message.into(),
    });
}

/// Handshake. Returns the session the connection is now attached to.
async fn open_session<S>(
    state: &AppState,
    frames: &mut S,
    handle: &ConnectionHandle,
) -> Option<SessionId>
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin + Send,
{
    let text = next_text(frames).await?;

    let id = match ClientMessage::from_json(&text) {
        Ok(ClientMessage::Auth { user, password }) => {
            let Some(user_data) = state.authenticator.check_auth(&user, &password).await else {
                tracing::info!(user = %user, "login rejected");
                auth_error(handle, "invalid credentials");
                return None;
            };
            state.registry.create_session(user_data)
        }
        Ok(ClientMessage::Resume { user, session_key }) => {
            let id = SessionId::new(user, session_key);
            if !state.registry.check_session(&id) {
                auth_error(handle, "session expired or unknown");
                return None;
            }
            id
        }
        Ok(_) => {
            auth_error(handle, "expected auth or resume");
            return None;
        }
        Err(e) => {
            auth_error(handle, format!("invalid frame: {}", e));
            return None;
        }
    };

    let role = state.registry.user_data(&id).and_then(|u| u.role);
    handle.send(ServerMessage::AuthSuccess {
        user: id.user.clone(),
        session_key: id.key.clone(),
        role,
    });
    // Queued notifications follow the auth reply, ahead of live pushes.
    if !state.registry.attach(&id, handle.clone()) {
        return None;
    }
    Some(id)
}

async fn serve_requests<S>(
    state: &AppState,
    id: &SessionId,
    frames: &mut S,
    handle: &ConnectionHandle,
) where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin + Send,
{
    while let Some(text) = next_text(frames).await {
        let message = match ClientMessage::from_json(&text) {
            Ok(message) => message,
            Err(e) => {
                handle.send(ServerMessage::error(
                    None,
                    ErrorKind::DataInconsistency,
                    format!("invalid frame: {}", e),
                    None,
                ));
                continue;
            }
        };

        if !state.registry.check_session(id) {
            handle.send(ServerMessage::error(
                None,
                ErrorKind::SessionInvalid,
                "session expired",
                None,
            ));
            break;
        }

        match message.into_store_request() {
            Ok((operation, request)) => dispatch(state, id, operation, request, handle).await,
            Err(ClientMessage::Logout { user, session_key }) => {
                if user == id.user && session_key == id.key {
                    state.registry.logout(id);
                    handle.send(ServerMessage::LogoutSuccess);
                    break;
                }
                handle.send(ServerMessage::LogoutError {
                    message: "not the session of this connection".to_string(),
                });
            }
            Err(_) => {
                handle.send(ServerMessage::error(
                    None,
                    ErrorKind::DataInconsistency,
                    "connection is already authenticated",
                    None,
                ));
            }
        }
    }
}

/// Run one request. A panic inside it is logged and answered with an error
/// frame unless the reply already went out.
async fn dispatch(
    state: &AppState,
    id: &SessionId,
    operation: Operation,
    request: StoreRequest,
    handle: &ConnectionHandle,
) {
    let return_data = request.return_data.clone();
    let replied = AtomicBool::new(false);

    let reply = {
        let return_data = return_data.clone();
        let replied = &replied;
        move |result: Result<Reply, SyncError>| {
            replied.store(true, Ordering::Relaxed);
            let frame = match result {
                Ok(reply) => reply.into_message(return_data),
                Err(e) => {
                    ServerMessage::error(Some(operation), e.kind(), e.to_string(), return_data)
                }
            };
            handle.send(frame);
        }
    };

    let outcome = AssertUnwindSafe(state.orchestrator.handle(id, operation, request, reply))
        .catch_unwind()
        .await;

    if outcome.is_err() {
        tracing::error!(user = %id.user, operation = %operation, "request handler panicked");
        if !replied.load(Ordering::Relaxed) {
            handle.send(ServerMessage::error(
                Some(operation),
                ErrorKind::StorageFailure,
                "internal error",
                return_data,
            ));
        }
    }
}
