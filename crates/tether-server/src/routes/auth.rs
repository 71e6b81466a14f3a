//! Login and logout.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::header,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use tether_core::SyncError;
use tether_proto::ServerMessage;

use crate::error::AppError;
use crate::json::{AuthRequest, AuthResponse};
use crate::session::{expired_cookie, session_cookie, CurrentSession};
use crate::AppState;

/// Authentication routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth", post(login))
        .route("/logout", post(logout))
}

/// Open a session and hand its key back in the body and a cookie.
async fn login(
    State(state): State<AppState>,
    body: Result<Json<AuthRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = body?;

    let Some(user_data) = state
        .authenticator
        .check_auth(&request.user, &request.password)
        .await
    else {
        tracing::info!(user = %request.user, "login rejected");
        return Err(SyncError::AuthFailed.into());
    };

    let role = user_data.role.clone();
    let id = state.registry.create_session(user_data);
    let cookie = session_cookie(&state.config, &id.key);

    let body = AuthResponse {
        user: id.user,
        session_key: id.key,
        role,
    };
    Ok(([(header::SET_COOKIE, cookie)], Json(body)).into_response())
}

async fn logout(State(state): State<AppState>, CurrentSession(id): CurrentSession) -> Response {
    state.registry.logout(&id);
    (
        [(header::SET_COOKIE, expired_cookie(&state.config))],
        Json(ServerMessage::LogoutSuccess),
    )
        .into_response()
}
