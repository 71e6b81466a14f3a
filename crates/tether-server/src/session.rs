//! Session identification for REST calls.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use tether_core::{SessionId, SyncError};

use crate::config::ServerConfig;
use crate::error::AppError;
use crate::state::AppState;

/// Header naming the user of a REST call.
pub const USERNAME_HEADER: &str = "username";

/// Header carrying the session key of a REST call.
pub const SESSION_KEY_HEADER: &str = "x-session-key";

/// The validated session of a REST call.
///
/// The user comes from the `username` header and the key from the
/// `x-session-key` header or the session cookie. Extraction runs the session
/// check, so a handler only ever sees a live session.
#[derive(Debug, Clone)]
pub struct CurrentSession(pub SessionId);

#[async_trait]
impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = header_value(&parts.headers, USERNAME_HEADER)
            .ok_or_else(|| AppError::Unauthorized("missing username header".to_string()))?;
        let key = header_value(&parts.headers, SESSION_KEY_HEADER)
            .map(str::to_string)
            .or_else(|| cookie_value(&parts.headers, &state.config.cookie_name))
            .ok_or_else(|| AppError::Unauthorized("missing session key".to_string()))?;

        let id = SessionId::new(user, key);
        if !state.registry.check_session(&id) {
            let reason = format!("no live session for {}", id.user);
            return Err(SyncError::SessionInvalid(reason).into());
        }
        Ok(CurrentSession(id))
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Value of the cookie `name`, if present.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_string())
        .filter(|v| !v.is_empty())
}

/// `Set-Cookie` value carrying a session key.
pub fn session_cookie(config: &ServerConfig, key: &str) -> String {
    format!(
        "{}={}; Path={}; HttpOnly; SameSite=Lax",
        config.cookie_name,
        key,
        cookie_path(config)
    )
}

/// `Set-Cookie` value that clears the session cookie.
pub fn expired_cookie(config: &ServerConfig) -> String {
    format!(
        "{}=; Path={}; HttpOnly; SameSite=Lax; Max-Age=0",
        config.cookie_name,
        cookie_path(config)
    )
}

fn cookie_path(config: &ServerConfig) -> &str {
    match config.url_prefix.as_str() {
        "" => "/",
        prefix => prefix,
    }
}
