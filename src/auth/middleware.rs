use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE, WWW_AUTHENTICATE};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::Error;
use crate::server::AppState;
use crate::types::User;

/// Name of the cookie carrying the browser session token.
pub const SESSION_COOKIE: &str = "access_token";

/// Extractor that authenticates the request and resolves the acting user.
///
/// Looks for a session token in the `access_token` cookie first, then in
/// an `Authorization: Bearer` header.
pub struct RequireUser {
    pub user: User,
}

#[derive(Debug)]
pub enum AuthError {
    MissingAuth,
    InvalidToken,
    TokenExpired,
    UnknownUser,
    InternalError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingAuth => (StatusCode::UNAUTHORIZED, "authentication required"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid session token"),
            AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "session expired"),
            AuthError::UnknownUser => (StatusCode::UNAUTHORIZED, "unknown user"),
            AuthError::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
            }
        };

        let body = Json(json!({
            "data": null,
            "error": message,
        }));

        if status == StatusCode::UNAUTHORIZED {
            (status, [(WWW_AUTHENTICATE, "Bearer")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}

fn session_token(parts: &Parts) -> Option<String> {
    if let Some(cookie_header) = parts.headers.get(COOKIE).and_then(|v| v.to_str().ok()) {
        for pair in cookie_header.split("; ") {
            if let Some(value) = pair.strip_prefix(&format!("{SESSION_COOKIE}=")) {
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }

    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.to_string())
}

impl FromRequestParts<Arc<AppState>> for RequireUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = session_token(parts).ok_or(AuthError::MissingAuth)?;

        let user_id = match state.sessions.verify(&token) {
            Ok(user_id) => user_id,
            Err(Error::TokenExpired) => return Err(AuthError::TokenExpired),
            Err(_) => return Err(AuthError::InvalidToken),
        };

        let user = state
            .store
            .get_user(&user_id)
            .map_err(|e| {
                tracing::error!("Failed to load user for session: {}", e);
                AuthError::InternalError
            })?
            .ok_or(AuthError::UnknownUser)?;

        Ok(RequireUser { user })
    }
}
