//! Magic-link login flow and session introspection.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::response::{IntoResponse, Response};
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::auth::{RequireUser, TokenKind, default_session_ttl, parse_token};
use crate::server::dto::{
    MagicLinkCallbackRequest, MagicLinkRequest, MagicLinkResponse, MembershipResponse,
    SessionResponse, UserResponse,
};
use crate::server::response::{ApiError, ApiResponse, StoreResultExt};
use crate::server::router::AppState;
use crate::server::validation::validate_email;
use crate::types::{LoginToken, User};

const MAGIC_LINK_TTL_MINUTES: i64 = 15;

/// POST /v1/auth/magic-link
///
/// Always answers with the same message whether or not the email is
/// known, so the endpoint cannot be used to probe for accounts. The
/// link itself goes out via the delivery channel (currently the server
/// log).
pub async fn request_magic_link(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MagicLinkRequest>,
) -> Result<Json<ApiResponse<MagicLinkResponse>>, ApiError> {
    validate_email(&req.email)?;

    let now = Utc::now();
    state.store.prune_expired_login_tokens(&now).api_err()?;

    let (raw, lookup, hash) = state
        .tokens
        .generate(TokenKind::MagicLink)
        .map_err(|e| ApiError::internal(format!("failed to mint login token: {e}")))?;

    state
        .store
        .create_login_token(&LoginToken {
            id: Uuid::new_v4().to_string(),
            email: req.email.clone(),
            token_hash: hash,
            token_lookup: lookup,
            expires_at: now + Duration::minutes(MAGIC_LINK_TTL_MINUTES),
            created_at: now,
        })
        .api_err()?;

    let link = format!("{}/auth/callback?token={}", state.public_base_url, raw);
    tracing::info!(email = %req.email, "Magic link issued: {}", link);

    Ok(ApiResponse::new(MagicLinkResponse {
        message: "If that address exists, a login link is on its way".to_string(),
    }))
}

/// POST /v1/auth/magic-link/callback
///
/// Redeems a magic link. The token is single-use: the stored row is
/// deleted before the session is issued.
pub async fn magic_link_callback(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MagicLinkCallbackRequest>,
) -> Result<Response, ApiError> {
    let parsed =
        parse_token(&req.token).map_err(|_| ApiError::unauthorized("invalid login token"))?;
    if parsed.kind != TokenKind::MagicLink {
        return Err(ApiError::unauthorized("invalid login token"));
    }

    let record = state
        .store
        .get_login_token_by_lookup(&parsed.lookup)
        .api_err()?
        .ok_or_else(|| ApiError::unauthorized("invalid or already-used login token"))?;

    if !state.tokens.verify(&parsed.secret, &record.token_hash) {
        return Err(ApiError::unauthorized("invalid login token"));
    }

    state.store.delete_login_token(&record.id).api_err()?;

    if record.expires_at < Utc::now() {
        return Err(ApiError::bad_request("login link has expired"));
    }

    let user = match state.store.get_user_by_email(&record.email).api_err()? {
        Some(user) => user,
        None => {
            let user = User {
                id: Uuid::new_v4().to_string(),
                email: record.email.clone(),
                name: None,
                created_at: Utc::now(),
            };
            state.store.create_user(&user).api_err()?;
            tracing::info!(email = %user.email, "Created user on first login");
            user
        }
    };

    let ttl = default_session_ttl();
    let access_token = state.sessions.issue(&user.id, ttl).api_err()?;

    let cookie = format!(
        "access_token={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        access_token,
        ttl.num_seconds(),
    );

    let body = ApiResponse::new(SessionResponse { access_token, user });
    Ok(([(SET_COOKIE, cookie)], body).into_response())
}

/// GET /v1/auth/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    RequireUser { user }: RequireUser,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    let memberships = state.store.list_user_memberships(&user.id).api_err()?;

    let mut tenants = Vec::with_capacity(memberships.len());
    for membership in memberships {
        let name = state
            .store
            .get_tenant(&membership.tenant_id)
            .api_err()?
            .map(|t| t.name)
            .unwrap_or_default();
        tenants.push(MembershipResponse {
            tenant_id: membership.tenant_id,
            tenant_name: name,
            role: membership.role,
        });
    }

    Ok(ApiResponse::new(UserResponse { user, tenants }))
}
