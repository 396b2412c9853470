//! Tenant invitations: create, and accept by token.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::auth::{RequireUser, TokenKind, parse_token};
use crate::server::access::authorize_admin;
use crate::server::dto::{
    AcceptInviteRequest, AcceptInviteResponse, CreateInviteRequest, InviteCreatedResponse,
};
use crate::server::response::{ApiError, ApiResponse, StoreResultExt};
use crate::server::router::AppState;
use crate::server::validation::validate_email;
use crate::types::{Invite, Membership, Role, User};

const INVITE_TTL_DAYS: i64 = 7;

/// POST /v1/invites
pub async fn create_invite(
    State(state): State<Arc<AppState>>,
    RequireUser { user }: RequireUser,
    Json(req): Json<CreateInviteRequest>,
) -> Result<(StatusCode, Json<ApiResponse<InviteCreatedResponse>>), ApiError> {
    authorize_admin(state.store.as_ref(), &user, &req.tenant_id)?;
    validate_email(&req.email)?;

    // Only tenant-scoped roles can be granted by invitation
    if req.role == Role::SuperAdmin {
        return Err(ApiError::bad_request("role must be 'admin' or 'member'"));
    }

    if let Some(existing) = state.store.get_user_by_email(&req.email).api_err()? {
        if state
            .store
            .get_membership(&existing.id, &req.tenant_id)
            .api_err()?
            .is_some()
        {
            return Err(ApiError::bad_request(
                "user is already a member of this tenant",
            ));
        }
    }

    let (raw, _lookup, hash) = state
        .tokens
        .generate(TokenKind::Invite)
        .map_err(|e| ApiError::internal(format!("failed to mint invite token: {e}")))?;

    let invite = Invite {
        id: Uuid::new_v4().to_string(),
        email: req.email.clone(),
        tenant_id: req.tenant_id.clone(),
        role: req.role,
        token_hash: hash,
        expires_at: Utc::now() + Duration::days(INVITE_TTL_DAYS),
        accepted_at: None,
        created_at: Utc::now(),
    };
    state.store.create_invite(&invite).api_err()?;

    let invite_link = format!("{}/auth/invite?token={}", state.public_base_url, raw);
    tracing::info!(
        tenant_id = %invite.tenant_id,
        email = %invite.email,
        "Invite created: {}",
        invite_link
    );

    Ok((
        StatusCode::CREATED,
        ApiResponse::new(InviteCreatedResponse {
            id: invite.id,
            email: invite.email,
            tenant_id: invite.tenant_id,
            role: invite.role,
            invite_link,
            expires_at: invite.expires_at,
        }),
    ))
}

/// POST /v1/invites/accept
///
/// Verification scans every open invite and checks the presented secret
/// against each stored hash; invite volume is small enough that the
/// linear pass is acceptable.
pub async fn accept_invite(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AcceptInviteRequest>,
) -> Result<Json<ApiResponse<AcceptInviteResponse>>, ApiError> {
    let parsed =
        parse_token(&req.token).map_err(|_| ApiError::unauthorized("invalid invite token"))?;
    if parsed.kind != TokenKind::Invite {
        return Err(ApiError::unauthorized("invalid invite token"));
    }

    let open_invites = state.store.list_open_invites().api_err()?;
    let invite = open_invites
        .into_iter()
        .find(|invite| state.tokens.verify(&parsed.secret, &invite.token_hash))
        .ok_or_else(|| ApiError::unauthorized("invalid or already-used invite token"))?;

    if invite.expires_at < Utc::now() {
        return Err(ApiError::bad_request("invite has expired"));
    }

    let user = match state.store.get_user_by_email(&invite.email).api_err()? {
        Some(user) => user,
        None => {
            let user = User {
                id: Uuid::new_v4().to_string(),
                email: invite.email.clone(),
                name: req.name.clone(),
                created_at: Utc::now(),
            };
            state.store.create_user(&user).api_err()?;
            user
        }
    };

    state
        .store
        .create_membership(&Membership {
            user_id: user.id.clone(),
            tenant_id: invite.tenant_id.clone(),
            role: invite.role,
        })
        .api_err()?;

    state
        .store
        .mark_invite_accepted(&invite.id, &Utc::now())
        .api_err()?;

    tracing::info!(
        tenant_id = %invite.tenant_id,
        user_id = %user.id,
        role = invite.role.as_str(),
        "Invite accepted"
    );

    Ok(ApiResponse::new(AcceptInviteResponse {
        tenant_id: invite.tenant_id,
        role: invite.role,
        user,
    }))
}
