//! Webhook configuration. The shared secret is hashed at rest.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use chrono::Utc;
use uuid::Uuid;

use crate::auth::RequireUser;
use crate::server::access::{authorize_admin, authorize_tenant_access};
use crate::server::dto::{CreateWebhookRequest, TenantQuery};
use crate::server::response::{ApiError, ApiResponse, StoreResultExt};
use crate::server::router::AppState;
use crate::server::validation::validate_url;
use crate::types::Webhook;

pub async fn create_webhook(
    State(state): State<Arc<AppState>>,
    RequireUser { user }: RequireUser,
    Json(req): Json<CreateWebhookRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Webhook>>), ApiError> {
    authorize_admin(state.store.as_ref(), &user, &req.tenant_id)?;
    validate_url(&req.endpoint_url)?;

    let secret_hash = match &req.secret {
        Some(secret) => Some(
            state
                .tokens
                .hash(secret)
                .map_err(|e| ApiError::internal(format!("failed to hash webhook secret: {e}")))?,
        ),
        None => None,
    };

    let webhook = Webhook {
        id: Uuid::new_v4().to_string(),
        tenant_id: req.tenant_id,
        endpoint_url: req.endpoint_url,
        secret_hash,
        active: true,
        created_at: Utc::now(),
    };
    state.store.create_webhook(&webhook).api_err()?;

    tracing::info!(webhook_id = %webhook.id, tenant_id = %webhook.tenant_id, "Created webhook");
    Ok((StatusCode::CREATED, ApiResponse::new(webhook)))
}

pub async fn list_webhooks(
    State(state): State<Arc<AppState>>,
    RequireUser { user }: RequireUser,
    Query(query): Query<TenantQuery>,
) -> Result<Json<ApiResponse<Vec<Webhook>>>, ApiError> {
    authorize_tenant_access(state.store.as_ref(), &user, &query.tenant_id)?;
    let webhooks = state
        .store
        .list_webhooks(&[query.tenant_id])
        .api_err()?;
    Ok(ApiResponse::new(webhooks))
}
