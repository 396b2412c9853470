//! Programmatic API keys. The raw `sk_` token is shown exactly once.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use chrono::Utc;
use uuid::Uuid;

use crate::auth::{RequireUser, TokenKind};
use crate::error::Error;
use crate::server::access::{authorize_admin, authorize_tenant_access};
use crate::server::dto::{ApiKeyCreatedResponse, CreateApiKeyRequest, TenantQuery};
use crate::server::response::{ApiError, ApiResponse, StoreResultExt};
use crate::server::router::AppState;
use crate::types::ApiKey;

const MAX_LOOKUP_RETRIES: usize = 3;

pub async fn create_api_key(
    State(state): State<Arc<AppState>>,
    RequireUser { user }: RequireUser,
    Json(req): Json<CreateApiKeyRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ApiKeyCreatedResponse>>), ApiError> {
    authorize_admin(state.store.as_ref(), &user, &req.tenant_id)?;

    // Lookup prefixes are short; regenerate on the rare collision
    for _ in 0..MAX_LOOKUP_RETRIES {
        let (raw, lookup, hash) = state
            .tokens
            .generate(TokenKind::ApiKey)
            .map_err(|e| ApiError::internal(format!("failed to mint API key: {e}")))?;

        let key = ApiKey {
            id: Uuid::new_v4().to_string(),
            tenant_id: req.tenant_id.clone(),
            name: req.name.clone(),
            token_hash: hash,
            token_lookup: lookup,
            scopes: req.scopes.clone().unwrap_or_default(),
            created_at: Utc::now(),
            last_used_at: None,
        };

        match state.store.create_api_key(&key) {
            Ok(()) => {
                tracing::info!(key_id = %key.id, tenant_id = %key.tenant_id, "Created API key");
                return Ok((
                    StatusCode::CREATED,
                    ApiResponse::new(ApiKeyCreatedResponse { token: raw, key }),
                ));
            }
            Err(Error::TokenLookupCollision) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(ApiError::internal("failed to generate a unique API key"))
}

pub async fn list_api_keys(
    State(state): State<Arc<AppState>>,
    RequireUser { user }: RequireUser,
    Query(query): Query<TenantQuery>,
) -> Result<Json<ApiResponse<Vec<ApiKey>>>, ApiError> {
    authorize_tenant_access(state.store.as_ref(), &user, &query.tenant_id)?;
    let keys = state.store.list_api_keys(&[query.tenant_id]).api_err()?;
    Ok(ApiResponse::new(keys))
}
