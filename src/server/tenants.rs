//! Tenant administration. Super admin only.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::Utc;
use uuid::Uuid;

use crate::auth::RequireUser;
use crate::server::access::authorize_super_admin;
use crate::server::dto::CreateTenantRequest;
use crate::server::response::{ApiError, ApiResponse, StoreResultExt};
use crate::server::router::AppState;
use crate::types::Tenant;

pub async fn create_tenant(
    State(state): State<Arc<AppState>>,
    RequireUser { user }: RequireUser,
    Json(req): Json<CreateTenantRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Tenant>>), ApiError> {
    authorize_super_admin(state.store.as_ref(), &user)?;

    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("tenant name must not be empty"));
    }

    let tenant = Tenant {
        id: Uuid::new_v4().to_string(),
        name: req.name.trim().to_string(),
        plan: req.plan.unwrap_or_else(|| "free".to_string()),
        created_at: Utc::now(),
    };
    state.store.create_tenant(&tenant).api_err()?;

    tracing::info!(tenant_id = %tenant.id, name = %tenant.name, "Created tenant");
    Ok((StatusCode::CREATED, ApiResponse::new(tenant)))
}

pub async fn list_tenants(
    State(state): State<Arc<AppState>>,
    RequireUser { user }: RequireUser,
) -> Result<Json<ApiResponse<Vec<Tenant>>>, ApiError> {
    authorize_super_admin(state.store.as_ref(), &user)?;
    let tenants = state.store.list_tenants().api_err()?;
    Ok(ApiResponse::new(tenants))
}

pub async fn delete_tenant(
    State(state): State<Arc<AppState>>,
    RequireUser { user }: RequireUser,
    Path(tenant_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    authorize_super_admin(state.store.as_ref(), &user)?;

    if state.store.delete_tenant(&tenant_id).api_err()? {
        tracing::info!(tenant_id = %tenant_id, "Deleted tenant");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("tenant not found"))
    }
}
