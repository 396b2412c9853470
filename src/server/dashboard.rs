//! Per-tenant dashboard aggregates and team listing.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use chrono::{Duration, Utc};

use crate::auth::RequireUser;
use crate::server::access::authorize_tenant_access;
use crate::server::dto::{TeamMemberResponse, TenantQuery};
use crate::server::response::{ApiError, ApiResponse, StoreResultExt};
use crate::server::router::AppState;
use crate::types::{DashboardStats, Item, Run};

const RECENT_LIMIT: i64 = 20;

/// GET /v1/dashboard/stats?tenant_id=
pub async fn stats(
    State(state): State<Arc<AppState>>,
    RequireUser { user }: RequireUser,
    Query(TenantQuery { tenant_id }): Query<TenantQuery>,
) -> Result<Json<ApiResponse<DashboardStats>>, ApiError> {
    authorize_tenant_access(state.store.as_ref(), &user, &tenant_id)?;

    let now = Utc::now();
    let week_ago = now - Duration::days(7);
    let today_start = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|ndt| ndt.and_utc())
        .unwrap_or(now);

    let stats = state
        .store
        .dashboard_stats(&tenant_id, &week_ago, &today_start)
        .api_err()?;
    Ok(ApiResponse::new(stats))
}

/// GET /v1/dashboard/team?tenant_id=
pub async fn team(
    State(state): State<Arc<AppState>>,
    RequireUser { user }: RequireUser,
    Query(TenantQuery { tenant_id }): Query<TenantQuery>,
) -> Result<Json<ApiResponse<Vec<TeamMemberResponse>>>, ApiError> {
    authorize_tenant_access(state.store.as_ref(), &user, &tenant_id)?;

    let members = state
        .store
        .list_tenant_members(&tenant_id)
        .api_err()?
        .into_iter()
        .map(|(membership, member)| TeamMemberResponse {
            user_id: member.id,
            email: member.email,
            name: member.name,
            role: membership.role,
        })
        .collect();
    Ok(ApiResponse::new(members))
}

/// GET /v1/dashboard/recent-items?tenant_id=
pub async fn recent_items(
    State(state): State<Arc<AppState>>,
    RequireUser { user }: RequireUser,
    Query(TenantQuery { tenant_id }): Query<TenantQuery>,
) -> Result<Json<ApiResponse<Vec<Item>>>, ApiError> {
    authorize_tenant_access(state.store.as_ref(), &user, &tenant_id)?;
    let items = state
        .store
        .list_tenant_items(&tenant_id, RECENT_LIMIT)
        .api_err()?;
    Ok(ApiResponse::new(items))
}

/// GET /v1/dashboard/recent-runs?tenant_id=
pub async fn recent_runs(
    State(state): State<Arc<AppState>>,
    RequireUser { user }: RequireUser,
    Query(TenantQuery { tenant_id }): Query<TenantQuery>,
) -> Result<Json<ApiResponse<Vec<Run>>>, ApiError> {
    authorize_tenant_access(state.store.as_ref(), &user, &tenant_id)?;
    let runs = state
        .store
        .list_tenant_runs(&tenant_id, RECENT_LIMIT)
        .api_err()?;
    Ok(ApiResponse::new(runs))
}
