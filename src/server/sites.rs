//! Site management and the run trigger endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::Utc;
use uuid::Uuid;

use crate::auth::RequireUser;
use crate::server::access::{authorize_admin, authorize_tenant_access};
use crate::server::dto::{CreateSiteRequest, CursorParams, PageParams, TriggerRunResponse};
use crate::server::response::{
    ApiError, ApiResponse, CollectionResponse, CursorResponse, StoreOptionExt, StoreResultExt,
    clamp_page,
};
use crate::server::router::AppState;
use crate::server::runs::trigger_run;
use crate::server::validation::{validate_interval_minutes, validate_url};
use crate::store::Store;
use crate::types::{Item, Run, Site, User};

/// Tenants the user can see. Super admins see every tenant.
fn visible_tenant_ids(store: &dyn Store, user: &User) -> Result<Vec<String>, ApiError> {
    if store.user_holds_super_admin(&user.id).api_err()? {
        return Ok(store
            .list_tenants()
            .api_err()?
            .into_iter()
            .map(|t| t.id)
            .collect());
    }
    Ok(store
        .list_user_memberships(&user.id)
        .api_err()?
        .into_iter()
        .map(|m| m.tenant_id)
        .collect())
}

/// Loads a site and checks the user can access its tenant.
fn load_site(store: &dyn Store, user: &User, site_id: &str) -> Result<Site, ApiError> {
    let site = store.get_site(site_id).api_err()?.or_not_found("site")?;
    authorize_tenant_access(store, user, &site.tenant_id)?;
    Ok(site)
}

/// POST /v1/sites
///
/// `tenant_id` may be omitted when the user belongs to exactly one
/// tenant; with several memberships the target must be named.
pub async fn create_site(
    State(state): State<Arc<AppState>>,
    RequireUser { user }: RequireUser,
    Json(req): Json<CreateSiteRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Site>>), ApiError> {
    let tenant_id = match req.tenant_id {
        Some(tenant_id) => tenant_id,
        None => {
            let memberships = state.store.list_user_memberships(&user.id).api_err()?;
            match memberships.as_slice() {
                [only] => only.tenant_id.clone(),
                [] => return Err(ApiError::forbidden("not a member of any tenant")),
                _ => {
                    return Err(ApiError::bad_request(
                        "tenant_id is required when you belong to multiple tenants",
                    ));
                }
            }
        }
    };

    authorize_admin(state.store.as_ref(), &user, &tenant_id)?;
    validate_url(&req.url)?;
    let interval_minutes = req.interval_minutes.unwrap_or(60);
    validate_interval_minutes(interval_minutes)?;

    let site = Site {
        id: Uuid::new_v4().to_string(),
        tenant_id,
        url: req.url,
        profile_key: req.profile_key,
        keywords: req.keywords.unwrap_or_default(),
        enabled: true,
        interval_minutes,
        last_run_at: None,
        created_at: Utc::now(),
    };
    state.store.create_site(&site).api_err()?;

    tracing::info!(site_id = %site.id, tenant_id = %site.tenant_id, url = %site.url, "Created site");
    Ok((StatusCode::CREATED, ApiResponse::new(site)))
}

/// GET /v1/sites
pub async fn list_sites(
    State(state): State<Arc<AppState>>,
    RequireUser { user }: RequireUser,
    Query(page): Query<PageParams>,
) -> Result<Json<CollectionResponse<Site>>, ApiError> {
    let tenant_ids = visible_tenant_ids(state.store.as_ref(), &user)?;
    let (offset, limit) = clamp_page(page.offset, page.limit);

    let sites = state.store.list_sites(&tenant_ids, offset, limit).api_err()?;
    let total = state.store.count_sites(&tenant_ids).api_err()?;
    Ok(CollectionResponse::new(sites, total, offset, limit))
}

/// GET /v1/sites/{id}
pub async fn get_site(
    State(state): State<Arc<AppState>>,
    RequireUser { user }: RequireUser,
    Path(site_id): Path<String>,
) -> Result<Json<ApiResponse<Site>>, ApiError> {
    let site = load_site(state.store.as_ref(), &user, &site_id)?;
    Ok(ApiResponse::new(site))
}

/// DELETE /v1/sites/{id}
pub async fn delete_site(
    State(state): State<Arc<AppState>>,
    RequireUser { user }: RequireUser,
    Path(site_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let site = load_site(state.store.as_ref(), &user, &site_id)?;
    authorize_admin(state.store.as_ref(), &user, &site.tenant_id)?;

    state.store.delete_site(&site.id).api_err()?;
    tracing::info!(site_id = %site.id, "Deleted site");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/sites/{id}/run
pub async fn trigger_site_run(
    State(state): State<Arc<AppState>>,
    RequireUser { user }: RequireUser,
    Path(site_id): Path<String>,
) -> Result<Json<ApiResponse<TriggerRunResponse>>, ApiError> {
    let site = load_site(state.store.as_ref(), &user, &site_id)?;

    let triggered = trigger_run(state.store.as_ref(), state.gateway.as_ref(), &user, &site).await?;

    Ok(ApiResponse::new(TriggerRunResponse {
        run_id: triggered.run_id,
        status: triggered.status,
        new_items: triggered.new_items,
    }))
}

/// GET /v1/sites/{id}/items
pub async fn list_site_items(
    State(state): State<Arc<AppState>>,
    RequireUser { user }: RequireUser,
    Path(site_id): Path<String>,
    Query(params): Query<CursorParams>,
) -> Result<Json<CursorResponse<Item>>, ApiError> {
    let site = load_site(state.store.as_ref(), &user, &site_id)?;
    let (_, limit) = clamp_page(None, params.limit);

    let items = state
        .store
        .list_site_items(&site.id, params.cursor.as_deref(), limit)
        .api_err()?;

    let next_cursor = if items.len() as i64 == limit {
        items.last().map(|item| item.id.clone())
    } else {
        None
    };
    Ok(CursorResponse::new(items, next_cursor))
}

/// GET /v1/sites/{id}/runs
pub async fn list_site_runs(
    State(state): State<Arc<AppState>>,
    RequireUser { user }: RequireUser,
    Path(site_id): Path<String>,
    Query(page): Query<PageParams>,
) -> Result<Json<CollectionResponse<Run>>, ApiError> {
    let site = load_site(state.store.as_ref(), &user, &site_id)?;
    let (offset, limit) = clamp_page(page.offset, page.limit);

    let runs = state
        .store
        .list_site_runs(&site.id, offset, limit)
        .api_err()?;
    let total = state.store.count_site_runs(&site.id).api_err()?;
    Ok(CollectionResponse::new(runs, total, offset, limit))
}
