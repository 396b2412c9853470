use std::sync::Arc;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use crate::auth::{SessionKeys, TokenGenerator};
use crate::server::{api_keys, auth, dashboard, invites, sites, tenants, webhooks};
use crate::store::Store;
use crate::worker::DiscoveryGateway;

/// Shared state for all request handlers.
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub gateway: Arc<dyn DiscoveryGateway>,
    pub sessions: SessionKeys,
    pub tokens: TokenGenerator,
    pub public_base_url: String,
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;

    tracing::info!("{} {} -> {}", method, uri, response.status());
    response
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let auth_routes = Router::new()
        .route("/magic-link", post(auth::request_magic_link))
        .route("/magic-link/callback", post(auth::magic_link_callback))
        .route("/me", get(auth::me));

    let tenant_routes = Router::new()
        .route("/", post(tenants::create_tenant).get(tenants::list_tenants))
        .route("/{tenant_id}", axum::routing::delete(tenants::delete_tenant));

    let invite_routes = Router::new()
        .route("/", post(invites::create_invite))
        .route("/accept", post(invites::accept_invite));

    let site_routes = Router::new()
        .route("/", post(sites::create_site).get(sites::list_sites))
        .route(
            "/{site_id}",
            get(sites::get_site).delete(sites::delete_site),
        )
        .route("/{site_id}/run", post(sites::trigger_site_run))
        .route("/{site_id}/items", get(sites::list_site_items))
        .route("/{site_id}/runs", get(sites::list_site_runs));

    let webhook_routes = Router::new().route(
        "/",
        post(webhooks::create_webhook).get(webhooks::list_webhooks),
    );

    let key_routes = Router::new().route(
        "/",
        post(api_keys::create_api_key).get(api_keys::list_api_keys),
    );

    let dashboard_routes = Router::new()
        .route("/stats", get(dashboard::stats))
        .route("/team", get(dashboard::team))
        .route("/recent-items", get(dashboard::recent_items))
        .route("/recent-runs", get(dashboard::recent_runs));

    Router::new()
        .route("/health", get(health))
        .nest("/v1/auth", auth_routes)
        .nest("/v1/tenants", tenant_routes)
        .nest("/v1/invites", invite_routes)
        .nest("/v1/sites", site_routes)
        .nest("/v1/webhooks", webhook_routes)
        .nest("/v1/keys", key_routes)
        .nest("/v1/dashboard", dashboard_routes)
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
