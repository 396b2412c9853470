//! Request and response bodies for the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ApiKey, Role, RunStatus, User};

// Auth

#[derive(Debug, Deserialize)]
pub struct MagicLinkRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct MagicLinkResponse {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct MagicLinkCallbackRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub access_token: String,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct MembershipResponse {
    pub tenant_id: String,
    pub tenant_name: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    #[serde(flatten)]
    pub user: User,
    pub tenants: Vec<MembershipResponse>,
}

// Tenants

#[derive(Debug, Deserialize)]
pub struct CreateTenantRequest {
    pub name: String,
    #[serde(default)]
    pub plan: Option<String>,
}

// Invites

#[derive(Debug, Deserialize)]
pub struct CreateInviteRequest {
    pub email: String,
    pub tenant_id: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct InviteCreatedResponse {
    pub id: String,
    pub email: String,
    pub tenant_id: String,
    pub role: Role,
    pub invite_link: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct AcceptInviteRequest {
    pub token: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AcceptInviteResponse {
    pub tenant_id: String,
    pub role: Role,
    pub user: User,
}

// Sites

#[derive(Debug, Deserialize)]
pub struct CreateSiteRequest {
    pub url: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub profile_key: Option<String>,
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
    #[serde(default)]
    pub interval_minutes: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct TriggerRunResponse {
    pub run_id: String,
    pub status: RunStatus,
    pub new_items: i64,
}

// Pagination query parameters

#[derive(Debug, Deserialize)]
pub struct PageParams {
    #[serde(default)]
    pub offset: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CursorParams {
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct TenantQuery {
    pub tenant_id: String,
}

// Webhooks

#[derive(Debug, Deserialize)]
pub struct CreateWebhookRequest {
    pub tenant_id: String,
    pub endpoint_url: String,
    #[serde(default)]
    pub secret: Option<String>,
}

// API keys

#[derive(Debug, Deserialize)]
pub struct CreateApiKeyRequest {
    pub tenant_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
}

/// Returned once at creation time; the raw token is never shown again.
#[derive(Debug, Serialize)]
pub struct ApiKeyCreatedResponse {
    pub token: String,
    #[serde(flatten)]
    pub key: ApiKey,
}

// Dashboard

#[derive(Debug, Serialize)]
pub struct TeamMemberResponse {
    pub user_id: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub role: Role,
}
