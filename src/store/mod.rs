mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::Result;
use crate::types::*;

/// Store defines the database interface.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // Tenant operations
    fn create_tenant(&self, tenant: &Tenant) -> Result<()>;
    fn get_tenant(&self, id: &str) -> Result<Option<Tenant>>;
    fn list_tenants(&self) -> Result<Vec<Tenant>>;
    fn delete_tenant(&self, id: &str) -> Result<bool>;

    // User operations
    fn create_user(&self, user: &User) -> Result<()>;
    fn get_user(&self, id: &str) -> Result<Option<User>>;
    fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;

    // Membership operations
    fn create_membership(&self, membership: &Membership) -> Result<()>;
    fn get_membership(&self, user_id: &str, tenant_id: &str) -> Result<Option<Membership>>;
    fn list_user_memberships(&self, user_id: &str) -> Result<Vec<Membership>>;
    fn list_tenant_members(&self, tenant_id: &str) -> Result<Vec<(Membership, User)>>;
    fn user_holds_super_admin(&self, user_id: &str) -> Result<bool>;
    fn has_super_admin(&self) -> Result<bool>;

    // Site operations
    fn create_site(&self, site: &Site) -> Result<()>;
    fn get_site(&self, id: &str) -> Result<Option<Site>>;
    fn list_sites(&self, tenant_ids: &[String], offset: i64, limit: i64) -> Result<Vec<Site>>;
    fn count_sites(&self, tenant_ids: &[String]) -> Result<i64>;
    fn update_site_last_run(&self, id: &str, at: &DateTime<Utc>) -> Result<()>;
    fn delete_site(&self, id: &str) -> Result<bool>;

    // Run operations
    fn create_run(&self, run: &Run) -> Result<()>;
    fn get_run(&self, id: &str) -> Result<Option<Run>>;
    /// Applies the single terminating transition of a run. Fails with
    /// `Conflict` if the run is already terminal.
    fn finalize_run(
        &self,
        id: &str,
        status: RunStatus,
        pages_scanned: i64,
        duration_ms: i64,
        diagnostics: Option<&Value>,
        finished_at: &DateTime<Utc>,
    ) -> Result<()>;
    fn list_site_runs(&self, site_id: &str, offset: i64, limit: i64) -> Result<Vec<Run>>;
    fn count_site_runs(&self, site_id: &str) -> Result<i64>;
    fn list_tenant_runs(&self, tenant_id: &str, limit: i64) -> Result<Vec<Run>>;

    // Item operations
    /// Inserts an item unless one with the same `(site_id, canonical_url)`
    /// already exists. Returns whether a row was inserted. The
    /// insert-or-skip is a single atomic statement.
    fn insert_item_if_new(&self, item: &Item) -> Result<bool>;
    fn list_site_items(&self, site_id: &str, cursor: Option<&str>, limit: i64) -> Result<Vec<Item>>;
    fn list_tenant_items(&self, tenant_id: &str, limit: i64) -> Result<Vec<Item>>;

    // Invite operations
    fn create_invite(&self, invite: &Invite) -> Result<()>;
    fn list_open_invites(&self) -> Result<Vec<Invite>>;
    fn mark_invite_accepted(&self, id: &str, at: &DateTime<Utc>) -> Result<()>;

    // Webhook operations
    fn create_webhook(&self, webhook: &Webhook) -> Result<()>;
    fn list_webhooks(&self, tenant_ids: &[String]) -> Result<Vec<Webhook>>;

    // API key operations
    fn create_api_key(&self, key: &ApiKey) -> Result<()>;
    fn list_api_keys(&self, tenant_ids: &[String]) -> Result<Vec<ApiKey>>;

    // Login token (magic link) operations
    fn create_login_token(&self, token: &LoginToken) -> Result<()>;
    fn get_login_token_by_lookup(&self, lookup: &str) -> Result<Option<LoginToken>>;
    fn delete_login_token(&self, id: &str) -> Result<bool>;
    fn prune_expired_login_tokens(&self, now: &DateTime<Utc>) -> Result<usize>;

    // Dashboard aggregates
    fn dashboard_stats(
        &self,
        tenant_id: &str,
        week_ago: &DateTime<Utc>,
        today_start: &DateTime<Utc>,
    ) -> Result<DashboardStats>;

    fn close(&self) -> Result<()>;
}
