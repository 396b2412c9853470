use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde_json::Value;

use super::Store;
use super::schema::SCHEMA;
use crate::error::{Error, Result};
use crate::types::*;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn parse_json(s: Option<String>) -> Option<Value> {
    s.and_then(|s| serde_json::from_str(&s).ok())
}

fn parse_string_list(s: &str) -> Vec<String> {
    serde_json::from_str(s).unwrap_or_default()
}

fn format_string_list(list: &[String]) -> String {
    serde_json::to_string(list).unwrap_or_else(|_| "[]".to_string())
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn in_placeholders(n: usize) -> String {
    vec!["?"; n].join(",")
}

fn tenant_from_row(row: &Row<'_>) -> rusqlite::Result<Tenant> {
    Ok(Tenant {
        id: row.get(0)?,
        name: row.get(1)?,
        plan: row.get(2)?,
        created_at: parse_datetime(&row.get::<_, String>(3)?),
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        created_at: parse_datetime(&row.get::<_, String>(3)?),
    })
}

fn membership_from_row(row: &Row<'_>) -> rusqlite::Result<Membership> {
    let role: String = row.get(2)?;
    Ok(Membership {
        user_id: row.get(0)?,
        tenant_id: row.get(1)?,
        role: Role::parse(&role).unwrap_or(Role::Member),
    })
}

fn site_from_row(row: &Row<'_>) -> rusqlite::Result<Site> {
    Ok(Site {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        url: row.get(2)?,
        profile_key: row.get(3)?,
        keywords: parse_string_list(&row.get::<_, String>(4)?),
        enabled: row.get(5)?,
        interval_minutes: row.get(6)?,
        last_run_at: row.get::<_, Option<String>>(7)?.map(|s| parse_datetime(&s)),
        created_at: parse_datetime(&row.get::<_, String>(8)?),
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<Run> {
    let status: String = row.get(2)?;
    Ok(Run {
        id: row.get(0)?,
        site_id: row.get(1)?,
        status: RunStatus::parse(&status).unwrap_or(RunStatus::Error),
        method: row.get(3)?,
        pages_scanned: row.get(4)?,
        duration_ms: row.get(5)?,
        diagnostics: parse_json(row.get::<_, Option<String>>(6)?),
        started_at: parse_datetime(&row.get::<_, String>(7)?),
        finished_at: row.get::<_, Option<String>>(8)?.map(|s| parse_datetime(&s)),
    })
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<Item> {
    Ok(Item {
        id: row.get(0)?,
        site_id: row.get(1)?,
        url: row.get(2)?,
        canonical_url: row.get(3)?,
        title: row.get(4)?,
        published_at: row.get::<_, Option<String>>(5)?.map(|s| parse_datetime(&s)),
        discovered_at: parse_datetime(&row.get::<_, String>(6)?),
        source: row.get(7)?,
        meta: parse_json(row.get::<_, Option<String>>(8)?),
    })
}

fn invite_from_row(row: &Row<'_>) -> rusqlite::Result<Invite> {
    let role: String = row.get(3)?;
    Ok(Invite {
        id: row.get(0)?,
        email: row.get(1)?,
        tenant_id: row.get(2)?,
        role: Role::parse(&role).unwrap_or(Role::Member),
        token_hash: row.get(4)?,
        expires_at: parse_datetime(&row.get::<_, String>(5)?),
        accepted_at: row.get::<_, Option<String>>(6)?.map(|s| parse_datetime(&s)),
        created_at: parse_datetime(&row.get::<_, String>(7)?),
    })
}

const SITE_COLUMNS: &str =
    "id, tenant_id, url, profile_key, keywords, enabled, interval_minutes, last_run_at, created_at";
const RUN_COLUMNS: &str =
    "id, site_id, status, method, pages_scanned, duration_ms, diagnostics, started_at, finished_at";
const ITEM_COLUMNS: &str =
    "id, site_id, url, canonical_url, title, published_at, discovered_at, source, meta";

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // Tenant operations

    fn create_tenant(&self, tenant: &Tenant) -> Result<()> {
        self.conn().execute(
            "INSERT INTO tenants (id, name, plan, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                tenant.id,
                tenant.name,
                tenant.plan,
                format_datetime(&tenant.created_at),
            ],
        )?;
        Ok(())
    }

    fn get_tenant(&self, id: &str) -> Result<Option<Tenant>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, name, plan, created_at FROM tenants WHERE id = ?1",
            params![id],
            tenant_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_tenants(&self) -> Result<Vec<Tenant>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT id, name, plan, created_at FROM tenants ORDER BY created_at")?;
        let rows = stmt.query_map([], tenant_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_tenant(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM tenants WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // User operations

    fn create_user(&self, user: &User) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO users (id, email, name, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                user.id,
                user.email,
                user.name,
                format_datetime(&user.created_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(Error::Conflict(format!(
                "user with email '{}' already exists",
                user.email
            ))),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_user(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, email, name, created_at FROM users WHERE id = ?1",
            params![id],
            user_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, email, name, created_at FROM users WHERE email = ?1",
            params![email],
            user_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    // Membership operations

    fn create_membership(&self, membership: &Membership) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO memberships (user_id, tenant_id, role) VALUES (?1, ?2, ?3)",
            params![
                membership.user_id,
                membership.tenant_id,
                membership.role.as_str(),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(Error::Conflict(
                "user is already a member of this tenant".to_string(),
            )),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_membership(&self, user_id: &str, tenant_id: &str) -> Result<Option<Membership>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT user_id, tenant_id, role FROM memberships
             WHERE user_id = ?1 AND tenant_id = ?2",
            params![user_id, tenant_id],
            membership_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_user_memberships(&self, user_id: &str) -> Result<Vec<Membership>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT user_id, tenant_id, role FROM memberships
             WHERE user_id = ?1 ORDER BY tenant_id",
        )?;
        let rows = stmt.query_map(params![user_id], membership_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_tenant_members(&self, tenant_id: &str) -> Result<Vec<(Membership, User)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT m.user_id, m.tenant_id, m.role, u.id, u.email, u.name, u.created_at
             FROM memberships m
             JOIN users u ON u.id = m.user_id
             WHERE m.tenant_id = ?1
             ORDER BY u.email",
        )?;

        let rows = stmt.query_map(params![tenant_id], |row| {
            let role: String = row.get(2)?;
            let membership = Membership {
                user_id: row.get(0)?,
                tenant_id: row.get(1)?,
                role: Role::parse(&role).unwrap_or(Role::Member),
            };
            let user = User {
                id: row.get(3)?,
                email: row.get(4)?,
                name: row.get(5)?,
                created_at: parse_datetime(&row.get::<_, String>(6)?),
            };
            Ok((membership, user))
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn user_holds_super_admin(&self, user_id: &str) -> Result<bool> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM memberships WHERE user_id = ?1 AND role = 'super_admin'",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn has_super_admin(&self) -> Result<bool> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM memberships WHERE role = 'super_admin'",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // Site operations

    fn create_site(&self, site: &Site) -> Result<()> {
        self.conn().execute(
            "INSERT INTO sites (id, tenant_id, url, profile_key, keywords, enabled, interval_minutes, last_run_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                site.id,
                site.tenant_id,
                site.url,
                site.profile_key,
                format_string_list(&site.keywords),
                site.enabled,
                site.interval_minutes,
                site.last_run_at.as_ref().map(format_datetime),
                format_datetime(&site.created_at),
            ],
        )?;
        Ok(())
    }

    fn get_site(&self, id: &str) -> Result<Option<Site>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {SITE_COLUMNS} FROM sites WHERE id = ?1"),
            params![id],
            site_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_sites(&self, tenant_ids: &[String], offset: i64, limit: i64) -> Result<Vec<Site>> {
        if tenant_ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn();
        let sql = format!(
            "SELECT {SITE_COLUMNS} FROM sites WHERE tenant_id IN ({})
             ORDER BY created_at DESC LIMIT ? OFFSET ?",
            in_placeholders(tenant_ids.len()),
        );
        let mut stmt = conn.prepare(&sql)?;

        let mut bind: Vec<&dyn ToSql> = tenant_ids.iter().map(|t| t as &dyn ToSql).collect();
        bind.push(&limit);
        bind.push(&offset);

        let rows = stmt.query_map(bind.as_slice(), site_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn count_sites(&self, tenant_ids: &[String]) -> Result<i64> {
        if tenant_ids.is_empty() {
            return Ok(0);
        }

        let conn = self.conn();
        let sql = format!(
            "SELECT COUNT(*) FROM sites WHERE tenant_id IN ({})",
            in_placeholders(tenant_ids.len()),
        );
        let mut stmt = conn.prepare(&sql)?;
        let bind: Vec<&dyn ToSql> = tenant_ids.iter().map(|t| t as &dyn ToSql).collect();
        let count: i64 = stmt.query_row(bind.as_slice(), |row| row.get(0))?;
        Ok(count)
    }

    fn update_site_last_run(&self, id: &str, at: &DateTime<Utc>) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE sites SET last_run_at = ?1 WHERE id = ?2",
            params![format_datetime(at), id],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn delete_site(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM sites WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Run operations

    fn create_run(&self, run: &Run) -> Result<()> {
        self.conn().execute(
            "INSERT INTO runs (id, site_id, status, method, pages_scanned, duration_ms, diagnostics, started_at, finished_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                run.id,
                run.site_id,
                run.status.as_str(),
                run.method,
                run.pages_scanned,
                run.duration_ms,
                run.diagnostics.as_ref().map(|d| d.to_string()),
                format_datetime(&run.started_at),
                run.finished_at.as_ref().map(format_datetime),
            ],
        )?;
        Ok(())
    }

    fn get_run(&self, id: &str) -> Result<Option<Run>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = ?1"),
            params![id],
            run_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn finalize_run(
        &self,
        id: &str,
        status: RunStatus,
        pages_scanned: i64,
        duration_ms: i64,
        diagnostics: Option<&Value>,
        finished_at: &DateTime<Utc>,
    ) -> Result<()> {
        // The status guard makes the terminating transition happen at most
        // once even if two finalizers race.
        let rows = self.conn().execute(
            "UPDATE runs SET status = ?1, pages_scanned = ?2, duration_ms = ?3,
                    diagnostics = ?4, finished_at = ?5
             WHERE id = ?6 AND status = 'running'",
            params![
                status.as_str(),
                pages_scanned,
                duration_ms,
                diagnostics.map(|d| d.to_string()),
                format_datetime(finished_at),
                id,
            ],
        )?;

        if rows == 0 {
            return match self.get_run(id)? {
                Some(_) => Err(Error::Conflict("run is already finalized".to_string())),
                None => Err(Error::NotFound),
            };
        }
        Ok(())
    }

    fn list_site_runs(&self, site_id: &str, offset: i64, limit: i64) -> Result<Vec<Run>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RUN_COLUMNS} FROM runs WHERE site_id = ?1
             ORDER BY started_at DESC LIMIT ?2 OFFSET ?3"
        ))?;
        let rows = stmt.query_map(params![site_id, limit, offset], run_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn count_site_runs(&self, site_id: &str) -> Result<i64> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM runs WHERE site_id = ?1",
            params![site_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn list_tenant_runs(&self, tenant_id: &str, limit: i64) -> Result<Vec<Run>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM runs r
             JOIN sites s ON s.id = r.site_id
             WHERE s.tenant_id = ?1
             ORDER BY r.started_at DESC LIMIT ?2",
            RUN_COLUMNS
                .split(", ")
                .map(|c| format!("r.{c}"))
                .collect::<Vec<_>>()
                .join(", "),
        ))?;
        let rows = stmt.query_map(params![tenant_id, limit], run_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // Item operations

    fn insert_item_if_new(&self, item: &Item) -> Result<bool> {
        // Single atomic conditional insert; a (site_id, canonical_url)
        // collision is skipped, never an error.
        let rows = self.conn().execute(
            "INSERT OR IGNORE INTO items (id, site_id, url, canonical_url, title, published_at, discovered_at, source, meta)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                item.id,
                item.site_id,
                item.url,
                item.canonical_url,
                item.title,
                item.published_at.as_ref().map(format_datetime),
                format_datetime(&item.discovered_at),
                item.source,
                item.meta.as_ref().map(|m| m.to_string()),
            ],
        )?;
        Ok(rows > 0)
    }

    fn list_site_items(&self, site_id: &str, cursor: Option<&str>, limit: i64) -> Result<Vec<Item>> {
        let conn = self.conn();

        match cursor {
            Some(cursor_id) => {
                // The cursor is an item id; seek past that item's
                // (discovered_at, id) position.
                let anchor: Option<(String, String)> = conn
                    .query_row(
                        "SELECT discovered_at, id FROM items WHERE id = ?1 AND site_id = ?2",
                        params![cursor_id, site_id],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;

                let (anchor_at, anchor_id) =
                    anchor.ok_or_else(|| Error::BadRequest("invalid cursor".to_string()))?;

                let mut stmt = conn.prepare(&format!(
                    "SELECT {ITEM_COLUMNS} FROM items
                     WHERE site_id = ?1
                       AND (discovered_at < ?2 OR (discovered_at = ?2 AND id < ?3))
                     ORDER BY discovered_at DESC, id DESC LIMIT ?4"
                ))?;
                let rows =
                    stmt.query_map(params![site_id, anchor_at, anchor_id, limit], item_from_row)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(Error::from)
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ITEM_COLUMNS} FROM items WHERE site_id = ?1
                     ORDER BY discovered_at DESC, id DESC LIMIT ?2"
                ))?;
                let rows = stmt.query_map(params![site_id, limit], item_from_row)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(Error::from)
            }
        }
    }

    fn list_tenant_items(&self, tenant_id: &str, limit: i64) -> Result<Vec<Item>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM items i
             JOIN sites s ON s.id = i.site_id
             WHERE s.tenant_id = ?1
             ORDER BY i.discovered_at DESC LIMIT ?2",
            ITEM_COLUMNS
                .split(", ")
                .map(|c| format!("i.{c}"))
                .collect::<Vec<_>>()
                .join(", "),
        ))?;
        let rows = stmt.query_map(params![tenant_id, limit], item_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // Invite operations

    fn create_invite(&self, invite: &Invite) -> Result<()> {
        self.conn().execute(
            "INSERT INTO invites (id, email, tenant_id, role, token_hash, expires_at, accepted_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                invite.id,
                invite.email,
                invite.tenant_id,
                invite.role.as_str(),
                invite.token_hash,
                format_datetime(&invite.expires_at),
                invite.accepted_at.as_ref().map(format_datetime),
                format_datetime(&invite.created_at),
            ],
        )?;
        Ok(())
    }

    fn list_open_invites(&self) -> Result<Vec<Invite>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, email, tenant_id, role, token_hash, expires_at, accepted_at, created_at
             FROM invites WHERE accepted_at IS NULL ORDER BY created_at",
        )?;
        let rows = stmt.query_map([], invite_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn mark_invite_accepted(&self, id: &str, at: &DateTime<Utc>) -> Result<()> {
        // Guard keeps an accepted invite terminal.
        let rows = self.conn().execute(
            "UPDATE invites SET accepted_at = ?1 WHERE id = ?2 AND accepted_at IS NULL",
            params![format_datetime(at), id],
        )?;

        if rows == 0 {
            return Err(Error::Conflict("invite is no longer open".to_string()));
        }
        Ok(())
    }

    // Webhook operations

    fn create_webhook(&self, webhook: &Webhook) -> Result<()> {
        self.conn().execute(
            "INSERT INTO webhooks (id, tenant_id, endpoint_url, secret_hash, active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                webhook.id,
                webhook.tenant_id,
                webhook.endpoint_url,
                webhook.secret_hash,
                webhook.active,
                format_datetime(&webhook.created_at),
            ],
        )?;
        Ok(())
    }

    fn list_webhooks(&self, tenant_ids: &[String]) -> Result<Vec<Webhook>> {
        if tenant_ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn();
        let sql = format!(
            "SELECT id, tenant_id, endpoint_url, secret_hash, active, created_at
             FROM webhooks WHERE tenant_id IN ({}) ORDER BY created_at",
            in_placeholders(tenant_ids.len()),
        );
        let mut stmt = conn.prepare(&sql)?;
        let bind: Vec<&dyn ToSql> = tenant_ids.iter().map(|t| t as &dyn ToSql).collect();

        let rows = stmt.query_map(bind.as_slice(), |row| {
            Ok(Webhook {
                id: row.get(0)?,
                tenant_id: row.get(1)?,
                endpoint_url: row.get(2)?,
                secret_hash: row.get(3)?,
                active: row.get(4)?,
                created_at: parse_datetime(&row.get::<_, String>(5)?),
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // API key operations

    fn create_api_key(&self, key: &ApiKey) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO api_keys (id, tenant_id, name, token_hash, token_lookup, scopes, created_at, last_used_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                key.id,
                key.tenant_id,
                key.name,
                key.token_hash,
                key.token_lookup,
                format_string_list(&key.scopes),
                format_datetime(&key.created_at),
                key.last_used_at.as_ref().map(format_datetime),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(Error::TokenLookupCollision),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn list_api_keys(&self, tenant_ids: &[String]) -> Result<Vec<ApiKey>> {
        if tenant_ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn();
        let sql = format!(
            "SELECT id, tenant_id, name, token_hash, token_lookup, scopes, created_at, last_used_at
             FROM api_keys WHERE tenant_id IN ({}) ORDER BY created_at",
            in_placeholders(tenant_ids.len()),
        );
        let mut stmt = conn.prepare(&sql)?;
        let bind: Vec<&dyn ToSql> = tenant_ids.iter().map(|t| t as &dyn ToSql).collect();

        let rows = stmt.query_map(bind.as_slice(), |row| {
            Ok(ApiKey {
                id: row.get(0)?,
                tenant_id: row.get(1)?,
                name: row.get(2)?,
                token_hash: row.get(3)?,
                token_lookup: row.get(4)?,
                scopes: parse_string_list(&row.get::<_, String>(5)?),
                created_at: parse_datetime(&row.get::<_, String>(6)?),
                last_used_at: row.get::<_, Option<String>>(7)?.map(|s| parse_datetime(&s)),
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // Login token operations

    fn create_login_token(&self, token: &LoginToken) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO login_tokens (id, email, token_hash, token_lookup, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                token.id,
                token.email,
                token.token_hash,
                token.token_lookup,
                format_datetime(&token.expires_at),
                format_datetime(&token.created_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(Error::TokenLookupCollision),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_login_token_by_lookup(&self, lookup: &str) -> Result<Option<LoginToken>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, email, token_hash, token_lookup, expires_at, created_at
             FROM login_tokens WHERE token_lookup = ?1",
            params![lookup],
            |row| {
                Ok(LoginToken {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    token_hash: row.get(2)?,
                    token_lookup: row.get(3)?,
                    expires_at: parse_datetime(&row.get::<_, String>(4)?),
                    created_at: parse_datetime(&row.get::<_, String>(5)?),
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    fn delete_login_token(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM login_tokens WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn prune_expired_login_tokens(&self, now: &DateTime<Utc>) -> Result<usize> {
        let rows = self.conn().execute(
            "DELETE FROM login_tokens WHERE expires_at < ?1",
            params![format_datetime(now)],
        )?;
        Ok(rows)
    }

    // Dashboard aggregates

    fn dashboard_stats(
        &self,
        tenant_id: &str,
        week_ago: &DateTime<Utc>,
        today_start: &DateTime<Utc>,
    ) -> Result<DashboardStats> {
        let conn = self.conn();

        let count = |sql: &str, bind: &[&dyn ToSql]| -> Result<i64> {
            let mut stmt = conn.prepare(sql)?;
            stmt.query_row(bind, |row| row.get(0)).map_err(Error::from)
        };

        let week_ago = format_datetime(week_ago);
        let today_start = format_datetime(today_start);

        Ok(DashboardStats {
            total_sites: count(
                "SELECT COUNT(*) FROM sites WHERE tenant_id = ?",
                &[&tenant_id],
            )?,
            active_sites: count(
                "SELECT COUNT(*) FROM sites WHERE tenant_id = ? AND enabled = 1",
                &[&tenant_id],
            )?,
            total_items: count(
                "SELECT COUNT(*) FROM items i JOIN sites s ON s.id = i.site_id
                 WHERE s.tenant_id = ?",
                &[&tenant_id],
            )?,
            items_this_week: count(
                "SELECT COUNT(*) FROM items i JOIN sites s ON s.id = i.site_id
                 WHERE s.tenant_id = ? AND i.discovered_at >= ?",
                &[&tenant_id, &week_ago],
            )?,
            total_runs: count(
                "SELECT COUNT(*) FROM runs r JOIN sites s ON s.id = r.site_id
                 WHERE s.tenant_id = ?",
                &[&tenant_id],
            )?,
            successful_runs_today: count(
                "SELECT COUNT(*) FROM runs r JOIN sites s ON s.id = r.site_id
                 WHERE s.tenant_id = ? AND r.status = 'success' AND r.started_at >= ?",
                &[&tenant_id, &today_start],
            )?,
            failed_runs_today: count(
                "SELECT COUNT(*) FROM runs r JOIN sites s ON s.id = r.site_id
                 WHERE s.tenant_id = ? AND r.status = 'error' AND r.started_at >= ?",
                &[&tenant_id, &today_start],
            )?,
        })
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn test_store() -> (TempDir, SqliteStore) {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();
        (temp, store)
    }

    fn seed_tenant(store: &SqliteStore, name: &str) -> Tenant {
        let tenant = Tenant {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            plan: "free".to_string(),
            created_at: Utc::now(),
        };
        store.create_tenant(&tenant).unwrap();
        tenant
    }

    fn seed_site(store: &SqliteStore, tenant_id: &str) -> Site {
        let site = Site {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            url: "https://example.com".to_string(),
            profile_key: None,
            keywords: vec!["news".to_string()],
            enabled: true,
            interval_minutes: 60,
            last_run_at: None,
            created_at: Utc::now(),
        };
        store.create_site(&site).unwrap();
        site
    }

    fn new_item(site_id: &str, canonical: &str, discovered_at: DateTime<Utc>) -> Item {
        Item {
            id: Uuid::new_v4().to_string(),
            site_id: site_id.to_string(),
            url: canonical.to_string(),
            canonical_url: canonical.to_string(),
            title: None,
            published_at: None,
            discovered_at,
            source: "html".to_string(),
            meta: None,
        }
    }

    #[test]
    fn test_initialize_creates_tables() {
        let (_temp, store) = test_store();

        let conn = store.conn();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for table in [
            "tenants",
            "users",
            "memberships",
            "sites",
            "runs",
            "items",
            "invites",
            "webhooks",
            "api_keys",
            "login_tokens",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
    }

    #[test]
    fn test_user_email_unique() {
        let (_temp, store) = test_store();

        let user = User {
            id: Uuid::new_v4().to_string(),
            email: "a@example.com".to_string(),
            name: None,
            created_at: Utc::now(),
        };
        store.create_user(&user).unwrap();

        let dup = User {
            id: Uuid::new_v4().to_string(),
            ..user.clone()
        };
        assert!(matches!(
            store.create_user(&dup),
            Err(Error::Conflict(_))
        ));

        let fetched = store.get_user_by_email("a@example.com").unwrap().unwrap();
        assert_eq!(fetched.id, user.id);
    }

    #[test]
    fn test_membership_exactly_once_per_pair() {
        let (_temp, store) = test_store();
        let tenant = seed_tenant(&store, "acme");
        let user = User {
            id: Uuid::new_v4().to_string(),
            email: "m@example.com".to_string(),
            name: None,
            created_at: Utc::now(),
        };
        store.create_user(&user).unwrap();

        let membership = Membership {
            user_id: user.id.clone(),
            tenant_id: tenant.id.clone(),
            role: Role::Member,
        };
        store.create_membership(&membership).unwrap();

        let again = Membership {
            role: Role::Admin,
            ..membership.clone()
        };
        assert!(matches!(
            store.create_membership(&again),
            Err(Error::Conflict(_))
        ));

        // The original role is untouched
        let fetched = store.get_membership(&user.id, &tenant.id).unwrap().unwrap();
        assert_eq!(fetched.role, Role::Member);
    }

    #[test]
    fn test_tenant_delete_cascades() {
        let (_temp, store) = test_store();
        let tenant = seed_tenant(&store, "acme");
        let site = seed_site(&store, &tenant.id);

        let item = new_item(&site.id, "https://example.com/1", Utc::now());
        assert!(store.insert_item_if_new(&item).unwrap());

        assert!(store.delete_tenant(&tenant.id).unwrap());
        assert!(store.get_site(&site.id).unwrap().is_none());
        assert!(store.list_site_items(&site.id, None, 10).unwrap().is_empty());
    }

    #[test]
    fn test_insert_item_if_new_is_idempotent() {
        let (_temp, store) = test_store();
        let tenant = seed_tenant(&store, "acme");
        let site = seed_site(&store, &tenant.id);

        let first = new_item(&site.id, "https://example.com/post", Utc::now());
        assert!(store.insert_item_if_new(&first).unwrap());

        // Same canonical URL, fresh id: skipped, not an error
        let second = new_item(&site.id, "https://example.com/post", Utc::now());
        assert!(!store.insert_item_if_new(&second).unwrap());

        let items = store.list_site_items(&site.id, None, 10).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, first.id);
    }

    #[test]
    fn test_same_canonical_url_in_different_sites() {
        let (_temp, store) = test_store();
        let tenant = seed_tenant(&store, "acme");
        let site_a = seed_site(&store, &tenant.id);
        let site_b = seed_site(&store, &tenant.id);

        let url = "https://example.com/shared";
        assert!(store.insert_item_if_new(&new_item(&site_a.id, url, Utc::now())).unwrap());
        assert!(store.insert_item_if_new(&new_item(&site_b.id, url, Utc::now())).unwrap());
    }

    #[test]
    fn test_item_cursor_pagination() {
        let (_temp, store) = test_store();
        let tenant = seed_tenant(&store, "acme");
        let site = seed_site(&store, &tenant.id);

        let base = Utc::now();
        for i in 0..5 {
            let item = new_item(
                &site.id,
                &format!("https://example.com/{i}"),
                base + Duration::seconds(i),
            );
            store.insert_item_if_new(&item).unwrap();
        }

        let first_page = store.list_site_items(&site.id, None, 2).unwrap();
        assert_eq!(first_page.len(), 2);
        assert_eq!(first_page[0].canonical_url, "https://example.com/4");

        let second_page = store
            .list_site_items(&site.id, Some(&first_page[1].id), 2)
            .unwrap();
        assert_eq!(second_page.len(), 2);
        assert_eq!(second_page[0].canonical_url, "https://example.com/2");

        assert!(matches!(
            store.list_site_items(&site.id, Some("bogus"), 2),
            Err(Error::BadRequest(_))
        ));
    }

    #[test]
    fn test_finalize_run_exactly_once() {
        let (_temp, store) = test_store();
        let tenant = seed_tenant(&store, "acme");
        let site = seed_site(&store, &tenant.id);

        let run = Run {
            id: Uuid::new_v4().to_string(),
            site_id: site.id.clone(),
            status: RunStatus::Running,
            method: "discover".to_string(),
            pages_scanned: 0,
            duration_ms: None,
            diagnostics: None,
            started_at: Utc::now(),
            finished_at: None,
        };
        store.create_run(&run).unwrap();

        store
            .finalize_run(&run.id, RunStatus::Success, 3, 120, None, &Utc::now())
            .unwrap();

        let fetched = store.get_run(&run.id).unwrap().unwrap();
        assert_eq!(fetched.status, RunStatus::Success);
        assert_eq!(fetched.pages_scanned, 3);
        assert!(fetched.finished_at.is_some());

        // Terminal: a second transition is refused
        assert!(matches!(
            store.finalize_run(&run.id, RunStatus::Error, 0, 5, None, &Utc::now()),
            Err(Error::Conflict(_))
        ));

        assert!(matches!(
            store.finalize_run("missing", RunStatus::Success, 0, 0, None, &Utc::now()),
            Err(Error::NotFound)
        ));
    }

    #[test]
    fn test_login_token_lookup_collision() {
        let (_temp, store) = test_store();

        let token = LoginToken {
            id: Uuid::new_v4().to_string(),
            email: "a@example.com".to_string(),
            token_hash: "hash1".to_string(),
            token_lookup: "lookup123".to_string(),
            expires_at: Utc::now() + Duration::minutes(15),
            created_at: Utc::now(),
        };
        store.create_login_token(&token).unwrap();

        let clash = LoginToken {
            id: Uuid::new_v4().to_string(),
            token_hash: "hash2".to_string(),
            ..token.clone()
        };
        assert!(matches!(
            store.create_login_token(&clash),
            Err(Error::TokenLookupCollision)
        ));
    }

    #[test]
    fn test_prune_expired_login_tokens() {
        let (_temp, store) = test_store();
        let now = Utc::now();

        for (i, offset) in [-10i64, 10].iter().enumerate() {
            store
                .create_login_token(&LoginToken {
                    id: format!("lt-{i}"),
                    email: "a@example.com".to_string(),
                    token_hash: "h".to_string(),
                    token_lookup: format!("lookup-{i}"),
                    expires_at: now + Duration::minutes(*offset),
                    created_at: now,
                })
                .unwrap();
        }

        assert_eq!(store.prune_expired_login_tokens(&now).unwrap(), 1);
        assert!(store.get_login_token_by_lookup("lookup-0").unwrap().is_none());
        assert!(store.get_login_token_by_lookup("lookup-1").unwrap().is_some());
    }

    #[test]
    fn test_dashboard_stats() {
        let (_temp, store) = test_store();
        let tenant = seed_tenant(&store, "acme");
        let site = seed_site(&store, &tenant.id);
        let other = seed_tenant(&store, "other");
        let other_site = seed_site(&store, &other.id);

        let now = Utc::now();
        store
            .insert_item_if_new(&new_item(&site.id, "https://example.com/a", now))
            .unwrap();
        store
            .insert_item_if_new(&new_item(&other_site.id, "https://example.com/a", now))
            .unwrap();

        let run = Run {
            id: Uuid::new_v4().to_string(),
            site_id: site.id.clone(),
            status: RunStatus::Running,
            method: "discover".to_string(),
            pages_scanned: 0,
            duration_ms: None,
            diagnostics: None,
            started_at: now,
            finished_at: None,
        };
        store.create_run(&run).unwrap();
        store
            .finalize_run(&run.id, RunStatus::Success, 1, 10, None, &now)
            .unwrap();

        let week_ago = now - Duration::days(7);
        let today_start = now - Duration::hours(1);
        let stats = store
            .dashboard_stats(&tenant.id, &week_ago, &today_start)
            .unwrap();

        assert_eq!(stats.total_sites, 1);
        assert_eq!(stats.active_sites, 1);
        assert_eq!(stats.total_items, 1);
        assert_eq!(stats.items_this_week, 1);
        assert_eq!(stats.total_runs, 1);
        assert_eq!(stats.successful_runs_today, 1);
        assert_eq!(stats.failed_runs_today, 0);
    }
}
