pub const SCHEMA: &str = r#"
-- Tenants are the unit of resource ownership
CREATE TABLE IF NOT EXISTS tenants (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    plan TEXT NOT NULL DEFAULT 'free',
    created_at TEXT DEFAULT (datetime('now'))
);

-- One identity per email, shared across tenants via memberships
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    name TEXT,
    created_at TEXT DEFAULT (datetime('now'))
);

-- Exactly one role per (user, tenant) pair
CREATE TABLE IF NOT EXISTS memberships (
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    role TEXT NOT NULL,  -- 'super_admin', 'admin', 'member'
    PRIMARY KEY (user_id, tenant_id)
);

-- Sites to watch for new posts
CREATE TABLE IF NOT EXISTS sites (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    url TEXT NOT NULL,
    profile_key TEXT,           -- NULL = generic discovery
    keywords TEXT NOT NULL DEFAULT '[]',  -- JSON array
    enabled INTEGER NOT NULL DEFAULT 1,
    interval_minutes INTEGER NOT NULL DEFAULT 60,
    last_run_at TEXT,
    created_at TEXT DEFAULT (datetime('now'))
);

-- Discovery runs: created 'running', finalized exactly once
CREATE TABLE IF NOT EXISTS runs (
    id TEXT PRIMARY KEY,
    site_id TEXT NOT NULL REFERENCES sites(id) ON DELETE CASCADE,
    status TEXT NOT NULL,       -- 'running', 'success', 'error'
    method TEXT NOT NULL,       -- 'profile' or 'discover'
    pages_scanned INTEGER NOT NULL DEFAULT 0,
    duration_ms INTEGER,
    diagnostics TEXT,           -- JSON
    started_at TEXT NOT NULL,
    finished_at TEXT
);

-- Discovered items, deduplicated per site by canonical URL
CREATE TABLE IF NOT EXISTS items (
    id TEXT PRIMARY KEY,
    site_id TEXT NOT NULL REFERENCES sites(id) ON DELETE CASCADE,
    url TEXT NOT NULL,
    canonical_url TEXT NOT NULL,
    title TEXT,
    published_at TEXT,
    discovered_at TEXT NOT NULL,
    source TEXT NOT NULL,       -- 'feed', 'html', 'sitemap'
    meta TEXT,                  -- JSON

    UNIQUE(site_id, canonical_url)
);

-- Single-use invitations; tokens are one-way hashed
CREATE TABLE IF NOT EXISTS invites (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL,
    tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    role TEXT NOT NULL,
    token_hash TEXT NOT NULL,   -- argon2id hash with embedded salt
    expires_at TEXT NOT NULL,
    accepted_at TEXT,           -- non-NULL = terminal
    created_at TEXT DEFAULT (datetime('now'))
);

-- Webhook configuration; the raw secret is never stored
CREATE TABLE IF NOT EXISTS webhooks (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    endpoint_url TEXT NOT NULL,
    secret_hash TEXT,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT DEFAULT (datetime('now'))
);

-- API keys: prefixed secret shown once, stored hash + lookup only
CREATE TABLE IF NOT EXISTS api_keys (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    name TEXT,
    token_hash TEXT NOT NULL,
    token_lookup TEXT NOT NULL,
    scopes TEXT NOT NULL DEFAULT '[]',  -- JSON array
    created_at TEXT DEFAULT (datetime('now')),
    last_used_at TEXT
);

-- Pending magic-link logins, keyed by token lookup, pruned by expiry
CREATE TABLE IF NOT EXISTS login_tokens (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL,
    token_hash TEXT NOT NULL,
    token_lookup TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now'))
);

-- Create indexes
CREATE INDEX IF NOT EXISTS idx_memberships_tenant ON memberships(tenant_id);
CREATE INDEX IF NOT EXISTS idx_sites_tenant ON sites(tenant_id);
CREATE INDEX IF NOT EXISTS idx_runs_site ON runs(site_id, started_at);
CREATE INDEX IF NOT EXISTS idx_items_site_discovered ON items(site_id, discovered_at);
CREATE INDEX IF NOT EXISTS idx_invites_tenant ON invites(tenant_id);
CREATE INDEX IF NOT EXISTS idx_webhooks_tenant ON webhooks(tenant_id);
CREATE INDEX IF NOT EXISTS idx_api_keys_tenant ON api_keys(tenant_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_api_keys_lookup ON api_keys(token_lookup);
CREATE UNIQUE INDEX IF NOT EXISTS idx_login_tokens_lookup ON login_tokens(token_lookup);
"#;
