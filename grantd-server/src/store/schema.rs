//! SQLite schema, applied idempotently at connection setup.

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS developers (
    id           TEXT PRIMARY KEY,
    api_key_hash TEXT NOT NULL UNIQUE,
    name         TEXT,
    created_at   INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS agents (
    id           TEXT PRIMARY KEY,
    did          TEXT NOT NULL,
    developer_id TEXT NOT NULL REFERENCES developers(id),
    name         TEXT NOT NULL,
    description  TEXT,
    scopes       TEXT NOT NULL DEFAULT '[]',
    status       TEXT NOT NULL DEFAULT 'active',
    created_at   INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS agents_developer ON agents(developer_id);

CREATE TABLE IF NOT EXISTS auth_requests (
    id             TEXT PRIMARY KEY,
    agent_id       TEXT NOT NULL REFERENCES agents(id),
    principal_id   TEXT NOT NULL,
    developer_id   TEXT NOT NULL REFERENCES developers(id),
    scopes         TEXT NOT NULL DEFAULT '[]',
    redirect_uri   TEXT,
    state          TEXT,
    code_challenge TEXT,
    audience       TEXT,
    expires_in     TEXT NOT NULL DEFAULT '24h',
    status         TEXT NOT NULL DEFAULT 'pending',
    code           TEXT,
    created_at     INTEGER NOT NULL,
    expires_at     INTEGER NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS auth_requests_code
    ON auth_requests(code) WHERE code IS NOT NULL;

CREATE TABLE IF NOT EXISTS grants (
    id               TEXT PRIMARY KEY,
    agent_id         TEXT NOT NULL REFERENCES agents(id),
    principal_id     TEXT NOT NULL,
    developer_id     TEXT NOT NULL REFERENCES developers(id),
    scopes           TEXT NOT NULL DEFAULT '[]',
    status           TEXT NOT NULL DEFAULT 'active',
    parent_grant_id  TEXT REFERENCES grants(id),
    delegation_depth INTEGER NOT NULL DEFAULT 0,
    issued_at        INTEGER NOT NULL,
    expires_at       INTEGER NOT NULL,
    revoked_at       INTEGER
);

CREATE INDEX IF NOT EXISTS grants_parent ON grants(parent_grant_id);
CREATE INDEX IF NOT EXISTS grants_developer ON grants(developer_id);

CREATE TABLE IF NOT EXISTS grant_tokens (
    jti        TEXT PRIMARY KEY,
    grant_id   TEXT NOT NULL REFERENCES grants(id),
    is_revoked INTEGER NOT NULL DEFAULT 0,
    issued_at  INTEGER NOT NULL,
    expires_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS grant_tokens_grant ON grant_tokens(grant_id);

CREATE TABLE IF NOT EXISTS refresh_tokens (
    id         TEXT PRIMARY KEY,
    grant_id   TEXT NOT NULL REFERENCES grants(id),
    is_used    INTEGER NOT NULL DEFAULT 0,
    expires_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS policies (
    id                TEXT PRIMARY KEY,
    developer_id      TEXT NOT NULL REFERENCES developers(id),
    name              TEXT,
    effect            TEXT NOT NULL,
    priority          INTEGER NOT NULL DEFAULT 0,
    agent_id          TEXT,
    principal_id      TEXT,
    scopes            TEXT,
    time_of_day_start TEXT,
    time_of_day_end   TEXT,
    created_at        INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS policies_developer ON policies(developer_id);

CREATE TABLE IF NOT EXISTS audit_entries (
    id           TEXT PRIMARY KEY,
    agent_id     TEXT NOT NULL,
    agent_did    TEXT NOT NULL,
    grant_id     TEXT NOT NULL,
    principal_id TEXT NOT NULL,
    developer_id TEXT NOT NULL REFERENCES developers(id),
    action       TEXT NOT NULL,
    status       TEXT NOT NULL DEFAULT 'success',
    metadata     TEXT NOT NULL DEFAULT '{}',
    hash         TEXT NOT NULL,
    prev_hash    TEXT,
    timestamp    TEXT NOT NULL
);

-- One unbranched chain per developer: the tail's hash may be used as a
-- prev_hash exactly once. COALESCE makes the genesis entry (NULL prev_hash)
-- subject to the constraint too.
CREATE UNIQUE INDEX IF NOT EXISTS audit_entries_chain
    ON audit_entries(developer_id, COALESCE(prev_hash, ''));

CREATE TABLE IF NOT EXISTS webhooks (
    id           TEXT PRIMARY KEY,
    developer_id TEXT NOT NULL REFERENCES developers(id),
    url          TEXT NOT NULL,
    secret       TEXT NOT NULL,
    events       TEXT NOT NULL DEFAULT '[]',
    created_at   INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS webhook_deliveries (
    id            TEXT PRIMARY KEY,
    webhook_id    TEXT NOT NULL REFERENCES webhooks(id),
    developer_id  TEXT NOT NULL REFERENCES developers(id),
    event_id      TEXT NOT NULL,
    event_type    TEXT NOT NULL,
    payload       TEXT NOT NULL,
    signature     TEXT NOT NULL,
    url           TEXT NOT NULL,
    status        TEXT NOT NULL DEFAULT 'pending',
    attempts      INTEGER NOT NULL DEFAULT 0,
    max_attempts  INTEGER NOT NULL DEFAULT 5,
    last_error    TEXT,
    next_retry_at INTEGER NOT NULL,
    delivered_at  INTEGER
);

CREATE INDEX IF NOT EXISTS webhook_deliveries_due
    ON webhook_deliveries(status, next_retry_at);
"#;
