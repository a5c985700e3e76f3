//! SQL schema for the route store.
//!
//! Executed once at connection startup. `PRAGMA user_version` records the
//! schema revision for later migrations.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- Live and history routes share one table so a slug is unique across both.
CREATE TABLE IF NOT EXISTS routes (
    route_id      TEXT PRIMARY KEY,
    resource_key  TEXT NOT NULL,
    resource_id   TEXT NOT NULL,
    locale        TEXT NOT NULL,
    site          TEXT NOT NULL DEFAULT '',   -- '' when the route has no site
    slug          TEXT NOT NULL,
    depth         INTEGER NOT NULL,
    history       INTEGER NOT NULL DEFAULT 0,
    parent_id     TEXT,
    target_id     TEXT,                       -- set on history rows only
    created_at    TEXT NOT NULL,
    changed_at    TEXT NOT NULL,
    CHECK (history IN (0, 1)),
    CHECK (history = 0 OR target_id IS NOT NULL)
);

CREATE UNIQUE INDEX IF NOT EXISTS routes_slug_idx
    ON routes(locale, site, slug);

-- At most one live route per resource and scope.
CREATE UNIQUE INDEX IF NOT EXISTS routes_live_owner_idx
    ON routes(resource_key, resource_id, locale, site) WHERE history = 0;

-- Keyset scans over a subtree, parents first.
CREATE INDEX IF NOT EXISTS routes_depth_idx
    ON routes(locale, site, history, depth, slug);

CREATE INDEX IF NOT EXISTS routes_parent_idx   ON routes(parent_id);
CREATE INDEX IF NOT EXISTS routes_target_idx   ON routes(target_id);
CREATE INDEX IF NOT EXISTS routes_resource_idx ON routes(resource_key, resource_id);

PRAGMA user_version = 1;
";
