//! Schema statement sets, written in the portable subset of SQL that both
//! supported engines execute unchanged. Identifiers are TEXT (UUIDs in
//! hyphenated form, timestamps in RFC 3339), which keeps ordering and
//! comparisons engine-independent.

/// Shared catalog database: cross-tenant records only.
pub const CATALOG_SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS organizations (
    id                  TEXT PRIMARY KEY,
    name                TEXT NOT NULL,
    kind                TEXT NOT NULL,
    address             TEXT NOT NULL,
    contact_email       TEXT NOT NULL,
    is_active           BOOLEAN NOT NULL,
    db_name             TEXT NOT NULL UNIQUE,
    provisioning_status TEXT NOT NULL,
    created_at          TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS users (
    id              TEXT PRIMARY KEY,
    email           TEXT NOT NULL UNIQUE,
    hashed_password TEXT NOT NULL,
    full_name       TEXT,
    is_active       BOOLEAN NOT NULL,
    is_superuser    BOOLEAN NOT NULL,
    organization_id TEXT
);
";

/// Per-tenant database: a full independent copy, seeded with a mirror of the
/// organization's catalog record so the tenant database is self-describing.
pub const TENANT_SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS organizations (
    id            TEXT PRIMARY KEY,
    name          TEXT NOT NULL,
    kind          TEXT NOT NULL,
    address       TEXT NOT NULL,
    contact_email TEXT NOT NULL,
    is_active     BOOLEAN NOT NULL,
    db_name       TEXT NOT NULL,
    created_at    TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS users (
    id              TEXT PRIMARY KEY,
    email           TEXT NOT NULL UNIQUE,
    hashed_password TEXT NOT NULL,
    full_name       TEXT,
    is_active       BOOLEAN NOT NULL,
    is_superuser    BOOLEAN NOT NULL
);
CREATE TABLE IF NOT EXISTS units (
    id         TEXT PRIMARY KEY,
    name       TEXT NOT NULL,
    floor      TEXT,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS access_points (
    id         TEXT PRIMARY KEY,
    unit_id    TEXT,
    name       TEXT NOT NULL,
    kind       TEXT NOT NULL,
    is_active  BOOLEAN NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS audit_logs (
    id         TEXT PRIMARY KEY,
    level      TEXT NOT NULL,
    message    TEXT NOT NULL,
    actor      TEXT,
    created_at TEXT NOT NULL
);
";
