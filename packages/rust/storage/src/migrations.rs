//! SQL migration definitions for the RegisterScout database.
//!
//! Migrations are applied in order on database open.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: officials, register_documents, scraping_audit, council caches",
            sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Elected officials. An empty ward means "unknown" so the UNIQUE key holds.
CREATE TABLE IF NOT EXISTS officials (
    id      INTEGER PRIMARY KEY AUTOINCREMENT,
    name    TEXT NOT NULL,
    council TEXT NOT NULL,
    ward    TEXT NOT NULL DEFAULT '',
    UNIQUE(name, council, ward)
);

CREATE INDEX IF NOT EXISTS idx_officials_council ON officials(council);

-- One confirmed register per official.
CREATE TABLE IF NOT EXISTS register_documents (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    official_id    INTEGER NOT NULL UNIQUE REFERENCES officials(id) ON DELETE CASCADE,
    register_url   TEXT NOT NULL,
    content_type   TEXT NOT NULL,
    raw_bytes      BLOB,
    extracted_text TEXT NOT NULL,
    content_hash   TEXT NOT NULL,
    fetched_at     TEXT NOT NULL
);

-- Append-only log of non-fatal problems.
CREATE TABLE IF NOT EXISTS scraping_audit (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    official_id INTEGER REFERENCES officials(id) ON DELETE SET NULL,
    issue_kind  TEXT NOT NULL,
    detail      TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_audit_official ON scraping_audit(official_id);
CREATE INDEX IF NOT EXISTS idx_audit_kind ON scraping_audit(issue_kind);

CREATE TABLE IF NOT EXISTS council_homepages (
    council       TEXT PRIMARY KEY,
    homepage_url  TEXT NOT NULL,
    discovered_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS council_index_pages (
    council       TEXT PRIMARY KEY,
    index_url     TEXT NOT NULL,
    discovered_at TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Full-text search over extracted register text",
            sql: r#"
CREATE VIRTUAL TABLE IF NOT EXISTS registers_fts USING fts5(
    extracted_text,
    content=register_documents,
    content_rowid=id
);

CREATE TRIGGER IF NOT EXISTS registers_fts_insert AFTER INSERT ON register_documents BEGIN
    INSERT INTO registers_fts(rowid, extracted_text)
    VALUES (new.id, new.extracted_text);
END;

CREATE TRIGGER IF NOT EXISTS registers_fts_delete AFTER DELETE ON register_documents BEGIN
    INSERT INTO registers_fts(registers_fts, rowid, extracted_text)
    VALUES ('delete', old.id, old.extracted_text);
END;

CREATE TRIGGER IF NOT EXISTS registers_fts_update AFTER UPDATE ON register_documents BEGIN
    INSERT INTO registers_fts(registers_fts, rowid, extracted_text)
    VALUES ('delete', old.id, old.extracted_text);
    INSERT INTO registers_fts(rowid, extracted_text)
    VALUES (new.id, new.extracted_text);
END;

INSERT INTO registers_fts(registers_fts) VALUES ('rebuild');

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
