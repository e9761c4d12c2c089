//! libSQL persistence gateway for RegisterScout.
//!
//! The [`Storage`] struct wraps an embedded libSQL database holding officials,
//! confirmed register documents, the audit log, council caches and a
//! full-text index over extracted register text.
//!
//! **Access rules:**
//! - Attribution runs: read-write via [`Storage::open`]; writes are serialised
//!   so concurrent workers may insert for different officials.
//! - Reporting and keyword search: read-only via [`Storage::open_readonly`].

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use serde::Serialize;
use tokio::sync::Mutex;

use registerscout_shared::{
    AuditEntry, IssueKind, Official, OfficialId, RegisterDocument, Result, ScoutError,
};

fn storage_err(e: impl std::fmt::Display) -> ScoutError {
    ScoutError::Storage(e.to_string())
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
    write_lock: Mutex<()>,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ScoutError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
            write_lock: Mutex::new(()),
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database for reading only.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ScoutError::Storage(format!(
                "database not found: {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
            write_lock: Mutex::new(()),
        })
    }

    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        ScoutError::Storage(format!("migration v{} failed: {e}", migration.version))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 before the first migration.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0,
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(ScoutError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Officials
    // -----------------------------------------------------------------------

    /// Insert an official, or return the id of the identical existing row.
    pub async fn insert_official(
        &self,
        name: &str,
        council: &str,
        ward: Option<&str>,
    ) -> Result<OfficialId> {
        self.check_writable()?;
        let ward = ward.map(str::trim).unwrap_or("");
        let _guard = self.write_lock.lock().await;

        self.conn
            .execute(
                "INSERT INTO officials (name, council, ward) VALUES (?1, ?2, ?3)
                 ON CONFLICT(name, council, ward) DO NOTHING",
                params![name, council, ward],
            )
            .await
            .map_err(storage_err)?;

        let mut rows = self
            .conn
            .query(
                "SELECT id FROM officials WHERE name = ?1 AND council = ?2 AND ward = ?3",
                params![name, council, ward],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(OfficialId(row.get::<i64>(0).map_err(storage_err)?)),
            None => Err(ScoutError::Storage(format!(
                "official {name} ({council}) vanished after insert"
            ))),
        }
    }

    /// All officials, ordered by id.
    pub async fn list_officials(&self) -> Result<Vec<Official>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, council, ward FROM officials ORDER BY id",
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut officials = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let ward = row
                .get::<String>(3)
                .ok()
                .filter(|w| !w.trim().is_empty());
            officials.push(Official {
                id: OfficialId(row.get::<i64>(0).map_err(storage_err)?),
                name: row.get::<String>(1).map_err(storage_err)?,
                council: row.get::<String>(2).map_err(storage_err)?,
                ward,
            });
        }
        Ok(officials)
    }

    // -----------------------------------------------------------------------
    // Register documents
    // -----------------------------------------------------------------------

    /// Does this official already have a stored register?
    pub async fn has_register(&self, official_id: OfficialId) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT 1 FROM register_documents WHERE official_id = ?1",
                params![official_id.0],
            )
            .await
            .map_err(storage_err)?;
        Ok(rows.next().await.map_err(storage_err)?.is_some())
    }

    /// Store a register. Returns `false` when the official already had one.
    pub async fn insert_register(&self, doc: &RegisterDocument) -> Result<bool> {
        self.check_writable()?;
        let _guard = self.write_lock.lock().await;

        let inserted = self
            .conn
            .execute(
                "INSERT INTO register_documents
                    (official_id, register_url, content_type, raw_bytes,
                     extracted_text, content_hash, fetched_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(official_id) DO NOTHING",
                params![
                    doc.official_id.0,
                    doc.url.as_str(),
                    doc.content_type.as_str(),
                    doc.raw_bytes.clone(),
                    doc.extracted_text.as_str(),
                    doc.content_hash.as_str(),
                    doc.fetched_at.to_rfc3339()
                ],
            )
            .await
            .map_err(storage_err)?;

        Ok(inserted > 0)
    }

    pub async fn get_register(&self, official_id: OfficialId) -> Result<Option<RegisterDocument>> {
        let mut rows = self
            .conn
            .query(
                "SELECT official_id, register_url, content_type, raw_bytes,
                        extracted_text, content_hash, fetched_at
                 FROM register_documents WHERE official_id = ?1",
                params![official_id.0],
            )
            .await
            .map_err(storage_err)?;

        let Some(row) = rows.next().await.map_err(storage_err)? else {
            return Ok(None);
        };

        let fetched_at: String = row.get(6).map_err(storage_err)?;
        Ok(Some(RegisterDocument {
            official_id: OfficialId(row.get::<i64>(0).map_err(storage_err)?),
            url: row.get::<String>(1).map_err(storage_err)?,
            content_type: row.get::<String>(2).map_err(storage_err)?,
            raw_bytes: row.get::<Vec<u8>>(3).ok(),
            extracted_text: row.get::<String>(4).map_err(storage_err)?,
            content_hash: row.get::<String>(5).map_err(storage_err)?,
            fetched_at: parse_timestamp(&fetched_at)?,
        }))
    }

    pub async fn count_registers(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM register_documents", params![])
            .await
            .map_err(storage_err)?;
        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(storage_err)?.max(0) as u64),
            None => Ok(0),
        }
    }

    // -----------------------------------------------------------------------
    // Audit log
    // -----------------------------------------------------------------------

    pub async fn insert_audit(&self, entry: &AuditEntry) -> Result<()> {
        self.check_writable()?;
        let _guard = self.write_lock.lock().await;
        self.conn
            .execute(
                "INSERT INTO scraping_audit (official_id, issue_kind, detail, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    entry.official_id.map(|id| id.0),
                    entry.kind.as_str(),
                    entry.detail.as_str(),
                    Utc::now().to_rfc3339()
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Audit entries in insertion order, optionally for one official.
    pub async fn list_audit(&self, official_id: Option<OfficialId>) -> Result<Vec<AuditEntry>> {
        let mut rows = match official_id {
            Some(id) => self
                .conn
                .query(
                    "SELECT official_id, issue_kind, detail FROM scraping_audit
                     WHERE official_id = ?1 ORDER BY id",
                    params![id.0],
                )
                .await,
            None => self
                .conn
                .query(
                    "SELECT official_id, issue_kind, detail FROM scraping_audit ORDER BY id",
                    params![],
                )
                .await,
        }
        .map_err(storage_err)?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let kind: String = row.get(1).map_err(storage_err)?;
            entries.push(AuditEntry {
                official_id: row.get::<i64>(0).ok().map(OfficialId),
                kind: kind.parse()?,
                detail: row.get::<String>(2).map_err(storage_err)?,
            });
        }
        Ok(entries)
    }

    /// Number of audit rows per issue kind (kinds with no rows omitted).
    pub async fn audit_counts(&self) -> Result<Vec<(IssueKind, u64)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT issue_kind, COUNT(*) FROM scraping_audit
                 GROUP BY issue_kind ORDER BY issue_kind",
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut counts = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let kind: String = row.get(0).map_err(storage_err)?;
            let count = row.get::<i64>(1).map_err(storage_err)?;
            counts.push((kind.parse()?, count.max(0) as u64));
        }
        Ok(counts)
    }

    // -----------------------------------------------------------------------
    // Council caches
    // -----------------------------------------------------------------------

    pub async fn get_cached_homepage(&self, council: &str) -> Result<Option<String>> {
        self.get_council_url(
            "SELECT homepage_url FROM council_homepages WHERE council = ?1",
            council,
        )
        .await
    }

    /// Upsert a council homepage, recording the discovery time.
    pub async fn cache_homepage(&self, council: &str, homepage_url: &str) -> Result<()> {
        self.upsert_council_url(
            "INSERT INTO council_homepages (council, homepage_url, discovered_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(council) DO UPDATE SET
                homepage_url = excluded.homepage_url,
                discovered_at = excluded.discovered_at",
            council,
            homepage_url,
        )
        .await
    }

    pub async fn get_index_page(&self, council: &str) -> Result<Option<String>> {
        self.get_council_url(
            "SELECT index_url FROM council_index_pages WHERE council = ?1",
            council,
        )
        .await
    }

    /// Upsert a council's councillor-index URL.
    pub async fn cache_index_page(&self, council: &str, index_url: &str) -> Result<()> {
        self.upsert_council_url(
            "INSERT INTO council_index_pages (council, index_url, discovered_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(council) DO UPDATE SET
                index_url = excluded.index_url,
                discovered_at = excluded.discovered_at",
            council,
            index_url,
        )
        .await
    }

    async fn get_council_url(&self, sql: &str, council: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(sql, params![council])
            .await
            .map_err(storage_err)?;
        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row.get::<String>(0).map_err(storage_err)?)),
            None => Ok(None),
        }
    }

    async fn upsert_council_url(&self, sql: &str, council: &str, url: &str) -> Result<()> {
        self.check_writable()?;
        let _guard = self.write_lock.lock().await;
        self.conn
            .execute(sql, params![council, url, Utc::now().to_rfc3339()])
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Keyword search
    // -----------------------------------------------------------------------

    /// Full-text search over stored register text (FTS5 query syntax).
    pub async fn search_registers(&self, term: &str, limit: u32) -> Result<Vec<RegisterHit>> {
        let mut rows = self
            .conn
            .query(
                "SELECT o.id, o.name, o.council, r.register_url,
                        snippet(registers_fts, 0, '[', ']', '...', 12), fts.rank
                 FROM registers_fts fts
                 JOIN register_documents r ON r.id = fts.rowid
                 JOIN officials o ON o.id = r.official_id
                 WHERE registers_fts MATCH ?1
                 ORDER BY fts.rank
                 LIMIT ?2",
                params![term, limit],
            )
            .await
            .map_err(storage_err)?;

        let mut hits = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            hits.push(RegisterHit {
                official_id: OfficialId(row.get::<i64>(0).map_err(storage_err)?),
                name: row.get::<String>(1).map_err(storage_err)?,
                council: row.get::<String>(2).map_err(storage_err)?,
                register_url: row.get::<String>(3).map_err(storage_err)?,
                snippet: row.get::<String>(4).unwrap_or_default(),
                score: row.get::<f64>(5).unwrap_or(0.0),
            });
        }
        Ok(hits)
    }
}

/// A keyword-search hit.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterHit {
    pub official_id: OfficialId,
    pub name: String,
    pub council: String,
    pub register_url: String,
    /// Matching excerpt with the term bracketed.
    pub snippet: String,
    /// FTS5 rank (lower is better).
    pub score: f64,
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ScoutError::Storage(format!("invalid date: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use registerscout_shared::{ContentKind, FetchedContent};
    use std::sync::Arc;
    use uuid::Uuid;

    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("rs_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn html_register(official_id: OfficialId, url: &str, text: &str) -> RegisterDocument {
        let content = FetchedContent {
            url: url.parse().expect("url"),
            content_type: "text/html".into(),
            kind: ContentKind::Html,
            raw_bytes: None,
            text: text.into(),
        };
        RegisterDocument::from_content(official_id, &content)
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 2);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("rs_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 2);
    }

    #[tokio::test]
    async fn officials_are_deduplicated() {
        let storage = test_storage().await;

        let a = storage
            .insert_official("Alex Carter", "Sandshire", Some("Riverside"))
            .await
            .unwrap();
        let again = storage
            .insert_official("Alex Carter", "Sandshire", Some("Riverside"))
            .await
            .unwrap();
        let b = storage
            .insert_official("Jane Smith", "Sandshire", None)
            .await
            .unwrap();
        let b_again = storage
            .insert_official("Jane Smith", "Sandshire", None)
            .await
            .unwrap();

        assert_eq!(a, again);
        assert_eq!(b, b_again);

        let officials = storage.list_officials().await.unwrap();
        assert_eq!(officials.len(), 2);
        assert_eq!(officials[0].id, a);
        assert_eq!(officials[0].ward.as_deref(), Some("Riverside"));
        assert_eq!(officials[1].ward, None);
    }

    #[tokio::test]
    async fn register_written_once_per_official() {
        let storage = test_storage().await;
        let id = storage
            .insert_official("Alex Carter", "Sandshire", Some("Riverside"))
            .await
            .unwrap();

        assert!(!storage.has_register(id).await.unwrap());

        let first = html_register(id, "https://democracy.sandshire.gov.uk/a", "first");
        let second = html_register(id, "https://democracy.sandshire.gov.uk/b", "second");
        assert!(storage.insert_register(&first).await.unwrap());
        assert!(!storage.insert_register(&second).await.unwrap());

        assert!(storage.has_register(id).await.unwrap());
        assert_eq!(storage.count_registers().await.unwrap(), 1);

        let stored = storage.get_register(id).await.unwrap().unwrap();
        assert_eq!(stored.url, "https://democracy.sandshire.gov.uk/a");
        assert_eq!(stored.extracted_text, "first");
        assert_eq!(stored.content_hash, first.content_hash);
        assert!(stored.raw_bytes.is_none());
    }

    #[tokio::test]
    async fn pdf_bytes_roundtrip() {
        let storage = test_storage().await;
        let id = storage
            .insert_official("Jane Smith", "Sandshire", None)
            .await
            .unwrap();

        let content = FetchedContent {
            url: "https://www.sandshire.gov.uk/roi/smith.pdf".parse().unwrap(),
            content_type: "application/pdf".into(),
            kind: ContentKind::Pdf,
            raw_bytes: Some(b"%PDF-1.4 bytes".to_vec()),
            text: String::new(),
        };
        let doc = RegisterDocument::from_content(id, &content);
        storage.insert_register(&doc).await.unwrap();

        let stored = storage.get_register(id).await.unwrap().unwrap();
        assert_eq!(stored.raw_bytes.as_deref(), Some(&b"%PDF-1.4 bytes"[..]));
        assert_eq!(stored.content_type, "application/pdf");
    }

    #[tokio::test]
    async fn audit_log_and_counts() {
        let storage = test_storage().await;
        let id = storage
            .insert_official("Alex Carter", "Sandshire", None)
            .await
            .unwrap();

        storage
            .insert_audit(&AuditEntry::new(Some(id), IssueKind::RegisterFetchError, "HTTP 500"))
            .await
            .unwrap();
        storage
            .insert_audit(&AuditEntry::new(Some(id), IssueKind::MissingRegisterUrl, "none"))
            .await
            .unwrap();
        storage
            .insert_audit(&AuditEntry::new(None, IssueKind::RegisterFetchError, "HTTP 404"))
            .await
            .unwrap();

        let mine = storage.list_audit(Some(id)).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].kind, IssueKind::RegisterFetchError);
        assert_eq!(storage.list_audit(None).await.unwrap().len(), 3);

        let counts = storage.audit_counts().await.unwrap();
        assert_eq!(
            counts,
            vec![
                (IssueKind::MissingRegisterUrl, 1),
                (IssueKind::RegisterFetchError, 2)
            ]
        );
    }

    #[tokio::test]
    async fn council_caches_upsert() {
        let storage = test_storage().await;

        assert!(storage.get_cached_homepage("Sandshire").await.unwrap().is_none());
        storage
            .cache_homepage("Sandshire", "https://old.sandshire.gov.uk/")
            .await
            .unwrap();
        storage
            .cache_homepage("Sandshire", "https://www.sandshire.gov.uk/")
            .await
            .unwrap();
        assert_eq!(
            storage.get_cached_homepage("Sandshire").await.unwrap().as_deref(),
            Some("https://www.sandshire.gov.uk/")
        );

        storage
            .cache_index_page("Sandshire", "https://democracy.sandshire.gov.uk/mgMemberIndex.aspx")
            .await
            .unwrap();
        assert!(storage.get_index_page("Sandshire").await.unwrap().is_some());
        assert!(storage.get_index_page("Othershire").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fts_search_registers() {
        let storage = test_storage().await;
        let id = storage
            .insert_official("Alex Carter", "Sandshire", Some("Riverside"))
            .await
            .unwrap();
        let doc = html_register(
            id,
            "https://democracy.sandshire.gov.uk/mgRofI.aspx?UID=7",
            "Register of Interests Alex Carter Employment: Riverside Boatyard Ltd",
        );
        storage.insert_register(&doc).await.unwrap();

        let hits = storage.search_registers("boatyard", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].official_id, id);
        assert_eq!(hits[0].council, "Sandshire");
        assert!(hits[0].snippet.contains("[Boatyard]"));

        assert!(storage.search_registers("allotment", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("rs_test_{}.db", Uuid::now_v7()));
        drop(Storage::open(&tmp).await.unwrap());

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        assert!(ro.insert_official("A B", "C", None).await.is_err());
        assert!(ro.list_officials().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_inserts_for_different_officials() {
        let storage = Arc::new(test_storage().await);
        let mut ids = Vec::new();
        for i in 0..8 {
            ids.push(
                storage
                    .insert_official(&format!("Member {i} Test"), "Sandshire", None)
                    .await
                    .unwrap(),
            );
        }

        let mut handles = Vec::new();
        for id in ids {
            let storage = storage.clone();
            handles.push(tokio::spawn(async move {
                let doc = html_register(id, "https://www.sandshire.gov.uk/roi", "text");
                storage.insert_register(&doc).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().unwrap());
        }
        assert_eq!(storage.count_registers().await.unwrap(), 8);
    }
}
