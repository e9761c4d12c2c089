//! Core domain types for RegisterScout runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

// ---------------------------------------------------------------------------
// Official
// ---------------------------------------------------------------------------

/// Database identifier of an elected official (councillor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OfficialId(pub i64);

impl std::fmt::Display for OfficialId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for OfficialId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

/// An elected council member. Read-only for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Official {
    pub id: OfficialId,
    /// Full display name, e.g. "Alex Carter".
    pub name: String,
    /// Council name as published, e.g. "Sandshire".
    pub council: String,
    /// Electoral ward, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ward: Option<String>,
}

// ---------------------------------------------------------------------------
// CandidateUrl
// ---------------------------------------------------------------------------

/// Where a candidate link was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoverySource {
    /// Councillor index page → profile page.
    IndexPage,
    /// Breadth-first crawl of the council website.
    Crawl,
    /// Web-search result (or a page harvested from one).
    Search,
}

impl DiscoverySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IndexPage => "index_page",
            Self::Crawl => "crawl",
            Self::Search => "search",
        }
    }
}

/// A URL suspected, but not yet confirmed, to host a register of interests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateUrl {
    /// Absolute URL (fragment stripped).
    pub url: Url,
    /// Hops from the discovery root.
    pub depth: u32,
    pub source: DiscoverySource,
    /// Link text of the anchor that pointed here, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_text: Option<String>,
    /// True when the anchor text or href already matched a register pattern
    /// (as opposed to a bare PDF link).
    #[serde(default)]
    pub register_hint: bool,
}

impl CandidateUrl {
    pub fn new(url: Url, depth: u32, source: DiscoverySource) -> Self {
        Self {
            url,
            depth,
            source,
            anchor_text: None,
            register_hint: false,
        }
    }

    pub fn with_anchor(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        if !text.trim().is_empty() {
            self.anchor_text = Some(text);
        }
        self
    }

    pub fn with_register_hint(mut self, hint: bool) -> Self {
        self.register_hint = hint;
        self
    }
}

// ---------------------------------------------------------------------------
// FetchedContent
// ---------------------------------------------------------------------------

/// Document kind, derived from the content-type header or URL suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Html,
    Pdf,
    Other,
}

/// A fetched and extracted URL. Cached per URL for the lifetime of a run.
#[derive(Debug, Clone)]
pub struct FetchedContent {
    /// The URL as requested (the cache key).
    pub url: Url,
    /// Lower-cased content-type (inferred when the header was absent).
    pub content_type: String,
    pub kind: ContentKind,
    /// Raw body, retained only for PDF content.
    pub raw_bytes: Option<Vec<u8>>,
    /// Normalized plain text; empty when extraction failed.
    pub text: String,
}

impl FetchedContent {
    pub fn is_html(&self) -> bool {
        self.kind == ContentKind::Html
    }

    pub fn is_pdf(&self) -> bool {
        self.kind == ContentKind::Pdf
    }
}

// ---------------------------------------------------------------------------
// RegisterDocument
// ---------------------------------------------------------------------------

/// A confirmed register of interests for one official. Persisted once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterDocument {
    pub official_id: OfficialId,
    pub url: String,
    pub content_type: String,
    #[serde(default, skip_serializing)]
    pub raw_bytes: Option<Vec<u8>>,
    pub extracted_text: String,
    /// SHA-256 of `extracted_text`.
    pub content_hash: String,
    pub fetched_at: DateTime<Utc>,
}

impl RegisterDocument {
    /// Build the persisted record from cached content.
    pub fn from_content(official_id: OfficialId, content: &FetchedContent) -> Self {
        Self {
            official_id,
            url: content.url.to_string(),
            content_type: content.content_type.clone(),
            raw_bytes: content.raw_bytes.clone(),
            extracted_text: content.text.clone(),
            content_hash: content_hash(&content.text),
            fetched_at: Utc::now(),
        }
    }
}

/// Compute the SHA-256 hex digest of some text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

/// Kind of non-fatal problem recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    SearchError,
    RegisterFetchError,
    MissingRegisterUrl,
    ProfileFetchError,
}

impl IssueKind {
    pub const ALL: [IssueKind; 4] = [
        Self::SearchError,
        Self::RegisterFetchError,
        Self::MissingRegisterUrl,
        Self::ProfileFetchError,
    ];

    /// Persisted string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SearchError => "search_error",
            Self::RegisterFetchError => "register_fetch_error",
            Self::MissingRegisterUrl => "missing_register_url",
            Self::ProfileFetchError => "profile_fetch_error",
        }
    }
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IssueKind {
    type Err = crate::ScoutError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| crate::ScoutError::validation(format!("unknown issue kind: {s}")))
    }
}

/// One append-only audit log row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub official_id: Option<OfficialId>,
    pub kind: IssueKind,
    pub detail: String,
}

impl AuditEntry {
    pub fn new(official_id: Option<OfficialId>, kind: IssueKind, detail: impl Into<String>) -> Self {
        Self {
            official_id,
            kind,
            detail: detail.into(),
        }
    }
}
