//! Application configuration for RegisterScout.
//!
//! User config lives at `~/.registerscout/registerscout.toml`.
//! CLI flags override config file values, which override defaults.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScoutError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "registerscout.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".registerscout";

// ---------------------------------------------------------------------------
// Config structs (matching registerscout.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Site crawler budgets and seeds.
    #[serde(default)]
    pub crawl: CrawlSection,

    /// Web-search provider settings.
    #[serde(default)]
    pub search: SearchSection,

    /// Councillor index discovery.
    #[serde(default)]
    pub index: IndexSection,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Path to the libSQL database file.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Worker pool width.
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Fixed delay before each request, per worker.
    #[serde(default)]
    pub request_delay_ms: u64,

    /// Per-request timeout.
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,

    /// Where end-of-run CSV reports are written.
    #[serde(default = "default_reports_dir")]
    pub reports_dir: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            workers: default_workers(),
            request_delay_ms: 0,
            request_timeout_secs: default_timeout(),
            reports_dir: default_reports_dir(),
        }
    }
}

fn default_db_path() -> String {
    "var/registerscout.db".into()
}
fn default_workers() -> u32 {
    4
}
fn default_timeout() -> u64 {
    30
}
fn default_reports_dir() -> String {
    "var/reports".into()
}

/// `[crawl]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlSection {
    /// Page budget of the first crawl pass.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Depth budget of the first crawl pass.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Internal links enqueued unconditionally from each seed page.
    #[serde(default = "default_broad_first_hop")]
    pub broad_first_hop: usize,

    /// Paths joined to the homepage origin and crawled alongside it.
    #[serde(default = "default_seed_paths")]
    pub seed_paths: Vec<String>,

    /// Permit requests to loopback/private addresses.
    #[serde(default)]
    pub allow_private_hosts: bool,
}

impl Default for CrawlSection {
    fn default() -> Self {
        Self {
            max_pages: default_max_pages(),
            max_depth: default_max_depth(),
            broad_first_hop: default_broad_first_hop(),
            seed_paths: default_seed_paths(),
            allow_private_hosts: false,
        }
    }
}

fn default_max_pages() -> usize {
    80
}
fn default_max_depth() -> u32 {
    3
}
fn default_broad_first_hop() -> usize {
    20
}
fn default_seed_paths() -> Vec<String> {
    [
        "/democracy",
        "/committees",
        "/a-z",
        "/councillors",
        "/council-and-democracy",
        "/your-council",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSection {
    /// Name of the env var holding the search API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Results requested per query.
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// How many link hops to follow from a search result page.
    #[serde(default = "default_harvest_depth")]
    pub harvest_depth: u32,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            max_results: default_max_results(),
            harvest_depth: default_harvest_depth(),
        }
    }
}

fn default_api_key_env() -> String {
    "SERPER_API_KEY".into()
}
fn default_max_results() -> usize {
    10
}
fn default_harvest_depth() -> u32 {
    1
}

/// `[index]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSection {
    /// Councillor-index URL templates; `{slug}` is replaced by the council slug.
    #[serde(default = "default_index_templates")]
    pub url_templates: Vec<String>,
}

impl Default for IndexSection {
    fn default() -> Self {
        Self {
            url_templates: default_index_templates(),
        }
    }
}

fn default_index_templates() -> Vec<String> {
    vec![
        "https://democracy.{slug}.gov.uk/mgMemberIndex.aspx?bcr=1".into(),
        "https://{slug}.moderngov.co.uk/mgMemberIndex.aspx?bcr=1".into(),
    ]
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// HTTP transport settings.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    /// Sleep before each request issued by the calling task.
    pub request_delay_ms: u64,
    pub allow_private_hosts: bool,
    /// Pin hostnames to fixed addresses (like `curl --resolve`).
    pub host_overrides: Vec<(String, SocketAddr)>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            timeout_secs: config.defaults.request_timeout_secs,
            request_delay_ms: config.defaults.request_delay_ms,
            allow_private_hosts: config.crawl.allow_private_hosts,
            host_overrides: Vec::new(),
        }
    }
}

/// One row of the crawl escalation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlBudget {
    pub max_pages: usize,
    pub max_depth: u32,
}

/// Site crawler settings.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub max_pages: usize,
    pub max_depth: u32,
    pub broad_first_hop: usize,
    pub seed_paths: Vec<String>,
}

impl CrawlConfig {
    /// Budgets tried in order; the crawl stops at the first pass with findings.
    pub fn budgets(&self) -> Vec<CrawlBudget> {
        vec![
            CrawlBudget {
                max_pages: self.max_pages,
                max_depth: self.max_depth,
            },
            CrawlBudget {
                max_pages: self.max_pages * 2,
                max_depth: self.max_depth + 1,
            },
        ]
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for CrawlConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_pages: config.crawl.max_pages,
            max_depth: config.crawl.max_depth,
            broad_first_hop: config.crawl.broad_first_hop,
            seed_paths: config.crawl.seed_paths.clone(),
        }
    }
}

/// Web-search settings.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub api_key_env: String,
    pub max_results: usize,
    pub harvest_depth: u32,
}

impl SearchConfig {
    /// Read the API key from the configured env var, if set and non-empty.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for SearchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            api_key_env: config.search.api_key_env.clone(),
            max_results: config.search.max_results,
            harvest_depth: config.search.harvest_depth,
        }
    }
}

/// Per-official attribution settings.
#[derive(Debug, Clone)]
pub struct AttributionConfig {
    pub index_url_templates: Vec<String>,
    /// Name-matching sub-links inspected in the extra hop.
    pub max_name_links: usize,
    /// PDF links inspected in the extra hop.
    pub max_pdf_links: usize,
    pub search_max_results: usize,
    pub search_harvest_depth: u32,
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for AttributionConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            index_url_templates: config.index.url_templates.clone(),
            max_name_links: 5,
            max_pdf_links: 10,
            search_max_results: config.search.max_results,
            search_harvest_depth: config.search.harvest_depth,
        }
    }
}

/// Worker pool settings.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub workers: usize,
    /// `None` disables the CSV side-channel reports.
    pub reports_dir: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for RunConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            workers: config.defaults.workers.max(1) as usize,
            reports_dir: Some(PathBuf::from(&config.defaults.reports_dir)),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.registerscout/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| ScoutError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.registerscout/registerscout.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ScoutError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| ScoutError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ScoutError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ScoutError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ScoutError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("db_path"));
        assert!(toml_str.contains("SERPER_API_KEY"));
        assert!(toml_str.contains("mgMemberIndex.aspx"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.crawl.max_depth, 3);
        assert_eq!(parsed.defaults.workers, 4);
        assert_eq!(parsed.search.api_key_env, "SERPER_API_KEY");
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let toml_str = r#"
[defaults]
workers = 8

[crawl]
max_pages = 10
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.workers, 8);
        assert_eq!(config.defaults.request_timeout_secs, 30);
        assert_eq!(config.crawl.max_pages, 10);
        assert_eq!(config.crawl.broad_first_hop, 20);
        assert!(config.crawl.seed_paths.contains(&"/democracy".to_string()));
    }

    #[test]
    fn crawl_budgets_escalate_once() {
        let crawl = CrawlConfig::from(&AppConfig::default());
        let budgets = crawl.budgets();
        assert_eq!(budgets.len(), 2);
        assert_eq!(budgets[0], CrawlBudget { max_pages: 80, max_depth: 3 });
        assert_eq!(budgets[1], CrawlBudget { max_pages: 160, max_depth: 4 });
    }

    #[test]
    fn run_config_never_zero_workers() {
        let mut app = AppConfig::default();
        app.defaults.workers = 0;
        assert_eq!(RunConfig::from(&app).workers, 1);
    }

    #[test]
    fn missing_api_key_is_none() {
        let search = SearchConfig {
            // Use a unique env var name to avoid interfering with other tests
            api_key_env: "RS_TEST_NONEXISTENT_KEY_12345".into(),
            max_results: 10,
            harvest_depth: 1,
        };
        assert!(search.api_key().is_none());
    }
}
