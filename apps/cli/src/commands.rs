//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};
use url::Url;

use registerscout_classify::{
    is_pdf_link, looks_like_register, looks_like_register_text, name_matches,
};
use registerscout_core::{Attributor, Coordinator, Outcome, ProgressReporter, RunSummary};
use registerscout_crawler::{Fetcher, SiteCrawler};
use registerscout_discovery::{HomepageResolver, NoopSearcher, SerperSearcher, WebSearcher};
use registerscout_shared::{
    AppConfig, AttributionConfig, CrawlConfig, FetchConfig, Official, RunConfig, SearchConfig,
    init_config, load_config,
};
use registerscout_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// RegisterScout: find and archive councillors' registers of interests.
#[derive(Parser)]
#[command(
    name = "registerscout",
    version,
    about = "Find, verify and archive elected officials' registers of interests.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Attribute a register of interests to every official in the database.
    Run {
        /// Database path (defaults to `defaults.db_path`).
        #[arg(long)]
        db: Option<PathBuf>,

        /// Worker pool width.
        #[arg(short, long)]
        workers: Option<u32>,

        /// Delay before each request, per worker.
        #[arg(long)]
        delay_ms: Option<u64>,

        /// Directory for the end-of-run CSV reports.
        #[arg(long)]
        reports_dir: Option<PathBuf>,

        /// Skip writing CSV reports.
        #[arg(long, conflicts_with = "reports_dir")]
        no_reports: bool,

        /// Print the run summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Resolve a council's homepage through web search.
    Homepage {
        /// Council name, e.g. "Sandshire".
        council: String,
    },

    /// Crawl a council website and list register/PDF findings.
    Crawl {
        /// Council homepage URL.
        url: String,

        /// Page budget of the first pass.
        #[arg(long)]
        max_pages: Option<usize>,

        /// Depth budget of the first pass.
        #[arg(long)]
        max_depth: Option<u32>,
    },

    /// Fetch one URL and show the classifier and name-match verdicts.
    Check {
        /// URL to fetch.
        url: String,

        /// Official's full name.
        #[arg(long)]
        name: String,
    },

    /// Stored-register count and audit counts by kind.
    Summary {
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Full-text search over stored register text.
    Search {
        /// FTS5 query, e.g. `"land" AND sandshire`.
        term: String,

        #[arg(long, default_value = "20")]
        limit: u32,

        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Manage the officials list.
    Official {
        #[command(subcommand)]
        action: OfficialAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Officials subcommands.
#[derive(Subcommand)]
pub(crate) enum OfficialAction {
    /// Add an official (no-op if already present).
    Add {
        /// Full name, e.g. "Alex Carter".
        name: String,

        #[arg(long)]
        council: String,

        #[arg(long)]
        ward: Option<String>,

        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// List officials and whether a register is stored.
    List {
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "registerscout=info",
        1 => "registerscout=debug",
        _ => "registerscout=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = load_config()?;

    match cli.command {
        Command::Run {
            db,
            workers,
            delay_ms,
            reports_dir,
            no_reports,
            json,
        } => {
            let mut config = config;
            if let Some(workers) = workers {
                config.defaults.workers = workers;
            }
            if let Some(delay) = delay_ms {
                config.defaults.request_delay_ms = delay;
            }
            if let Some(dir) = reports_dir {
                config.defaults.reports_dir = dir.to_string_lossy().into_owned();
            }
            cmd_run(&config, db.as_deref(), no_reports, json).await
        }
        Command::Homepage { council } => cmd_homepage(&config, &council).await,
        Command::Crawl {
            url,
            max_pages,
            max_depth,
        } => cmd_crawl(&config, &url, max_pages, max_depth).await,
        Command::Check { url, name } => cmd_check(&config, &url, &name).await,
        Command::Summary { db } => cmd_summary(&config, db.as_deref()).await,
        Command::Search { term, limit, db } => {
            cmd_search(&config, &term, limit, db.as_deref()).await
        }
        Command::Official { action } => match action {
            OfficialAction::Add {
                name,
                council,
                ward,
                db,
            } => cmd_official_add(&config, &name, &council, ward.as_deref(), db.as_deref()).await,
            OfficialAction::List { db } => cmd_official_list(&config, db.as_deref()).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&config).await,
        },
    }
}

fn db_path(config: &AppConfig, flag: Option<&Path>) -> PathBuf {
    flag.map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&config.defaults.db_path))
}

/// Serper when an API key is configured, otherwise a searcher that finds nothing.
fn build_searcher(config: &AppConfig) -> Result<Arc<dyn WebSearcher>> {
    let search = SearchConfig::from(config);
    match search.api_key() {
        Some(key) => Ok(Arc::new(SerperSearcher::new(key)?)),
        None => {
            warn!(
                env = %search.api_key_env,
                "no search API key set; web search and homepage discovery are disabled"
            );
            Ok(Arc::new(NoopSearcher))
        }
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

async fn cmd_run(config: &AppConfig, db: Option<&Path>, no_reports: bool, json: bool) -> Result<()> {
    let db = db_path(config, db);
    let storage = Arc::new(Storage::open(&db).await?);
    let fetcher = Fetcher::new(&FetchConfig::from(config))?;
    let searcher = build_searcher(config)?;

    let attributor = Attributor::new(
        storage,
        fetcher,
        CrawlConfig::from(config),
        searcher,
        AttributionConfig::from(config),
    );

    let mut run_config = RunConfig::from(config);
    if no_reports {
        run_config.reports_dir = None;
    }

    info!(db = %db.display(), workers = run_config.workers, "starting run");

    let coordinator = Coordinator::new(Arc::new(attributor), run_config.clone());
    let summary = coordinator.run(Arc::new(CliProgress::new())).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let t = &summary.totals;
    println!();
    println!("  Attribution run complete");
    println!("  Processed:        {}", t.processed);
    println!("  Stored:           {}", t.stored);
    println!("  Already stored:   {}", t.already_stored);
    println!("  Missing:          {}", t.missing);
    println!("  Failed:           {}", t.failed);
    println!("  Search errors:    {}", t.search_error);
    println!("  Fetch errors:     {}", t.register_fetch_error);
    println!("  Profile errors:   {}", t.profile_fetch_error);
    println!("  Manual review:    {}", summary.manual_review.len());
    if let Some(dir) = &run_config.reports_dir {
        println!("  Reports:          {}", dir.display());
    }
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif bar.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        Self { bar }
    }
}

impl ProgressReporter for CliProgress {
    fn started(&self, total: usize) {
        self.bar.set_length(total as u64);
    }

    fn official_done(&self, official: &Official, outcome: &Outcome, completed: usize, _total: usize) {
        self.bar.set_position(completed as u64);
        self.bar
            .set_message(format!("{} ({}): {}", official.name, official.council, outcome.label()));
    }

    fn done(&self, _summary: &RunSummary) {
        self.bar.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

async fn cmd_homepage(config: &AppConfig, council: &str) -> Result<()> {
    let search = SearchConfig::from(config);
    let resolver = HomepageResolver::new(build_searcher(config)?, search.max_results);

    match resolver.resolve(council).await? {
        Some(url) => println!("{url}"),
        None => println!("homepage not found for {council}"),
    }
    Ok(())
}

async fn cmd_crawl(
    config: &AppConfig,
    url: &str,
    max_pages: Option<usize>,
    max_depth: Option<u32>,
) -> Result<()> {
    let homepage = Url::parse(url).map_err(|e| eyre!("invalid URL '{url}': {e}"))?;

    let mut crawl = CrawlConfig::from(config);
    if let Some(pages) = max_pages {
        crawl.max_pages = pages;
    }
    if let Some(depth) = max_depth {
        crawl.max_depth = depth;
    }

    let crawler = SiteCrawler::new(Fetcher::new(&FetchConfig::from(config))?, crawl);
    let report = crawler.crawl(&homepage).await?;

    println!(
        "  {} findings, {} pages fetched, {} pass(es), budget {} pages / depth {}",
        report.findings.len(),
        report.pages_fetched,
        report.passes,
        report.budget.max_pages,
        report.budget.max_depth,
    );
    for finding in &report.findings {
        let kind = if finding.register_hint { "register" } else { "pdf" };
        println!(
            "  [{kind}] d{} {}  {}",
            finding.depth,
            finding.url,
            finding.anchor_text.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

async fn cmd_check(config: &AppConfig, url: &str, name: &str) -> Result<()> {
    let url = Url::parse(url).map_err(|e| eyre!("invalid URL '{url}': {e}"))?;
    let fetcher = Fetcher::new(&FetchConfig::from(config))?;
    let doc = fetcher.fetch_document(&url).await?;
    let content = &doc.content;

    let register_links = doc
        .anchors
        .iter()
        .filter(|a| looks_like_register(&a.text, a.href.as_str()))
        .count();
    let pdf_links = doc.anchors.iter().filter(|a| is_pdf_link(&a.href)).count();

    println!("  URL:             {}", content.url);
    println!("  Content type:    {}", content.content_type);
    println!("  Text length:     {}", content.text.chars().count());
    println!(
        "  Looks like ROI:  {}",
        looks_like_register(&content.text, url.as_str()) || looks_like_register_text(&content.text)
    );
    println!("  Names official:  {}", name_matches(&content.text, name));
    println!("  Register links:  {register_links}");
    println!("  PDF links:       {pdf_links}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Database reports
// ---------------------------------------------------------------------------

async fn cmd_summary(config: &AppConfig, db: Option<&Path>) -> Result<()> {
    let storage = Storage::open_readonly(&db_path(config, db)).await?;

    println!("  Officials:        {}", storage.list_officials().await?.len());
    println!("  Stored registers: {}", storage.count_registers().await?);
    for (kind, count) in storage.audit_counts().await? {
        println!("  {:<22}{count}", format!("{kind}:"));
    }
    Ok(())
}

async fn cmd_search(config: &AppConfig, term: &str, limit: u32, db: Option<&Path>) -> Result<()> {
    let storage = Storage::open_readonly(&db_path(config, db)).await?;
    let hits = storage.search_registers(term, limit).await?;

    if hits.is_empty() {
        println!("no matches for {term:?}");
        return Ok(());
    }
    for hit in hits {
        println!("  {} ({}) {}", hit.name, hit.council, hit.register_url);
        println!("      {}", hit.snippet);
    }
    Ok(())
}

async fn cmd_official_add(
    config: &AppConfig,
    name: &str,
    council: &str,
    ward: Option<&str>,
    db: Option<&Path>,
) -> Result<()> {
    let storage = Storage::open(&db_path(config, db)).await?;
    let id = storage.insert_official(name, council, ward).await?;
    println!("official {id}: {name} ({council})");
    Ok(())
}

async fn cmd_official_list(config: &AppConfig, db: Option<&Path>) -> Result<()> {
    let storage = Storage::open_readonly(&db_path(config, db)).await?;
    for official in storage.list_officials().await? {
        let stored = if storage.has_register(official.id).await? { "stored" } else { "-" };
        println!(
            "  {:>5}  {:<30} {:<24} {:<20} {stored}",
            official.id.0,
            official.name,
            official.council,
            official.ward.as_deref().unwrap_or(""),
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}
