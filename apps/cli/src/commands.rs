//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Report, Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use url::Url;

use rewritex_core::{
    ArticleState, BatchReport, ChatClient, ItemOutcome, ItemReport, LlmOptions, ProgressReporter,
    RerunPolicy, RewriteOptions, RewritePipeline, Rewriter,
};
use rewritex_crawler::{ContentExtractor, HttpFetcher, IngestOptions, IngestionScraper};
use rewritex_discovery::{ReferenceDiscovery, SearchOptions, SerpApiClient};
use rewritex_shared::{
    AppConfig, Article, ArticleFilter, ArticleId, ArticlePatch, ArticleSource, NewArticle,
    RewritexError, SortOrder, init_config, load_config,
};
use rewritex_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Rewritex: ingest articles and publish improved rewrites.
#[derive(Parser)]
#[command(
    name = "rewritex",
    version,
    about = "Ingest source articles, find references, and store model-assisted rewrites.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Database file (defaults to `[database] path` from the config).
    #[arg(long, global = true, env = "REWRITEX_DB")]
    pub db: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
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
    /// Scrape the source site and store new origin articles.
    Ingest {
        /// Article listing root (overrides `[ingest] listing_url`).
        #[arg(long)]
        listing_url: Option<String>,

        /// Maximum number of articles to collect (overrides `[ingest] max_articles`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Rewrite every origin article using discovered references.
    Rewrite {
        /// Rewrite origins that already have a derived article.
        #[arg(long)]
        force: bool,
    },

    /// Manage stored articles.
    Articles {
        #[command(subcommand)]
        action: ArticlesAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Article subcommands.
#[derive(Subcommand)]
pub(crate) enum ArticlesAction {
    /// List articles, newest first.
    List {
        /// Only articles of this source: origin, derived, or manual.
        #[arg(long)]
        source: Option<ArticleSource>,

        /// Oldest first.
        #[arg(long)]
        oldest: bool,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Show one article.
    Show {
        id: ArticleId,

        /// Render the body as Markdown instead of JSON.
        #[arg(long)]
        markdown: bool,
    },

    /// Create an article.
    Create {
        #[arg(long)]
        title: String,

        /// HTML body.
        #[arg(long, conflicts_with = "content_file")]
        content: Option<String>,

        /// Read the HTML body from a file.
        #[arg(long)]
        content_file: Option<PathBuf>,

        #[arg(long, default_value = "manual")]
        source: ArticleSource,

        #[arg(long)]
        author: Option<String>,

        /// Origin article this one derives from.
        #[arg(long)]
        original: Option<ArticleId>,

        #[arg(long)]
        source_url: Option<String>,

        /// Publication time (RFC 3339).
        #[arg(long)]
        published_at: Option<DateTime<Utc>>,

        /// Reference URL (repeatable).
        #[arg(long = "reference")]
        references: Vec<String>,
    },

    /// Update fields of an article.
    Update {
        id: ArticleId,

        #[arg(long)]
        title: Option<String>,

        /// HTML body.
        #[arg(long, conflicts_with = "content_file")]
        content: Option<String>,

        /// Read the HTML body from a file.
        #[arg(long)]
        content_file: Option<PathBuf>,

        #[arg(long)]
        source: Option<ArticleSource>,

        #[arg(long)]
        author: Option<String>,

        #[arg(long)]
        original: Option<ArticleId>,

        /// Publication time (RFC 3339).
        #[arg(long)]
        published_at: Option<DateTime<Utc>>,

        /// Replace the reference list (repeatable).
        #[arg(long = "reference")]
        references: Option<Vec<String>>,
    },

    /// Delete an article.
    Delete { id: ArticleId },
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
        0 => "rewritex=info",
        1 => "rewritex=debug",
        _ => "rewritex=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

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
    let db = cli.db;
    match cli.command {
        Command::Ingest { listing_url, limit } => {
            cmd_ingest(db, listing_url.as_deref(), limit).await
        }
        Command::Rewrite { force } => cmd_rewrite(db, force).await,
        Command::Articles { action } => cmd_articles(db, action).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

/// Exit status for rejected input, matching clap's usage errors.
pub(crate) const CLIENT_ERROR_EXIT: i32 = 2;

/// The input error behind a failed command, if the caller is at fault.
///
/// Validation, invalid input and duplicates are reported as one line with
/// [`CLIENT_ERROR_EXIT`] instead of a full error report.
pub(crate) fn client_error(report: &Report) -> Option<&RewritexError> {
    report
        .chain()
        .find_map(|e| e.downcast_ref::<RewritexError>())
        .filter(|e| e.is_client_error())
}

/// The database path: `--db` when given, else the configured one.
fn db_path(flag: Option<PathBuf>, config: &AppConfig) -> PathBuf {
    flag.unwrap_or_else(|| PathBuf::from(&config.database.path))
}

async fn open_storage(path: &Path) -> Result<Storage> {
    Storage::open(path)
        .await
        .wrap_err_with(|| format!("failed to open database {}", path.display()))
}

// ---------------------------------------------------------------------------
// ingest
// ---------------------------------------------------------------------------

async fn cmd_ingest(db: Option<PathBuf>, listing_url: Option<&str>, limit: Option<usize>) -> Result<()> {
    let config = load_config()?;
    let mut opts = IngestOptions::from_config(&config.ingest)?;
    if let Some(raw) = listing_url {
        opts.listing_url = Url::parse(raw).map_err(|e| eyre!("invalid listing URL '{raw}': {e}"))?;
    }
    if let Some(limit) = limit {
        opts.max_articles = limit;
    }

    let storage = open_storage(&db_path(db, &config)).await?;
    info!(listing_url = %opts.listing_url, max_articles = opts.max_articles, "ingesting articles");

    let spinner = spinner("Collecting article links");
    let scraper = IngestionScraper::new(Arc::new(HttpFetcher::new()?), opts);
    let result = scraper.run(&storage).await;
    spinner.finish_and_clear();
    let report = result?;

    println!();
    println!("  Ingestion finished");
    println!("  Links:      {}", report.links_collected);
    println!("  Created:    {}", report.created);
    println!("  Duplicates: {}", report.duplicates);
    println!("  Failures:   {}", report.failures.len());
    for (url, error) in &report.failures {
        println!("    - {url}: {error}");
    }
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// rewrite
// ---------------------------------------------------------------------------

async fn cmd_rewrite(db: Option<PathBuf>, force: bool) -> Result<()> {
    let config = load_config()?;

    // Resolve API keys before touching the database.
    let search = SerpApiClient::new(SearchOptions::from_config(&config.search)?)?;
    let llm = ChatClient::new(LlmOptions::from_config(&config.llm)?)?;

    let storage = Arc::new(open_storage(&db_path(db, &config)).await?);
    let policy = if force {
        RerunPolicy::Always
    } else {
        RerunPolicy::SkipRewritten
    };

    let pipeline = RewritePipeline::new(
        ReferenceDiscovery::new(Arc::new(search), config.search.result_count),
        ContentExtractor::new(Arc::new(HttpFetcher::new()?)),
        Rewriter::new(Arc::new(llm), RewriteOptions::from_config(&config.llm)),
        storage,
    )
    .with_policy(policy);

    info!(?policy, model = %config.llm.model, "starting rewrite");

    let reporter = CliProgress::new();
    let report = pipeline.run(&reporter).await?;
    print_batch(&report);

    Ok(())
}

fn print_batch(report: &BatchReport) {
    println!();
    println!("  Rewrite finished");
    for item in &report.items {
        println!("  {}", describe_item(item));
    }
    println!();
    println!("  Rewritten: {}", report.rewritten());
    println!("  Skipped:   {}", report.skipped());
    println!("  Failed:    {}", report.failed());
    println!("  Time:      {:.1}s", report.elapsed.as_secs_f64());
    println!();
}

fn describe_item(item: &ItemReport) -> String {
    match &item.outcome {
        ItemOutcome::Rewritten { derived_id } => {
            format!("rewritten  {} -> {derived_id}", item.title)
        }
        ItemOutcome::Skipped(reason) => format!("skipped    {} ({reason})", item.title),
        ItemOutcome::Failed { stage, error } => {
            format!("failed     {} while {stage}: {error}", item.title)
        }
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    spinner.set_style(style);
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));
    spinner.set_message(message.to_string());
    spinner
}

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        Self {
            spinner: spinner("Loading origin articles"),
        }
    }
}

impl ProgressReporter for CliProgress {
    fn batch_started(&self, total: usize) {
        self.spinner.set_message(format!("{total} origin article(s) to process"));
    }

    fn stage(&self, title: &str, current: usize, total: usize, state: ArticleState) {
        self.spinner
            .set_message(format!("[{current}/{total}] {state}: {title}"));
    }

    fn item_finished(&self, item: &ItemReport) {
        self.spinner.println(format!("  {}", describe_item(item)));
    }

    fn done(&self, _report: &BatchReport) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// articles
// ---------------------------------------------------------------------------

async fn cmd_articles(db: Option<PathBuf>, action: ArticlesAction) -> Result<()> {
    let config = load_config()?;
    let path = db_path(db, &config);

    match action {
        ArticlesAction::List {
            source,
            oldest,
            json,
        } => {
            let storage = Storage::open_readonly(&path).await?;
            let filter = ArticleFilter {
                source,
                order: if oldest {
                    SortOrder::Oldest
                } else {
                    SortOrder::Newest
                },
            };
            let articles = storage.list_articles(filter).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&articles)?);
            } else {
                print_table(&articles);
            }
        }
        ArticlesAction::Show { id, markdown } => {
            let storage = Storage::open_readonly(&path).await?;
            let article = storage
                .get_article(&id)
                .await?
                .ok_or_else(|| eyre!("article {id} not found"))?;
            if markdown {
                println!("# {}\n", article.title);
                println!("{}", rewritex_html::to_markdown(&article.content)?);
            } else {
                println!("{}", serde_json::to_string_pretty(&article)?);
            }
        }
        ArticlesAction::Create {
            title,
            content,
            content_file,
            source,
            author,
            original,
            source_url,
            published_at,
            references,
        } => {
            let content = read_content(content, content_file)?
                .ok_or_else(|| eyre!("either --content or --content-file is required"))?;
            let mut new = NewArticle::new(title, content, source);
            new.author = author;
            new.original_article_id = original;
            new.source_url = source_url;
            new.published_at = published_at;
            new.references = references;

            let storage = open_storage(&path).await?;
            let article = storage.create_article(new).await?;
            info!(id = %article.id, "article created");
            println!("{}", serde_json::to_string_pretty(&article)?);
        }
        ArticlesAction::Update {
            id,
            title,
            content,
            content_file,
            source,
            author,
            original,
            published_at,
            references,
        } => {
            let patch = ArticlePatch {
                title,
                content: read_content(content, content_file)?,
                source,
                author,
                original_article_id: original,
                published_at,
                references,
            };
            if patch.is_empty() {
                return Err(eyre!("nothing to update: pass at least one field flag"));
            }

            let storage = open_storage(&path).await?;
            let article = storage.update_article(&id, patch).await?;
            info!(%id, "article updated");
            println!("{}", serde_json::to_string_pretty(&article)?);
        }
        ArticlesAction::Delete { id } => {
            let storage = open_storage(&path).await?;
            storage.delete_article(&id).await?;
            info!(%id, "article deleted");
            println!("Deleted {id}");
        }
    }

    Ok(())
}

fn read_content(inline: Option<String>, file: Option<PathBuf>) -> Result<Option<String>> {
    match (inline, file) {
        (Some(content), _) => Ok(Some(content)),
        (None, Some(file)) => std::fs::read_to_string(&file)
            .map(Some)
            .wrap_err_with(|| format!("failed to read {}", file.display())),
        (None, None) => Ok(None),
    }
}

fn print_table(articles: &[Article]) {
    if articles.is_empty() {
        println!("No articles.");
        return;
    }
    println!("{:<36}  {:<7}  {:<16}  TITLE", "ID", "SOURCE", "CREATED");
    for article in articles {
        println!(
            "{:<36}  {:<7}  {:<16}  {}",
            article.id,
            article.source,
            article.created_at.format("%Y-%m-%d %H:%M"),
            article.title
        );
    }
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
