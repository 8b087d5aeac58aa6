//! Octagon-Harvest main entry point
//!
//! This is the command-line interface for the discovery crawl and the
//! table normalizer.

use anyhow::Context;
use clap::{Parser, Subcommand};
use octagon_harvest::config::{load_config_or_default, Config};
use octagon_harvest::{Discoverer, EntityKind, Normalizer};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Instant;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Octagon-Harvest: ufcstats.com link discovery and table normalization
///
/// Discovers event, fight and fighter URLs with a resumable, rate-limited
/// crawl, and links the scraped tables into a keyed relational schema.
#[derive(Parser, Debug)]
#[command(name = "octagon-harvest")]
#[command(version)]
#[command(about = "ufcstats.com link discovery and table normalization", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults apply when omitted)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Discover record URLs (events, fights, fighters or all)
    Discover {
        #[arg(value_name = "KIND", default_value = "all")]
        target: Target,

        /// Show the resolved configuration and the pages that would be
        /// fetched, without fetching
        #[arg(long)]
        dry_run: bool,
    },

    /// Link the scraped tables into the keyed schema
    Normalize,

    /// Discover all URLs, then normalize the scraped tables
    Run,
}

#[derive(Debug, Clone, Copy)]
enum Target {
    All,
    One(EntityKind),
}

impl Target {
    fn kinds(&self) -> Vec<EntityKind> {
        match self {
            Self::All => EntityKind::ALL.to_vec(),
            Self::One(kind) => vec![*kind],
        }
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            Ok(Self::All)
        } else {
            s.parse().map(Self::One)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config_or_default(cli.config.as_deref()).with_context(|| match &cli.config
    {
        Some(path) => format!("Failed to load configuration from {}", path.display()),
        None => "Invalid default configuration".to_string(),
    })?;

    setup_logging(cli.verbose, cli.quiet, config.logging.file.as_deref())?;
    if let Some(path) = &cli.config {
        tracing::info!("Configuration loaded from: {}", path.display());
    }

    match cli.command {
        Command::Discover { target, dry_run } if dry_run => handle_dry_run(config, target),
        Command::Discover { target, .. } => handle_discover(config, target).await,
        Command::Normalize => handle_normalize(&config),
        Command::Run => handle_run(config).await,
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level, with an
/// optional second sink writing plain text to `file`
fn setup_logging(verbose: u8, quiet: bool, file: Option<&Path>) -> anyhow::Result<()> {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("octagon_harvest=info,warn"),
            1 => EnvFilter::new("octagon_harvest=debug,info"),
            2 => EnvFilter::new("octagon_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    let file_layer = match file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let log_file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Cannot open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(log_file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();

    Ok(())
}

/// Handles `discover --dry-run`: shows the configuration and planned pages
fn handle_dry_run(config: Config, target: Target) -> anyhow::Result<()> {
    println!("=== Octagon-Harvest Dry Run ===\n");

    println!("Site: {}", config.site.base_url);

    println!("\nHTTP:");
    println!("  User agent: {}", config.http.user_agent);
    println!("  Timeout: {}s", config.http.timeout_secs);
    println!("  Connect timeout: {}s", config.http.connect_timeout_secs);
    println!(
        "  Retries: {} (backoff from {}ms)",
        config.http.max_retries, config.http.backoff_base_ms
    );

    println!("\nDiscovery:");
    println!("  Delay between pages: {}ms", config.discovery.request_delay_ms);
    println!(
        "  Checkpoint every: {} pages",
        config.discovery.checkpoint_every
    );

    println!("\nPaths:");
    println!("  URL lists: {}", config.paths.url_dir.display());
    println!("  Checkpoints: {}", config.paths.checkpoint_dir.display());
    println!("  Raw tables: {}", config.paths.raw_dir.display());
    println!("  Normalized tables: {}", config.paths.normalized_dir.display());
    match &config.paths.key_registry {
        Some(path) => println!("  Key registry: {}", path.display()),
        None => println!("  Key registry: (none)"),
    }

    let discoverer = Discoverer::new(config)?;
    for kind in target.kinds() {
        match discoverer.planned_pages(kind) {
            Ok(pages) => {
                println!("\n{} discovery: {} pages", kind, pages.len());
                for page in pages.iter().take(5) {
                    println!("  * {}", page);
                }
                if pages.len() > 5 {
                    println!("  ... and {} more", pages.len() - 5);
                }
            }
            Err(e) => println!("\n{} discovery: cannot plan ({})", kind, e),
        }
    }

    println!("\n✓ Configuration is valid");

    Ok(())
}

/// Handles the discovery runs
async fn handle_discover(config: Config, target: Target) -> anyhow::Result<()> {
    let discoverer = Discoverer::new(config)?;

    let results = match target {
        Target::All => discoverer.discover_all().await,
        Target::One(kind) => {
            tracing::info!("Getting {} URLs...", kind);
            vec![discoverer.discover(kind).await]
        }
    };

    let mut failures = 0;
    for result in results {
        match result {
            Ok(report) if report.written => tracing::info!(
                "{}: {} new URLs ({} found), written to {}",
                report.kind,
                report.links.len(),
                report.found,
                report.output.display()
            ),
            Ok(report) => tracing::info!(
                "{}: no new URLs ({} found)",
                report.kind,
                report.found
            ),
            Err(e) => {
                if let Target::One(kind) = target {
                    tracing::error!("{} URL discovery failed: {}", kind, e);
                }
                failures += 1;
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} discovery run(s) failed", failures);
    }
    Ok(())
}

/// Handles the normalization pass
fn handle_normalize(config: &Config) -> anyhow::Result<()> {
    let report = Normalizer::from_config(config)
        .run()
        .context("Normalization failed")?;

    tracing::info!(
        "Normalized tables written to {} ({} rows rejected)",
        report.output_dir.display(),
        report.rejected()
    );

    Ok(())
}

/// Handles the full pipeline: discovery, then normalization
async fn handle_run(config: Config) -> anyhow::Result<()> {
    let start = Instant::now();

    let discovery = handle_discover(config.clone(), Target::All).await;
    if let Err(e) = &discovery {
        tracing::warn!("{}; normalizing the tables already on disk", e);
    }

    let normalized = handle_normalize(&config);

    let elapsed = start.elapsed();
    tracing::info!(
        "Time taken to run: {} minutes and {} seconds",
        elapsed.as_secs() / 60,
        elapsed.as_secs() % 60
    );

    normalized?;
    discovery
}
