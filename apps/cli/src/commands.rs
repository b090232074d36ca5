//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use keywatch_core::{Scheduler, TickReport, WatchEngine};
use keywatch_shared::{
    AppConfig, KeywordMode, ScanSnapshot, SubscriberId, init_config, load_config,
    load_config_from,
};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// keywatch: watch web pages for newly appearing keywords.
#[derive(Parser)]
#[command(
    name = "keywatch",
    version,
    about = "Watch web pages for newly appearing keywords and notify subscribers.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.keywatch/keywatch.toml.
    #[arg(long, global = true, env = "KEYWATCH_CONFIG")]
    pub config: Option<PathBuf>,

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
    /// Run the scheduled watch loop over configured subscribers until Ctrl-C.
    Watch {
        /// Seconds between ticks (overrides config).
        #[arg(long)]
        interval_secs: Option<u64>,

        /// Per-request fetch timeout in seconds (overrides config).
        #[arg(long)]
        fetch_timeout_secs: Option<u64>,

        /// Run a single tick immediately and exit.
        #[arg(long)]
        once: bool,
    },

    /// Scan URLs for keywords without recording anything.
    Scan {
        /// URL to scan (repeatable).
        #[arg(short, long = "url", required = true)]
        urls: Vec<String>,

        /// Keyword to look for (repeatable).
        #[arg(short, long = "keyword", required = true)]
        keywords: Vec<String>,

        /// Keyword interpretation: literal or pattern (overrides config).
        #[arg(long)]
        mode: Option<KeywordMode>,

        /// Print the snapshot as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Refresh one subscriber now and show what is new.
    Check {
        /// Subscriber id.
        id: String,

        /// Print the diff as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List configured subscribers.
    Subscribers,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
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
        0 => "keywatch=info",
        1 => "keywatch=debug",
        _ => "keywatch=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Watch {
            interval_secs,
            fetch_timeout_secs,
            once,
        } => {
            let mut config = resolve_config(config_path.as_ref())?;
            if let Some(secs) = interval_secs {
                config.watch.scan_interval_secs = secs;
            }
            if let Some(secs) = fetch_timeout_secs {
                config.watch.fetch_timeout_secs = secs;
            }
            cmd_watch(config, once).await
        }
        Command::Scan {
            urls,
            keywords,
            mode,
            json,
        } => {
            let mut config = resolve_config(config_path.as_ref())?;
            if let Some(mode) = mode {
                config.watch.keyword_mode = mode;
            }
            cmd_scan(&config, &urls, &keywords, json).await
        }
        Command::Check { id, json } => {
            let config = resolve_config(config_path.as_ref())?;
            cmd_check(&config, &id, json).await
        }
        Command::Subscribers => cmd_subscribers(&resolve_config(config_path.as_ref())?),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&resolve_config(config_path.as_ref())?),
        },
    }
}

/// File (explicit path or default location), then `KEYWATCH_*` overrides.
fn resolve_config(path: Option<&PathBuf>) -> Result<AppConfig> {
    let mut config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    config.apply_env_overrides()?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_watch(config: AppConfig, once: bool) -> Result<()> {
    config.validate()?;
    if config.subscribers.is_empty() {
        return Err(eyre!(
            "no subscribers configured: add [[subscribers]] entries to the config file"
        ));
    }

    let engine = Arc::new(WatchEngine::from_config(&config)?);

    if once {
        let report = engine.run_tick().await;
        print_report(&report);
        return Ok(());
    }

    let interval = Duration::from_secs(config.watch.scan_interval_secs);
    let scheduler = Scheduler::new(engine);
    scheduler.start(interval)?;

    info!(
        subscribers = config.subscribers.len(),
        interval_secs = interval.as_secs(),
        "watching, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| eyre!("failed to listen for Ctrl-C: {e}"))?;

    info!("shutting down");
    scheduler.stop().await;
    println!("Completed {} tick(s).", scheduler.ticks_completed());
    Ok(())
}

async fn cmd_scan(config: &AppConfig, urls: &[String], keywords: &[String], json: bool) -> Result<()> {
    config.validate()?;
    let engine = WatchEngine::from_config(config)?;

    info!(urls = urls.len(), keywords = keywords.len(), "scanning");
    let snapshot = engine.preview_scan(urls, keywords).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print_snapshot(&snapshot);
    }
    Ok(())
}

async fn cmd_check(config: &AppConfig, id: &str, json: bool) -> Result<()> {
    config.validate()?;
    let engine = WatchEngine::from_config(config)?;
    let id = SubscriberId::from(id);

    // A fresh process has no baseline, so everything found is reported as new.
    let diff = engine.force_refresh(&id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&diff)?);
    } else {
        print_snapshot(&diff);
    }
    Ok(())
}

fn cmd_subscribers(config: &AppConfig) -> Result<()> {
    config.validate()?;
    if config.subscribers.is_empty() {
        println!("No subscribers configured.");
        return Ok(());
    }

    for entry in &config.subscribers {
        let notify = if entry.notify_by_email {
            entry.contact_address.as_str()
        } else {
            "off"
        };
        println!(
            "{}  urls: {}  keywords: {}  notify: {notify}",
            entry.id,
            entry.urls.len(),
            entry.keywords.len(),
        );
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_snapshot(snapshot: &ScanSnapshot) {
    if snapshot.is_empty() {
        println!("No keyword hits.");
        return;
    }

    for page in snapshot {
        println!("{}", page.url);
        for hit in &page.hits {
            println!("  [{}] ...{}...", hit.keyword, hit.context);
        }
    }
    println!();
    println!(
        "  {} hit(s) on {} page(s)",
        snapshot.hit_count(),
        snapshot.len()
    );
}

fn print_report(report: &TickReport) {
    println!();
    println!("  Tick complete");
    println!("  Subscribers:   {}", report.subscribers);
    println!("  Changed:       {}", report.changed);
    println!(
        "  Notified:      {}/{}",
        report.notifications_sent, report.notifications_attempted
    );
    if report.directory_failed {
        println!("  Subscriber directory unavailable; nothing scanned.");
    }
    println!();
}
