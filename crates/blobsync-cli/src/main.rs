//! BlobSync - incremental directory upload to Azure Blob Storage
//!
//! Uploads the files of a local directory whose content differs from the
//! container, then optionally purges the overwritten paths from the CDN.

mod display;
mod json_output;

use anyhow::{Context, Result};
use blobsync_cdn::CacheInvalidator;
use blobsync_config::{CdnSettings, ConfigError, ConfigLoader, Settings};
use blobsync_network::AzureBlobStore;
use blobsync_sync::{ProgressReporter, TreeWalker, WalkOptions};
use blobsync_types::Error;
use clap::{Parser, Subcommand};
use console::style;
use json_output::RunSummaryJson;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// BlobSync - incremental directory upload to Azure Blob Storage
#[derive(Parser)]
#[command(
    name = "blobsync",
    version = env!("CARGO_PKG_VERSION"),
    about = "Incremental directory upload to Azure Blob Storage",
    long_about = "BlobSync uploads the files of a local directory whose content differs from\n\
                  an Azure Blob Storage container, and can purge the overwritten paths\n\
                  from an Azure CDN endpoint afterwards."
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Quiet mode - minimal output
    #[arg(short, long)]
    quiet: bool,

    /// Verbose mode - detailed output
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Configuration file path (defaults to ~/.azure_upload.yml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload changed files and optionally purge the CDN
    Upload {
        /// Destination container
        container: String,
        /// Local directory to upload
        source: PathBuf,
        /// Purge overwritten paths from the CDN afterwards
        #[arg(long)]
        purge: bool,
        /// CDN resource group (overrides the configuration file)
        #[arg(long)]
        resource_group: Option<String>,
        /// CDN profile name (overrides the configuration file)
        #[arg(long)]
        profile: Option<String>,
        /// CDN endpoint name (overrides the configuration file)
        #[arg(long)]
        endpoint: Option<String>,
        /// Evaluate every file regardless of modification time
        #[arg(long)]
        process_all: bool,
        /// Entries processed concurrently per batch
        #[arg(long)]
        concurrency: Option<usize>,
        /// Skip files modified before this RFC 3339 timestamp
        #[arg(long, value_parser = parse_since)]
        since: Option<SystemTime>,
        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show or generate configuration
    Config {
        /// Write a configuration template to this file
        #[arg(long)]
        template: Option<PathBuf>,
    },
}

/// Options of the `upload` command
struct UploadArgs {
    container: String,
    source: PathBuf,
    purge: bool,
    process_all: bool,
    since: Option<SystemTime>,
    json: bool,
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.debug, cli.quiet, cli.verbose, cli.json_logs)?;

    info!("BlobSync v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Upload {
            container,
            source,
            purge,
            resource_group,
            profile,
            endpoint,
            process_all,
            concurrency,
            since,
            json,
        } => {
            let explicit = Settings {
                concurrency,
                cdn: CdnSettings {
                    resource_group,
                    profile,
                    endpoint,
                    ..CdnSettings::default()
                },
                ..Settings::default()
            };
            let settings = load_settings(cli.config.as_deref(), explicit)?;
            let args = UploadArgs {
                container,
                source,
                purge,
                process_all,
                since,
                json,
                quiet: cli.quiet,
            };
            upload_command(args, &settings).await?;
        }
        Commands::Config { template } => {
            config_command(cli.config.as_deref(), template)?;
        }
    }

    Ok(())
}

fn init_logging(debug: bool, quiet: bool, verbose: bool, json: bool) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else if quiet {
        "error"
    } else {
        "warn"
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("invalid log filter")?;

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }

    Ok(())
}

fn load_settings(config_path: Option<&Path>, explicit: Settings) -> Result<Settings> {
    ConfigLoader::load(config_path, &[], explicit).map_err(|e| {
        let error = Error::from(e);
        display::print_stage_failure(&error);
        anyhow::Error::new(error)
    })
}

/// Log every missing key and convert into the run error
fn configuration_failure(error: ConfigError) -> anyhow::Error {
    if !error.missing_keys().is_empty() {
        error!(
            "Missing required configuration: {}",
            error.missing_keys().join(", ")
        );
    }
    let error = Error::from(error);
    display::print_stage_failure(&error);
    anyhow::Error::new(error)
}

async fn upload_command(args: UploadArgs, settings: &Settings) -> Result<()> {
    // Validate everything before the first network call
    let storage = settings.require_storage().map_err(configuration_failure)?;
    let cdn = if args.purge {
        Some(settings.require_cdn().map_err(configuration_failure)?)
    } else {
        None
    };

    if !args.source.is_dir() {
        anyhow::bail!("{} is not a directory", args.source.display());
    }

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing the current batch");
            signal_token.cancel();
        }
    });

    if !args.quiet && !args.json {
        println!(
            "{} Uploading {} to container {}",
            style("→").green().bold(),
            style(args.source.display()).cyan(),
            style(&args.container).cyan()
        );
    }

    let store = Arc::new(
        AzureBlobStore::new(&storage, args.container.clone()).context("creating blob client")?,
    );
    let options = WalkOptions {
        concurrency: settings.concurrency(),
        process_all: args.process_all,
    };

    let (reporter, events) = ProgressReporter::channel();
    let progress = display::spawn_progress(events, display::create_spinner(args.quiet || args.json));

    let start = Instant::now();
    let walk_result = {
        let walker = TreeWalker::new(store, args.source.clone(), options)
            .with_cancellation(cancel.clone())
            .with_progress(reporter);
        walker.walk(args.since).await
    };
    let elapsed = start.elapsed();
    display::finish_progress(progress).await;

    let report = match walk_result {
        Ok(report) => report,
        Err(e) => {
            display::print_stage_failure(&e);
            return Err(e.into());
        }
    };

    if !args.json && !args.quiet {
        display::print_walk_summary(&args.container, &report, elapsed);
    }
    if !args.json {
        display::print_failures(&report.failures);
    }

    let mut purge_report = None;
    let mut purge_error = None;
    if let Some(cdn) = cdn {
        if report.cancelled {
            warn!("Skipping cache purge after cancellation");
        } else if report.changed_paths.is_empty() {
            info!("No overwritten objects, nothing to purge");
        } else {
            let paths = report.changed_paths.cache_paths(&args.container);
            let invalidator = CacheInvalidator::azure(&cdn)?.with_cancellation(cancel.clone());
            match invalidator.purge(&paths).await {
                Ok(purge) => {
                    if !args.json && !args.quiet {
                        display::print_purge_summary(&purge);
                    }
                    purge_report = Some(purge);
                }
                Err(e) => {
                    if !args.json {
                        display::print_stage_failure(&e);
                    }
                    purge_error = Some(e);
                }
            }
        }
    }

    if args.json {
        let summary = RunSummaryJson::new(
            &args.container,
            &args.source,
            &report,
            elapsed,
            purge_report.as_ref(),
            purge_error.as_ref(),
        );
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    if let Some(e) = purge_error {
        return Err(e.into());
    }
    if !report.failures.is_empty() {
        anyhow::bail!("{} entries failed to sync", report.failures.len());
    }
    if report.cancelled || purge_report.is_some_and(|p| p.cancelled) {
        anyhow::bail!(Error::Cancelled);
    }

    if !args.quiet && !args.json {
        println!("{} Upload completed", style("✓").green());
    }
    info!("Upload completed successfully");
    Ok(())
}

fn config_command(config_path: Option<&Path>, template: Option<PathBuf>) -> Result<()> {
    if let Some(path) = template {
        ConfigLoader::generate_template(&path)
            .with_context(|| format!("writing template to {}", path.display()))?;
        println!(
            "{} Configuration template written to {}",
            style("✓").green(),
            style(path.display()).cyan()
        );
        return Ok(());
    }

    let settings = load_settings(config_path, Settings::default())?;
    display::print_settings(&settings);
    Ok(())
}

fn parse_since(value: &str) -> std::result::Result<SystemTime, String> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(SystemTime::from)
        .map_err(|e| format!("expected an RFC 3339 timestamp such as 2024-01-31T12:00:00Z: {e}"))
}
