//! Shelfwatch main entry point
//!
//! This is the command-line interface for the Shelfwatch catalog change tracker.

use clap::Parser;
use shelfwatch::config::{load_config_with_hash, Config};
use shelfwatch::crawler::{RunCoordinator, RunOptions};
use shelfwatch::model::RunId;
use shelfwatch::storage::{open_storage, share};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Shelfwatch: a catalog change tracker
///
/// Shelfwatch harvests every product page of a catalog site, keeps the
/// current version of each item, and records what is new or changed since
/// the previous run. Interrupted runs can be resumed.
#[derive(Parser, Debug)]
#[command(name = "shelfwatch")]
#[command(version)]
#[command(about = "A catalog change tracker", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Resume an unfinished run (the latest one unless --run-id is given)
    #[arg(long)]
    resume: bool,

    /// Identifier of the run to start or resume
    #[arg(long, value_name = "ID")]
    run_id: Option<String>,

    /// Validate config and show what would be harvested without fetching
    #[arg(long, conflicts_with_all = ["stats", "export_summary"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export_summary"])]
    stats: bool,

    /// Regenerate the markdown summary of the latest run and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    export_summary: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.export_summary {
        handle_export_summary(&config)?;
    } else {
        let options = RunOptions {
            run_id: cli.run_id.map(RunId::new),
            resume: cli.resume,
            config_hash,
        };
        handle_run(&config, options).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("shelfwatch=info,warn"),
            1 => EnvFilter::new("shelfwatch=debug,info"),
            2 => EnvFilter::new("shelfwatch=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be harvested
fn handle_dry_run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Shelfwatch Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Worker pool width: {}", config.crawler.max_concurrent_fetches);
    println!("  Request timeout: {}s", config.crawler.request_timeout_secs);
    println!("  Connect timeout: {}s", config.crawler.connect_timeout_secs);

    println!("\nRetry Policy:");
    println!("  Max attempts: {}", config.retry.max_attempts);
    println!("  Base delay: {}ms", config.retry.base_delay_ms);
    println!("  Multiplier: {}", config.retry.multiplier);
    println!("  Max delay: {}ms", config.retry.max_delay_ms);
    println!("  Jitter: {}", config.retry.jitter);

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Summary: {}", config.output.summary_path);
    match config.output.changelog_limit {
        Some(limit) => println!("  Changelog limit: {}", limit),
        None => println!("  Changelog limit: unlimited"),
    }

    println!("\nCatalog:");
    println!("  Base URL: {}", config.catalog.base_url);
    if config.catalog.targets.is_empty() {
        println!("  Index page: {}", config.catalog.index_path);
        println!("\n✓ Configuration is valid");
        println!("✓ Would enumerate targets through the catalog's category listings");
    } else {
        println!("  Explicit targets ({}):", config.catalog.targets.len());
        for target in &config.catalog.targets {
            println!("    * {}", target);
        }
        println!("\n✓ Configuration is valid");
        println!(
            "✓ Would harvest {} explicit target URLs",
            config.catalog.targets.len()
        );
    }

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    use shelfwatch::output::{load_statistics, print_statistics};

    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --export-summary mode: rebuilds the latest run's markdown summary
fn handle_export_summary(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    use shelfwatch::output::{generate_markdown_summary, rebuild_latest_summary};

    println!("=== Exporting Run Summary ===\n");
    println!("Database: {}", config.output.database_path);
    println!("Output: {}", config.output.summary_path);
    println!();

    let storage = open_storage(Path::new(&config.output.database_path))?;

    tracing::info!("Loading latest run from database...");
    let summary = rebuild_latest_summary(&storage)?;

    tracing::info!("Generating markdown summary...");
    generate_markdown_summary(&summary, Path::new(&config.output.summary_path))?;

    println!("✓ Summary of run {} exported to: {}", summary.run_id, config.output.summary_path);

    Ok(())
}

/// Handles the main run operation
async fn handle_run(config: &Config, options: RunOptions) -> Result<(), Box<dyn std::error::Error>> {
    if options.resume {
        tracing::info!("Resuming unfinished run");
    } else {
        tracing::info!("Starting new run");
    }

    let storage = share(open_storage(Path::new(&config.output.database_path))?);
    let coordinator = RunCoordinator::from_config(config, storage)?;

    let stop = coordinator.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight work and stopping");
            stop.stop();
        }
    });

    match coordinator.run(options).await {
        Ok(summary) => {
            tracing::info!(
                "Run {} finished as {} ({} new, {} updated, {} unchanged, {} failed)",
                summary.run_id,
                summary.state,
                summary.counts.new,
                summary.counts.updated,
                summary.counts.unchanged,
                summary.counts.failed
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Run failed: {}", e);
            Err(e.into())
        }
    }
}
