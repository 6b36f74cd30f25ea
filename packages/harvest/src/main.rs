#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the project health harvester.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use health_harvest::run_harvest;
use health_harvest_collector::{HttpFetcher, ReportFetcher};
use health_harvest_config::{HarvestConfig, config_path, enabled_projects};
use health_harvest_store::{InfluxStore, LineProtocolPrinter, TimeSeriesStore};

#[derive(Parser)]
#[command(
    name = "health_harvest",
    about = "Collects code-quality and build health into a time-series store"
)]
struct Cli {
    /// Path to the config file (default: `$HARVEST_CONFIG`, then `harvest.toml`)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect every project once and write one batch (default)
    Run {
        /// Print line protocol to stdout instead of writing to the store
        #[arg(long)]
        dry_run: bool,
        /// Hide the progress bar
        #[arg(long)]
        quiet: bool,
        /// Comma-separated list of project keys to harvest (overrides `HARVEST_PROJECTS` env var)
        #[arg(long)]
        projects: Option<String>,
    },
    /// List configured projects
    Projects,
    /// Load and validate the config, then print a summary
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = health_harvest_cli_utils::init_logger();
    let cli = Cli::parse();

    let path = config_path(cli.config);
    let config = match HarvestConfig::load(&path) {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration in {}: {e}", path.display());
            return Err(e.into());
        }
    };

    let command = cli.command.unwrap_or(Commands::Run {
        dry_run: false,
        quiet: false,
        projects: None,
    });

    match command {
        Commands::Projects => {
            println!("{:<36} {:<12} JOB", "KEY", "TYPE");
            println!("{}", "-".repeat(80));
            for project in &config.projects {
                println!(
                    "{:<36} {:<12} {}",
                    project.key, project.component_type, project.build_endpoint
                );
            }
        }
        Commands::CheckConfig => {
            println!("Config:          {}", path.display());
            println!("Concurrency:     {}", config.concurrency);
            println!("Request timeout: {:?}", config.request_timeout);
            println!("Run timeout:     {:?}", config.run_timeout);
            println!("On failure:      {}", config.failure_policy);
            println!("Quality service: {}", config.quality.base_url);
            println!("  metrics:       {}", config.quality.metric_keys_csv());
            println!("  auth:          {:?}", config.quality.auth);
            println!("Build auth:      {:?}", config.build.auth);
            println!(
                "Store:           {} (database '{}')",
                config.store.url, config.store.database
            );
            println!("Projects:        {}", config.projects.len());
        }
        Commands::Run {
            dry_run,
            quiet,
            projects,
        } => {
            let selected = enabled_projects(&config.projects, projects);
            let config = config.with_projects(selected);

            let fetcher: Arc<dyn ReportFetcher> = Arc::new(HttpFetcher::new(&config)?);
            let store: Box<dyn TimeSeriesStore> = if dry_run {
                Box::new(LineProtocolPrinter::stdout())
            } else {
                Box::new(InfluxStore::new(&config.store)?)
            };
            let progress = health_harvest_cli_utils::collection_progress(&multi, quiet);

            if let Err(e) = run_harvest(&config, fetcher, store.as_ref(), progress).await {
                log::error!("Harvest failed: {e}");
                return Err(e.into());
            }
        }
    }

    Ok(())
}
