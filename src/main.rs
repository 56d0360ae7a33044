use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use repovault::engine::BackupEngine;
use repovault::providers::active_providers;
use repovault::Config;

#[derive(Parser)]
#[command(name = "repovault")]
#[command(about = "Concurrent git repository backup with archive retention")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Back up every repository from the configured providers
    Backup {
        /// Destination directory (overrides the configured one)
        #[arg(short, long)]
        destination: Option<PathBuf>,
    },

    /// List repositories that would be backed up
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose)?;
    info!("Starting RepoVault v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(cli.config)?;

    match cli.command {
        Commands::Backup { destination } => cmd_backup(config, destination).await,
        Commands::List => cmd_list(config).await,
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("repovault=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    Ok(())
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load(&path),
        None => Config::load_or_default(),
    }
}

async fn cmd_backup(config: Config, destination: Option<PathBuf>) -> Result<()> {
    let destination = destination.unwrap_or_else(|| PathBuf::from(&config.destination));

    let providers = active_providers(&config)?;
    if providers.is_empty() {
        bail!("no providers configured; add a gitlab or github section to the config file");
    }

    let engine = BackupEngine::new(config);
    let mut failed = 0usize;

    for (provider, settings) in &providers {
        match engine.run(provider.as_ref(), settings, &destination).await {
            Ok(summary) => {
                failed += summary.failed;
            }
            Err(err) => {
                // A provider that cannot authenticate or enumerate aborts
                // the whole run; there is nothing safe to back up for it.
                error!(provider = provider.name(), "provider failed: {err}");
                return Err(err.into());
            }
        }
    }

    if failed > 0 {
        bail!("{failed} repository backup(s) failed; see the log for details");
    }

    Ok(())
}

async fn cmd_list(config: Config) -> Result<()> {
    let providers = active_providers(&config)?;
    if providers.is_empty() {
        bail!("no providers configured; add a gitlab or github section to the config file");
    }

    for (provider, _) in &providers {
        let output = provider.describe().await?;

        println!("{} ({} repositories)", provider.name(), output.repos.len());
        for repo in &output.repos {
            println!("  {:40} {}", repo.name_with_owner, repo.https_url);
        }
    }

    Ok(())
}
