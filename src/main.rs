use std::{path::PathBuf, process::ExitCode};

use ::tracing::{error, info, info_span, Instrument};
use anyhow::Result;
use clap::{Parser, Subcommand};
use config::TransferConfig;
use data_model::PipelineVariant;
use orchestrator::BatchOrchestrator;
use watcher::DirectoryWatcher;

mod classifier;
mod config;
mod dir_events;
mod error;
mod ledger;
mod manifest;
mod orchestrator;
mod partition;
mod tracing;
mod watcher;
use tracing::setup_tracing;

#[cfg(test)]
mod testing;

#[derive(Parser)]
#[command(version, about = "Moves tracker described feed batches into date partitioned storage", long_about = None)]
struct Cli {
    #[arg(
        short,
        long,
        global = true,
        value_name = "config file",
        help = "Path to config file"
    )]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Upload every complete batch found in the source directory")]
    Transfer {
        #[arg(help = "directory holding tracker files and feed files")]
        source_dir: PathBuf,

        #[arg(help = "destination root for feed files that match their category")]
        valid_root: String,

        #[arg(help = "destination root for feed files that do not")]
        invalid_root: Option<String>,

        #[arg(long, help = "legacy (.txt trackers) or partitioned (.csv trackers)")]
        variant: Option<PipelineVariant>,

        #[arg(long, help = "directory for per tracker transfer records")]
        ledger_dir: Option<PathBuf>,
    },
    #[command(about = "Upload files as they appear in a directory")]
    Watch {
        dir: PathBuf,

        destination: String,

        #[arg(long)]
        poll_interval_secs: Option<u64>,
    },
}

impl Commands {
    fn apply(&self, config: &mut TransferConfig) {
        match self {
            Commands::Transfer {
                source_dir,
                valid_root,
                invalid_root,
                variant,
                ledger_dir,
            } => {
                config.source_dir = source_dir.clone();
                config.valid_root = valid_root.clone();
                if invalid_root.is_some() {
                    config.invalid_root = invalid_root.clone();
                }
                if let Some(variant) = variant {
                    config.variant = *variant;
                }
                if let Some(ledger_dir) = ledger_dir {
                    config.ledger_dir = ledger_dir.clone();
                }
            }
            Commands::Watch {
                dir,
                destination,
                poll_interval_secs,
            } => {
                config.watch.dir = Some(dir.clone());
                config.watch.destination = Some(destination.clone());
                if let Some(secs) = poll_interval_secs {
                    config.watch.poll_interval_secs = *secs;
                }
            }
        }
    }
}

async fn run_transfer(config: TransferConfig) -> Result<()> {
    let store = blob_store::build_client(&config.blob_storage)?;
    let orchestrator = BatchOrchestrator::new(config, store)?;
    let summary = orchestrator.run().await?;
    info!(
        discovered = summary.discovered,
        cleaned_up = summary.cleaned_up,
        retained = summary.retained,
        aborted = summary.aborted,
        failed = summary.failed,
        "transfer run finished"
    );
    Ok(())
}

async fn run_watch(config: TransferConfig) -> Result<()> {
    let store = blob_store::build_client(&config.blob_storage)?;
    let watcher = DirectoryWatcher::new(&config, store)?;
    watcher
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("unable to listen for shutdown signal: {:?}", e);
            }
        })
        .await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli.config.as_ref().map(|p| p.to_string_lossy().to_string());
    let mut config = match TransferConfig::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error loading config: {:?}", err);
            return ExitCode::FAILURE;
        }
    };
    cli.command.apply(&mut config);

    let _log_guard = match setup_tracing(&config) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Error setting up logging: {:?}", err);
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        built = env!("VERGEN_BUILD_TIMESTAMP"),
        rustc = env!("VERGEN_RUSTC_SEMVER"),
        "starting feed-transfer"
    );

    let result = match cli.command {
        Commands::Transfer { .. } => {
            run_transfer(config)
                .instrument(info_span!("transfer"))
                .await
        }
        Commands::Watch { .. } => run_watch(config).instrument(info_span!("watch")).await,
    };
    if let Err(err) = result {
        error!("Aborting: {:?}", err);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
