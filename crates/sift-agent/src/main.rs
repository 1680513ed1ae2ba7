//! Host binary: loads a pipeline configuration, runs it until interrupted.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use sift_core::{AgentConfig, BuildContext, Database, Pipeline};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "sift-agent", about = "A pipeline-based log collection agent")]
struct Cli {
    /// Path to the pipeline configuration (YAML).
    #[arg(long)]
    config: PathBuf,

    /// Path to the offset database. Offsets are kept in memory when omitted.
    #[arg(long)]
    database: Option<PathBuf>,

    /// Log level for agent diagnostics.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "agent failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    sift_operators::register_defaults();

    let raw = std::fs::read_to_string(&cli.config)?;
    let config = AgentConfig::from_yaml(&raw)?;

    let database = match &cli.database {
        Some(path) => Database::open(path)?,
        None => Database::ephemeral()?,
    };
    let context = BuildContext::new(database.clone());

    let operators = config.build(&context)?;
    let mut pipeline = Pipeline::new(operators)?;

    pipeline.start().await?;
    info!(operators = pipeline.operators().len(), "pipeline started");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    pipeline.stop().await;
    database.flush()?;
    Ok(())
}
