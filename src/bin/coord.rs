//! Coordinator binary

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use strata::{common::Config, Coordinator};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "strata-coord")]
#[command(about = "strata cluster coordinator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the coordinator
    Serve {
        /// Node ID
        #[arg(long)]
        id: Option<String>,

        /// Bind address for the admin HTTP API
        #[arg(long)]
        bind: Option<String>,

        /// Base URL of the metadata service
        #[arg(long)]
        metadata: Option<String>,

        /// Config file (TOML); defaults to ./strata.toml when present
        #[arg(long)]
        config: Option<PathBuf>,

        /// Coordination cycle period (e.g. "30s", "5m")
        #[arg(long)]
        period: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            id,
            bind,
            metadata,
            config,
            period,
        } => {
            // Load config from file/env, then override with CLI arguments
            let mut config = Config::load(config.as_deref())?;
            if let Some(id) = id {
                config.node_id = id;
            }
            if let Some(bind) = bind {
                config.bind_addr = bind.parse()?;
            }
            if let Some(metadata) = metadata {
                config.metadata_url = metadata;
            }
            if let Some(period) = period {
                config.coordination.cycle_period_ms =
                    strata::common::parse_duration(&period)?.as_millis() as u64;
            }

            let coordinator = Coordinator::new(config);
            coordinator.serve().await?;
        }
    }

    Ok(())
}
