//! Region directory binary

use clap::{Parser, Subcommand};
use minipd::{Config, Coordinator};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "minipd")]
#[command(about = "minipd region directory and split coordinator")]
#[command(version = minipd::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the region directory
    Serve {
        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Node ID
        #[arg(long)]
        node_id: Option<String>,

        /// Bind address for HTTP
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Stores replicating the first region (comma-separated)
        #[arg(long, value_delimiter = ',')]
        bootstrap_stores: Vec<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            node_id,
            bind,
            bootstrap_stores,
        } => {
            // File and environment first, CLI flags on top
            let mut config = Config::load(config.as_deref())?;
            if let Some(node_id) = node_id {
                config.node_id = node_id;
            }
            if let Some(bind) = bind {
                config.server.bind_addr = bind;
            }
            if !bootstrap_stores.is_empty() {
                config.cluster.bootstrap_stores = bootstrap_stores;
            }
            config.validate()?;

            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| config.log_level.clone().into()),
                )
                .with(tracing_subscriber::fmt::layer())
                .init();

            Coordinator::new(config).serve().await?;
        }
    }

    Ok(())
}
