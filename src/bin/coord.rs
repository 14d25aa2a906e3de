//! Coordinator binary

use clap::{Parser, Subcommand};
use minizero::common::{parse_duration, Config, WalSyncPolicy, ZeroConfig};
use minizero::ZeroServer;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "minizero-coord")]
#[command(about = "minizero membership and tablet coordinator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start coordinator server
    Serve {
        /// Bind address for HTTP
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Commit log file
        #[arg(long)]
        wal: Option<PathBuf>,

        /// Target replicas per group
        #[arg(long)]
        replicas: Option<usize>,

        /// Connection probe timeout (e.g. "2s", "500ms")
        #[arg(long)]
        probe_timeout: Option<String>,

        /// always | interval | never
        #[arg(long)]
        wal_sync: Option<WalSyncPolicy>,

        /// Keep the commit log in memory only
        #[arg(long)]
        ephemeral: bool,
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
            bind,
            wal,
            replicas,
            probe_timeout,
            wal_sync,
            ephemeral,
        } => {
            // File/env config first, CLI flags win
            let mut config: ZeroConfig = Config::load().zero.unwrap_or_default();
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            if let Some(wal) = wal {
                config.wal_path = wal;
            }
            if let Some(replicas) = replicas {
                config.num_replicas = replicas;
            }
            if let Some(timeout) = probe_timeout {
                config.probe_timeout_ms = parse_duration(&timeout)?.as_millis() as u64;
            }
            if let Some(policy) = wal_sync {
                config.wal_sync = policy;
            }
            config.ephemeral |= ephemeral;
            config.validate()?;

            ZeroServer::new(config).serve().await?;
        }
    }

    Ok(())
}
