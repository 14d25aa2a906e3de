//! Coordinator server

use crate::common::{Result, ZeroConfig};
use crate::coordinator::commit_log::{CommitLog, MemoryCommitLog, WalCommitLog};
use crate::coordinator::http::{create_router, ZeroState};
use crate::coordinator::probe::{ChannelProbe, ConnectionProbe};
use crate::coordinator::registry::MembershipRegistry;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct ZeroServer {
    config: ZeroConfig,
}

impl ZeroServer {
    pub fn new(config: ZeroConfig) -> Self {
        Self { config }
    }

    /// Open the commit log and rebuild the registry from it
    pub async fn build_registry(&self) -> Result<Arc<MembershipRegistry>> {
        self.config.validate()?;

        let log: Arc<dyn CommitLog> = if self.config.ephemeral {
            tracing::warn!("Running with an in-memory commit log; state will not survive restarts");
            Arc::new(MemoryCommitLog::new())
        } else {
            Arc::new(WalCommitLog::open(
                &self.config.wal_path,
                self.config.wal_sync,
            )?)
        };
        let probe: Arc<dyn ConnectionProbe> =
            Arc::new(ChannelProbe::new(self.config.probe_timeout()));

        let registry = MembershipRegistry::recover(self.config.num_replicas, log, probe).await?;
        Ok(Arc::new(registry))
    }

    /// Serve until ctrl-c
    pub async fn serve(self) -> Result<()> {
        tracing::info!("Starting zero coordinator");
        tracing::info!("  HTTP API: {}", self.config.bind_addr);
        tracing::info!("  Commit log: {}", self.config.wal_path.display());
        tracing::info!("  Replicas per group: {}", self.config.num_replicas);

        let registry = self.build_registry().await?;
        let listener = TcpListener::bind(self.config.bind_addr).await?;

        run(listener, registry, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutting down");
        })
        .await
    }
}

/// Serve the coordinator API on `listener` until `shutdown` resolves
pub async fn run(
    listener: TcpListener,
    registry: Arc<MembershipRegistry>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let router = create_router(ZeroState { registry });
    tracing::info!("Coordinator ready on {}", listener.local_addr()?);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
