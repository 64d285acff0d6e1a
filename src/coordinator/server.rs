//! Coordinator server

use crate::common::{Config, Result};
use crate::coordinator::cluster::RegionCluster;
use crate::coordinator::http::{create_router, CoordState};
use crate::coordinator::id_alloc::LocalIdAllocator;
use std::sync::Arc;

pub struct Coordinator {
    config: Config,
}

impl Coordinator {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Build the directory, bootstrapping it when stores are configured.
    pub fn build_cluster(&self) -> Result<Arc<RegionCluster>> {
        let cluster_config = self.config.cluster.clone();
        let id_alloc = Arc::new(LocalIdAllocator::new(cluster_config.id_alloc_start));
        let cluster = Arc::new(RegionCluster::new(cluster_config, id_alloc));

        if self.config.cluster.bootstrap_stores.is_empty() {
            tracing::info!("No bootstrap stores configured, rebuilding directory from heartbeats");
        } else {
            let region = cluster.bootstrap(&self.config.cluster.bootstrap_stores)?;
            tracing::info!("  Bootstrap region: {}", region);
        }
        Ok(cluster)
    }

    pub async fn serve(self) -> Result<()> {
        tracing::info!("Starting region directory: {}", self.config.node_id);
        tracing::info!("  HTTP API: {}", self.config.server.bind_addr);
        tracing::info!("  Max batch split: {}", self.config.cluster.max_batch_split);

        let cluster = self.build_cluster()?;
        let router = create_router(
            CoordState {
                cluster: cluster.clone(),
            },
            self.config.server.max_body_bytes,
        );

        let listener = tokio::net::TcpListener::bind(self.config.server.bind_addr).await?;
        tracing::info!("✓ Region directory ready ({} regions)", cluster.region_count());

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Region directory stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
