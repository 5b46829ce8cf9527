//! Coordinator server
//!
//! Wires configuration into collaborator adapters, starts the discovery
//! watcher and the reconciliation loop, and serves the admin HTTP API until
//! shutdown.

use crate::cluster::{
    DiscoveryWatcher, HttpNodeClient, HttpNodeDiscovery, HttpRuleSource, HttpSegmentCatalog,
    LogStatsSink,
};
use crate::common::{Config, Result};
use crate::coordinator::http::{create_router, AdminState};
use crate::coordinator::runner::{ClusterHandles, CoordinatorRunner};
use std::future::IntoFuture;
use std::sync::Arc;

pub struct Coordinator {
    config: Config,
}

impl Coordinator {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn serve(self) -> Result<()> {
        self.config.validate()?;

        tracing::info!("Starting coordinator: {}", self.config.node_id);
        tracing::info!("  Admin API: {}", self.config.bind_addr);
        tracing::info!("  Metadata service: {}", self.config.metadata_url);
        tracing::info!(
            "  Cycle period: {:?}, strategy: {:?}",
            self.config.coordination.cycle_period(),
            self.config.balancer.strategy
        );

        let client = reqwest::Client::builder()
            .timeout(self.config.request_timeout())
            .build()?;

        let discovery = Arc::new(HttpNodeDiscovery::new(
            self.config.metadata_url.clone(),
            client.clone(),
        ));
        let node_client = Arc::new(HttpNodeClient::new(client.clone()));
        let handles = ClusterHandles {
            catalog: Arc::new(HttpSegmentCatalog::new(
                self.config.metadata_url.clone(),
                client.clone(),
            )),
            discovery: discovery.clone(),
            inventory: node_client.clone(),
            commands: node_client,
            rules: Arc::new(HttpRuleSource::new(self.config.metadata_url.clone(), client)),
            stats: Arc::new(LogStatsSink),
        };

        let watcher = DiscoveryWatcher::new(
            discovery,
            self.config.coordination.discovery_poll_period(),
            self.config.coordination.node_event_queue,
        );
        let (events, watcher_handle) = watcher.start();

        let runner = CoordinatorRunner::new(
            self.config.coordination.clone(),
            &self.config.balancer,
            handles,
            events,
        );
        let admin_state = AdminState {
            status: runner.status_handle(),
        };
        let runner_task = tokio::spawn(runner.run());

        let router = create_router(admin_state);
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!("✓ Coordinator ready");

        tokio::select! {
            res = axum::serve(listener, router).into_future() => {
                if let Err(e) = res {
                    tracing::error!("Admin API error: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
            }
        }

        runner_task.abort();
        watcher_handle.stop().await;

        Ok(())
    }
}
