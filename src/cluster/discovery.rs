//! Node discovery boundary
//!
//! Discovery is an explicit service handle passed into the loop at
//! construction, with a start/stop lifecycle — never ambient global state.
//! Membership changes reach the loop through a bounded single-consumer
//! channel, so there is exactly one in-flight delivery at a time by
//! construction rather than by caller discipline.

use crate::common::NodeState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// One serving node as discovery reports it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Unique host identity
    pub name: String,
    /// Base URL for inventory/command HTTP calls
    pub address: String,
    pub tier: String,
    pub capacity_bytes: u64,
    pub state: NodeState,
}

/// Membership change event delivered to the loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    Added(NodeInfo),
    Removed(String),
}

/// Access to current cluster membership
#[async_trait]
pub trait NodeDiscovery: Send + Sync {
    /// Current serving nodes, optionally limited to one tier.
    async fn current_servers(&self, tier: Option<&str>) -> crate::Result<Vec<NodeInfo>>;
}

/// Discovery adapter over the metadata service's HTTP API
pub struct HttpNodeDiscovery {
    base_url: String,
    client: reqwest::Client,
}

impl HttpNodeDiscovery {
    pub fn new(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into(),
            client,
        }
    }
}

#[async_trait]
impl NodeDiscovery for HttpNodeDiscovery {
    async fn current_servers(&self, tier: Option<&str>) -> crate::Result<Vec<NodeInfo>> {
        let mut url = format!("{}/v1/servers", self.base_url);
        if let Some(tier) = tier {
            url = format!("{}?tier={}", url, tier);
        }
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(crate::Error::Discovery(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }
        Ok(response.json().await?)
    }
}

/// Polls discovery and turns membership diffs into `NodeEvent`s on a
/// bounded channel. A full channel drops the event and keeps polling; the
/// loop's next full snapshot catches anything missed.
pub struct DiscoveryWatcher {
    discovery: std::sync::Arc<dyn NodeDiscovery>,
    poll_period: Duration,
    queue_capacity: usize,
}

/// Handle to a running watcher; dropping or calling `stop` ends it.
pub struct WatcherHandle {
    stop: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

impl WatcherHandle {
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        let _ = self.task.await;
    }
}

impl DiscoveryWatcher {
    pub fn new(
        discovery: std::sync::Arc<dyn NodeDiscovery>,
        poll_period: Duration,
        queue_capacity: usize,
    ) -> Self {
        Self {
            discovery,
            poll_period,
            queue_capacity,
        }
    }

    /// Start the poll task. Returns the event receiver (single consumer)
    /// and a stop handle.
    pub fn start(self) -> (mpsc::Receiver<NodeEvent>, WatcherHandle) {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut known: HashMap<String, NodeInfo> = HashMap::new();
            let mut ticker = tokio::time::interval(self.poll_period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    res = stop_rx.changed() => {
                        // stop requested, or the handle is gone
                        if res.is_err() || *stop_rx.borrow() {
                            return;
                        }
                    }
                }

                let current = match self.discovery.current_servers(None).await {
                    Ok(servers) => servers,
                    Err(e) => {
                        tracing::warn!("discovery poll failed: {}", e);
                        continue;
                    }
                };

                let mut seen: HashMap<String, NodeInfo> = HashMap::new();
                for node in current {
                    if !known.contains_key(&node.name) {
                        if tx.try_send(NodeEvent::Added(node.clone())).is_err() {
                            tracing::warn!("node event queue full, dropping add for {}", node.name);
                        }
                    }
                    seen.insert(node.name.clone(), node);
                }
                for name in known.keys() {
                    if !seen.contains_key(name) {
                        if tx.try_send(NodeEvent::Removed(name.clone())).is_err() {
                            tracing::warn!("node event queue full, dropping removal for {}", name);
                        }
                    }
                }
                known = seen;
            }
        });

        (
            rx,
            WatcherHandle {
                stop: stop_tx,
                task,
            },
        )
    }
}
