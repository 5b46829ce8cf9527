//! Serving-node inventory and command boundaries
//!
//! Inventory is the node's own report of what it holds and what is in
//! flight; commands are fire-and-forget and idempotent on the receiving
//! side (re-issuing a load for a resident segment is a no-op there).

use crate::cluster::discovery::NodeInfo;
use crate::segment::{Segment, SegmentId};
use async_trait::async_trait;
use serde::Serialize;

/// Per-node segment inventory, as reported by the node itself
#[async_trait]
pub trait NodeInventory: Send + Sync {
    async fn loaded_segments(&self, node: &NodeInfo) -> crate::Result<Vec<Segment>>;
    async fn queued_loads(&self, node: &NodeInfo) -> crate::Result<Vec<Segment>>;
    async fn queued_drops(&self, node: &NodeInfo) -> crate::Result<Vec<SegmentId>>;
}

/// Load/drop command dispatch to a serving node
#[async_trait]
pub trait NodeCommand: Send + Sync {
    async fn issue_load(&self, node: &NodeInfo, segment: &Segment) -> crate::Result<()>;
    async fn issue_drop(&self, node: &NodeInfo, segment: &SegmentId) -> crate::Result<()>;
}

/// HTTP adapter for both inventory reads and command dispatch
pub struct HttpNodeClient {
    client: reqwest::Client,
}

impl HttpNodeClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        node: &NodeInfo,
        path: &str,
    ) -> crate::Result<T> {
        let url = format!("{}{}", node.address, path);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(crate::Error::ConnectionFailed(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }
        Ok(response.json().await?)
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        node: &NodeInfo,
        path: &str,
        body: &B,
    ) -> crate::Result<()> {
        let url = format!("{}{}", node.address, path);
        let response = self.client.post(&url).json(body).send().await?;
        if !response.status().is_success() {
            return Err(crate::Error::DispatchFailed {
                server: node.name.clone(),
                reason: format!("{} returned {}", url, response.status()),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl NodeInventory for HttpNodeClient {
    async fn loaded_segments(&self, node: &NodeInfo) -> crate::Result<Vec<Segment>> {
        self.get_json(node, "/v1/segments/loaded").await
    }

    async fn queued_loads(&self, node: &NodeInfo) -> crate::Result<Vec<Segment>> {
        self.get_json(node, "/v1/segments/loading").await
    }

    async fn queued_drops(&self, node: &NodeInfo) -> crate::Result<Vec<SegmentId>> {
        self.get_json(node, "/v1/segments/dropping").await
    }
}

#[async_trait]
impl NodeCommand for HttpNodeClient {
    async fn issue_load(&self, node: &NodeInfo, segment: &Segment) -> crate::Result<()> {
        self.post_json(node, "/v1/segments/load", segment).await
    }

    async fn issue_drop(&self, node: &NodeInfo, segment: &SegmentId) -> crate::Result<()> {
        self.post_json(node, "/v1/segments/drop", segment).await
    }
}
