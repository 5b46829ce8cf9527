//! In-memory cluster collaborators for integration tests
//!
//! One `MemoryCluster` plays the metadata service and every serving node:
//! the catalog hands out records, discovery lists nodes, inventory reports
//! each node's shadow state, and issued commands land in per-node queues
//! that stay pending until a test calls `apply_queues` — mirroring how real
//! nodes complete work between coordination cycles.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use strata::cluster::{
    NodeCommand, NodeDiscovery, NodeInfo, NodeInventory, SegmentCatalog, SegmentRecord, StatsSink,
};
use strata::common::NodeState;
use strata::segment::{Segment, SegmentId};

#[derive(Default)]
struct NodeShadow {
    loaded: Vec<Segment>,
    queued_loads: Vec<Segment>,
    queued_drops: Vec<SegmentId>,
}

struct Inner {
    nodes: HashMap<String, (NodeInfo, NodeShadow)>,
    records: Vec<SegmentRecord>,
}

pub struct MemoryCluster {
    inner: Mutex<Inner>,
}

impl MemoryCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                nodes: HashMap::new(),
                records: Vec::new(),
            }),
        })
    }

    pub fn add_node(&self, name: &str, tier: &str, capacity_bytes: u64) {
        let info = NodeInfo {
            name: name.to_string(),
            address: format!("mem://{}", name),
            tier: tier.to_string(),
            capacity_bytes,
            state: NodeState::Alive,
        };
        self.inner
            .lock()
            .unwrap()
            .nodes
            .insert(name.to_string(), (info, NodeShadow::default()));
    }

    pub fn add_segment(&self, segment: &Segment) {
        self.inner
            .lock()
            .unwrap()
            .records
            .push(SegmentRecord::from_segment(segment));
    }

    pub fn add_raw_record(&self, record: SegmentRecord) {
        self.inner.lock().unwrap().records.push(record);
    }

    /// Preload a segment directly onto a node, bypassing the queues.
    pub fn preload(&self, node: &str, segment: &Segment) {
        let mut inner = self.inner.lock().unwrap();
        let (_, shadow) = inner.nodes.get_mut(node).expect("unknown node");
        shadow.loaded.push(segment.clone());
    }

    /// Complete all in-flight work, as the nodes would between cycles.
    pub fn apply_queues(&self) {
        let mut inner = self.inner.lock().unwrap();
        for (_, shadow) in inner.nodes.values_mut() {
            let loads = std::mem::take(&mut shadow.queued_loads);
            shadow.loaded.extend(loads);
            let drops = std::mem::take(&mut shadow.queued_drops);
            shadow.loaded.retain(|s| !drops.contains(&s.id()));
        }
    }

    /// Nodes where the segment is confirmed loaded.
    pub fn loaded_on(&self, id: &SegmentId) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        let mut names: Vec<String> = inner
            .nodes
            .iter()
            .filter(|(_, (_, shadow))| shadow.loaded.iter().any(|s| &s.id() == id))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn queued_load_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner
            .nodes
            .values()
            .map(|(_, shadow)| shadow.queued_loads.len())
            .sum()
    }
}

#[async_trait]
impl SegmentCatalog for MemoryCluster {
    async fn used_segments(&self) -> strata::Result<Vec<SegmentRecord>> {
        Ok(self.inner.lock().unwrap().records.clone())
    }
}

#[async_trait]
impl NodeDiscovery for MemoryCluster {
    async fn current_servers(&self, tier: Option<&str>) -> strata::Result<Vec<NodeInfo>> {
        let inner = self.inner.lock().unwrap();
        let mut servers: Vec<NodeInfo> = inner
            .nodes
            .values()
            .map(|(info, _)| info.clone())
            .filter(|info| tier.map_or(true, |t| info.tier == t))
            .collect();
        servers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(servers)
    }
}

#[async_trait]
impl NodeInventory for MemoryCluster {
    async fn loaded_segments(&self, node: &NodeInfo) -> strata::Result<Vec<Segment>> {
        let inner = self.inner.lock().unwrap();
        let (_, shadow) = inner
            .nodes
            .get(&node.name)
            .ok_or_else(|| strata::Error::UnknownServer(node.name.clone()))?;
        Ok(shadow.loaded.clone())
    }

    async fn queued_loads(&self, node: &NodeInfo) -> strata::Result<Vec<Segment>> {
        let inner = self.inner.lock().unwrap();
        let (_, shadow) = inner
            .nodes
            .get(&node.name)
            .ok_or_else(|| strata::Error::UnknownServer(node.name.clone()))?;
        Ok(shadow.queued_loads.clone())
    }

    async fn queued_drops(&self, node: &NodeInfo) -> strata::Result<Vec<SegmentId>> {
        let inner = self.inner.lock().unwrap();
        let (_, shadow) = inner
            .nodes
            .get(&node.name)
            .ok_or_else(|| strata::Error::UnknownServer(node.name.clone()))?;
        Ok(shadow.queued_drops.clone())
    }
}

#[async_trait]
impl NodeCommand for MemoryCluster {
    async fn issue_load(&self, node: &NodeInfo, segment: &Segment) -> strata::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let (_, shadow) = inner
            .nodes
            .get_mut(&node.name)
            .ok_or_else(|| strata::Error::UnknownServer(node.name.clone()))?;
        let id = segment.id();
        // idempotent on the receiving side
        if shadow.loaded.iter().any(|s| s.id() == id)
            || shadow.queued_loads.iter().any(|s| s.id() == id)
        {
            return Ok(());
        }
        shadow.queued_loads.push(segment.clone());
        Ok(())
    }

    async fn issue_drop(&self, node: &NodeInfo, segment: &SegmentId) -> strata::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let (_, shadow) = inner
            .nodes
            .get_mut(&node.name)
            .ok_or_else(|| strata::Error::UnknownServer(node.name.clone()))?;
        if !shadow.queued_drops.contains(segment) {
            shadow.queued_drops.push(segment.clone());
        }
        Ok(())
    }
}

/// Sink that records every flushed stat for assertions.
#[derive(Default)]
pub struct CapturingSink {
    reports: Mutex<Vec<(String, String, u64)>>,
}

impl CapturingSink {
    pub fn reported(&self, tier: &str, stat: &str) -> Option<u64> {
        self.reports
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(t, s, _)| t == tier && s == stat)
            .map(|(_, _, v)| *v)
    }
}

impl StatsSink for CapturingSink {
    fn report(&self, tier: &str, stat: &str, value: u64) {
        self.reports
            .lock()
            .unwrap()
            .push((tier.to_string(), stat.to_string(), value));
    }
}

/// Let fire-and-forget dispatch tasks run to completion.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
