//! Per-server bookkeeping for one coordination cycle
//!
//! A `ServerHolder` wraps one serving node's identity, capacity and segment
//! sets (resident, loading, dropping). Holders are rebuilt from discovery and
//! node inventory at the start of every cycle and thrown away at the end —
//! they are a cycle-scoped snapshot, never a source of truth.

use crate::common::NodeState;
use crate::segment::{Segment, SegmentId};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// One serving node, as the balancer sees it
#[derive(Debug, Clone)]
pub struct ServerHolder {
    name: String,
    tier: String,
    state: NodeState,
    max_size_bytes: u64,
    /// Segments reported resident by node inventory
    served: HashMap<SegmentId, Segment>,
    /// Segments queued to load: reported in-flight plus planned this cycle
    loading: HashMap<SegmentId, Segment>,
    /// Segments queued to drop: reported in-flight plus planned this cycle
    dropping: HashSet<SegmentId>,
}

impl ServerHolder {
    pub fn new(name: impl Into<String>, tier: impl Into<String>, max_size_bytes: u64) -> Self {
        Self {
            name: name.into(),
            tier: tier.into(),
            state: NodeState::Alive,
            max_size_bytes,
            served: HashMap::new(),
            loading: HashMap::new(),
            dropping: HashSet::new(),
        }
    }

    pub fn with_state(mut self, state: NodeState) -> Self {
        self.state = state;
        self
    }

    /// Seed the holder with the node's reported inventory. In-flight queues
    /// carried over here are what keeps re-planning from double-issuing.
    pub fn with_inventory(
        mut self,
        loaded: Vec<Segment>,
        queued_loads: Vec<Segment>,
        queued_drops: Vec<SegmentId>,
    ) -> Self {
        for segment in loaded {
            self.served.insert(segment.id(), segment);
        }
        for segment in queued_loads {
            self.loading.insert(segment.id(), segment);
        }
        self.dropping.extend(queued_drops);
        self
    }

    // === Identity & capacity ===

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tier(&self) -> &str {
        &self.tier
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    /// Bytes resident plus in flight. Segments queued to drop still count
    /// until the node confirms the drop, so a server may transiently sit
    /// above its capacity target while a drop completes.
    pub fn size_used(&self) -> u64 {
        self.served.values().map(|s| s.size_bytes).sum::<u64>()
            + self.loading.values().map(|s| s.size_bytes).sum::<u64>()
    }

    pub fn available_size(&self) -> u64 {
        self.max_size_bytes.saturating_sub(self.size_used())
    }

    pub fn percent_used(&self) -> f64 {
        if self.max_size_bytes == 0 {
            return 100.0;
        }
        100.0 * self.size_used() as f64 / self.max_size_bytes as f64
    }

    // === Segment-state queries ===

    pub fn is_serving(&self, id: &SegmentId) -> bool {
        self.served.contains_key(id)
    }

    pub fn is_loading(&self, id: &SegmentId) -> bool {
        self.loading.contains_key(id)
    }

    pub fn is_dropping(&self, id: &SegmentId) -> bool {
        self.dropping.contains(id)
    }

    /// Does this server hold the segment in any form that counts as a
    /// replica (resident or on its way)?
    pub fn has_segment(&self, id: &SegmentId) -> bool {
        self.served.contains_key(id) || self.loading.contains_key(id)
    }

    /// Does this server count as a replica for planning purposes? A
    /// segment queued to drop is on its way out and no longer counts.
    pub fn holds_replica(&self, id: &SegmentId) -> bool {
        self.has_segment(id) && !self.dropping.contains(id)
    }

    /// Can this server take a new replica of `segment`?
    pub fn can_load(&self, segment: &Segment) -> bool {
        let id = segment.id();
        self.state.can_load()
            && !self.has_segment(&id)
            && !self.dropping.contains(&id)
            && self.available_size() >= segment.size_bytes
    }

    pub fn served_count(&self) -> usize {
        self.served.len()
    }

    pub fn loading_count(&self) -> usize {
        self.loading.len()
    }

    pub fn served_segments(&self) -> impl Iterator<Item = &Segment> {
        self.served.values()
    }

    /// Segments eligible as move candidates: resident, not already being
    /// dropped.
    pub fn movable_segments(&self) -> impl Iterator<Item = &Segment> {
        self.served
            .iter()
            .filter(|(id, _)| !self.dropping.contains(*id))
            .map(|(_, s)| s)
    }

    // === Planning bookkeeping ===

    /// Record a planned load so later decisions in the same cycle see it.
    pub fn start_loading(&mut self, segment: Segment) {
        self.loading.insert(segment.id(), segment);
    }

    /// Record a planned drop. The segment stays in the served set (and in
    /// `size_used`) until the node confirms on a later cycle's inventory.
    pub fn start_dropping(&mut self, id: SegmentId) {
        self.dropping.insert(id);
    }

    pub fn summary(&self) -> ServerSummary {
        ServerSummary {
            name: self.name.clone(),
            tier: self.tier.clone(),
            state: self.state,
            segments: self.served.len(),
            loading: self.loading.len(),
            dropping: self.dropping.len(),
            size_used_bytes: self.size_used(),
            max_size_bytes: self.max_size_bytes,
            percent_used: self.percent_used(),
        }
    }
}

/// Read-only view of a holder for the admin API
#[derive(Debug, Clone, Serialize)]
pub struct ServerSummary {
    pub name: String,
    pub tier: String,
    pub state: NodeState,
    pub segments: usize,
    pub loading: usize,
    pub dropping: usize,
    pub size_used_bytes: u64,
    pub max_size_bytes: u64,
    pub percent_used: f64,
}
