//! The reconciliation loop
//!
//! One repeating cycle: gather cluster state, compute rule targets, plan a
//! bounded set of load/drop/move actions, dispatch them fire-and-forget,
//! flush stats. Cycles never overlap and never block on remote completion —
//! an issued command is only believed once a later cycle's inventory
//! confirms it. There is no fatal error path inside a cycle: entities that
//! fail validation are excluded and counted, and a cycle that skipped some
//! of them is still a valid cycle.

use crate::cluster::{
    NodeCommand, NodeDiscovery, NodeEvent, NodeInfo, NodeInventory, RuleSource, SegmentCatalog,
    StatsSink,
};
use crate::common::config::{BalancerConfig, CoordinationConfig};
use crate::common::METRICS;
use crate::coordinator::balancer::BalancerStrategy;
use crate::coordinator::rules::{Fate, Rule, RuleEngine};
use crate::coordinator::server_holder::{ServerHolder, ServerSummary};
use crate::coordinator::stats::{stat, CoordinatorStats};
use crate::segment::{Segment, SegmentId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio::sync::mpsc;

/// Phase of the cycle state machine, observable on the admin API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    #[default]
    Idle,
    GatheringState,
    ComputingTargets,
    PlanningActions,
    IssuingActions,
    ReportingStats,
}

/// A planned command, produced by planning and consumed by issuing
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    Load {
        server: String,
        segment: Segment,
    },
    Drop {
        server: String,
        segment_id: SegmentId,
    },
    /// A balancer move dispatches a load to `to`; the surplus replica on
    /// `from` is dropped by a later cycle's over-replication handling once
    /// the destination confirms the segment.
    Move {
        from: String,
        to: String,
        segment: Segment,
    },
}

impl Action {
    /// The server this action dispatches to
    fn target(&self) -> &str {
        match self {
            Action::Load { server, .. } | Action::Drop { server, .. } => server,
            Action::Move { to, .. } => to,
        }
    }
}

/// Everything one cycle works from; rebuilt from scratch every cycle
pub struct ClusterSnapshot {
    pub servers: Vec<ServerHolder>,
    pub nodes: HashMap<String, NodeInfo>,
    pub segments: Vec<Segment>,
    pub rules_by_datasource: HashMap<String, Vec<Rule>>,
}

/// Summary of one completed cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub duration_ms: u64,
    pub segments: usize,
    pub servers: usize,
    pub loads_issued: usize,
    pub drops_issued: usize,
    pub moves_issued: usize,
    pub stats: CoordinatorStats,
}

/// Mutable status shared with the admin API
#[derive(Debug, Clone, Default, Serialize)]
pub struct CoordinatorStatus {
    pub phase: CyclePhase,
    pub cycles_completed: u64,
    /// True once the first cycle has completed
    pub ready: bool,
    pub last_report: Option<CycleReport>,
    pub servers: Vec<ServerSummary>,
}

/// The external collaborators one runner talks to
pub struct ClusterHandles {
    pub catalog: Arc<dyn SegmentCatalog>,
    pub discovery: Arc<dyn NodeDiscovery>,
    pub inventory: Arc<dyn NodeInventory>,
    pub commands: Arc<dyn NodeCommand>,
    pub rules: Arc<dyn RuleSource>,
    pub stats: Arc<dyn StatsSink>,
}

/// Turns rule-derived targets and cluster state into a bounded action set.
///
/// Planning is pure bookkeeping over the cycle's `ServerHolder`s: every
/// planned load/drop is recorded on the holder immediately, so later
/// decisions in the same pass (and re-planning against the mutated
/// snapshot) see in-flight work and never double-issue.
pub struct Planner<'a> {
    config: &'a CoordinationConfig,
    strategy: &'a mut BalancerStrategy,
}

impl<'a> Planner<'a> {
    pub fn new(config: &'a CoordinationConfig, strategy: &'a mut BalancerStrategy) -> Self {
        Self { config, strategy }
    }

    pub fn plan(
        &mut self,
        servers: &mut Vec<ServerHolder>,
        fates: &[(Segment, Fate)],
        stats: &mut CoordinatorStats,
    ) -> Vec<Action> {
        let mut actions = Vec::new();
        let mut loads_planned = 0usize;

        for (segment, fate) in fates {
            match fate {
                Fate::Load { tiered_replicants } => {
                    self.plan_replication(
                        servers,
                        segment,
                        tiered_replicants,
                        stats,
                        &mut actions,
                        &mut loads_planned,
                    );
                }
                Fate::Drop => {
                    self.plan_full_drop(servers, segment, stats, &mut actions);
                }
            }
        }

        self.plan_moves(servers, fates, stats, &mut actions, &mut loads_planned);

        // per-tier utilization spread, recorded by the strategy
        let tiers: BTreeSet<String> = servers.iter().map(|s| s.tier().to_string()).collect();
        for tier in &tiers {
            let in_tier: Vec<&ServerHolder> =
                servers.iter().filter(|s| s.tier() == tier).collect();
            self.strategy.emit_stats(tier, stats, &in_tier);
        }

        actions
    }

    fn plan_replication(
        &mut self,
        servers: &mut Vec<ServerHolder>,
        segment: &Segment,
        targets: &std::collections::BTreeMap<String, usize>,
        stats: &mut CoordinatorStats,
        actions: &mut Vec<Action>,
        loads_planned: &mut usize,
    ) {
        let id = segment.id();

        // every tier that wants replicas, plus every tier currently holding
        // one (those converge to a target of zero)
        let mut tiers: BTreeSet<String> = targets.keys().cloned().collect();
        for server in servers.iter() {
            if server.holds_replica(&id) {
                tiers.insert(server.tier().to_string());
            }
        }

        for tier in tiers {
            let target = targets.get(&tier).copied().unwrap_or(0);
            let current = servers
                .iter()
                .filter(|s| s.tier() == tier && s.holds_replica(&id))
                .count();

            if current < target {
                for _ in current..target {
                    if *loads_planned >= self.config.max_loads_per_cycle {
                        stats.add_tiered(stat::DEFERRED, &tier, 1);
                        continue;
                    }
                    let candidates: Vec<&ServerHolder> = servers
                        .iter()
                        .filter(|s| {
                            s.tier() == tier
                                && s.loading_count() < self.config.max_loads_per_server
                        })
                        .collect();
                    match self.strategy.find_server_for_new_replica(segment, &candidates) {
                        Some(name) => {
                            if let Some(holder) =
                                servers.iter_mut().find(|s| s.name() == name)
                            {
                                holder.start_loading(segment.clone());
                            }
                            actions.push(Action::Load {
                                server: name,
                                segment: segment.clone(),
                            });
                            stats.add_tiered(stat::ASSIGNED, &tier, 1);
                            *loads_planned += 1;
                        }
                        None => {
                            tracing::debug!(
                                segment = %id,
                                tier = %tier,
                                "no eligible server for replica"
                            );
                            stats.add_tiered(stat::UNASSIGNED, &tier, 1);
                            stats.add_tiered(stat::UNASSIGNED_BYTES, &tier, segment.size_bytes);
                            break;
                        }
                    }
                }
            } else if current > target {
                let excess = current - target;
                let holding: Vec<&ServerHolder> = servers
                    .iter()
                    .filter(|s| s.tier() == tier && s.holds_replica(&id))
                    .collect();
                let order = self.strategy.pick_servers_to_drop(segment, &holding);
                for name in order.into_iter().take(excess) {
                    if let Some(holder) = servers.iter_mut().find(|s| s.name() == name) {
                        holder.start_dropping(id.clone());
                    }
                    actions.push(Action::Drop {
                        server: name,
                        segment_id: id.clone(),
                    });
                    stats.add_tiered(stat::DROPPED, &tier, 1);
                }
            }
        }
    }

    fn plan_full_drop(
        &mut self,
        servers: &mut Vec<ServerHolder>,
        segment: &Segment,
        stats: &mut CoordinatorStats,
        actions: &mut Vec<Action>,
    ) {
        let id = segment.id();
        let holding: Vec<&ServerHolder> = servers
            .iter()
            .filter(|s| s.holds_replica(&id))
            .collect();
        if holding.is_empty() {
            return;
        }
        let tier_of: HashMap<String, String> = holding
            .iter()
            .map(|s| (s.name().to_string(), s.tier().to_string()))
            .collect();

        let order = self.strategy.pick_servers_to_drop(segment, &holding);
        for name in order {
            if let Some(holder) = servers.iter_mut().find(|s| s.name() == name) {
                holder.start_dropping(id.clone());
            }
            if let Some(tier) = tier_of.get(&name) {
                stats.add_tiered(stat::DROPPED, tier, 1);
            }
            actions.push(Action::Drop {
                server: name,
                segment_id: id.clone(),
            });
        }
    }

    fn plan_moves(
        &mut self,
        servers: &mut Vec<ServerHolder>,
        fates: &[(Segment, Fate)],
        stats: &mut CoordinatorStats,
        actions: &mut Vec<Action>,
        loads_planned: &mut usize,
    ) {
        let fate_by_id: HashMap<SegmentId, &Fate> =
            fates.iter().map(|(s, f)| (s.id(), f)).collect();

        for _ in 0..self.config.max_segments_to_move {
            if *loads_planned >= self.config.max_loads_per_cycle {
                break;
            }
            let Some(candidate) = self.strategy.pick_segment_to_move(servers) else {
                break;
            };
            let id = candidate.segment.id();

            // only move segments the rules still want somewhere
            match fate_by_id.get(&id) {
                Some(Fate::Load { .. }) => {}
                _ => continue,
            }

            let Some(source_tier) = servers
                .iter()
                .find(|s| s.name() == candidate.server)
                .map(|s| s.tier().to_string())
            else {
                continue;
            };

            let destinations: Vec<&ServerHolder> = servers
                .iter()
                .filter(|s| {
                    s.tier() == source_tier
                        && s.name() != candidate.server
                        && s.loading_count() < self.config.max_loads_per_server
                })
                .collect();

            match self
                .strategy
                .find_server_for_balancer_move(&candidate.segment, &destinations)
            {
                Some(dest) => {
                    if let Some(holder) = servers.iter_mut().find(|s| s.name() == dest) {
                        holder.start_loading(candidate.segment.clone());
                    }
                    actions.push(Action::Move {
                        from: candidate.server.clone(),
                        to: dest,
                        segment: candidate.segment.clone(),
                    });
                    stats.add_tiered(stat::MOVED, &source_tier, 1);
                    *loads_planned += 1;
                }
                None => {
                    stats.add_tiered(stat::UNMOVED, &source_tier, 1);
                }
            }
        }
    }
}

/// The coordinator's reconciliation loop
pub struct CoordinatorRunner {
    config: CoordinationConfig,
    strategy: BalancerStrategy,
    engine: RuleEngine,
    handles: ClusterHandles,
    events: mpsc::Receiver<NodeEvent>,
    status: Arc<RwLock<CoordinatorStatus>>,
    cycles: u64,
}

impl CoordinatorRunner {
    pub fn new(
        config: CoordinationConfig,
        balancer: &BalancerConfig,
        handles: ClusterHandles,
        events: mpsc::Receiver<NodeEvent>,
    ) -> Self {
        let strategy = BalancerStrategy::from_config(balancer);
        let engine = RuleEngine::new(&config.default_fate);
        Self {
            config,
            strategy,
            engine,
            handles,
            events,
            status: Arc::new(RwLock::new(CoordinatorStatus::default())),
            cycles: 0,
        }
    }

    /// Shared status handle for the admin API
    pub fn status_handle(&self) -> Arc<RwLock<CoordinatorStatus>> {
        Arc::clone(&self.status)
    }

    /// Run cycles forever, one at a time, `cycle_period` apart.
    pub async fn run(mut self) {
        let period = self.config.cycle_period();
        loop {
            match self.run_cycle(Utc::now()).await {
                Ok(report) => {
                    tracing::info!(
                        cycle = report.cycle,
                        duration_ms = report.duration_ms,
                        segments = report.segments,
                        servers = report.servers,
                        loads = report.loads_issued,
                        drops = report.drops_issued,
                        moves = report.moves_issued,
                        "coordination cycle complete"
                    );
                }
                Err(e) => {
                    METRICS.cycle_errors.inc();
                    tracing::warn!("coordination cycle failed: {}", e);
                    self.set_phase(CyclePhase::Idle);
                }
            }
            tokio::time::sleep(period).await;
        }
    }

    /// One full reconciliation cycle at wall-clock `now`.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> crate::Result<CycleReport> {
        let started = Instant::now();
        let mut stats = CoordinatorStats::new();

        self.set_phase(CyclePhase::GatheringState);
        let mut snapshot = self.gather(&mut stats).await?;
        METRICS.segments_seen.set(snapshot.segments.len() as u64);
        METRICS.servers_seen.set(snapshot.servers.len() as u64);

        self.set_phase(CyclePhase::ComputingTargets);
        let fates = self.compute_targets(&snapshot, now);

        self.set_phase(CyclePhase::PlanningActions);
        let actions = Planner::new(&self.config, &mut self.strategy).plan(
            &mut snapshot.servers,
            &fates,
            &mut stats,
        );

        self.set_phase(CyclePhase::IssuingActions);
        let (loads_issued, drops_issued, moves_issued) =
            self.issue(actions, &snapshot.nodes, &mut stats);

        self.set_phase(CyclePhase::ReportingStats);
        self.cycles += 1;
        let report = CycleReport {
            cycle: self.cycles,
            duration_ms: started.elapsed().as_millis() as u64,
            segments: snapshot.segments.len(),
            servers: snapshot.servers.len(),
            loads_issued,
            drops_issued,
            moves_issued,
            stats: stats.clone(),
        };
        self.flush_stats(&stats);
        METRICS.cycles_total.inc();
        METRICS.cycle_duration_ms.observe(report.duration_ms as f64);

        {
            let mut status = self.status.write().unwrap();
            status.cycles_completed = self.cycles;
            status.ready = true;
            status.servers = snapshot.servers.iter().map(|s| s.summary()).collect();
            status.last_report = Some(report.clone());
        }
        self.set_phase(CyclePhase::Idle);

        Ok(report)
    }

    // === GatheringState ===

    async fn gather(&mut self, stats: &mut CoordinatorStats) -> crate::Result<ClusterSnapshot> {
        // stale membership events predate the authoritative snapshot below
        while self.events.try_recv().is_ok() {}

        let nodes = self.handles.discovery.current_servers(None).await?;

        let mut servers = Vec::with_capacity(nodes.len());
        let mut node_map = HashMap::with_capacity(nodes.len());
        for node in nodes {
            match self.gather_server(&node).await {
                Ok(holder) => {
                    servers.push(holder);
                    node_map.insert(node.name.clone(), node);
                }
                Err(e) => {
                    // inconsistent snapshot: the node is excluded for this
                    // cycle and re-examined on the next one
                    tracing::warn!("excluding server {} this cycle: {}", node.name, e);
                }
            }
        }

        let records = self.handles.catalog.used_segments().await?;
        let mut segments = Vec::with_capacity(records.len());
        for record in records {
            match record.validate() {
                Ok(segment) => segments.push(segment),
                Err(e) => {
                    stats.add_global(stat::MALFORMED_SEGMENTS, 1);
                    tracing::warn!("skipping malformed segment record: {}", e);
                }
            }
        }

        let rules_by_datasource = self.gather_rules(&segments, stats).await?;

        tracing::debug!(
            "gathered {} servers ({} capacity), {} used segments",
            servers.len(),
            crate::common::format_bytes(servers.iter().map(|s| s.max_size_bytes()).sum()),
            segments.len()
        );

        Ok(ClusterSnapshot {
            servers,
            nodes: node_map,
            segments,
            rules_by_datasource,
        })
    }

    async fn gather_server(&self, node: &NodeInfo) -> crate::Result<ServerHolder> {
        let loaded = self.handles.inventory.loaded_segments(node).await?;
        let queued_loads = self.handles.inventory.queued_loads(node).await?;
        let queued_drops = self.handles.inventory.queued_drops(node).await?;
        Ok(
            ServerHolder::new(&node.name, &node.tier, node.capacity_bytes)
                .with_state(node.state)
                .with_inventory(loaded, queued_loads, queued_drops),
        )
    }

    async fn gather_rules(
        &self,
        segments: &[Segment],
        stats: &mut CoordinatorStats,
    ) -> crate::Result<HashMap<String, Vec<Rule>>> {
        let default_rules = self.handles.rules.default_rules().await?;

        let datasources: BTreeSet<&str> =
            segments.iter().map(|s| s.datasource.as_str()).collect();

        let mut rules_by_datasource = HashMap::new();
        for datasource in datasources {
            let mut rules = match self.handles.rules.rules_for(datasource).await {
                Ok(rules) => rules,
                Err(e) => {
                    tracing::warn!(
                        "rules for {} unavailable, using defaults only: {}",
                        datasource,
                        e
                    );
                    Vec::new()
                }
            };
            rules.extend(default_rules.iter().cloned());
            rules.retain(|rule| match rule.validate() {
                Ok(()) => true,
                Err(e) => {
                    stats.add_global(stat::MALFORMED_RULES, 1);
                    tracing::warn!("excluding malformed rule for {}: {}", datasource, e);
                    false
                }
            });
            rules_by_datasource.insert(datasource.to_string(), rules);
        }

        Ok(rules_by_datasource)
    }

    // === ComputingTargets ===

    fn compute_targets(
        &self,
        snapshot: &ClusterSnapshot,
        now: DateTime<Utc>,
    ) -> Vec<(Segment, Fate)> {
        snapshot
            .segments
            .iter()
            .map(|segment| {
                let rules = snapshot
                    .rules_by_datasource
                    .get(&segment.datasource)
                    .map(|r| r.as_slice())
                    .unwrap_or(&[]);
                let fate = self.engine.evaluate(segment, now, rules);
                (segment.clone(), fate)
            })
            .collect()
    }

    // === IssuingActions ===

    fn issue(
        &mut self,
        actions: Vec<Action>,
        nodes: &HashMap<String, NodeInfo>,
        stats: &mut CoordinatorStats,
    ) -> (usize, usize, usize) {
        // servers discovery removed while we were planning
        let mut removed = HashSet::new();
        while let Ok(event) = self.events.try_recv() {
            if let NodeEvent::Removed(name) = event {
                removed.insert(name);
            }
        }

        let (mut loads, mut drops, mut moves) = (0, 0, 0);
        for action in actions {
            let target = action.target();
            let Some(node) = nodes.get(target) else {
                stats.add_global(stat::SKIPPED_DISPATCH, 1);
                continue;
            };
            if removed.contains(target) {
                tracing::debug!("server {} gone, skipping {:?}", target, action);
                stats.add_global(stat::SKIPPED_DISPATCH, 1);
                continue;
            }

            match action {
                Action::Load { segment, .. } => {
                    self.dispatch_load(node.clone(), segment);
                    loads += 1;
                    METRICS.loads_issued.inc();
                }
                Action::Drop { segment_id, .. } => {
                    self.dispatch_drop(node.clone(), segment_id);
                    drops += 1;
                    METRICS.drops_issued.inc();
                }
                Action::Move { segment, .. } => {
                    self.dispatch_load(node.clone(), segment);
                    moves += 1;
                    METRICS.moves_issued.inc();
                }
            }
        }
        (loads, drops, moves)
    }

    /// Fire-and-forget dispatch; failures surface as metrics and logs and
    /// heal through re-evaluation on later cycles.
    fn dispatch_load(&self, node: NodeInfo, segment: Segment) {
        let commands = Arc::clone(&self.handles.commands);
        tokio::spawn(async move {
            if let Err(e) = commands.issue_load(&node, &segment).await {
                METRICS.dispatch_errors.inc();
                tracing::warn!("load dispatch to {} failed: {}", node.name, e);
            }
        });
    }

    fn dispatch_drop(&self, node: NodeInfo, segment_id: SegmentId) {
        let commands = Arc::clone(&self.handles.commands);
        tokio::spawn(async move {
            if let Err(e) = commands.issue_drop(&node, &segment_id).await {
                METRICS.dispatch_errors.inc();
                tracing::warn!("drop dispatch to {} failed: {}", node.name, e);
            }
        });
    }

    // === ReportingStats ===

    fn flush_stats(&self, stats: &CoordinatorStats) {
        stats.for_each_tiered(|stat, tier, value| {
            self.handles.stats.report(tier, stat, value);
        });
        stats.for_each_global(|stat, value| {
            self.handles.stats.report("_cluster", stat, value);
        });
    }

    fn set_phase(&self, phase: CyclePhase) {
        if let Ok(mut status) = self.status.write() {
            status.phase = phase;
        }
    }
}
