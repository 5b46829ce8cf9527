//! End-to-end reconciliation tests against in-memory collaborators

mod common;

use chrono::{DateTime, Utc};
use common::{settle, CapturingSink, MemoryCluster};
use std::collections::BTreeMap;
use std::sync::Arc;
use strata::cluster::{SegmentRecord, StaticRuleSource};
use strata::common::config::{BalancerConfig, CoordinationConfig, StrategyKind};
use strata::coordinator::rules::Rule;
use strata::coordinator::runner::{ClusterHandles, CoordinatorRunner};
use strata::coordinator::stats::stat;
use strata::segment::{Interval, Segment};
use tokio::sync::mpsc;

fn ts(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

fn segment(datasource: &str, day: u32, size_bytes: u64) -> Segment {
    let start = ts(&format!("2024-01-{:02}T00:00:00Z", day));
    let end = ts(&format!("2024-01-{:02}T00:00:00Z", day + 1));
    Segment {
        datasource: datasource.to_string(),
        interval: Interval::new(start, end).unwrap(),
        version: "v1".to_string(),
        partition_num: 0,
        size_bytes,
    }
}

fn load_forever(tier: &str, count: usize) -> Rule {
    Rule::LoadForever {
        tiered_replicants: BTreeMap::from([(tier.to_string(), count)]),
    }
}

struct Harness {
    sink: Arc<CapturingSink>,
    runner: CoordinatorRunner,
    // keeps the node-event channel open for the runner's lifetime
    _events_tx: mpsc::Sender<strata::cluster::NodeEvent>,
}

fn harness(cluster: Arc<MemoryCluster>, coordination: CoordinationConfig, rules: Vec<Rule>) -> Harness {
    let sink = Arc::new(CapturingSink::default());
    let handles = ClusterHandles {
        catalog: cluster.clone(),
        discovery: cluster.clone(),
        inventory: cluster.clone(),
        commands: cluster.clone(),
        rules: Arc::new(StaticRuleSource::new(rules)),
        stats: sink.clone(),
    };
    let (events_tx, events_rx) = mpsc::channel(16);
    let balancer = BalancerConfig {
        strategy: StrategyKind::Uniform,
        seed: Some(1),
        ..BalancerConfig::default()
    };
    let runner = CoordinatorRunner::new(coordination, &balancer, handles, events_rx);
    Harness {
        sink,
        runner,
        _events_tx: events_tx,
    }
}

fn now() -> DateTime<Utc> {
    ts("2024-02-01T00:00:00Z")
}

#[tokio::test]
async fn test_replica_convergence_under_throttle() {
    let cluster = MemoryCluster::new();
    for i in 1..=3 {
        cluster.add_node(&format!("hist-{}", i), "_default", 1_000_000);
    }
    let seg = segment("events", 1, 100);
    cluster.add_segment(&seg);

    let coordination = CoordinationConfig {
        max_loads_per_cycle: 1,
        max_segments_to_move: 0,
        ..CoordinationConfig::default()
    };
    let mut h = harness(cluster.clone(), coordination, vec![load_forever("_default", 2)]);

    // cycle 1: one replica issued under the throttle
    let report = h.runner.run_cycle(now()).await.unwrap();
    settle().await;
    assert_eq!(report.loads_issued, 1);
    assert_eq!(report.stats.tiered(stat::DEFERRED, "_default"), 1);
    cluster.apply_queues();

    // cycle 2: the second replica lands on a different server
    let report = h.runner.run_cycle(now()).await.unwrap();
    settle().await;
    assert_eq!(report.loads_issued, 1);
    cluster.apply_queues();

    let replicas = cluster.loaded_on(&seg.id());
    assert_eq!(replicas.len(), 2, "replicas on {:?}", replicas);

    // cycle 3: converged, nothing further
    let report = h.runner.run_cycle(now()).await.unwrap();
    settle().await;
    assert_eq!(report.loads_issued, 0);
    assert_eq!(report.drops_issued, 0);
}

#[tokio::test]
async fn test_no_reissue_while_loads_in_flight() {
    let cluster = MemoryCluster::new();
    for i in 1..=3 {
        cluster.add_node(&format!("hist-{}", i), "_default", 1_000_000);
    }
    cluster.add_segment(&segment("events", 1, 100));

    let coordination = CoordinationConfig {
        max_segments_to_move: 0,
        ..CoordinationConfig::default()
    };
    let mut h = harness(cluster.clone(), coordination, vec![load_forever("_default", 2)]);

    let report = h.runner.run_cycle(now()).await.unwrap();
    settle().await;
    assert_eq!(report.loads_issued, 2);
    assert_eq!(cluster.queued_load_count(), 2);

    // nodes have not completed the loads; the next snapshot sees them in
    // flight and plans nothing new
    let report = h.runner.run_cycle(now()).await.unwrap();
    settle().await;
    assert_eq!(report.loads_issued, 0);
    assert_eq!(cluster.queued_load_count(), 2);
}

#[tokio::test]
async fn test_drop_rule_clears_cluster() {
    let cluster = MemoryCluster::new();
    let seg = segment("events", 1, 100);
    for i in 1..=3 {
        let name = format!("hist-{}", i);
        cluster.add_node(&name, "_default", 1_000_000);
        cluster.preload(&name, &seg);
    }
    cluster.add_segment(&seg);

    let coordination = CoordinationConfig {
        max_segments_to_move: 0,
        ..CoordinationConfig::default()
    };
    let mut h = harness(cluster.clone(), coordination, vec![Rule::DropForever]);

    let report = h.runner.run_cycle(now()).await.unwrap();
    settle().await;
    assert_eq!(report.drops_issued, 3);
    cluster.apply_queues();

    assert!(cluster.loaded_on(&seg.id()).is_empty());
}

#[tokio::test]
async fn test_retention_expiry_moves_between_fates() {
    let cluster = MemoryCluster::new();
    cluster.add_node("hist-1", "_default", 1_000_000);
    let recent = segment("events", 25, 100);
    let ancient = segment("events", 1, 100);
    cluster.add_segment(&recent);
    cluster.add_segment(&ancient);
    cluster.preload("hist-1", &ancient);

    let coordination = CoordinationConfig {
        max_segments_to_move: 0,
        ..CoordinationConfig::default()
    };
    let rules = vec![
        Rule::LoadByPeriod {
            period: "P14D".to_string(),
            tiered_replicants: BTreeMap::from([("_default".to_string(), 1)]),
        },
        Rule::DropForever,
    ];
    let mut h = harness(cluster.clone(), coordination, rules);

    let report = h.runner.run_cycle(now()).await.unwrap();
    settle().await;
    cluster.apply_queues();

    // recent segment loaded, ancient one dropped
    assert_eq!(report.loads_issued, 1);
    assert_eq!(report.drops_issued, 1);
    assert_eq!(cluster.loaded_on(&recent.id()), vec!["hist-1".to_string()]);
    assert!(cluster.loaded_on(&ancient.id()).is_empty());
}

#[tokio::test]
async fn test_unassigned_when_no_eligible_server() {
    let cluster = MemoryCluster::new();
    cluster.add_node("hist-1", "_default", 1_000_000);
    let seg = segment("events", 1, 100);
    cluster.add_segment(&seg);
    cluster.preload("hist-1", &seg);

    let coordination = CoordinationConfig {
        max_segments_to_move: 0,
        ..CoordinationConfig::default()
    };
    let mut h = harness(cluster.clone(), coordination, vec![load_forever("_default", 2)]);

    let report = h.runner.run_cycle(now()).await.unwrap();
    settle().await;

    assert_eq!(report.loads_issued, 0);
    assert_eq!(report.stats.tiered(stat::UNASSIGNED, "_default"), 1);
    // stats reach the sink at cycle end
    assert_eq!(h.sink.reported("_default", stat::UNASSIGNED), Some(1));
}

#[tokio::test]
async fn test_malformed_record_is_isolated() {
    let cluster = MemoryCluster::new();
    cluster.add_node("hist-1", "_default", 1_000_000);
    let good = segment("events", 1, 100);
    cluster.add_segment(&good);
    cluster.add_raw_record(SegmentRecord {
        datasource: Some("events".to_string()),
        start: Some(ts("2024-01-05T00:00:00Z")),
        end: Some(ts("2024-01-06T00:00:00Z")),
        version: None, // mandatory field missing
        partition_num: Some(0),
        size_bytes: Some(100),
    });

    let coordination = CoordinationConfig {
        max_segments_to_move: 0,
        ..CoordinationConfig::default()
    };
    let mut h = harness(cluster.clone(), coordination, vec![load_forever("_default", 1)]);

    let report = h.runner.run_cycle(now()).await.unwrap();
    settle().await;
    cluster.apply_queues();

    // the bad record is counted and skipped; the good one still converges
    assert_eq!(report.stats.global(stat::MALFORMED_SEGMENTS), 1);
    assert_eq!(report.segments, 1);
    assert_eq!(cluster.loaded_on(&good.id()), vec!["hist-1".to_string()]);
}

#[tokio::test]
async fn test_tiered_placement_respects_tier() {
    let cluster = MemoryCluster::new();
    cluster.add_node("hot-1", "hot", 1_000_000);
    cluster.add_node("hot-2", "hot", 1_000_000);
    cluster.add_node("cold-1", "cold", 1_000_000);
    let seg = segment("events", 1, 100);
    cluster.add_segment(&seg);

    let coordination = CoordinationConfig {
        max_segments_to_move: 0,
        ..CoordinationConfig::default()
    };
    let mut h = harness(cluster.clone(), coordination, vec![load_forever("hot", 2)]);

    let report = h.runner.run_cycle(now()).await.unwrap();
    settle().await;
    cluster.apply_queues();

    assert_eq!(report.loads_issued, 2);
    assert_eq!(
        cluster.loaded_on(&seg.id()),
        vec!["hot-1".to_string(), "hot-2".to_string()]
    );
}

#[tokio::test]
async fn test_balancer_move_spreads_load() {
    let cluster = MemoryCluster::new();
    cluster.add_node("hist-1", "_default", 1_000_000);
    cluster.add_node("hist-2", "_default", 1_000_000);
    let segments: Vec<Segment> = (1..=6).map(|d| segment("events", d, 100)).collect();
    for seg in &segments {
        cluster.add_segment(seg);
        cluster.preload("hist-1", seg);
    }

    let coordination = CoordinationConfig {
        max_segments_to_move: 1,
        ..CoordinationConfig::default()
    };
    let mut h = harness(cluster.clone(), coordination, vec![load_forever("_default", 1)]);

    let report = h.runner.run_cycle(now()).await.unwrap();
    settle().await;

    // every segment already meets its target; only a move gets planned, and
    // the empty server is the only possible destination
    assert_eq!(report.loads_issued, 0);
    assert_eq!(report.moves_issued, 1);
    assert_eq!(cluster.queued_load_count(), 1);
}

#[tokio::test]
async fn test_moved_surplus_dropped_next_cycle() {
    let cluster = MemoryCluster::new();
    cluster.add_node("hist-1", "_default", 1_000_000);
    cluster.add_node("hist-2", "_default", 1_000_000);
    let seg = segment("events", 1, 100);
    cluster.add_segment(&seg);
    cluster.preload("hist-1", &seg);

    let coordination = CoordinationConfig {
        max_segments_to_move: 1,
        ..CoordinationConfig::default()
    };
    let mut h = harness(cluster.clone(), coordination, vec![load_forever("_default", 1)]);

    // cycle 1 plans the move: a load onto hist-2
    let report = h.runner.run_cycle(now()).await.unwrap();
    settle().await;
    assert_eq!(report.moves_issued, 1);
    cluster.apply_queues();
    assert_eq!(cluster.loaded_on(&seg.id()).len(), 2);

    // cycle 2 sees the over-replication and drops one copy
    let report = h.runner.run_cycle(now()).await.unwrap();
    settle().await;
    assert_eq!(report.drops_issued, 1);
    cluster.apply_queues();
    assert_eq!(cluster.loaded_on(&seg.id()).len(), 1);
}
