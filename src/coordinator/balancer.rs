//! Balancer strategies: where replicas go, what moves, what drops first
//!
//! Two policies behind one closed enum, selected at configuration time:
//!
//! - `Uniform` places replicas uniformly at random among eligible servers
//!   and samples move candidates with the reservoir sampler.
//! - `CostBased` scores candidate servers by projected utilization plus an
//!   interval-affinity penalty (co-locating replicas of adjacent intervals
//!   of one datasource concentrates query load), picking the cheapest.
//!
//! No operation here fails for "no eligible candidate" — empty results are
//! the contract, and the planner records them as stats and retries on a
//! later cycle.

use crate::common::config::{BalancerConfig, StrategyKind};
use crate::coordinator::sampler::{sample_balancer_segment, BalancerSegmentHolder};
use crate::coordinator::server_holder::ServerHolder;
use crate::coordinator::stats::{stat, CoordinatorStats};
use crate::segment::Segment;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Cost difference below which two candidates count as tied
const COST_EPSILON: f64 = 1e-9;

/// Pluggable placement policy (closed set of variants)
#[derive(Debug)]
pub enum BalancerStrategy {
    Uniform(UniformStrategy),
    CostBased(CostStrategy),
}

impl BalancerStrategy {
    pub fn from_config(config: &BalancerConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        match config.strategy {
            StrategyKind::Uniform => BalancerStrategy::Uniform(UniformStrategy { rng }),
            StrategyKind::Cost => BalancerStrategy::CostBased(CostStrategy {
                rng,
                utilization_weight: config.utilization_weight,
                affinity_weight: config.affinity_weight,
                affinity_halflife_hours: config.affinity_halflife_hours,
            }),
        }
    }

    /// Choose a destination for a new replica. Never a server that already
    /// holds the segment; `None` when every candidate is ineligible.
    pub fn find_server_for_new_replica(
        &mut self,
        segment: &Segment,
        candidates: &[&ServerHolder],
    ) -> Option<String> {
        match self {
            BalancerStrategy::Uniform(s) => s.pick_random_eligible(segment, candidates),
            BalancerStrategy::CostBased(s) => s.pick_cheapest(segment, candidates),
        }
    }

    /// Choose a destination for a balancer move; same eligibility contract
    /// as `find_server_for_new_replica`, used purely to even out load.
    pub fn find_server_for_balancer_move(
        &mut self,
        segment: &Segment,
        candidates: &[&ServerHolder],
    ) -> Option<String> {
        match self {
            BalancerStrategy::Uniform(s) => s.pick_random_eligible(segment, candidates),
            BalancerStrategy::CostBased(s) => s.pick_cheapest(segment, candidates),
        }
    }

    /// Pick one (server, segment) pair as a move candidate, uniformly over
    /// the flattened population. Both variants sample the same way; the
    /// cost model only steers the destination.
    pub fn pick_segment_to_move(
        &mut self,
        servers: &[ServerHolder],
    ) -> Option<BalancerSegmentHolder> {
        let rng = self.rng();
        sample_balancer_segment(servers, rng)
    }

    /// Order the servers a replica should be dropped from. Servers still
    /// loading the segment come first (cancelling a queued load is the
    /// cheapest drop), then the policy's ordering over serving ones.
    pub fn pick_servers_to_drop(
        &mut self,
        segment: &Segment,
        candidates: &[&ServerHolder],
    ) -> Vec<String> {
        let id = segment.id();
        let mut loading: Vec<&ServerHolder> = candidates
            .iter()
            .copied()
            .filter(|s| s.is_loading(&id))
            .collect();
        let mut serving: Vec<&ServerHolder> = candidates
            .iter()
            .copied()
            .filter(|s| s.is_serving(&id) && !s.is_dropping(&id))
            .collect();

        match self {
            BalancerStrategy::Uniform(s) => {
                loading.shuffle(&mut s.rng);
                serving.shuffle(&mut s.rng);
            }
            BalancerStrategy::CostBased(s) => {
                loading.shuffle(&mut s.rng);
                serving.shuffle(&mut s.rng);
                // fullest first; the shuffle above decides among equals
                serving.sort_by_key(|h| std::cmp::Reverse((h.percent_used() * 1000.0) as i64));
            }
        }

        loading
            .into_iter()
            .chain(serving)
            .map(|s| s.name().to_string())
            .collect()
    }

    /// Record per-tier utilization spread. Must not fail on empty input.
    pub fn emit_stats(&self, tier: &str, stats: &mut CoordinatorStats, servers: &[&ServerHolder]) {
        if servers.is_empty() {
            return;
        }
        let mut min = f64::MAX;
        let mut max = f64::MIN;
        for server in servers {
            let used = server.percent_used();
            min = min.min(used);
            max = max.max(used);
        }
        stats.set_tiered(stat::MIN_PERCENT_USED, tier, min.round() as u64);
        stats.set_tiered(stat::MAX_PERCENT_USED, tier, max.round() as u64);
    }

    fn rng(&mut self) -> &mut StdRng {
        match self {
            BalancerStrategy::Uniform(s) => &mut s.rng,
            BalancerStrategy::CostBased(s) => &mut s.rng,
        }
    }
}

/// Cost-agnostic uniform random policy
#[derive(Debug)]
pub struct UniformStrategy {
    rng: StdRng,
}

impl UniformStrategy {
    fn pick_random_eligible(
        &mut self,
        segment: &Segment,
        candidates: &[&ServerHolder],
    ) -> Option<String> {
        let eligible: Vec<&&ServerHolder> =
            candidates.iter().filter(|s| s.can_load(segment)).collect();
        eligible
            .choose(&mut self.rng)
            .map(|s| s.name().to_string())
    }
}

/// Cost-scored policy
#[derive(Debug)]
pub struct CostStrategy {
    rng: StdRng,
    utilization_weight: f64,
    affinity_weight: f64,
    affinity_halflife_hours: f64,
}

impl CostStrategy {
    /// Cost of placing `segment` on `server`. Infinite when the server is
    /// ineligible (already holds the segment, lacks space, cannot load) —
    /// excluded, not merely penalized. Monotonic in utilization all else
    /// equal.
    fn placement_cost(&self, server: &ServerHolder, segment: &Segment) -> f64 {
        if !server.can_load(segment) {
            return f64::INFINITY;
        }

        let projected =
            (server.size_used() + segment.size_bytes) as f64 / server.max_size_bytes() as f64;

        let affinity: f64 = server
            .served_segments()
            .filter(|other| other.datasource == segment.datasource)
            .map(|other| self.interval_decay(segment, other))
            .sum();

        self.utilization_weight * projected + self.affinity_weight * affinity
    }

    /// 1.0 for overlapping intervals, halving per `affinity_halflife_hours`
    /// of gap between them.
    fn interval_decay(&self, a: &Segment, b: &Segment) -> f64 {
        let gap_seconds = if a.interval.overlaps(&b.interval) {
            0.0
        } else if a.interval.end <= b.interval.start {
            (b.interval.start - a.interval.end).num_seconds() as f64
        } else {
            (a.interval.start - b.interval.end).num_seconds() as f64
        };
        let gap_hours = gap_seconds / 3600.0;
        0.5_f64.powf(gap_hours / self.affinity_halflife_hours)
    }

    fn pick_cheapest(&mut self, segment: &Segment, candidates: &[&ServerHolder]) -> Option<String> {
        let costs: Vec<(usize, f64)> = candidates
            .iter()
            .enumerate()
            .map(|(i, s)| (i, self.placement_cost(s, segment)))
            .filter(|(_, c)| c.is_finite())
            .collect();

        let min = costs
            .iter()
            .map(|(_, c)| *c)
            .fold(f64::INFINITY, f64::min);
        if !min.is_finite() {
            return None;
        }

        let tied: Vec<usize> = costs
            .iter()
            .filter(|(_, c)| *c - min <= COST_EPSILON)
            .map(|(i, _)| *i)
            .collect();

        tied.choose(&mut self.rng)
            .map(|&i| candidates[i].name().to_string())
    }
}
