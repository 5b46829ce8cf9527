//! Reservoir sampling over the cluster's (server, segment) pairs
//!
//! The balancer needs one uniformly random "segment sitting on some server"
//! pair out of a population whose size is unknown up front and unevenly
//! spread across servers. A size-1 reservoir gives every pair probability
//! 1/N in a single pass without flattening the population.

use crate::coordinator::server_holder::ServerHolder;
use crate::segment::Segment;
use rand::Rng;

/// Size-1 reservoir: each offered item replaces the current pick with
/// probability 1/n, n counting the new item.
#[derive(Debug)]
pub struct Reservoir<T> {
    n: u64,
    pick: Option<T>,
}

impl<T> Reservoir<T> {
    pub fn new() -> Self {
        Self { n: 0, pick: None }
    }

    pub fn offer<R: Rng>(&mut self, item: T, rng: &mut R) {
        self.n += 1;
        if rng.gen_range(0..self.n) == 0 {
            self.pick = Some(item);
        }
    }

    /// Items seen so far
    pub fn seen(&self) -> u64 {
        self.n
    }

    pub fn into_pick(self) -> Option<T> {
        self.pick
    }
}

impl<T> Default for Reservoir<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A (server, segment) pair picked as a move candidate; produced and
/// consumed within one cycle.
#[derive(Debug, Clone)]
pub struct BalancerSegmentHolder {
    pub server: String,
    pub segment: Segment,
}

/// Sample one movable (server, segment) pair uniformly across all servers'
/// segment sets, regardless of per-server skew. Returns `None` when no
/// server holds a movable segment.
pub fn sample_balancer_segment<R: Rng>(
    servers: &[ServerHolder],
    rng: &mut R,
) -> Option<BalancerSegmentHolder> {
    let mut reservoir = Reservoir::new();
    for server in servers {
        for segment in server.movable_segments() {
            reservoir.offer((server.name(), segment), rng);
        }
    }
    reservoir
        .into_pick()
        .map(|(server, segment)| BalancerSegmentHolder {
            server: server.to_string(),
            segment: segment.clone(),
        })
}
