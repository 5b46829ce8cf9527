//! The cluster coordination control loop
//!
//! The coordinator is responsible for:
//! - Evaluating retention/load rules into per-segment replication targets
//! - Placement, balancing and drop-ordering decisions (pluggable strategy)
//! - The reconciliation cycle turning targets into bounded load/drop/move
//!   commands against serving nodes
//! - Cycle-scoped stats for observability

pub mod balancer;
pub mod http;
pub mod rules;
pub mod runner;
pub mod sampler;
pub mod server;
pub mod server_holder;
pub mod stats;

pub use balancer::BalancerStrategy;
pub use runner::{CoordinatorRunner, CyclePhase};
pub use rules::{Fate, Rule, RuleEngine};
pub use sampler::{BalancerSegmentHolder, Reservoir};
pub use server::Coordinator;
pub use server_holder::ServerHolder;
pub use stats::CoordinatorStats;
