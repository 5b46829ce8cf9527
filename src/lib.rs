//! # strata
//!
//! The cluster coordination plane of a distributed, horizontally-scaled
//! columnar data store:
//! - Declarative retention/load rules evaluated into per-tier replication
//!   targets
//! - Pluggable balancer strategies (uniform random and cost-based) for
//!   replica placement, move selection and drop ordering
//! - A reconciliation loop that continuously converges the cluster toward
//!   its targets under per-server and per-cycle throttles
//! - HTTP adapters for the external collaborators (segment catalog, node
//!   discovery, node inventory/commands, rule source)
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   used segments   ┌──────────────────────────────┐
//! │  Metadata    ├──────────────────►│        Coordinator           │
//! │  service     ├──────────────────►│  gather → targets → plan →   │
//! └──────────────┘   rules, servers  │  issue → report   (cycle)    │
//!                                    └──────┬───────────────────────┘
//!                          load/drop (fire-and-forget)
//!                  ┌────────────┬───────────┴──┬─────────────┐
//!              ┌───▼───────┐ ┌──▼─────────┐ ┌──▼─────────┐   ▼
//!              │ Serving 1 │ │ Serving 2  │ │ Serving 3  │  ...
//!              │ tier: hot │ │ tier: hot  │ │ tier: cold │
//!              └───────────┘ └────────────┘ └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! strata-coord serve \
//!   --id coord-1 \
//!   --bind 0.0.0.0:8181 \
//!   --metadata http://metadata.internal:8081
//! ```

pub mod cluster;
pub mod common;
pub mod coordinator;
pub mod segment;

// Re-export commonly used types
pub use common::{Config, Error, Result};
pub use coordinator::Coordinator;
pub use segment::{Interval, Segment, SegmentId};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
