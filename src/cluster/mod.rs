//! External collaborator boundaries
//!
//! The coordinator consumes four independently concurrent systems: the
//! segment catalog (metadata store), node discovery, per-node inventory, and
//! the node command interface, plus a rule source and a stats sink. Each is
//! a trait here, with HTTP adapters for production wiring; the loop treats
//! all of them as eventually consistent and never assumes an issued command
//! took effect until a later snapshot confirms it.

pub mod catalog;
pub mod discovery;
pub mod node;
pub mod rules_source;
pub mod stats_sink;

pub use catalog::{HttpSegmentCatalog, SegmentCatalog, SegmentRecord};
pub use discovery::{DiscoveryWatcher, HttpNodeDiscovery, NodeDiscovery, NodeEvent, NodeInfo};
pub use node::{HttpNodeClient, NodeCommand, NodeInventory};
pub use rules_source::{HttpRuleSource, RuleSource, StaticRuleSource};
pub use stats_sink::{LogStatsSink, StatsSink};
