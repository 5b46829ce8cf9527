//! Common utilities and types shared across strata

pub mod config;
pub mod error;
pub mod metrics;
pub mod utils;

pub use config::{BalancerConfig, Config, CoordinationConfig, DefaultFate, StrategyKind};
pub use error::{Error, Result};
pub use metrics::{MetricsRegistry, METRICS};
pub use utils::{format_bytes, parse_duration, NodeState};
