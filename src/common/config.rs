//! Configuration for the strata coordinator

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Coordinator node ID (unique identifier, used in logs and stats)
    pub node_id: String,

    /// Bind address for the admin HTTP API
    pub bind_addr: SocketAddr,

    /// Base URL of the metadata service (segment catalog, rules, discovery)
    pub metadata_url: String,

    /// Timeout for collaborator HTTP requests
    pub request_timeout_ms: u64,

    /// Logging level
    pub log_level: String,

    /// Reconciliation loop settings
    pub coordination: CoordinationConfig,

    /// Balancer strategy settings
    pub balancer: BalancerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_id: "coordinator".to_string(),
            bind_addr: "0.0.0.0:8181".parse().unwrap(),
            metadata_url: "http://localhost:8081".to_string(),
            request_timeout_ms: 10_000,
            log_level: "info".to_string(),
            coordination: CoordinationConfig::default(),
            balancer: BalancerConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file (optional) overlaid with
    /// `STRATA_*` environment variables.
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let mut builder = config::Config::builder();
        builder = match path {
            Some(p) => builder.add_source(config::File::from(p)),
            None => builder.add_source(config::File::with_name("strata").required(false)),
        };
        builder = builder.add_source(
            config::Environment::with_prefix("STRATA")
                .separator("__")
                .try_parsing(true),
        );

        let cfg: Config = builder
            .build()
            .map_err(|e| crate::Error::InvalidConfig(e.to_string()))?
            .try_deserialize()
            .map_err(|e| crate::Error::InvalidConfig(e.to_string()))?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Sanity-check knob values before wiring anything up.
    pub fn validate(&self) -> crate::Result<()> {
        if self.coordination.cycle_period_ms == 0 {
            return Err(crate::Error::InvalidConfig(
                "coordination.cycle_period_ms must be > 0".into(),
            ));
        }
        if self.coordination.discovery_poll_ms == 0 {
            return Err(crate::Error::InvalidConfig(
                "coordination.discovery_poll_ms must be > 0".into(),
            ));
        }
        if self.coordination.max_loads_per_server == 0 {
            return Err(crate::Error::InvalidConfig(
                "coordination.max_loads_per_server must be > 0".into(),
            ));
        }
        if self.coordination.node_event_queue == 0 {
            return Err(crate::Error::InvalidConfig(
                "coordination.node_event_queue must be > 0".into(),
            ));
        }
        if self.balancer.utilization_weight < 0.0 || self.balancer.affinity_weight < 0.0 {
            return Err(crate::Error::InvalidConfig(
                "balancer weights must be non-negative".into(),
            ));
        }
        if self.balancer.affinity_halflife_hours <= 0.0 {
            return Err(crate::Error::InvalidConfig(
                "balancer.affinity_halflife_hours must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Reconciliation loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinationConfig {
    /// Time between coordination cycles
    pub cycle_period_ms: u64,

    /// How often the discovery watcher polls for membership changes
    pub discovery_poll_ms: u64,

    /// Capacity of the bounded node-event queue feeding the loop
    pub node_event_queue: usize,

    /// Maximum in-flight loads per serving node (queued + newly planned)
    pub max_loads_per_server: usize,

    /// Maximum loads planned per cycle across the whole cluster
    pub max_loads_per_cycle: usize,

    /// Balancer move iterations per cycle
    pub max_segments_to_move: usize,

    /// Fate applied when no rule matches a segment. Always explicit.
    pub default_fate: DefaultFate,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            cycle_period_ms: 30_000,
            discovery_poll_ms: 5_000,
            node_event_queue: 128,
            max_loads_per_server: 8,
            max_loads_per_cycle: 100,
            max_segments_to_move: 5,
            default_fate: DefaultFate::Drop,
        }
    }
}

impl CoordinationConfig {
    pub fn cycle_period(&self) -> Duration {
        Duration::from_millis(self.cycle_period_ms)
    }

    pub fn discovery_poll_period(&self) -> Duration {
        Duration::from_millis(self.discovery_poll_ms)
    }
}

/// Fate applied to segments no rule matches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum DefaultFate {
    /// Drop unmatched segments from all tiers
    Drop,
    /// Keep unmatched segments at the given per-tier replica counts
    Load {
        tiered_replicants: BTreeMap<String, usize>,
    },
}

/// Balancer strategy selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Uniform random placement, reservoir-sampled moves
    Uniform,
    /// Cost-scored placement (utilization + interval affinity)
    Cost,
}

/// Balancer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BalancerConfig {
    pub strategy: StrategyKind,

    /// Fixed RNG seed. Unset means seeded from entropy; set it to make a
    /// run's placement decisions reproducible.
    pub seed: Option<u64>,

    /// Weight of the projected-utilization term in the cost function
    pub utilization_weight: f64,

    /// Weight of the interval-affinity term in the cost function
    pub affinity_weight: f64,

    /// Distance (in hours) at which interval affinity halves
    pub affinity_halflife_hours: f64,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Cost,
            seed: None,
            utilization_weight: 3.0,
            affinity_weight: 1.0,
            affinity_halflife_hours: 24.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.coordination.cycle_period_ms, 30_000);
        assert_eq!(config.coordination.max_segments_to_move, 5);
        assert_eq!(config.coordination.default_fate, DefaultFate::Drop);
        assert_eq!(config.balancer.strategy, StrategyKind::Cost);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strata.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            r#"
node_id = "coord-7"
metadata_url = "http://meta.internal:9000"

[coordination]
cycle_period_ms = 5000
max_segments_to_move = 2

[balancer]
strategy = "uniform"
seed = 42
"#
        )
        .unwrap();

        let config = Config::load(Some(path.as_path())).unwrap();
        assert_eq!(config.node_id, "coord-7");
        assert_eq!(config.metadata_url, "http://meta.internal:9000");
        assert_eq!(config.coordination.cycle_period_ms, 5000);
        assert_eq!(config.coordination.max_segments_to_move, 2);
        assert_eq!(config.balancer.strategy, StrategyKind::Uniform);
        assert_eq!(config.balancer.seed, Some(42));
        // untouched fields keep their defaults
        assert_eq!(config.coordination.max_loads_per_server, 8);
    }

    #[test]
    fn test_validate_rejects_bad_knobs() {
        let mut config = Config::default();
        config.coordination.cycle_period_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.balancer.affinity_halflife_hours = 0.0;
        assert!(config.validate().is_err());
    }
}
