//! Process metrics for the coordinator
//!
//! Prometheus-compatible counters, gauges and a cycle-duration histogram,
//! exposed on the admin API's `/metrics` endpoint. These are process-lifetime
//! instruments; the per-cycle planning counters live in
//! [`crate::coordinator::stats::CoordinatorStats`] and are flushed through
//! the stats sink instead.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Histogram bucket boundaries for cycle durations (in milliseconds)
const CYCLE_BUCKETS: [f64; 10] = [
    10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 10000.0, 30000.0,
];

/// A simple histogram for duration tracking
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<AtomicU64>,
    boundaries: Vec<f64>,
    sum: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    pub fn new() -> Self {
        Self::with_buckets(&CYCLE_BUCKETS)
    }

    pub fn with_buckets(boundaries: &[f64]) -> Self {
        let mut buckets = Vec::with_capacity(boundaries.len() + 1);
        for _ in 0..=boundaries.len() {
            buckets.push(AtomicU64::new(0));
        }
        Self {
            buckets,
            boundaries: boundaries.to_vec(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Record a value in the histogram
    pub fn observe(&self, value: f64) {
        let mut bucket_idx = self.boundaries.len();
        for (i, &boundary) in self.boundaries.iter().enumerate() {
            if value <= boundary {
                bucket_idx = i;
                break;
            }
        }

        self.buckets[bucket_idx].fetch_add(1, Ordering::Relaxed);
        // stored in micros to keep fractional millis
        self.sum
            .fetch_add((value * 1000.0) as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Cumulative (boundary, count) pairs, ending with +Inf
    pub fn get_buckets(&self) -> Vec<(f64, u64)> {
        let mut cumulative = 0u64;
        let mut result = Vec::with_capacity(self.boundaries.len() + 1);

        for (i, &boundary) in self.boundaries.iter().enumerate() {
            cumulative += self.buckets[i].load(Ordering::Relaxed);
            result.push((boundary, cumulative));
        }

        cumulative += self.buckets[self.boundaries.len()].load(Ordering::Relaxed);
        result.push((f64::INFINITY, cumulative));

        result
    }

    pub fn sum(&self) -> f64 {
        self.sum.load(Ordering::Relaxed) as f64 / 1000.0
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Counter for monotonically increasing values
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Gauge for tracking current values
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn set(&self, v: u64) {
        self.value.store(v, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Coordinator metrics registry
#[derive(Debug)]
pub struct MetricsRegistry {
    /// Completed coordination cycles
    pub cycles_total: Counter,
    /// Cycles that aborted before IssuingActions (gather failed)
    pub cycle_errors: Counter,
    /// Cycle wall-clock duration
    pub cycle_duration_ms: Histogram,

    /// Commands dispatched
    pub loads_issued: Counter,
    pub drops_issued: Counter,
    pub moves_issued: Counter,
    /// Fire-and-forget dispatches that reported a transport/node error
    pub dispatch_errors: Counter,

    /// Last snapshot sizes
    pub segments_seen: Gauge,
    pub servers_seen: Gauge,

    start_time: Instant,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            cycles_total: Counter::new(),
            cycle_errors: Counter::new(),
            cycle_duration_ms: Histogram::new(),
            loads_issued: Counter::new(),
            drops_issued: Counter::new(),
            moves_issued: Counter::new(),
            dispatch_errors: Counter::new(),
            segments_seen: Gauge::new(),
            servers_seen: Gauge::new(),
            start_time: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-compatible metrics output
    pub fn to_prometheus(&self) -> String {
        use std::fmt::Write;
        let mut out = String::new();

        let counters: [(&str, &str, u64); 7] = [
            (
                "strata_cycles_total",
                "Completed coordination cycles",
                self.cycles_total.get(),
            ),
            (
                "strata_cycle_errors_total",
                "Cycles aborted before issuing actions",
                self.cycle_errors.get(),
            ),
            (
                "strata_loads_issued_total",
                "Segment load commands dispatched",
                self.loads_issued.get(),
            ),
            (
                "strata_drops_issued_total",
                "Segment drop commands dispatched",
                self.drops_issued.get(),
            ),
            (
                "strata_moves_issued_total",
                "Balancer moves dispatched",
                self.moves_issued.get(),
            ),
            (
                "strata_dispatch_errors_total",
                "Command dispatches that reported an error",
                self.dispatch_errors.get(),
            ),
            (
                "strata_uptime_seconds",
                "Coordinator uptime in seconds",
                self.uptime_seconds(),
            ),
        ];
        for (name, help, value) in counters {
            writeln!(out, "# HELP {} {}", name, help).unwrap();
            writeln!(out, "# TYPE {} counter", name).unwrap();
            writeln!(out, "{} {}", name, value).unwrap();
        }

        let gauges: [(&str, &str, u64); 2] = [
            (
                "strata_segments_seen",
                "Used segments in the last snapshot",
                self.segments_seen.get(),
            ),
            (
                "strata_servers_seen",
                "Serving nodes in the last snapshot",
                self.servers_seen.get(),
            ),
        ];
        for (name, help, value) in gauges {
            writeln!(out, "# HELP {} {}", name, help).unwrap();
            writeln!(out, "# TYPE {} gauge", name).unwrap();
            writeln!(out, "{} {}", name, value).unwrap();
        }

        out.push_str("# HELP strata_cycle_duration_ms Coordination cycle duration\n");
        out.push_str("# TYPE strata_cycle_duration_ms histogram\n");
        for (le, count) in self.cycle_duration_ms.get_buckets() {
            if le.is_infinite() {
                writeln!(out, "strata_cycle_duration_ms_bucket{{le=\"+Inf\"}} {}", count).unwrap();
            } else {
                writeln!(
                    out,
                    "strata_cycle_duration_ms_bucket{{le=\"{}\"}} {}",
                    le, count
                )
                .unwrap();
            }
        }
        writeln!(
            out,
            "strata_cycle_duration_ms_sum {}",
            self.cycle_duration_ms.sum()
        )
        .unwrap();
        writeln!(
            out,
            "strata_cycle_duration_ms_count {}",
            self.cycle_duration_ms.count()
        )
        .unwrap();

        out
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Global metrics instance
pub static METRICS: once_cell::sync::Lazy<MetricsRegistry> =
    once_cell::sync::Lazy::new(MetricsRegistry::new);
