//! Stats sink boundary

/// Receiver for flushed per-tier coordination stats
pub trait StatsSink: Send + Sync {
    fn report(&self, tier: &str, stat: &str, value: u64);
}

/// Sink that emits stats as structured log events; the default wiring.
#[derive(Debug, Default)]
pub struct LogStatsSink;

impl StatsSink for LogStatsSink {
    fn report(&self, tier: &str, stat: &str, value: u64) {
        tracing::debug!(tier, stat, value, "coordination stat");
    }
}
