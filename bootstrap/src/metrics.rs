//! Metrics for [crate::Bootstrapper].

use commonware_runtime::Metrics as RuntimeMetrics;
use prometheus_client::metrics::{counter::Counter, gauge::Gauge};

/// Metrics for [crate::Bootstrapper].
#[derive(Default)]
pub struct Metrics {
    /// Number of blocks fetched during bootstrapping.
    pub fetched: Counter,
    /// Number of blocks accepted during bootstrapping.
    pub accepted: Counter,
    /// ETA in nanoseconds until the fetching phase completes.
    pub fetch_eta: Gauge,
}

impl Metrics {
    /// Create and register metrics with the given context.
    ///
    /// Metric names will be prefixed with the context's label.
    pub fn init<E: RuntimeMetrics>(context: &E) -> Self {
        let metrics = Self::default();
        context.register(
            "fetched",
            "Number of blocks fetched during bootstrapping",
            metrics.fetched.clone(),
        );
        context.register(
            "accepted",
            "Number of blocks accepted during bootstrapping",
            metrics.accepted.clone(),
        );
        context.register(
            "eta_fetching_complete",
            "ETA in nanoseconds until fetching phase of bootstrapping finishes",
            metrics.fetch_eta.clone(),
        );
        metrics
    }
}
