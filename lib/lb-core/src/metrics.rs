//! Prometheus metrics for the reconciliation pipeline

use prometheus::{CounterVec, Encoder, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// SyncMetrics owns the controller's registry; clones share it
#[derive(Clone)]
pub struct SyncMetrics {
    /// Calls to the load balancer by object type, method and outcome
    pub rest_operations_total: CounterVec,
    /// Keys handed to a retry class
    pub retries_total: CounterVec,
    pub graph_builds_total: IntCounter,
    /// Full resynchronizations by outcome
    pub full_syncs_total: CounterVec,
    pub sync_duration_seconds: Histogram,
    pub registry: Arc<Registry>,
}

impl SyncMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let rest_operations_total = CounterVec::new(
            Opts::new("lb_rest_operations_total", "Load balancer REST operations"),
            &["object_type", "method", "outcome"],
        )?;
        let retries_total = CounterVec::new(
            Opts::new("lb_retries_total", "Model keys scheduled for retry"),
            &["class"],
        )?;
        let graph_builds_total = IntCounter::new("lb_graph_builds_total", "Processed ingestion keys")?;
        let full_syncs_total = CounterVec::new(
            Opts::new("lb_full_syncs_total", "Full resynchronization runs"),
            &["outcome"],
        )?;
        let sync_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "lb_sync_duration_seconds",
            "Duration of one model key sync pass",
        ))?;

        registry.register(Box::new(rest_operations_total.clone()))?;
        registry.register(Box::new(retries_total.clone()))?;
        registry.register(Box::new(graph_builds_total.clone()))?;
        registry.register(Box::new(full_syncs_total.clone()))?;
        registry.register(Box::new(sync_duration_seconds.clone()))?;

        Ok(Self {
            rest_operations_total,
            retries_total,
            graph_builds_total,
            full_syncs_total,
            sync_duration_seconds,
            registry,
        })
    }

    /// Gather all metrics in Prometheus text format
    pub fn gather(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = vec![];
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
