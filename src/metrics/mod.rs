use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

use crate::error::Result;

/// Prometheus metrics for the package database
#[derive(Clone)]
pub struct DatabaseMetrics {
    // Counters
    pub rebuilds_total: CounterVec,
    pub records_ingested: Counter,
    pub rejected_starts: Counter,
    pub persist_failures: Counter,
    pub restore_failures: Counter,
    pub queries_total: IntCounterVec,

    // Gauges
    pub published_generation: Gauge,
    pub snapshot_records: Gauge,

    // Histograms
    pub rebuild_duration: Histogram,

    // Registry
    registry: Arc<Registry>,
}

impl DatabaseMetrics {
    /// Create a new DatabaseMetrics instance with its own registry
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        // Counters
        let rebuilds_total = CounterVec::new(
            Opts::new("pkgdb_rebuilds_total", "Rebuild cycles by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(rebuilds_total.clone()))?;

        let records_ingested = Counter::with_opts(Opts::new(
            "pkgdb_records_ingested_total",
            "Package records accepted into ingestion buffers",
        ))?;
        registry.register(Box::new(records_ingested.clone()))?;

        let rejected_starts = Counter::with_opts(Opts::new(
            "pkgdb_rejected_starts_total",
            "Rebuild starts rejected because a cycle was already running",
        ))?;
        registry.register(Box::new(rejected_starts.clone()))?;

        let persist_failures = Counter::with_opts(Opts::new(
            "pkgdb_persist_failures_total",
            "Published snapshots that could not be written to disk",
        ))?;
        registry.register(Box::new(persist_failures.clone()))?;

        let restore_failures = Counter::with_opts(Opts::new(
            "pkgdb_restore_failures_total",
            "Snapshot files discarded at open because they could not be read",
        ))?;
        registry.register(Box::new(restore_failures.clone()))?;

        let queries_total = IntCounterVec::new(
            Opts::new("pkgdb_queries_total", "Queries served by kind"),
            &["kind"],
        )?;
        registry.register(Box::new(queries_total.clone()))?;

        // Gauges
        let published_generation = Gauge::with_opts(Opts::new(
            "pkgdb_published_generation",
            "Generation of the currently published snapshot",
        ))?;
        registry.register(Box::new(published_generation.clone()))?;

        let snapshot_records = Gauge::with_opts(Opts::new(
            "pkgdb_snapshot_records",
            "Number of records in the currently published snapshot",
        ))?;
        registry.register(Box::new(snapshot_records.clone()))?;

        // Histograms
        let rebuild_duration = Histogram::with_opts(
            HistogramOpts::new("pkgdb_rebuild_duration_seconds", "Rebuild cycle duration")
                .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]),
        )?;
        registry.register(Box::new(rebuild_duration.clone()))?;

        Ok(Self {
            rebuilds_total,
            records_ingested,
            rejected_starts,
            persist_failures,
            restore_failures,
            queries_total,
            published_generation,
            snapshot_records,
            rebuild_duration,
            registry: Arc::new(registry),
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Record a successful publish
    pub fn record_published(&self, generation: u64, records: usize, duration_secs: f64) {
        self.rebuilds_total.with_label_values(&["published"]).inc();
        self.published_generation.set(generation as f64);
        self.snapshot_records.set(records as f64);
        self.rebuild_duration.observe(duration_secs);
    }

    /// Record an aborted cycle
    pub fn record_aborted(&self, duration_secs: f64) {
        self.rebuilds_total.with_label_values(&["aborted"]).inc();
        self.rebuild_duration.observe(duration_secs);
    }

    /// Record a rejected start
    pub fn record_rejected_start(&self) {
        self.rejected_starts.inc();
    }

    /// Record a staged record
    pub fn record_ingested(&self) {
        self.records_ingested.inc();
    }

    /// Record a failed snapshot write
    pub fn record_persist_failure(&self) {
        self.persist_failures.inc();
    }

    /// Record a snapshot file that was discarded at open
    pub fn record_restore_failure(&self) {
        self.restore_failures.inc();
    }

    /// Record a served query
    pub fn record_query(&self, kind: &str) {
        self.queries_total.with_label_values(&[kind]).inc();
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn gather_text(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
