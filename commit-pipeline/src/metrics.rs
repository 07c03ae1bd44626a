//! Metrics collection for observability
//!
//! Prometheus metrics of the pipeline, registered on a registry owned by the
//! service (nothing global).
//!
//! # Metrics
//!
//! - `civic_ingested_total{kind}` - Readings and governance actions received
//! - `civic_ledger_worthy_total` - Records sent towards the ledger
//! - `civic_local_only_total` - Records kept local
//! - `civic_validation_rejections_total` - Records refused by validation
//! - `civic_commits_total{category}` - Update operations committed
//! - `civic_initializations_total{outcome}` - Initialize operations (new / existing)
//! - `civic_rejections_total` - Permanent ledger rejections
//! - `civic_dead_letters_total` - Operations out of attempts
//! - `civic_evictions_total` - Operations evicted at capacity
//! - `civic_retries_total` - Transient failures sent back to the queue head
//! - `civic_audit_failures_total` - Address audits that failed
//! - `civic_queue_depth` - Pending operations
//! - `civic_delivery_duration_seconds` - Ledger delivery latency

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use civic_core::OperationKind;
use ledger_adapter::Receipt;
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct PipelineMetrics {
    /// Records received, by kind (reading / action)
    pub ingested: IntCounterVec,

    /// Ledger-worthy records
    pub ledger_worthy: IntCounter,

    /// Local-only records
    pub local_only: IntCounter,

    /// Validation rejections
    pub validation_rejections: IntCounter,

    /// Commits by category
    pub commits: IntCounterVec,

    /// Initializations by outcome
    pub initializations: IntCounterVec,

    /// Permanent rejections
    pub rejections: IntCounter,

    /// Dead letters
    pub dead_letters: IntCounter,

    /// Capacity evictions
    pub evictions: IntCounter,

    /// Retries
    pub retries: IntCounter,

    /// Audit failures
    pub audit_failures: IntCounter,

    /// Queue depth
    pub queue_depth: IntGauge,

    /// Delivery latency
    pub delivery_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for PipelineMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineMetrics").finish_non_exhaustive()
    }
}

impl PipelineMetrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let ingested = IntCounterVec::new(
            Opts::new("civic_ingested_total", "Readings and governance actions received"),
            &["kind"],
        )?;
        registry.register(Box::new(ingested.clone()))?;

        let ledger_worthy = IntCounter::new("civic_ledger_worthy_total", "Records sent towards the ledger")?;
        registry.register(Box::new(ledger_worthy.clone()))?;

        let local_only = IntCounter::new("civic_local_only_total", "Records kept local")?;
        registry.register(Box::new(local_only.clone()))?;

        let validation_rejections = IntCounter::new(
            "civic_validation_rejections_total",
            "Records refused by validation",
        )?;
        registry.register(Box::new(validation_rejections.clone()))?;

        let commits = IntCounterVec::new(
            Opts::new("civic_commits_total", "Update operations committed"),
            &["category"],
        )?;
        registry.register(Box::new(commits.clone()))?;

        let initializations = IntCounterVec::new(
            Opts::new("civic_initializations_total", "Initialize operations by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(initializations.clone()))?;

        let rejections = IntCounter::new("civic_rejections_total", "Permanent ledger rejections")?;
        registry.register(Box::new(rejections.clone()))?;

        let dead_letters = IntCounter::new("civic_dead_letters_total", "Operations out of attempts")?;
        registry.register(Box::new(dead_letters.clone()))?;

        let evictions = IntCounter::new("civic_evictions_total", "Operations evicted at capacity")?;
        registry.register(Box::new(evictions.clone()))?;

        let retries = IntCounter::new("civic_retries_total", "Transient failures sent back to the queue head")?;
        registry.register(Box::new(retries.clone()))?;

        let audit_failures = IntCounter::new("civic_audit_failures_total", "Address audits that failed")?;
        registry.register(Box::new(audit_failures.clone()))?;

        let queue_depth = IntGauge::new("civic_queue_depth", "Pending operations")?;
        registry.register(Box::new(queue_depth.clone()))?;

        let delivery_duration = Histogram::with_opts(
            HistogramOpts::new("civic_delivery_duration_seconds", "Ledger delivery latency")
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0]),
        )?;
        registry.register(Box::new(delivery_duration.clone()))?;

        Ok(Self {
            ingested,
            ledger_worthy,
            local_only,
            validation_rejections,
            commits,
            initializations,
            rejections,
            dead_letters,
            evictions,
            retries,
            audit_failures,
            queue_depth,
            delivery_duration,
            registry,
        })
    }

    /// Count a ledger acceptance: updates per category, initializations per outcome
    pub fn record_commit(&self, kind: OperationKind, category: &str, receipt: &Receipt) {
        match kind {
            OperationKind::Update => self.commits.with_label_values(&[category]).inc(),
            OperationKind::Initialize => {
                let outcome = if receipt.already_existed { "existing" } else { "new" };
                self.initializations.with_label_values(&[outcome]).inc();
            }
        }
    }

    /// Prometheus text exposition of every metric
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
