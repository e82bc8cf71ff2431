//! Pull-based observability surface for the write path (§6, §10).
//!
//! The teacher drives its own gauges through a `metrics_group!` macro backed
//! by `prometheus`; that macro lives in a crate this workspace does not
//! carry, so here the same lazily-registered gauge-vec pattern is built
//! directly on `prometheus` instead.

use prometheus::{IntGaugeVec, Opts, Registry};

/// Per-table/per-sequence gauges the write path updates as it mutates state.
/// `NoopMetrics` is the default so tests and embedders that don't care about
/// observability pay nothing for it.
pub trait Metrics: Send + Sync {
    fn set_pending_edits(&self, table: &str, count: i64);
    fn set_committed_edits(&self, table: &str, count: i64);
    fn set_auto_increment_current(&self, table: &str, value: i64);
}

#[derive(Default)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn set_pending_edits(&self, _table: &str, _count: i64) {}
    fn set_committed_edits(&self, _table: &str, _count: i64) {}
    fn set_auto_increment_current(&self, _table: &str, _value: i64) {}
}

pub struct PrometheusMetrics {
    pending_edits: IntGaugeVec,
    committed_edits: IntGaugeVec,
    ai_current: IntGaugeVec,
}

impl PrometheusMetrics {
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let pending_edits = IntGaugeVec::new(
            Opts::new("loom_write_pending_edits", "Staged but unflushed edits per table"),
            &["table"],
        )?;
        let committed_edits = IntGaugeVec::new(
            Opts::new("loom_write_committed_edits", "Committed edits per table since open"),
            &["table"],
        )?;
        let ai_current = IntGaugeVec::new(
            Opts::new("loom_write_auto_increment_current", "Current auto-increment value per table"),
            &["table"],
        )?;
        registry.register(Box::new(pending_edits.clone()))?;
        registry.register(Box::new(committed_edits.clone()))?;
        registry.register(Box::new(ai_current.clone()))?;
        Ok(Self {
            pending_edits,
            committed_edits,
            ai_current,
        })
    }
}

impl Metrics for PrometheusMetrics {
    fn set_pending_edits(&self, table: &str, count: i64) {
        self.pending_edits.with_label_values(&[table]).set(count);
    }

    fn set_committed_edits(&self, table: &str, count: i64) {
        self.committed_edits.with_label_values(&[table]).set(count);
    }

    fn set_auto_increment_current(&self, table: &str, value: i64) {
        self.ai_current.with_label_values(&[table]).set(value);
    }
}
