//! Database-global, cross-branch auto-increment sequence store (§4.4).
//!
//! Branch/remote-ref enumeration — the commit-graph plumbing this tracker
//! walks to reconcile values across branches — is out of scope (§1); the
//! `BranchEnumerator` seam below is the narrow interface the tracker needs
//! from it, mirroring how the teacher's own `Sequence`/`SequencesState`
//! stay ignorant of how `SequenceSchema` values are loaded.

use std::collections::HashMap;
use std::sync::Arc;

use loom_primitives::TableId;
use parking_lot::{Mutex, RwLock};

use crate::error::AutoIncrementError;
use crate::metrics::Metrics;

/// Supplies every stored auto-increment value for `table` across every
/// branch working set and remote ref currently known to the database.
/// Tables absent from a given root, or present without an AI column,
/// contribute nothing.
pub trait BranchEnumerator: Send + Sync {
    fn ai_values_for_table(&self, table: TableId) -> Vec<u64>;
}

/// A `BranchEnumerator` with no branches — suitable for a freshly created
/// database or for tests that only exercise a single working set.
pub struct NoBranches;

impl BranchEnumerator for NoBranches {
    fn ai_values_for_table(&self, _table: TableId) -> Vec<u64> {
        Vec::new()
    }
}

fn coerce_provided(raw: &loom_value::Value) -> Result<Option<u64>, AutoIncrementError> {
    use loom_value::Value;
    match raw {
        Value::Null => Ok(None),
        Value::Int(i) => {
            if *i < 0 {
                return Err(AutoIncrementError::Negative(*i as f64));
            }
            Ok(if *i == 0 { None } else { Some(*i as u64) })
        }
        Value::UInt(u) => Ok(if *u == 0 { None } else { Some(*u) }),
        Value::Cardinality(c) => Ok(if *c == 0 { None } else { Some(*c) }),
        Value::Float(f) => {
            if *f < 0.0 {
                return Err(AutoIncrementError::Negative(*f));
            }
            let rounded = f.round() as u64;
            Ok(if rounded == 0 { None } else { Some(rounded) })
        }
        _ => Err(AutoIncrementError::NotNumeric),
    }
}

/// Per-(database,table) monotonic counter. One instance is shared across
/// every `WriteSession` of a database (§5: "shared across all sessions of a
/// database; mutation only under its lock").
pub struct AutoIncrementTracker {
    counters: RwLock<HashMap<TableId, Arc<Mutex<u64>>>>,
    branches: Arc<dyn BranchEnumerator>,
    metrics: Arc<dyn Metrics>,
}

impl AutoIncrementTracker {
    pub fn new(branches: Arc<dyn BranchEnumerator>, metrics: Arc<dyn Metrics>) -> Self {
        Self {
            counters: RwLock::new(HashMap::new()),
            branches,
            metrics,
        }
    }

    fn initial_current(&self, table: TableId) -> u64 {
        self.branches.ai_values_for_table(table).into_iter().max().unwrap_or(1)
    }

    fn counter_for(&self, table: TableId) -> Arc<Mutex<u64>> {
        if let Some(c) = self.counters.read().get(&table) {
            return c.clone();
        }
        let mut guard = self.counters.write();
        guard
            .entry(table)
            .or_insert_with(|| Arc::new(Mutex::new(self.initial_current(table))))
            .clone()
    }

    /// The value `next(table, 0)` would return, without advancing anything.
    pub fn current(&self, table: TableId) -> u64 {
        *self.counter_for(table).lock()
    }

    /// Coerces `provided` (accepting float/signed/unsigned numeric types,
    /// rounding floats, rejecting negatives, treating null and 0
    /// identically) and returns the value to use for this row, advancing
    /// the counter only when `provided` is absent or would otherwise be
    /// skipped by the monotonicity invariant (§4.4).
    #[tracing::instrument(skip_all)]
    pub fn next(&self, table: TableId, provided: &loom_value::Value) -> Result<u64, AutoIncrementError> {
        let provided = coerce_provided(provided)?;
        let counter = self.counter_for(table);
        let mut current = counter.lock();
        let result = match provided {
            None => {
                let v = *current;
                *current = v + 1;
                v
            }
            Some(p) if p >= *current => {
                *current = p + 1;
                p
            }
            Some(p) => p,
        };
        log::trace!("AI NEXT: table={table:?} result={result} current={}", *current);
        self.metrics.set_auto_increment_current(&format!("{table}"), *current as i64);
        Ok(result)
    }

    /// Advances `current` to `new_val` unless some branch's stored value is
    /// already `>= new_val`, in which case the higher value wins. Holds the
    /// per-table lock for the entire branch walk (§9 resolution), trading
    /// latency for a formal answer to "can `set` observe a stale `current`
    /// during its walk" — it cannot, by construction.
    #[tracing::instrument(skip_all)]
    pub fn set(&self, table: TableId, new_val: u64) {
        let counter = self.counter_for(table);
        let mut current = counter.lock();
        if new_val > *current {
            *current = new_val;
            log::debug!("AI SET: table={table:?} -> {new_val} (direct)");
            return;
        }
        let deep_max = self.branches.ai_values_for_table(table).into_iter().max().unwrap_or(0);
        if deep_max < new_val {
            *current = new_val;
            log::debug!("AI SET: table={table:?} -> {new_val} (deep-set, no branch >= new_val)");
        } else {
            log::debug!("AI SET: table={table:?} no-op, branch already holds >= {new_val}");
        }
    }

    /// Initializes `current` to 1 unless some other branch already has a
    /// value for this table.
    pub fn add_new_table(&self, table: TableId) {
        let mut guard = self.counters.write();
        guard.entry(table).or_insert_with(|| Arc::new(Mutex::new(self.initial_current(table))));
    }

    /// Resets `current` to the max of `remaining_values` (the AI values of
    /// this table across every working set other than the one being
    /// dropped) plus one, or 1 if none remain.
    pub fn drop_table(&self, table: TableId, remaining_values: &[u64]) {
        let new_current = remaining_values.iter().copied().max().unwrap_or(1);
        self.counters.write().insert(table, Arc::new(Mutex::new(new_current)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NoopMetrics;
    use loom_value::Value;

    struct FixedBranches(Vec<u64>);
    impl BranchEnumerator for FixedBranches {
        fn ai_values_for_table(&self, _table: TableId) -> Vec<u64> {
            self.0.clone()
        }
    }

    #[test]
    fn scenario_d_auto_increment_across_branches() {
        // main has stored AI 10, dev has stored AI 15.
        let tracker = AutoIncrementTracker::new(Arc::new(FixedBranches(vec![10, 15])), Arc::new(NoopMetrics));
        let t = TableId(1);
        assert_eq!(tracker.current(t), 15);
        let v = tracker.next(t, &Value::Null).unwrap();
        assert_eq!(v, 15);
        assert_eq!(tracker.current(t), 16);

        tracker.set(t, 12); // no-op: dev (15) >= 12
        assert_eq!(tracker.current(t), 16);

        tracker.set(t, 20); // advances: no branch >= 20
        assert_eq!(tracker.current(t), 20);
    }

    #[test]
    fn next_treats_null_and_zero_identically() {
        let tracker = AutoIncrementTracker::new(Arc::new(NoBranches), Arc::new(NoopMetrics));
        let t = TableId(2);
        assert_eq!(tracker.next(t, &Value::Null).unwrap(), 1);
        assert_eq!(tracker.next(t, &Value::Int(0)).unwrap(), 2);
    }

    #[test]
    fn next_with_high_provided_value_advances_past_it() {
        let tracker = AutoIncrementTracker::new(Arc::new(NoBranches), Arc::new(NoopMetrics));
        let t = TableId(3);
        assert_eq!(tracker.next(t, &Value::Int(100)).unwrap(), 100);
        assert_eq!(tracker.current(t), 101);
        assert_eq!(tracker.next(t, &Value::Int(5)).unwrap(), 5);
        assert_eq!(tracker.current(t), 101);
    }

    #[test]
    fn next_rejects_negative_values() {
        let tracker = AutoIncrementTracker::new(Arc::new(NoBranches), Arc::new(NoopMetrics));
        assert!(matches!(
            tracker.next(TableId(4), &Value::Int(-1)),
            Err(AutoIncrementError::Negative(_))
        ));
    }
}
