//! The top-level write-path coordinator: owns one `TableWriter` per table
//! touched this session, mediates foreign-key checks and cascades across
//! them, and folds everything into a new `WorkingSet` on `Flush` (§5).
//!
//! FK enforcement lives here rather than on `TableWriter` (see that module's
//! doc comment) because only `WriteSession` holds every writer at once and
//! can sequence borrows across them. Cascades walk a plain worklist —
//! `Vec<(TableId, Tuple)>` plus a visited set — rather than recursing, per
//! the re-architecture note against unbounded native-stack recursion on a
//! long FK chain (§9).

use std::collections::{HashMap, HashSet};
use std::ops::Bound;
use std::sync::Arc;

use loom_primitives::TableId;
use loom_value::{Tuple, Value};
use rayon::prelude::*;

use crate::auto_increment::AutoIncrementTracker;
use crate::cancellation::CancellationToken;
use crate::error::{TableWriterError, WriteSessionError};
use crate::metrics::Metrics;
use crate::schema::{FkAction, ForeignKey, Root, Schema, Table, WorkingSet};
use crate::table_writer::{TableWriter, PRIMARY_INDEX_ID};

/// Invoked with the newly assembled root at the end of a successful `Flush`,
/// the seam through which a session publishes its result to whatever owns
/// the actual commit-graph storage (out of scope here, §1).
pub type RootSetter = Arc<dyn Fn(Root) + Send + Sync>;

#[derive(Clone, Debug)]
pub struct WriteSessionConfig {
    /// Upper bound on how many tables `Flush` materializes concurrently.
    pub max_parallel_tables: usize,
}

impl Default for WriteSessionConfig {
    fn default() -> Self {
        Self { max_parallel_tables: 8 }
    }
}

/// One open write session against a single working set (§3, §5). Not `Sync`:
/// a session is used from one thread at a time, same as the teacher's
/// `MutTxId`; `Flush` is the only place that fans out across threads, and it
/// does so internally.
pub struct WriteSession {
    working_set: WorkingSet,
    /// `true` when this session targets `staged_root` rather than
    /// `working_root` — e.g. a session opened to prepare a commit.
    target_staging: bool,
    table_writers: HashMap<TableId, TableWriter>,
    schemas: HashMap<TableId, Arc<Schema>>,
    foreign_keys: Vec<ForeignKey>,
    auto_increment: Arc<AutoIncrementTracker>,
    root_setter: RootSetter,
    config: WriteSessionConfig,
    metrics: Arc<dyn Metrics>,
}

impl WriteSession {
    pub fn new(
        working_set: WorkingSet,
        target_staging: bool,
        schemas: HashMap<TableId, Arc<Schema>>,
        auto_increment: Arc<AutoIncrementTracker>,
        root_setter: RootSetter,
        config: WriteSessionConfig,
        metrics: Arc<dyn Metrics>,
    ) -> Self {
        let foreign_keys = if target_staging {
            working_set.staged_root.foreign_keys.clone()
        } else {
            working_set.working_root.foreign_keys.clone()
        };
        Self {
            working_set,
            target_staging,
            table_writers: HashMap::new(),
            schemas,
            foreign_keys,
            auto_increment,
            root_setter,
            config,
            metrics,
        }
    }

    fn current_root(&self) -> &Root {
        if self.target_staging {
            &self.working_set.staged_root
        } else {
            &self.working_set.working_root
        }
    }

    /// Returns the session's `TableWriter` for `table`, building it lazily
    /// from the current root the first time it's touched (§5 `GetTableWriter`).
    pub fn get_table_writer(&mut self, table: TableId) -> Result<&mut TableWriter, WriteSessionError> {
        if !self.table_writers.contains_key(&table) {
            let schema = self
                .schemas
                .get(&table)
                .cloned()
                .ok_or(WriteSessionError::TableNotFound(table))?;
            let writer = match self.current_root().get_table(table) {
                Some(t) => TableWriter::from_table(schema, t),
                None => TableWriter::empty(schema),
            };
            self.table_writers.insert(table, writer);
        }
        Ok(self.table_writers.get_mut(&table).unwrap())
    }

    fn ensure_table_writer(&mut self, table: TableId) -> Result<(), WriteSessionError> {
        self.get_table_writer(table)?;
        Ok(())
    }

    fn schema_of(&self, table: TableId) -> Result<Arc<Schema>, WriteSessionError> {
        self.schemas.get(&table).cloned().ok_or(WriteSessionError::TableNotFound(table))
    }

    /// Applies the auto-increment monotonicity rule (§4.4) to `row`'s AI
    /// column, if the table has one, before it's handed to `TableWriter`.
    fn apply_auto_increment(&mut self, table: TableId, row: Tuple) -> Result<Tuple, WriteSessionError> {
        let schema = self.schema_of(table)?;
        match schema.auto_increment_col {
            None => Ok(row),
            Some(col) => {
                let pos = schema.col_position(col);
                let provided = row.get_field(pos).clone();
                let assigned = self.auto_increment.next(table, &provided)?;
                Ok(row.with_field(pos, Value::UInt(assigned)))
            }
        }
    }

    /// Every value in `fk.child_cols` order extracted from `row`, or `None`
    /// if any of them is `NULL` (a `NULL` FK column never requires a parent
    /// match, §4.3).
    fn fk_child_values(schema: &Schema, fk: &ForeignKey, row: &Tuple) -> Option<Vec<Value>> {
        let values: Vec<Value> = fk.child_cols.iter().map(|c| row.get_field(schema.col_position(c)).clone()).collect();
        if values.iter().any(Value::is_null) {
            None
        } else {
            Some(values)
        }
    }

    fn check_child_fks(&mut self, table: TableId, row: &Tuple) -> Result<(), WriteSessionError> {
        let schema = self.schema_of(table)?;
        let fks: Vec<ForeignKey> = self.foreign_keys.iter().filter(|fk| fk.child_table == table).cloned().collect();
        for fk in fks {
            let Some(values) = Self::fk_child_values(&schema, &fk, row) else {
                continue;
            };
            self.ensure_table_writer(fk.parent_table)?;
            let parent = &self.table_writers[&fk.parent_table];
            let prefix_desc = parent.index_descriptor_for(fk.parent_index);
            let prefix = Tuple::new(values);
            if !parent.contains_by_index(fk.parent_index, &prefix, &prefix_desc) {
                return Err(WriteSessionError::Table(TableWriterError::ForeignKeyChildViolation {
                    fk_name: fk.name.clone(),
                    child_table: schema.table_name.clone(),
                    parent_table: self.schemas[&fk.parent_table].table_name.clone(),
                    key_str: prefix.format_key(&prefix_desc),
                }));
            }
        }
        Ok(())
    }

    /// Inserts `row` into `table`, assigning its auto-increment column (if
    /// any) and rejecting the insert if any foreign key is unsatisfied
    /// before any index writer is touched.
    #[tracing::instrument(skip_all)]
    pub fn insert_row(&mut self, table: TableId, row: Tuple) -> Result<(), WriteSessionError> {
        let row = self.apply_auto_increment(table, row)?;
        self.check_child_fks(table, &row)?;
        self.get_table_writer(table)?.insert_row(&row)?;
        self.metrics.set_pending_edits(&self.schemas[&table].table_name, 1);
        Ok(())
    }

    /// Updates `old_row` to `new_row` in `table`, re-validating child FKs
    /// against `new_row` and, if the table's own primary key changed,
    /// walking every FK that names `table` as a parent (§9 cascades).
    #[tracing::instrument(skip_all)]
    pub fn update_row(&mut self, table: TableId, old_row: Tuple, new_row: Tuple, cancel: &CancellationToken) -> Result<(), WriteSessionError> {
        self.check_child_fks(table, &new_row)?;
        self.enforce_parent_mutation_on_update(table, &old_row, &new_row, cancel)?;
        self.get_table_writer(table)?.update_row(&old_row, &new_row)?;
        Ok(())
    }

    /// Deletes `row` from `table`, cascading/restricting/nulling through
    /// every foreign key that names `table` as a parent, and transitively
    /// through any table reached via a `Cascade` action (§9).
    #[tracing::instrument(skip_all)]
    pub fn delete_row(&mut self, table: TableId, row: Tuple, cancel: &CancellationToken) -> Result<(), WriteSessionError> {
        let mut worklist: Vec<(TableId, Tuple)> = vec![(table, row)];
        let mut visited: HashSet<(TableId, Vec<u8>)> = HashSet::new();

        while let Some((t, r)) = worklist.pop() {
            if cancel.is_cancelled() {
                return Err(WriteSessionError::Cancelled);
            }
            let schema = self.schema_of(t)?;
            if !schema.keyless {
                let key = Tuple::new(schema.primary_key_positions().iter().map(|&p| r.get_field(p).clone()).collect());
                let key_bytes = key.encode(&schema.primary_key_descriptor());
                if !visited.insert((t, key_bytes)) {
                    continue;
                }
                self.cascade_from_parent_delete(t, &schema, &key, &mut worklist)?;
            }
            self.get_table_writer(t)?.delete_row(&r);
        }
        Ok(())
    }

    /// Resolves every FK that names `parent_table` as a parent against the
    /// row being deleted (identified by `parent_key`), either rejecting the
    /// delete (`Restrict`), queuing the matching child rows for deletion
    /// too (`Cascade`), or nulling their FK columns in place (`SetNull`).
    fn cascade_from_parent_delete(
        &mut self,
        parent_table: TableId,
        parent_schema: &Schema,
        parent_key: &Tuple,
        worklist: &mut Vec<(TableId, Tuple)>,
    ) -> Result<(), WriteSessionError> {
        let fks: Vec<ForeignKey> = self.foreign_keys.iter().filter(|fk| fk.parent_table == parent_table).cloned().collect();
        for fk in fks {
            self.ensure_table_writer(fk.child_table)?;
            let children = self.find_referencing_children(&fk, parent_key.values())?;
            if children.is_empty() {
                continue;
            }
            match fk.on_delete {
                FkAction::Restrict => {
                    return Err(WriteSessionError::Table(TableWriterError::ForeignKeyParentViolation {
                        fk_name: fk.name.clone(),
                        child_table: self.schemas[&fk.child_table].table_name.clone(),
                        parent_table: parent_schema.table_name.clone(),
                        key_str: parent_key.format_key(&parent_schema.primary_key_descriptor()),
                    }));
                }
                FkAction::Cascade => {
                    for child_row in children {
                        worklist.push((fk.child_table, child_row));
                    }
                }
                FkAction::SetNull => {
                    for child_row in children {
                        let child_schema = self.schema_of(fk.child_table)?;
                        let new_row = set_fk_columns_null(&child_schema, &fk, &child_row)?;
                        self.get_table_writer(fk.child_table)?.update_row(&child_row, &new_row)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// The `update` counterpart of `cascade_from_parent_delete`: only does
    /// anything when `table`'s primary key actually changes, since an
    /// update that leaves the key alone can't orphan any child row.
    fn enforce_parent_mutation_on_update(
        &mut self,
        table: TableId,
        old_row: &Tuple,
        new_row: &Tuple,
        cancel: &CancellationToken,
    ) -> Result<(), WriteSessionError> {
        let schema = self.schema_of(table)?;
        if schema.keyless {
            return Ok(());
        }
        let old_key: Vec<Value> = schema.primary_key_positions().iter().map(|&p| old_row.get_field(p).clone()).collect();
        let new_key: Vec<Value> = schema.primary_key_positions().iter().map(|&p| new_row.get_field(p).clone()).collect();
        if old_key == new_key {
            return Ok(());
        }
        let fks: Vec<ForeignKey> = self.foreign_keys.iter().filter(|fk| fk.parent_table == table).cloned().collect();
        for fk in fks {
            if cancel.is_cancelled() {
                return Err(WriteSessionError::Cancelled);
            }
            self.ensure_table_writer(fk.child_table)?;
            let children = self.find_referencing_children(&fk, &old_key)?;
            if children.is_empty() {
                continue;
            }
            match fk.on_update {
                FkAction::Restrict => {
                    return Err(WriteSessionError::Table(TableWriterError::ForeignKeyParentViolation {
                        fk_name: fk.name.clone(),
                        child_table: self.schemas[&fk.child_table].table_name.clone(),
                        parent_table: schema.table_name.clone(),
                        key_str: Tuple::new(old_key.clone()).format_key(&schema.primary_key_descriptor()),
                    }));
                }
                FkAction::Cascade => {
                    for child_row in children {
                        let child_schema = self.schema_of(fk.child_table)?;
                        let mut updated = child_row.clone();
                        for (i, c) in fk.child_cols.iter().enumerate() {
                            updated = updated.with_field(child_schema.col_position(c), new_key[i].clone());
                        }
                        self.get_table_writer(fk.child_table)?.update_row(&child_row, &updated)?;
                    }
                }
                FkAction::SetNull => {
                    for child_row in children {
                        let child_schema = self.schema_of(fk.child_table)?;
                        let new_child_row = set_fk_columns_null(&child_schema, &fk, &child_row)?;
                        self.get_table_writer(fk.child_table)?.update_row(&child_row, &new_child_row)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Every row currently staged in `fk.child_table` whose `fk.child_cols`
    /// equal `parent_values`, in schema-column order. A full scan of the
    /// child's primary index: cascades aren't assumed to have a dedicated
    /// index over the FK columns to probe instead.
    fn find_referencing_children(&mut self, fk: &ForeignKey, parent_values: &[Value]) -> Result<Vec<Tuple>, WriteSessionError> {
        self.ensure_table_writer(fk.child_table)?;
        let child_schema = self.schema_of(fk.child_table)?;
        let writer = &self.table_writers[&fk.child_table];
        let positions: Vec<usize> = fk.child_cols.iter().map(|c| child_schema.col_position(c)).collect();
        Ok(writer
            .iter_all_rows()
            .filter(|row| positions.iter().zip(parent_values).all(|(&p, v)| row.get_field(p) == v))
            .collect())
    }

    /// Ends the current statement: every writer's staged edits fold from
    /// its `pending` layer into `checkpoint`, surviving a later
    /// `discard_changes` (§4.1 `checkpoint`).
    pub fn statement_complete(&mut self) {
        for writer in self.table_writers.values_mut() {
            writer.commit();
        }
    }

    /// Rolls back every edit staged since the last `statement_complete`,
    /// leaving already-checkpointed edits untouched (§4.1 `revert`).
    pub fn discard_changes(&mut self) {
        for writer in self.table_writers.values_mut() {
            writer.discard();
        }
    }

    /// Materializes every touched table, assembles a new root, publishes it
    /// through `root_setter`, and returns the session's new `WorkingSet`
    /// (§5 `Flush`). Implicitly completes the open statement first.
    pub fn flush(&mut self, cancel: &CancellationToken) -> Result<WorkingSet, WriteSessionError> {
        self.flush_with_overrides(&HashMap::new(), cancel)
    }

    /// As `flush`, but forces the auto-increment tracker's `current` for
    /// each named table to the given value after materializing (used when
    /// replaying a historical commit whose rows carry values the tracker
    /// never assigned itself).
    pub fn flush_with_auto_increment_overrides(
        &mut self,
        overrides: &HashMap<TableId, u64>,
        cancel: &CancellationToken,
    ) -> Result<WorkingSet, WriteSessionError> {
        self.flush_with_overrides(overrides, cancel)
    }

    fn flush_with_overrides(&mut self, overrides: &HashMap<TableId, u64>, cancel: &CancellationToken) -> Result<WorkingSet, WriteSessionError> {
        if cancel.is_cancelled() {
            return Err(WriteSessionError::Cancelled);
        }
        self.statement_complete();

        let dirty: Vec<TableId> = self.table_writers.iter().filter(|(_, w)| w.has_edits()).map(|(id, _)| *id).collect();

        // Bounded fan-out: chunk the dirty set so no more than
        // `max_parallel_tables` materializations run at once, while still
        // running on the process-global rayon pool rather than spinning up
        // a dedicated one per flush (§10).
        let mut materialized: Vec<(TableId, Table)> = Vec::with_capacity(dirty.len());
        for chunk in dirty.chunks(self.config.max_parallel_tables.max(1)) {
            if cancel.is_cancelled() {
                return Err(WriteSessionError::Cancelled);
            }
            let batch: Vec<(TableId, Table)> = chunk.par_iter().map(|&id| (id, self.table_writers[&id].materialize())).collect();
            materialized.extend(batch);
        }

        if cancel.is_cancelled() {
            return Err(WriteSessionError::Cancelled);
        }

        let mut new_root = self.current_root().clone();
        for (id, mut table) in materialized {
            if let Some(&forced) = overrides.get(&id) {
                self.auto_increment.set(id, forced);
            }
            if self.schemas[&id].auto_increment_col.is_some() {
                table.auto_increment_value = self.auto_increment.current(id);
            }
            self.metrics.set_committed_edits(&self.schemas[&id].table_name, table.primary.len() as i64);
            new_root = new_root.put_table(id, table.clone());
            self.table_writers.insert(id, TableWriter::from_table(self.schemas[&id].clone(), &table));
        }

        (self.root_setter)(new_root.clone());

        let new_ws = if self.target_staging {
            WorkingSet::new(self.working_set.ref_name.clone(), self.working_set.working_root.clone(), new_root)
        } else {
            WorkingSet::new(self.working_set.ref_name.clone(), new_root, self.working_set.staged_root.clone())
        };
        self.working_set = new_ws.clone();
        Ok(new_ws)
    }

    /// Replaces the session's working set wholesale, dropping every cached
    /// `TableWriter` (§3: "reset on working-set swap") so the next
    /// `GetTableWriter` rebuilds from the new root, and refreshing
    /// `self.schemas` from that root's own per-table schemas so a schema
    /// change baked into the new root is honored rather than shadowed by a
    /// stale cached one (§4.3).
    ///
    /// Rejects `working_set` if it names a different ref than the one this
    /// session was opened against — swapping across refs would silently
    /// repoint every future `GetTableWriter`/`Flush` at an unrelated branch.
    pub fn set_working_set(&mut self, working_set: WorkingSet) -> Result<(), WriteSessionError> {
        if working_set.ref_name != self.working_set.ref_name {
            return Err(WriteSessionError::WorkingSetRefMismatch {
                expected: self.working_set.ref_name.to_string(),
                actual: working_set.ref_name.to_string(),
            });
        }
        self.foreign_keys = if self.target_staging {
            working_set.staged_root.foreign_keys.clone()
        } else {
            working_set.working_root.foreign_keys.clone()
        };
        let current = if self.target_staging {
            &working_set.staged_root
        } else {
            &working_set.working_root
        };
        for id in current.table_ids() {
            if let Some(table) = current.get_table(id) {
                self.schemas.insert(id, table.schema.clone());
            }
        }
        self.working_set = working_set;
        self.table_writers.clear();
        Ok(())
    }

    /// Applies `f` to the current working set and installs the result,
    /// same reset semantics and ref check as `set_working_set`.
    pub fn update_working_set(&mut self, f: impl FnOnce(WorkingSet) -> WorkingSet) -> Result<(), WriteSessionError> {
        let updated = f(self.working_set.clone());
        self.set_working_set(updated)
    }

    pub fn working_set(&self) -> &WorkingSet {
        &self.working_set
    }
}

fn set_fk_columns_null(child_schema: &Schema, fk: &ForeignKey, row: &Tuple) -> Result<Tuple, WriteSessionError> {
    let mut new_row = row.clone();
    for c in fk.child_cols.iter() {
        let pos = child_schema.col_position(c);
        if !child_schema.columns[pos].nullable {
            return Err(WriteSessionError::Table(TableWriterError::NotNullViolation {
                table: child_schema.table_name.clone(),
                column: c,
                fk_name: fk.name.clone(),
            }));
        }
        new_row = new_row.with_field(pos, Value::Null);
    }
    Ok(new_row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auto_increment::NoBranches;
    use crate::metrics::NoopMetrics;
    use crate::schema::ColumnDef;
    use loom_primitives::{BranchId, ColId, ColList};
    use loom_value::FieldKind;

    fn make_schema(table_id: TableId, name: &str, pk: ColId, extra: &[(ColId, FieldKind, bool)]) -> Arc<Schema> {
        let mut columns = vec![ColumnDef {
            name: "id".into(),
            col_id: pk,
            kind: FieldKind::I64,
            nullable: false,
            auto_increment: false,
        }];
        for (c, kind, nullable) in extra {
            columns.push(ColumnDef {
                name: format!("col{}", c.idx()),
                col_id: *c,
                kind: kind.clone(),
                nullable: *nullable,
                auto_increment: false,
            });
        }
        Arc::new(Schema {
            table_id,
            table_name: name.into(),
            keyless: false,
            columns,
            pk_cols: ColList::new([pk]),
            indexes: vec![],
            auto_increment_col: None,
        })
    }

    fn empty_root() -> Root {
        Root::empty()
    }

    fn session(schemas: HashMap<TableId, Arc<Schema>>, foreign_keys: Vec<ForeignKey>) -> WriteSession {
        let mut root = empty_root();
        root.foreign_keys = foreign_keys;
        let ws = WorkingSet::new(BranchId("main".into()), root, empty_root());
        WriteSession::new(
            ws,
            false,
            schemas,
            Arc::new(AutoIncrementTracker::new(Arc::new(NoBranches), Arc::new(NoopMetrics))),
            Arc::new(|_root| {}),
            WriteSessionConfig::default(),
            Arc::new(NoopMetrics),
        )
    }

    #[test]
    fn self_referential_cascade_delete_walks_the_whole_chain() {
        let t = TableId(1);
        let parent_col = ColId(1);
        let schema = make_schema(t, "nodes", ColId(0), &[(parent_col, FieldKind::I64, true)]);
        let mut schemas = HashMap::new();
        schemas.insert(t, schema.clone());

        let fk = ForeignKey {
            name: "parent_fk".into(),
            child_table: t,
            child_cols: ColList::new([parent_col]),
            parent_table: t,
            parent_index: PRIMARY_INDEX_ID,
            on_delete: FkAction::Cascade,
            on_update: FkAction::Restrict,
        };
        let mut s = session(schemas, vec![fk]);

        let cancel = CancellationToken::new();
        // 1 <- 2 <- 3 <- 4 (each row's parent_col points at the row above it)
        s.insert_row(t, Tuple::new(vec![Value::Int(1), Value::Null])).unwrap();
        s.insert_row(t, Tuple::new(vec![Value::Int(2), Value::Int(1)])).unwrap();
        s.insert_row(t, Tuple::new(vec![Value::Int(3), Value::Int(2)])).unwrap();
        s.insert_row(t, Tuple::new(vec![Value::Int(4), Value::Int(3)])).unwrap();

        s.delete_row(t, Tuple::new(vec![Value::Int(1), Value::Null]), &cancel).unwrap();

        let writer = s.get_table_writer(t).unwrap();
        for id in 1..=4 {
            let key = Tuple::new(vec![Value::Int(id)]);
            assert!(writer.get_primary(&key).is_none(), "row {id} should have cascaded away");
        }
    }

    #[test]
    fn restrict_blocks_delete_when_child_still_references_parent() {
        let parent = TableId(10);
        let child = TableId(11);
        let parent_schema = make_schema(parent, "parents", ColId(0), &[]);
        let child_schema = make_schema(child, "children", ColId(0), &[(ColId(1), FieldKind::I64, true)]);
        let mut schemas = HashMap::new();
        schemas.insert(parent, parent_schema);
        schemas.insert(child, child_schema);

        let fk = ForeignKey {
            name: "child_parent_fk".into(),
            child_table: child,
            child_cols: ColList::new([ColId(1)]),
            parent_table: parent,
            parent_index: PRIMARY_INDEX_ID,
            on_delete: FkAction::Restrict,
            on_update: FkAction::Restrict,
        };
        let mut s = session(schemas, vec![fk]);
        let cancel = CancellationToken::new();

        s.insert_row(parent, Tuple::new(vec![Value::Int(1)])).unwrap();
        s.insert_row(child, Tuple::new(vec![Value::Int(100), Value::Int(1)])).unwrap();

        let err = s.delete_row(parent, Tuple::new(vec![Value::Int(1)]), &cancel).unwrap_err();
        assert!(matches!(
            err,
            WriteSessionError::Table(TableWriterError::ForeignKeyParentViolation { .. })
        ));
    }

    #[test]
    fn insert_rejects_child_row_with_no_matching_parent() {
        let parent = TableId(20);
        let child = TableId(21);
        let parent_schema = make_schema(parent, "parents", ColId(0), &[]);
        let child_schema = make_schema(child, "children", ColId(0), &[(ColId(1), FieldKind::I64, true)]);
        let mut schemas = HashMap::new();
        schemas.insert(parent, parent_schema);
        schemas.insert(child, child_schema);

        let fk = ForeignKey {
            name: "child_parent_fk".into(),
            child_table: child,
            child_cols: ColList::new([ColId(1)]),
            parent_table: parent,
            parent_index: PRIMARY_INDEX_ID,
            on_delete: FkAction::Restrict,
            on_update: FkAction::Restrict,
        };
        let mut s = session(schemas, vec![fk]);

        let err = s.insert_row(child, Tuple::new(vec![Value::Int(1), Value::Int(999)])).unwrap_err();
        assert!(matches!(
            err,
            WriteSessionError::Table(TableWriterError::ForeignKeyChildViolation { .. })
        ));
    }

    #[test]
    fn null_fk_column_never_requires_a_parent_match() {
        let parent = TableId(30);
        let child = TableId(31);
        let parent_schema = make_schema(parent, "parents", ColId(0), &[]);
        let child_schema = make_schema(child, "children", ColId(0), &[(ColId(1), FieldKind::I64, true)]);
        let mut schemas = HashMap::new();
        schemas.insert(parent, parent_schema);
        schemas.insert(child, child_schema);

        let fk = ForeignKey {
            name: "child_parent_fk".into(),
            child_table: child,
            child_cols: ColList::new([ColId(1)]),
            parent_table: parent,
            parent_index: PRIMARY_INDEX_ID,
            on_delete: FkAction::Restrict,
            on_update: FkAction::Restrict,
        };
        let mut s = session(schemas, vec![fk]);

        s.insert_row(child, Tuple::new(vec![Value::Int(1), Value::Null])).unwrap();
    }

    #[test]
    fn flush_produces_a_root_containing_inserted_rows() {
        let t = TableId(40);
        let schema = make_schema(t, "widgets", ColId(0), &[]);
        let mut schemas = HashMap::new();
        schemas.insert(t, schema);
        let mut s = session(schemas, vec![]);
        let cancel = CancellationToken::new();

        s.insert_row(t, Tuple::new(vec![Value::Int(1)])).unwrap();
        let ws = s.flush(&cancel).unwrap();
        let table = ws.working_root.get_table(t).unwrap();
        assert_eq!(table.primary.len(), 1);
    }
}
