//! Projects a SQL row into per-index writers in the fixed order that keeps
//! the data model's invariants intact on any failure path (§4.2).
//!
//! Foreign-key enforcement is deliberately NOT a method on `TableWriter`:
//! a cascade or a parent lookup needs simultaneous read access to one
//! table's writer and mutable access to another's (or, for a
//! self-referential FK, to the very writer already being mutated), which
//! Rust's borrow checker cannot prove safe through a method boundary on a
//! single `HashMap<TableId, TableWriter>` entry. `WriteSession`, which owns
//! every `TableWriter` in the session, mediates FK checks and cascades
//! instead — exactly the "writers hold a non-owning handle back to the
//! session" relationship the design calls for (§9).

use std::sync::Arc;

use loom_primitives::IndexId;
use loom_value::{Descriptor, Tuple};

use crate::error::TableWriterError;
use crate::index_writer::{IndexWriter, KeylessContext};
use crate::schema::{Schema, Table};

/// Reserved index id meaning "the primary index" wherever an `IndexId` is
/// used to name a lookup target (foreign keys, `contains_by_index`).
pub const PRIMARY_INDEX_ID: IndexId = IndexId(0);

pub struct TableWriter {
    schema: Arc<Schema>,
    primary: IndexWriter,
    secondaries: Vec<(IndexId, IndexWriter)>,
}

impl TableWriter {
    pub fn from_table(schema: Arc<Schema>, table: &Table) -> Self {
        let primary = IndexWriter::new_primary(&schema, table.primary.clone());
        let secondaries = schema
            .indexes
            .iter()
            .map(|idx| {
                let base = table
                    .secondaries
                    .get(&idx.index_id)
                    .cloned()
                    .unwrap_or_else(|| loom_storage::OrderedMap::empty(schema.index_key_descriptor(idx)));
                (idx.index_id, IndexWriter::new_secondary(&schema, idx, base))
            })
            .collect();
        Self {
            schema,
            primary,
            secondaries,
        }
    }

    pub fn empty(schema: Arc<Schema>) -> Self {
        let table = Table::empty(schema.clone());
        Self::from_table(schema, &table)
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn keyless_context(&self, row: &Tuple, cardinality_after: u64) -> Option<KeylessContext> {
        if !self.schema.keyless {
            return None;
        }
        Some(KeylessContext {
            hash: self.primary.keyless_row_hash(row),
            cardinality_after,
        })
    }

    /// `contains_by_index` resolves `PRIMARY_INDEX_ID` to an exact-key probe
    /// on the primary and any other id to a prefix probe on that secondary —
    /// the "`ContainsByIndex` capability" a parent's indexes expose to
    /// foreign-key checks (§4.2).
    pub fn contains_by_index(&self, index: IndexId, prefix: &Tuple, prefix_desc: &Descriptor) -> bool {
        if index == PRIMARY_INDEX_ID {
            let _ = prefix_desc;
            self.primary.get(prefix).is_some()
        } else {
            self.secondaries
                .iter()
                .find(|(id, _)| *id == index)
                .map(|(_, w)| w.contains_prefix(prefix, prefix_desc))
                .unwrap_or(false)
        }
    }

    pub fn get_primary(&self, key: &Tuple) -> Option<Tuple> {
        self.primary.get(key)
    }

    /// The key descriptor a probe against `index` must be encoded with:
    /// the whole primary key for `PRIMARY_INDEX_ID`, or just the indexed
    /// (non-suffix) columns of a secondary — the prefix a unique secondary
    /// is actually unique over.
    pub fn index_descriptor_for(&self, index: IndexId) -> Descriptor {
        if index == PRIMARY_INDEX_ID {
            self.schema.primary_key_descriptor()
        } else {
            let def = self
                .schema
                .indexes
                .iter()
                .find(|i| i.index_id == index)
                .unwrap_or_else(|| panic!("index {index:?} not declared on table {}", self.schema.table_name));
            let full = self.schema.index_key_descriptor(def);
            Descriptor::new(full.fields()[..def.cols.len()].to_vec())
        }
    }

    /// Every row currently staged in the primary index, recombined into full
    /// schema-column order. Used by foreign-key cascades to find child rows
    /// referencing a given parent key; a full scan, since cascades aren't
    /// assumed to have a dedicated index over the FK columns.
    pub fn iter_all_rows(&self) -> impl Iterator<Item = Tuple> + '_ {
        self.primary
            .iter_range((std::ops::Bound::Unbounded, std::ops::Bound::Unbounded))
            .map(move |(k, v)| self.schema.recombine_row(&k, &v))
    }

    #[tracing::instrument(skip_all)]
    pub fn insert_row(&mut self, row: &Tuple) -> Result<(), TableWriterError> {
        let ctx = self.keyless_context(row, cardinality_after_insert(&self.primary, row, &self.schema));

        // Primary uniqueness is pre-checked alongside the secondaries' so
        // that a PK violation never leaves any secondary mutated, matching
        // the invariant the secondaries-first ordering exists to uphold.
        self.primary.validate_key(row, ctx)?;
        for (_, sec) in self.secondaries.iter() {
            if sec.is_unique() {
                if let Err(e) = sec.validate_key(row, ctx) {
                    return Err(resolve_index_error(&self.primary, e));
                }
            }
        }
        for (_, sec) in self.secondaries.iter_mut() {
            if let Err(e) = sec.insert(row, ctx) {
                return Err(resolve_index_error(&self.primary, e));
            }
        }
        self.primary.insert(row, ctx)?;
        log::trace!("ROW INSERTED: table={}", self.schema.table_name);
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    pub fn update_row(&mut self, old_row: &Tuple, new_row: &Tuple) -> Result<(), TableWriterError> {
        let old_ctx = self.keyless_context(old_row, cardinality_after_update_old(&self.primary, old_row, &self.schema));
        let new_ctx = self.keyless_context(new_row, cardinality_after_update_new(&self.primary, old_row, new_row, &self.schema));

        for (_, sec) in self.secondaries.iter() {
            if sec.is_unique() {
                if let Err(e) = sec.validate_key(new_row, new_ctx) {
                    return Err(resolve_index_error(&self.primary, e));
                }
            }
        }
        for (_, sec) in self.secondaries.iter_mut() {
            if let Err(e) = sec.update(old_row, new_row, old_ctx, new_ctx) {
                return Err(resolve_index_error(&self.primary, e));
            }
        }
        self.primary.update(old_row, new_row, old_ctx, new_ctx)?;
        log::trace!("ROW UPDATED: table={}", self.schema.table_name);
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    pub fn delete_row(&mut self, row: &Tuple) {
        let ctx = self.keyless_context(row, cardinality_after_delete(&self.primary, row, &self.schema));
        for (_, sec) in self.secondaries.iter_mut() {
            sec.delete(row, ctx);
        }
        self.primary.delete(row, ctx);
        log::trace!("ROW DELETED: table={}", self.schema.table_name);
    }

    pub fn commit(&mut self) {
        self.primary.commit();
        for (_, sec) in self.secondaries.iter_mut() {
            sec.commit();
        }
    }

    pub fn discard(&mut self) {
        self.primary.discard();
        for (_, sec) in self.secondaries.iter_mut() {
            sec.discard();
        }
    }

    pub fn has_edits(&self) -> bool {
        self.primary.has_edits() || self.secondaries.iter().any(|(_, w)| w.has_edits())
    }

    /// Folds every writer's staged edits into a new `Table` value.
    pub fn materialize(&self) -> Table {
        Table {
            schema: self.schema.clone(),
            primary: self.primary.materialize(),
            secondaries: self
                .secondaries
                .iter()
                .map(|(id, w)| (*id, w.materialize()))
                .collect(),
            auto_increment_value: 0, // overwritten by WriteSession::flush with the tracker's value
        }
    }
}

fn cardinality_after_insert(primary: &IndexWriter, row: &Tuple, schema: &Schema) -> u64 {
    if !schema.keyless {
        return 0;
    }
    primary.current_cardinality(primary.keyless_row_hash(row)) + 1
}

fn cardinality_after_delete(primary: &IndexWriter, row: &Tuple, schema: &Schema) -> u64 {
    if !schema.keyless {
        return 0;
    }
    primary.current_cardinality(primary.keyless_row_hash(row)).saturating_sub(1)
}

fn cardinality_after_update_old(primary: &IndexWriter, old_row: &Tuple, schema: &Schema) -> u64 {
    if old_row.count() == 0 {
        return 0;
    }
    cardinality_after_delete(primary, old_row, schema)
}

fn cardinality_after_update_new(primary: &IndexWriter, old_row: &Tuple, new_row: &Tuple, schema: &Schema) -> u64 {
    if !schema.keyless {
        return 0;
    }
    // `update` on a keyless table is delete(old) then insert(new) — two
    // independent cardinality adjustments (§4.1) — so the post-insert
    // cardinality for `new` must account for `old` having already been
    // removed first when old and new hash to the same row.
    let old_hash = if old_row.count() == 0 { None } else { Some(primary.keyless_row_hash(old_row)) };
    let new_hash = primary.keyless_row_hash(new_row);
    let base = primary.current_cardinality(new_hash);
    let base = if old_hash == Some(new_hash) { base.saturating_sub(1) } else { base };
    base + 1
}

fn resolve_index_error(primary: &IndexWriter, err: crate::error::IndexWriterError) -> TableWriterError {
    use crate::error::IndexWriterError;
    match err {
        IndexWriterError::SecondaryUniqueViolation {
            name,
            prefix_str,
            existing_pk,
        } => {
            let existing_value = primary.get(&existing_pk).unwrap_or_else(Tuple::empty);
            TableWriterError::Index(IndexWriterError::UniqueViolation {
                name,
                key_str: prefix_str,
                existing_key: existing_pk,
                existing_value,
                is_primary_key: false,
            })
        }
        other => TableWriterError::Index(other),
    }
}
