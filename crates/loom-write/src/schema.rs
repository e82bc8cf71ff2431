//! The minimum surface of `Schema`/`Root`/`WorkingSet`/table shape needed to
//! drive the write path (§1, §3). Commit objects, branch refs and history
//! plumbing stay out of scope; this module models just enough to let
//! `WriteSession` and `AutoIncrementTracker` walk branches and assemble roots.

use std::collections::BTreeMap;
use std::sync::Arc;

use loom_primitives::{BranchId, ColId, ColList, IndexId, TableId};
use loom_storage::OrderedMap;
use loom_value::{Descriptor, FieldKind};

/// One column of a table's row shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub col_id: ColId,
    pub kind: FieldKind,
    pub nullable: bool,
    pub auto_increment: bool,
}

/// One column within a (possibly composite) index, with its own prefix
/// truncation length if the column is variable-length.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexColumn {
    pub col_id: ColId,
    pub prefix_len: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexDefinition {
    pub index_id: IndexId,
    pub name: String,
    pub cols: Vec<IndexColumn>,
    pub unique: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FkAction {
    Restrict,
    Cascade,
    SetNull,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForeignKey {
    pub name: String,
    pub child_table: TableId,
    pub child_cols: ColList,
    pub parent_table: TableId,
    /// The parent-side unique index (primary or unique secondary) this FK is
    /// checked against.
    pub parent_index: IndexId,
    pub on_delete: FkAction,
    pub on_update: FkAction,
}

/// Logical shape of one table, immutable for the lifetime of the
/// `TableWriter` built from it (§3). A schema change produces a new writer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schema {
    pub table_id: TableId,
    pub table_name: String,
    pub keyless: bool,
    pub columns: Vec<ColumnDef>,
    /// Empty iff `keyless`.
    pub pk_cols: ColList,
    pub indexes: Vec<IndexDefinition>,
    pub auto_increment_col: Option<ColId>,
}

impl Schema {
    pub fn col_position(&self, col_id: ColId) -> usize {
        self.columns
            .iter()
            .position(|c| c.col_id == col_id)
            .unwrap_or_else(|| panic!("column {col_id:?} not present in schema for {}", self.table_name))
    }

    /// The non-keyless primary key descriptor: one field per PK column, in
    /// PK-column order, no prefix truncation (PK columns are compared whole).
    pub fn primary_key_descriptor(&self) -> Descriptor {
        if self.keyless {
            return Descriptor::new(vec![FieldKind::Hash128]);
        }
        let fields = self
            .pk_cols
            .iter()
            .map(|c| self.columns[self.col_position(c)].kind.clone())
            .collect();
        Descriptor::new(fields)
    }

    /// The primary value descriptor. For a keyed table this is every
    /// non-PK column in schema order; for a keyless table it is the
    /// cardinality field followed by every column (§3, §6).
    pub fn primary_value_descriptor(&self) -> Descriptor {
        if self.keyless {
            let mut fields = vec![FieldKind::Cardinality];
            fields.extend(self.columns.iter().map(|c| c.kind.clone()));
            return Descriptor::new(fields);
        }
        let fields = self
            .columns
            .iter()
            .filter(|c| !self.pk_cols.iter().any(|pk| pk == c.col_id))
            .map(|c| c.kind.clone())
            .collect();
        Descriptor::new(fields)
    }

    /// Row positions (in schema column order) feeding the primary key tuple,
    /// in key-field order.
    pub fn primary_key_positions(&self) -> Vec<usize> {
        if self.keyless {
            return Vec::new();
        }
        self.pk_cols.iter().map(|c| self.col_position(c)).collect()
    }

    /// Row positions feeding the primary value tuple, in value-field order.
    /// For a keyless table this excludes the synthetic leading cardinality
    /// field (there is no row column for it); see `primary_value_column_descriptor`.
    pub fn primary_value_positions(&self) -> Vec<usize> {
        if self.keyless {
            return (0..self.columns.len()).collect();
        }
        (0..self.columns.len())
            .filter(|&pos| !self.pk_cols.iter().any(|pk| pk.idx() == self.columns[pos].col_id.idx()))
            .collect()
    }

    /// The value descriptor restricted to the columns `primary_value_positions`
    /// actually indexes into — i.e. `primary_value_descriptor()` minus the
    /// leading `Cardinality` field for a keyless table, unchanged otherwise.
    pub fn primary_value_column_descriptor(&self) -> Descriptor {
        if self.keyless {
            Descriptor::new(self.primary_value_descriptor().fields()[1..].to_vec())
        } else {
            self.primary_value_descriptor()
        }
    }

    /// The key descriptor for a secondary index: the indexed columns (each
    /// with its declared prefix truncation), followed by the suffix that
    /// recovers the owning primary key (the PK columns for a keyed table, or
    /// a single `Hash128` field for a keyless one).
    pub fn index_key_descriptor(&self, index: &IndexDefinition) -> Descriptor {
        let mut fields: Vec<FieldKind> = index
            .cols
            .iter()
            .map(|ic| {
                let base = self.columns[self.col_position(ic.col_id)].kind.clone();
                apply_prefix(base, ic.prefix_len)
            })
            .collect();
        if self.keyless {
            fields.push(FieldKind::Hash128);
        } else {
            fields.extend(self.pk_cols.iter().map(|c| self.columns[self.col_position(c)].kind.clone()));
        }
        Descriptor::new(fields)
    }

    /// Row positions feeding a secondary index's key tuple, indexed columns
    /// first, PK columns last (empty for a keyless table, whose suffix is
    /// computed separately as the row's content hash).
    pub fn index_key_positions(&self, index: &IndexDefinition) -> Vec<usize> {
        let mut positions: Vec<usize> = index.cols.iter().map(|ic| self.col_position(ic.col_id)).collect();
        if !self.keyless {
            positions.extend(self.pk_cols.iter().map(|c| self.col_position(c)));
        }
        positions
    }

    pub fn index_prefix_lens(&self, index: &IndexDefinition) -> Vec<Option<usize>> {
        let mut lens: Vec<Option<usize>> = index.cols.iter().map(|ic| ic.prefix_len).collect();
        if !self.keyless {
            lens.extend(self.pk_cols.iter().map(|_| None));
        } else {
            lens.push(None);
        }
        lens
    }

    /// Rebuilds a full row in schema-column order from a primary (key, value)
    /// pair, the inverse of the `primary_key_positions`/`primary_value_positions`
    /// projection. For a keyless table the key carries no row data (it is a
    /// content hash); the row lives entirely in the value tuple after its
    /// leading cardinality field.
    pub fn recombine_row(&self, key: &loom_value::Tuple, value: &loom_value::Tuple) -> loom_value::Tuple {
        let mut fields = vec![loom_value::Value::Null; self.columns.len()];
        if self.keyless {
            for (i, v) in value.values().iter().skip(1).enumerate() {
                fields[i] = v.clone();
            }
        } else {
            for (i, pos) in self.primary_key_positions().into_iter().enumerate() {
                fields[pos] = key.get_field(i).clone();
            }
            for (i, pos) in self.primary_value_positions().into_iter().enumerate() {
                fields[pos] = value.get_field(i).clone();
            }
        }
        loom_value::Tuple::new(fields)
    }
}

fn apply_prefix(kind: FieldKind, prefix_len: Option<usize>) -> FieldKind {
    match (kind, prefix_len) {
        (FieldKind::Bytes { .. }, Some(n)) => FieldKind::Bytes { prefix_len: Some(n) },
        (FieldKind::Str { .. }, Some(n)) => FieldKind::Str { prefix_len: Some(n) },
        (other, _) => other,
    }
}

/// One relational table at one version: schema plus its primary map, one map
/// per secondary index, and its auto-increment counter if it has one.
#[derive(Clone)]
pub struct Table {
    pub schema: Arc<Schema>,
    pub primary: OrderedMap,
    pub secondaries: BTreeMap<IndexId, OrderedMap>,
    pub auto_increment_value: u64,
}

impl Table {
    pub fn empty(schema: Arc<Schema>) -> Self {
        let primary = OrderedMap::empty(schema.primary_key_descriptor());
        let secondaries = schema
            .indexes
            .iter()
            .map(|idx| (idx.index_id, OrderedMap::empty(schema.index_key_descriptor(idx))))
            .collect();
        Self {
            schema,
            primary,
            secondaries,
            auto_increment_value: 0,
        }
    }
}

/// Snapshot of every table in a database at one version, plus the foreign
/// keys declared across them. Immutable; `put_table` returns a new `Root`
/// (the BTreeMap clone is cheap: every `Table` is itself `Arc`-backed).
#[derive(Clone, Default)]
pub struct Root {
    tables: BTreeMap<TableId, Table>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl Root {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get_table(&self, id: TableId) -> Option<&Table> {
        self.tables.get(&id)
    }

    pub fn put_table(&self, id: TableId, table: Table) -> Root {
        let mut tables = self.tables.clone();
        tables.insert(id, table);
        Root {
            tables,
            foreign_keys: self.foreign_keys.clone(),
        }
    }

    pub fn table_ids(&self) -> impl Iterator<Item = TableId> + '_ {
        self.tables.keys().copied()
    }

    pub fn foreign_keys_with_child(&self, table: TableId) -> impl Iterator<Item = &ForeignKey> {
        self.foreign_keys.iter().filter(move |fk| fk.child_table == table)
    }

    pub fn foreign_keys_with_parent(&self, table: TableId) -> impl Iterator<Item = &ForeignKey> {
        self.foreign_keys.iter().filter(move |fk| fk.parent_table == table)
    }
}

/// A named mutable pointer to (working root, staged root). Identity is fixed
/// at creation; only its roots mutate, via `Flush`/`SetWorkingSet` (§3).
#[derive(Clone)]
pub struct WorkingSet {
    pub ref_name: BranchId,
    pub working_root: Root,
    pub staged_root: Root,
}

impl WorkingSet {
    pub fn new(ref_name: BranchId, working_root: Root, staged_root: Root) -> Self {
        Self {
            ref_name,
            working_root,
            staged_root,
        }
    }
}
