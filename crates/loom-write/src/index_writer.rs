//! Staged key/value edits for one index, primary or secondary (§4.1).
//!
//! The source models this as an interface with five concrete
//! implementations (primary, primary-keyless, secondary-unique,
//! secondary-non-unique, secondary-keyless). Re-encoded here as a sealed
//! tagged variant: one `IndexWriter` struct holding the fields every variant
//! shares (its `MutableMap`, descriptors, name) plus an `IndexKind` enum
//! carrying variant-specific row-projection data. Dispatch on `self.kind` is
//! static; no trait object crosses the boundary.

use std::ops::Bound;

use loom_storage::{MutableMap, OrderedMap};
use loom_value::{Descriptor, FieldKind, Tuple, Value};

use crate::error::IndexWriterError;
use crate::schema::{IndexDefinition, Schema};

/// Extra context a `TableWriter` supplies alongside a row, needed by the
/// keyless variants, which cannot derive a row's content hash or
/// post-operation cardinality from the row alone (§4.1 secondary-keyless:
/// "Delete must also consult the primary's cardinality").
#[derive(Clone, Copy)]
pub struct KeylessContext {
    pub hash: [u8; 16],
    /// Cardinality the primary row will have *after* the caller's own
    /// primary-side mutation is applied. Only consulted by
    /// `SecondaryKeyless::delete`.
    pub cardinality_after: u64,
}

enum IndexKind {
    Primary {
        key_positions: Vec<usize>,
        value_positions: Vec<usize>,
    },
    PrimaryKeyless {
        value_positions: Vec<usize>,
        column_value_desc: Descriptor,
    },
    SecondaryUnique {
        key_positions: Vec<usize>,
        indexed_len: usize,
    },
    SecondaryNonUnique {
        key_positions: Vec<usize>,
        indexed_len: usize,
    },
    SecondaryKeyless {
        key_positions: Vec<usize>,
        indexed_len: usize,
    },
}

pub struct IndexWriter {
    name: String,
    key_desc: Descriptor,
    value_desc: Descriptor,
    map: MutableMap,
    kind: IndexKind,
}

fn project_row(row: &Tuple, positions: &[usize], desc: &Descriptor) -> Tuple {
    let values = positions
        .iter()
        .enumerate()
        .map(|(i, &p)| {
            let v = row.get_field(p).clone();
            match desc.fields().get(i) {
                Some(FieldKind::Bytes { prefix_len: Some(n) }) | Some(FieldKind::Str { prefix_len: Some(n) }) => {
                    v.truncate_prefix(*n)
                }
                _ => v,
            }
        })
        .collect();
    Tuple::new(values)
}

/// Like `project_row`, but appends `suffix` as one extra trailing field —
/// used to build a keyless secondary index's key (indexed columns, then the
/// parent row's content hash) without requiring the caller to pre-size a
/// tuple that `with_field` could index into.
fn project_row_with_suffix(row: &Tuple, positions: &[usize], desc: &Descriptor, suffix: Value) -> Tuple {
    let mut values: Vec<Value> = positions
        .iter()
        .enumerate()
        .map(|(i, &p)| {
            let v = row.get_field(p).clone();
            match desc.fields().get(i) {
                Some(FieldKind::Bytes { prefix_len: Some(n) }) | Some(FieldKind::Str { prefix_len: Some(n) }) => {
                    v.truncate_prefix(*n)
                }
                _ => v,
            }
        })
        .collect();
    values.push(suffix);
    Tuple::new(values)
}

/// Builds the half-open byte range over an index's key encoding that
/// contains every key sharing `prefix`'s encoded bytes as a prefix. Used by
/// the unique-secondary probe and by foreign-key parent/child lookups.
pub fn prefix_range(prefix: &Tuple, prefix_desc: &Descriptor) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
    let lower = prefix.encode(prefix_desc);
    let mut upper = lower.clone();
    // Append a 0xFF-run long enough to dominate any suffix the full key
    // descriptor can add; the encoded prefix is always a strict prefix of
    // every matching full key's bytes, so any single 0xFF-terminated bound
    // wider than the longest possible suffix is sufficient here because we
    // compare with Excluded on the upper bound after incrementing the last
    // byte that isn't already 0xFF (standard prefix-range increment).
    if let Some(pos) = upper.iter().rposition(|&b| b != 0xFF) {
        upper.truncate(pos + 1);
        upper[pos] += 1;
        (Bound::Included(lower), Bound::Excluded(upper))
    } else {
        (Bound::Included(lower), Bound::Unbounded)
    }
}

impl IndexWriter {
    pub fn new_primary(schema: &Schema, base: OrderedMap) -> Self {
        let key_desc = schema.primary_key_descriptor();
        let value_desc = schema.primary_value_descriptor();
        let kind = if schema.keyless {
            IndexKind::PrimaryKeyless {
                value_positions: schema.primary_value_positions(),
                column_value_desc: schema.primary_value_column_descriptor(),
            }
        } else {
            IndexKind::Primary {
                key_positions: schema.primary_key_positions(),
                value_positions: schema.primary_value_positions(),
            }
        };
        Self {
            name: String::new(),
            key_desc,
            value_desc,
            map: MutableMap::new(base),
            kind,
        }
    }

    pub fn new_secondary(schema: &Schema, index: &IndexDefinition, base: OrderedMap) -> Self {
        let key_desc = schema.index_key_descriptor(index);
        let key_positions = schema.index_key_positions(index);
        let indexed_len = index.cols.len();
        let kind = if schema.keyless {
            IndexKind::SecondaryKeyless {
                key_positions,
                indexed_len,
            }
        } else if index.unique {
            IndexKind::SecondaryUnique {
                key_positions,
                indexed_len,
            }
        } else {
            IndexKind::SecondaryNonUnique {
                key_positions,
                indexed_len,
            }
        };
        Self {
            name: index.name.clone(),
            key_desc,
            value_desc: Descriptor::new(Vec::new()),
            map: MutableMap::new(base),
            kind,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_desc(&self) -> &Descriptor {
        &self.key_desc
    }

    pub fn is_unique(&self) -> bool {
        matches!(self.kind, IndexKind::Primary { .. } | IndexKind::PrimaryKeyless { .. } | IndexKind::SecondaryUnique { .. })
    }

    fn indexed_prefix(&self, row: &Tuple) -> Option<Tuple> {
        let (key_positions, indexed_len) = match &self.kind {
            IndexKind::SecondaryUnique { key_positions, indexed_len }
            | IndexKind::SecondaryNonUnique { key_positions, indexed_len }
            | IndexKind::SecondaryKeyless { key_positions, indexed_len } => (key_positions, *indexed_len),
            _ => return None,
        };
        let prefix_desc = Descriptor::new(self.key_desc.fields()[..indexed_len].to_vec());
        Some(project_row(row, &key_positions[..indexed_len], &prefix_desc))
    }

    /// Pre-flight uniqueness check used before any writer in a multi-index
    /// insert/update is mutated (§4.2: early validation avoids partial work
    /// on abort).
    #[tracing::instrument(skip_all)]
    pub fn validate_key(&self, row: &Tuple, ctx: Option<KeylessContext>) -> Result<(), IndexWriterError> {
        match &self.kind {
            IndexKind::Primary { key_positions, .. } => {
                let key = project_row(row, key_positions, &self.key_desc);
                if let Some(existing_value) = self.map.get(&key) {
                    return Err(self.unique_violation(&key, existing_value, true));
                }
                Ok(())
            }
            IndexKind::PrimaryKeyless { .. } => Ok(()),
            IndexKind::SecondaryUnique { indexed_len, .. } => {
                let prefix = self.indexed_prefix(row).expect("secondary writer has a key prefix");
                if prefix.values().iter().any(Value::is_null) {
                    return Ok(());
                }
                if let Some((existing_key, _)) = self.first_matching_prefix(&prefix) {
                    return Err(self.secondary_unique_violation(&prefix, &existing_key, *indexed_len));
                }
                let _ = ctx;
                Ok(())
            }
            IndexKind::SecondaryNonUnique { .. } | IndexKind::SecondaryKeyless { .. } => Ok(()),
        }
    }

    fn first_matching_prefix(&self, prefix: &Tuple) -> Option<(Tuple, Tuple)> {
        let indexed_len = match &self.kind {
            IndexKind::SecondaryUnique { indexed_len, .. } => *indexed_len,
            _ => return None,
        };
        let prefix_desc = Descriptor::new(self.key_desc.fields()[..indexed_len].to_vec());
        let range = prefix_range(prefix, &prefix_desc);
        self.map.iter_range(range).next()
    }

    fn unique_violation(&self, key: &Tuple, existing_value: Tuple, is_primary_key: bool) -> IndexWriterError {
        IndexWriterError::UniqueViolation {
            name: self.name.clone(),
            key_str: key.format_key(&self.key_desc),
            existing_key: key.clone(),
            existing_value,
            is_primary_key,
        }
    }

    /// Raised by a unique secondary on a colliding prefix. Carries only the
    /// existing row's primary key, not its full value — the containing
    /// `TableWriter` resolves the full row via the primary writer and
    /// re-raises a complete `UniqueViolation` (§4.1).
    fn secondary_unique_violation(&self, prefix: &Tuple, existing_key: &Tuple, indexed_len: usize) -> IndexWriterError {
        let prefix_desc = Descriptor::new(self.key_desc.fields()[..indexed_len].to_vec());
        let existing_pk = Tuple::new(existing_key.values()[indexed_len..].to_vec());
        IndexWriterError::SecondaryUniqueViolation {
            name: self.name.clone(),
            prefix_str: prefix.format_key(&prefix_desc),
            existing_pk,
        }
    }

    #[tracing::instrument(skip_all)]
    pub fn insert(&mut self, row: &Tuple, ctx: Option<KeylessContext>) -> Result<(), IndexWriterError> {
        match &self.kind {
            IndexKind::Primary {
                key_positions,
                value_positions,
            } => {
                let key = project_row(row, key_positions, &self.key_desc);
                if let Some(existing_value) = self.map.get(&key) {
                    return Err(self.unique_violation(&key, existing_value, true));
                }
                let value = project_row(row, value_positions, &self.value_desc);
                log::trace!("PRIMARY INSERT: key={}", key.format_key(&self.key_desc));
                self.map.put(key, value);
                Ok(())
            }
            IndexKind::PrimaryKeyless {
                value_positions,
                column_value_desc,
            } => {
                let ctx = ctx.expect("keyless primary insert always carries a KeylessContext");
                let hash_key = Tuple::new(vec![Value::Hash128(ctx.hash)]);
                let value = match self.map.get(&hash_key) {
                    Some(existing) => bump_cardinality(&existing, 1),
                    None => {
                        let cols = project_row(row, value_positions, column_value_desc);
                        let mut values = vec![Value::Cardinality(1)];
                        values.extend(cols.values().iter().cloned());
                        Tuple::new(values)
                    }
                };
                log::trace!("KEYLESS PRIMARY INSERT: hash={hash_key:?}");
                self.map.put(hash_key, value);
                Ok(())
            }
            IndexKind::SecondaryUnique { key_positions, indexed_len } => {
                let prefix = self.indexed_prefix(row).unwrap();
                if !prefix.values().iter().any(Value::is_null) {
                    if let Some((existing_key, _)) = self.first_matching_prefix(&prefix) {
                        return Err(self.secondary_unique_violation(&prefix, &existing_key, *indexed_len));
                    }
                }
                let key = project_row(row, key_positions, &self.key_desc);
                self.map.put(key, Tuple::empty());
                Ok(())
            }
            IndexKind::SecondaryNonUnique { key_positions, .. } => {
                let key = project_row(row, key_positions, &self.key_desc);
                self.map.put(key, Tuple::empty());
                Ok(())
            }
            IndexKind::SecondaryKeyless { key_positions, .. } => {
                let ctx = ctx.expect("keyless secondary insert always carries a KeylessContext");
                let key = project_row_with_suffix(row, key_positions, &self.key_desc, Value::Hash128(ctx.hash));
                self.map.put(key, Tuple::empty());
                Ok(())
            }
        }
    }

    #[tracing::instrument(skip_all)]
    pub fn delete(&mut self, row: &Tuple, ctx: Option<KeylessContext>) {
        match &self.kind {
            IndexKind::Primary { key_positions, .. } => {
                let key = project_row(row, key_positions, &self.key_desc);
                self.map.delete(&key);
            }
            IndexKind::PrimaryKeyless { .. } => {
                let ctx = ctx.expect("keyless primary delete always carries a KeylessContext");
                let hash_key = Tuple::new(vec![Value::Hash128(ctx.hash)]);
                match self.map.get(&hash_key) {
                    None => {}
                    Some(existing) => {
                        if ctx.cardinality_after == 0 {
                            self.map.delete(&hash_key);
                        } else {
                            self.map.put(hash_key, bump_cardinality(&existing, -1));
                        }
                    }
                }
            }
            IndexKind::SecondaryUnique { key_positions, .. } | IndexKind::SecondaryNonUnique { key_positions, .. } => {
                let key = project_row(row, key_positions, &self.key_desc);
                self.map.delete(&key);
            }
            IndexKind::SecondaryKeyless { key_positions, .. } => {
                let ctx = ctx.expect("keyless secondary delete always carries a KeylessContext");
                if ctx.cardinality_after > 0 {
                    // Other duplicate rows still need this secondary entry.
                    return;
                }
                let key = project_row_with_suffix(row, key_positions, &self.key_desc, Value::Hash128(ctx.hash));
                self.map.delete(&key);
            }
        }
    }

    /// `update` is logically `delete(old)` then `insert(new)`, but elides the
    /// delete when the key fields are provably unchanged, to avoid tombstone
    /// churn (§4.1).
    #[tracing::instrument(skip_all)]
    pub fn update(
        &mut self,
        old_row: &Tuple,
        new_row: &Tuple,
        old_ctx: Option<KeylessContext>,
        new_ctx: Option<KeylessContext>,
    ) -> Result<(), IndexWriterError> {
        if old_row.count() == 0 {
            // §9 open question: an empty old tuple means "no prior row" —
            // elide the delete step entirely rather than treat it as
            // malformed input.
            return self.insert(new_row, new_ctx);
        }
        match &self.kind {
            IndexKind::Primary { key_positions, value_positions } => {
                let old_key = project_row(old_row, key_positions, &self.key_desc);
                let new_key = project_row(new_row, key_positions, &self.key_desc);
                if old_key == new_key {
                    let value = project_row(new_row, value_positions, &self.value_desc);
                    self.map.put(new_key, value);
                    return Ok(());
                }
                self.delete(old_row, old_ctx);
                self.insert(new_row, new_ctx)
            }
            IndexKind::PrimaryKeyless { .. } => {
                // Two separate cardinality adjustments; never combined (§4.1).
                self.delete(old_row, old_ctx);
                self.insert(new_row, new_ctx)
            }
            IndexKind::SecondaryUnique { key_positions, .. } | IndexKind::SecondaryNonUnique { key_positions, .. } => {
                let old_key = project_row(old_row, key_positions, &self.key_desc);
                let new_key = project_row(new_row, key_positions, &self.key_desc);
                if old_key == new_key {
                    return Ok(());
                }
                self.delete(old_row, old_ctx);
                self.insert(new_row, new_ctx)
            }
            IndexKind::SecondaryKeyless { key_positions, .. } => {
                let old_key = project_row(old_row, &key_positions[..key_positions.len()], &self.key_desc);
                let new_key = project_row(new_row, &key_positions[..key_positions.len()], &self.key_desc);
                let old_hash = old_ctx.map(|c| c.hash);
                let new_hash = new_ctx.map(|c| c.hash);
                if old_key == new_key && old_hash == new_hash {
                    return Ok(());
                }
                self.delete(old_row, old_ctx);
                self.insert(new_row, new_ctx)
            }
        }
    }

    pub fn commit(&mut self) {
        self.map.checkpoint();
    }

    pub fn discard(&mut self) {
        self.map.revert();
    }

    pub fn has_edits(&self) -> bool {
        self.map.has_edits()
    }

    pub fn iter_range(&self, range: (Bound<Vec<u8>>, Bound<Vec<u8>>)) -> impl Iterator<Item = (Tuple, Tuple)> + '_ {
        self.map.iter_range(range)
    }

    /// Consults whether a non-null prefix is already present in a unique
    /// secondary (or the primary), without mutating anything. Used by
    /// foreign-key parent lookups (§4.2 `ContainsByIndex`).
    pub fn contains_prefix(&self, prefix: &Tuple, prefix_desc: &Descriptor) -> bool {
        let range = prefix_range(prefix, prefix_desc);
        self.map.iter_range(range).next().is_some()
    }

    pub fn get(&self, key: &Tuple) -> Option<Tuple> {
        self.map.get(key)
    }

    /// Computes a keyless row's content hash from the raw SQL row, without
    /// touching the staged map. Only meaningful on the primary-keyless
    /// writer; `TableWriter` calls this once per row and threads the result
    /// through every writer (primary and secondary) that needs it.
    pub fn keyless_row_hash(&self, row: &Tuple) -> [u8; 16] {
        let (value_positions, column_value_desc) = match &self.kind {
            IndexKind::PrimaryKeyless {
                value_positions,
                column_value_desc,
            } => (value_positions, column_value_desc),
            _ => panic!("keyless_row_hash called on a non-keyless-primary writer"),
        };
        let cols = project_row(row, value_positions, column_value_desc);
        let mut values = vec![Value::Cardinality(0)];
        values.extend(cols.values().iter().cloned());
        Tuple::new(values).keyless_hash(&self.value_desc)
    }

    pub fn current_cardinality(&self, hash: [u8; 16]) -> u64 {
        let hash_key = Tuple::new(vec![Value::Hash128(hash)]);
        match self.map.get(&hash_key) {
            Some(value) => match value.get_field(0) {
                Value::Cardinality(c) => *c,
                _ => 0,
            },
            None => 0,
        }
    }

    pub fn materialize(&self) -> OrderedMap {
        self.map.materialize()
    }
}

fn bump_cardinality(value: &Tuple, delta: i64) -> Tuple {
    let current = match value.get_field(0) {
        Value::Cardinality(c) => *c,
        _ => 0,
    };
    let next = (current as i64 + delta).max(0) as u64;
    value.clone().with_field(0, Value::Cardinality(next))
}
