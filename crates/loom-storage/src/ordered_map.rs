use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use loom_value::{Descriptor, Tuple};

/// A persistent, content-addressed, ordered map from key `Tuple`s to value
/// `Tuple`s. Snapshots are immutable and freely shared (§5): cloning an
/// `OrderedMap` is an `Arc` bump, never a deep copy.
///
/// This is the in-memory reference implementation of the contract in §6;
/// the production prolly-map backing a real content-addressed store is out
/// of scope (§1) but must satisfy the same contract.
#[derive(Clone)]
pub struct OrderedMap {
    entries: Arc<BTreeMap<Vec<u8>, (Tuple, Tuple)>>,
    key_desc: Descriptor,
}

impl OrderedMap {
    pub fn empty(key_desc: Descriptor) -> Self {
        Self {
            entries: Arc::new(BTreeMap::new()),
            key_desc,
        }
    }

    pub fn key_desc(&self) -> &Descriptor {
        &self.key_desc
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &Tuple) -> Option<&Tuple> {
        self.entries.get(&key.encode(&self.key_desc)).map(|(_, v)| v)
    }

    pub fn has(&self, key: &Tuple) -> bool {
        self.entries.contains_key(&key.encode(&self.key_desc))
    }

    /// Iterates key/value pairs whose encoded key falls within `range`
    /// (a byte-range over the same encoding `get`/`has` use), in key order.
    pub fn iter_range<'a>(
        &'a self,
        range: (Bound<Vec<u8>>, Bound<Vec<u8>>),
    ) -> impl Iterator<Item = (&'a Tuple, &'a Tuple)> + 'a {
        self.entries.range(range).map(|(_, (k, v))| (k, v))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Tuple, &Tuple)> + '_ {
        self.entries.values().map(|(k, v)| (k, v))
    }

    /// Content-identity for §8 property 8 (flush idempotence): two
    /// `OrderedMap`s built from the same edits produce the same encoded
    /// entries, regardless of `Arc` identity.
    pub fn content_eq(&self, other: &OrderedMap) -> bool {
        self.entries.keys().eq(other.entries.keys())
            && self
                .entries
                .values()
                .zip(other.entries.values())
                .all(|(a, b)| a.1 == b.1)
    }

    pub(crate) fn from_entries(key_desc: Descriptor, entries: BTreeMap<Vec<u8>, (Tuple, Tuple)>) -> Self {
        Self {
            entries: Arc::new(entries),
            key_desc,
        }
    }
}
