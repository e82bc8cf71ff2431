use std::collections::BTreeMap;
use std::ops::Bound;

use loom_value::Tuple;

use crate::ordered_map::OrderedMap;

/// A staging overlay above an immutable `OrderedMap` (§3, §6). Owned by
/// exactly one `IndexWriter`; never shared across threads (§5).
///
/// Two layers of pending edits are tracked, matching the statement/flush
/// discipline of §7:
/// - `pending`: edits since the last `checkpoint()` or `revert()`. Dropped
///   wholesale by `revert()` (statement `discard_changes`).
/// - `checkpoint`: edits folded in by a prior `checkpoint()` call
///   (statement `statement_complete`), durable against a later `revert()`.
///
/// A `None` entry records a tombstone (an explicit delete of a key that
/// exists in an earlier layer).
pub struct MutableMap {
    base: OrderedMap,
    checkpoint: BTreeMap<Vec<u8>, Option<(Tuple, Tuple)>>,
    pending: BTreeMap<Vec<u8>, Option<(Tuple, Tuple)>>,
}

impl MutableMap {
    pub fn new(base: OrderedMap) -> Self {
        Self {
            base,
            checkpoint: BTreeMap::new(),
            pending: BTreeMap::new(),
        }
    }

    pub fn base(&self) -> &OrderedMap {
        &self.base
    }

    fn encode_key(&self, key: &Tuple) -> Vec<u8> {
        key.encode(self.base.key_desc())
    }

    pub fn get(&self, key: &Tuple) -> Option<Tuple> {
        let enc = self.encode_key(key);
        if let Some(slot) = self.pending.get(&enc) {
            return slot.as_ref().map(|(_, v)| v.clone());
        }
        if let Some(slot) = self.checkpoint.get(&enc) {
            return slot.as_ref().map(|(_, v)| v.clone());
        }
        self.base.get(key).cloned()
    }

    pub fn has(&self, key: &Tuple) -> bool {
        self.get(key).is_some()
    }

    pub fn put(&mut self, key: Tuple, value: Tuple) {
        let enc = self.encode_key(&key);
        self.pending.insert(enc, Some((key, value)));
    }

    pub fn delete(&mut self, key: &Tuple) {
        let enc = self.encode_key(key);
        self.pending.insert(enc, None);
    }

    pub fn has_edits(&self) -> bool {
        !self.pending.is_empty() || !self.checkpoint.is_empty()
    }

    /// Promotes `pending` into `checkpoint`. No materialization happens
    /// here — the overlay still sits above the original `base`.
    pub fn checkpoint(&mut self) {
        for (k, v) in std::mem::take(&mut self.pending) {
            self.checkpoint.insert(k, v);
        }
    }

    /// Drops edits made since the last `checkpoint()`.
    pub fn revert(&mut self) {
        self.pending.clear();
    }

    /// Iterates the overlay-merged view within `range` (a byte range over
    /// the key descriptor's encoding), in key order, honoring tombstones
    /// and overlay precedence (`pending` over `checkpoint` over `base`).
    ///
    /// The merge is eager over the *edited* keys (bounded by the size of
    /// this statement's pending/checkpoint edits, never by the size of
    /// `base`) and lazy over `base` itself, so iteration cost scales with
    /// what changed, not with table size.
    pub fn iter_range(&self, range: (Bound<Vec<u8>>, Bound<Vec<u8>>)) -> MergedRangeIter<'_> {
        let mut overlay: BTreeMap<&Vec<u8>, Option<&(Tuple, Tuple)>> = BTreeMap::new();
        for (k, v) in &self.checkpoint {
            overlay.insert(k, v.as_ref());
        }
        for (k, v) in &self.pending {
            overlay.insert(k, v.as_ref());
        }
        let overlay_in_range: Vec<(Vec<u8>, Option<(Tuple, Tuple)>)> = overlay
            .range((range.0.clone(), range.1.clone()))
            .map(|(k, v)| ((*k).clone(), v.cloned()))
            .collect();

        let base_iter: Box<dyn Iterator<Item = (&Tuple, &Tuple)> + '_> = Box::new(self.base.iter_range(range));
        MergedRangeIter {
            base_iter: base_iter.peekable(),
            base_desc: self.base.key_desc().clone(),
            overlay: overlay_in_range.into_iter().peekable(),
        }
    }

    /// Folds every committed and pending edit over `base`, producing a new
    /// immutable `OrderedMap`.
    pub fn materialize(&self) -> OrderedMap {
        let key_desc = self.base.key_desc().clone();
        let mut entries: BTreeMap<Vec<u8>, (Tuple, Tuple)> = self
            .base
            .iter()
            .map(|(k, v)| (k.encode(&key_desc), (k.clone(), v.clone())))
            .collect();
        for (k, v) in self.checkpoint.iter().chain(self.pending.iter()) {
            match v {
                Some(kv) => {
                    entries.insert(k.clone(), kv.clone());
                }
                None => {
                    entries.remove(k);
                }
            }
        }
        OrderedMap::from_entries(key_desc, entries)
    }
}

/// Lazy, finite, forward-only, non-restartable iterator merging the staged
/// overlay with the underlying `OrderedMap` (Design Notes, §9).
pub struct MergedRangeIter<'a> {
    base_iter: std::iter::Peekable<Box<dyn Iterator<Item = (&'a Tuple, &'a Tuple)> + 'a>>,
    base_desc: loom_value::Descriptor,
    overlay: std::iter::Peekable<std::vec::IntoIter<(Vec<u8>, Option<(Tuple, Tuple)>)>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_value::{Descriptor, FieldKind, Value};

    fn desc() -> Descriptor {
        Descriptor::new(vec![FieldKind::I64])
    }

    fn key(n: i64) -> Tuple {
        Tuple::new(vec![Value::Int(n)])
    }

    #[test]
    fn put_shadows_base_until_materialized() {
        let base = OrderedMap::empty(desc());
        let mut mm = MutableMap::new(base);
        mm.put(key(1), key(100));
        assert_eq!(mm.get(&key(1)), Some(key(100)));

        let materialized = mm.materialize();
        assert_eq!(materialized.get(&key(1)), Some(&key(100)));
    }

    #[test]
    fn revert_drops_pending_but_not_checkpoint() {
        let base = OrderedMap::empty(desc());
        let mut mm = MutableMap::new(base);
        mm.put(key(1), key(100));
        mm.checkpoint();
        mm.put(key(2), key(200));
        mm.revert();

        assert_eq!(mm.get(&key(1)), Some(key(100)));
        assert_eq!(mm.get(&key(2)), None);
    }

    #[test]
    fn delete_after_checkpoint_materializes_as_tombstone() {
        let base = OrderedMap::empty(desc());
        let mut mm = MutableMap::new(base);
        mm.put(key(1), key(100));
        mm.checkpoint();
        mm.delete(&key(1));

        assert_eq!(mm.get(&key(1)), None);
        let materialized = mm.materialize();
        assert!(!materialized.has(&key(1)));
    }

    #[test]
    fn iter_range_merges_overlay_over_base_in_order() {
        let mut entries = std::collections::BTreeMap::new();
        let d = desc();
        for n in [1i64, 3, 5] {
            entries.insert(key(n).encode(&d), (key(n), key(n * 10)));
        }
        let base = OrderedMap::from_entries(d.clone(), entries);
        let mut mm = MutableMap::new(base);
        mm.put(key(2), key(20));
        mm.delete(&key(3));

        let all: Vec<i64> = mm
            .iter_range((std::ops::Bound::Unbounded, std::ops::Bound::Unbounded))
            .map(|(k, _)| match k.get_field(0) {
                Value::Int(n) => *n,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(all, vec![1, 2, 5]);
    }
}

impl<'a> Iterator for MergedRangeIter<'a> {
    type Item = (Tuple, Tuple);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let base_key = self.base_iter.peek().map(|(k, _)| k.encode(&self.base_desc));
            let overlay_key = self.overlay.peek().map(|(k, _)| k.clone());

            match (base_key, overlay_key) {
                (None, None) => return None,
                (Some(_), None) => {
                    let (k, v) = self.base_iter.next().unwrap();
                    return Some((k.clone(), v.clone()));
                }
                (None, Some(_)) => match self.overlay.next().unwrap().1 {
                    Some(kv) => return Some(kv),
                    None => continue,
                },
                (Some(bk), Some(ok)) => {
                    if bk < ok {
                        let (k, v) = self.base_iter.next().unwrap();
                        return Some((k.clone(), v.clone()));
                    } else if ok < bk {
                        match self.overlay.next().unwrap().1 {
                            Some(kv) => return Some(kv),
                            None => continue,
                        }
                    } else {
                        // Overlay wins on key collision; drop the shadowed
                        // base entry.
                        self.base_iter.next();
                        match self.overlay.next().unwrap().1 {
                            Some(kv) => return Some(kv),
                            None => continue,
                        }
                    }
                }
            }
        }
    }
}
