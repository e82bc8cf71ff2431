//! Id newtypes and small ordinal collections used throughout the write path.
//!
//! Mirrors the teacher's `spacetimedb-primitives` crate: every identifier that
//! crosses a component boundary (table, index, sequence, column, branch) is a
//! distinct newtype so that, e.g., a `TableId` can never be passed where an
//! `IndexId` is expected.

use std::fmt;

use smallvec::SmallVec;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident($inner:ty)) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub $inner);

        impl From<$inner> for $name {
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }

        impl From<$name> for $inner {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Identifies a table within one database root.
    TableId(u32)
);
id_type!(
    /// Identifies an index (primary or secondary) within one table.
    IndexId(u32)
);
id_type!(
    /// Identifies an auto-increment sequence. One per AI column.
    SequenceId(u32)
);
id_type!(
    /// Ordinal position of a column within a table's column list.
    ColId(u16)
);

impl ColId {
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}

/// An ordered, non-empty list of column ids, e.g. the indexed columns of a
/// (possibly composite) index. Most indexes are single-column, so this is
/// backed by a `SmallVec` to avoid a heap allocation in the common case.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColList(SmallVec<[ColId; 4]>);

impl ColList {
    pub fn new(cols: impl IntoIterator<Item = ColId>) -> Self {
        let v: SmallVec<[ColId; 4]> = cols.into_iter().collect();
        assert!(!v.is_empty(), "ColList must have at least one column");
        Self(v)
    }

    pub fn single(col: ColId) -> Self {
        Self(SmallVec::from_elem(col, 1))
    }

    pub fn as_slice(&self) -> &[ColId] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// A `ColList` is never empty by construction.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn iter(&self) -> impl Iterator<Item = ColId> + '_ {
        self.0.iter().copied()
    }
}

impl<'a> IntoIterator for &'a ColList {
    type Item = ColId;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, ColId>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter().copied()
    }
}

/// Identifies one branch (a named ref) of a versioned database. Branch
/// identity is its ref name; the write path never needs to resolve this to
/// anything more structured than a string.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BranchId(pub String);

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for BranchId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn col_list_preserves_order() {
        let cols = ColList::new([ColId(2), ColId(0), ColId(1)]);
        assert_eq!(cols.as_slice(), &[ColId(2), ColId(0), ColId(1)]);
    }

    #[test]
    fn id_round_trips_through_inner() {
        let t: TableId = 7u32.into();
        let back: u32 = t.into();
        assert_eq!(back, 7);
    }
}
