//! The `OrderedMap`/`MutableMap` contract (§6) and an in-memory reference
//! implementation of it. A production prolly-tree-backed, content-addressed
//! store is out of scope here, but must honor the same contract these types
//! expose.

mod mutable_map;
mod ordered_map;

pub use mutable_map::{MergedRangeIter, MutableMap};
pub use ordered_map::OrderedMap;
