//! Tuple and descriptor encoding shared by every index writer.
//!
//! This crate sits directly above `loom-primitives` in the dependency order
//! fixed by the design: `OrderedMap ← TupleBuilder/Descriptor ← IndexWriter`.

mod descriptor;
mod tuple;
mod value;

pub use descriptor::{Descriptor, FieldKind, KeyDescriptor, ValueDescriptor};
pub use tuple::Tuple;
pub use value::Value;
