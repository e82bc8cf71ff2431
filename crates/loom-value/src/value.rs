use std::cmp::Ordering;

/// The logical content of one field of a row, independent of its physical
/// encoding. `Null` is distinct from every other variant and, per SQL
/// semantics, compares unequal to itself under unique-index checks (see
/// `loom-write`'s secondary-unique writer).
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bytes(Vec<u8>),
    Str(String),
    /// A 128-bit content hash, used as the primary key of keyless rows.
    Hash128([u8; 16]),
    /// The `u64` duplicate-row counter stored as field 0 of a keyless value
    /// tuple.
    Cardinality(u64),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truncates a `Str`/`Bytes` value to a declared index prefix length.
    /// For `Str`, `len` counts *characters*, never splitting a multi-byte
    /// code point; for `Bytes`, `len` counts raw bytes. Other variants are
    /// returned unchanged.
    pub fn truncate_prefix(&self, len: usize) -> Value {
        match self {
            Value::Str(s) => Value::Str(s.chars().take(len).collect()),
            Value::Bytes(b) => Value::Bytes(b.iter().take(len).copied().collect()),
            other => other.clone(),
        }
    }

    /// Numeric zero check used by the auto-increment insertion path: a
    /// provided value of `0` (of any numeric representation) is treated the
    /// same as `NULL`.
    pub fn is_numeric_zero(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Int(i) => *i == 0,
            Value::UInt(u) => *u == 0,
            Value::Float(f) => *f == 0.0,
            _ => false,
        }
    }

    /// A total order over non-null values of the same logical type. Two
    /// values of different non-null variants are ordered by a fixed variant
    /// rank; this only matters for mixed-type composite keys, which SQL
    /// schemas don't produce in practice but which must still resolve to a
    /// deterministic order for testing.
    pub fn cmp_typed(&self, other: &Value) -> Ordering {
        use Value::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (UInt(a), UInt(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Bytes(a), Bytes(b)) => a.cmp(b),
            (Str(a), Str(b)) => a.as_bytes().cmp(b.as_bytes()),
            (Hash128(a), Hash128(b)) => a.cmp(b),
            (Cardinality(a), Cardinality(b)) => a.cmp(b),
            _ => self.variant_rank().cmp(&other.variant_rank()),
        }
    }

    fn variant_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) => 2,
            Value::UInt(_) => 3,
            Value::Float(_) => 4,
            Value::Bytes(_) => 5,
            Value::Str(_) => 6,
            Value::Hash128(_) => 7,
            Value::Cardinality(_) => 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_truncation_respects_char_boundaries() {
        let v = Value::Str("a\u{1F600}bc".to_owned());
        let t = v.truncate_prefix(2);
        assert_eq!(t, Value::Str("a\u{1F600}".to_owned()));
    }

    #[test]
    fn zero_and_null_are_both_numeric_zero() {
        assert!(Value::Null.is_numeric_zero());
        assert!(Value::Int(0).is_numeric_zero());
        assert!(Value::UInt(0).is_numeric_zero());
        assert!(!Value::Int(1).is_numeric_zero());
    }
}
