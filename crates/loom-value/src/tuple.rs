use std::cmp::Ordering;
use std::fmt::Write as _;

use crate::descriptor::{Descriptor, FieldKind};
use crate::value::Value;

/// A byte-packed row fragment: either a key tuple or a value tuple, laid out
/// according to a `Descriptor`. `Tuple` has value semantics — cheap to
/// clone, never mutated in place; every edit produces a new `Tuple`.
///
/// Internally we keep the decoded `Value`s rather than eagerly packing
/// bytes, matching how the teacher's `ProductValue` is built up field by
/// field before being encoded for storage or hashing. `encode` produces the
/// canonical byte representation on demand (§6): a leading null-bitmap, then
/// fixed-width fields inline, then an offset table over the variable-length
/// fields, then the variable-length content itself at the tail.
#[derive(Clone, Debug, PartialEq)]
pub struct Tuple {
    values: Vec<Value>,
}

impl Tuple {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Builds a tuple with **permissive semantics**: any column not
    /// supplied by `get` is filled with `Value::Null`, and no width/type
    /// check is performed here. This is what lets a `TableWriter` build a
    /// partial key tuple (e.g. for a prefix-range probe) without having a
    /// complete row in hand.
    pub fn build_permissive<F>(len: usize, mut get: F) -> Self
    where
        F: FnMut(usize) -> Value,
    {
        Self {
            values: (0..len).map(&mut get).collect(),
        }
    }

    pub fn empty() -> Self {
        Self { values: Vec::new() }
    }

    pub fn count(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get_field(&self, i: usize) -> &Value {
        &self.values[i]
    }

    pub fn is_null(&self, i: usize) -> bool {
        self.values[i].is_null()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn with_field(mut self, i: usize, value: Value) -> Self {
        self.values[i] = value;
        self
    }

    /// Projects a subset of columns (in the given order) into a new tuple,
    /// truncating variable-length fields to the prefix length the
    /// descriptor declares for that position, if any.
    pub fn project(&self, positions: &[usize], desc: &Descriptor) -> Self {
        let values = positions
            .iter()
            .map(|&p| {
                let v = &self.values[p];
                match desc.fields().get(p) {
                    Some(FieldKind::Bytes { prefix_len: Some(n) }) | Some(FieldKind::Str { prefix_len: Some(n) }) => {
                        v.truncate_prefix(*n)
                    }
                    _ => v.clone(),
                }
            })
            .collect();
        Self { values }
    }

    /// Compares two tuples field-by-field under `desc`, applying each
    /// field's declared prefix truncation before comparing. This realizes
    /// the "lexicographic over the byte representation of each field in
    /// descriptor order" rule of §6 without forcing a full byte encode on
    /// every comparison.
    pub fn cmp_under(&self, other: &Tuple, desc: &Descriptor) -> Ordering {
        for (i, kind) in desc.fields().iter().enumerate() {
            let (a, b) = (&self.values[i], &other.values[i]);
            let (a, b) = match kind {
                FieldKind::Bytes { prefix_len: Some(n) } | FieldKind::Str { prefix_len: Some(n) } => {
                    (a.truncate_prefix(*n), b.truncate_prefix(*n))
                }
                _ => (a.clone(), b.clone()),
            };
            match a.cmp_typed(&b) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    }

    /// Encodes the tuple to its canonical byte representation under `desc`:
    /// fields are emitted strictly in descriptor order, each self-contained
    /// (a one-byte presence flag, then — for a non-null field — its
    /// fixed-width bytes inline, or a `u32` BE length followed by the
    /// (possibly prefix-truncated) variable-length content). Numeric widths
    /// are big-endian sign-biased, except the keyless cardinality field
    /// which is little-endian (§6).
    ///
    /// Emitting fields in order rather than splitting them across a
    /// head/tail split matters beyond tidiness: it's what makes a prefix
    /// descriptor's encoding a genuine leading byte-substring of the full
    /// descriptor's encoding of the same leading values, which
    /// `prefix_range` depends on for range-scanning a secondary index's
    /// unique prefix.
    pub fn encode(&self, desc: &Descriptor) -> Vec<u8> {
        let mut out = Vec::new();

        for (i, kind) in desc.fields().iter().enumerate() {
            let value = &self.values[i];
            if value.is_null() {
                out.push(0);
                continue;
            }
            out.push(1);
            match kind {
                FieldKind::Bool => out.push(matches!(value, Value::Bool(true)) as u8),
                FieldKind::I64 => {
                    let i = match value {
                        Value::Int(i) => *i,
                        _ => 0,
                    };
                    // Sign-bias: flip the sign bit so big-endian byte order
                    // matches signed numeric order.
                    let biased = (i as u64) ^ (1u64 << 63);
                    out.extend_from_slice(&biased.to_be_bytes());
                }
                FieldKind::U64 => {
                    let u = match value {
                        Value::UInt(u) => *u,
                        _ => 0,
                    };
                    out.extend_from_slice(&u.to_be_bytes());
                }
                FieldKind::F64 => {
                    let f = match value {
                        Value::Float(f) => *f,
                        _ => 0.0,
                    };
                    out.extend_from_slice(&monotonic_f64_bytes(f));
                }
                FieldKind::Hash128 => {
                    let h = match value {
                        Value::Hash128(h) => *h,
                        _ => [0u8; 16],
                    };
                    out.extend_from_slice(&h);
                }
                FieldKind::Cardinality => {
                    let c = match value {
                        Value::Cardinality(c) => *c,
                        _ => 0,
                    };
                    out.extend_from_slice(&c.to_le_bytes());
                }
                FieldKind::Bytes { prefix_len } => {
                    let bytes = match value {
                        Value::Bytes(b) => b.clone(),
                        _ => Vec::new(),
                    };
                    let bytes: Vec<u8> = match prefix_len {
                        Some(n) => bytes.into_iter().take(*n).collect(),
                        None => bytes,
                    };
                    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
                    out.extend_from_slice(&bytes);
                }
                FieldKind::Str { prefix_len } => {
                    let s = match value {
                        Value::Str(s) => s.clone(),
                        _ => String::new(),
                    };
                    let s: String = match prefix_len {
                        Some(n) => s.chars().take(*n).collect(),
                        None => s,
                    };
                    let bytes = s.into_bytes();
                    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
                    out.extend_from_slice(&bytes);
                }
            }
        }

        out
    }

    /// Formats the tuple for diagnostics (unique-violation key strings,
    /// etc.): address-encoded (out-of-line) string/bytes fields are
    /// rendered as their raw string-of-bytes content; every other field
    /// uses its native `Display`-like formatter. Matches the convention
    /// `"[field1, field2, ...]"`.
    pub fn format_key(&self, desc: &Descriptor) -> String {
        let mut s = String::from("[");
        for (i, kind) in desc.fields().iter().enumerate() {
            if i > 0 {
                s.push_str(", ");
            }
            let v = &self.values[i];
            match (kind, v) {
                (_, Value::Null) => s.push_str("NULL"),
                (FieldKind::Str { .. }, Value::Str(text)) => s.push_str(text),
                (FieldKind::Bytes { .. }, Value::Bytes(bytes)) => {
                    s.push_str(&String::from_utf8_lossy(bytes));
                }
                (_, Value::Int(i)) => {
                    let _ = write!(s, "{i}");
                }
                (_, Value::UInt(u)) => {
                    let _ = write!(s, "{u}");
                }
                (_, Value::Float(f)) => {
                    let _ = write!(s, "{f}");
                }
                (_, Value::Bool(b)) => {
                    let _ = write!(s, "{b}");
                }
                (_, Value::Hash128(h)) => {
                    let _ = write!(s, "{}", hex_encode(h));
                }
                (_, Value::Cardinality(c)) => {
                    let _ = write!(s, "{c}");
                }
                (_, other) => {
                    let _ = write!(s, "{other:?}");
                }
            }
        }
        s.push(']');
        s
    }

    /// The 128-bit content hash of a keyless value tuple, used as its
    /// primary key. Per §6, this hashes the value tuple with its
    /// cardinality field (field 0) held at zero, so that re-hashing after a
    /// cardinality bump is unnecessary — the hash identifies the row's
    /// *content*, not its duplicate count.
    pub fn keyless_hash(&self, desc: &Descriptor) -> [u8; 16] {
        let zeroed = self.clone().with_field(0, Value::Cardinality(0));
        let bytes = zeroed.encode(desc);
        let digest = blake3::hash(&bytes);
        let mut out = [0u8; 16];
        out.copy_from_slice(&digest.as_bytes()[..16]);
        out
    }
}

/// Maps an IEEE-754 `f64` bit pattern to one whose big-endian byte order
/// matches numeric order: for non-negative floats, flip the sign bit; for
/// negative floats, flip every bit (reversing their otherwise-descending
/// magnitude order).
fn monotonic_f64_bytes(f: f64) -> [u8; 8] {
    let bits = f.to_bits();
    let mapped = if bits & (1 << 63) != 0 {
        !bits
    } else {
        bits | (1 << 63)
    };
    mapped.to_be_bytes()
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
