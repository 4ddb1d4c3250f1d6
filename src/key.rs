//! The generic index key type (spec §9, "generic index over key type").
//!
//! nimbus's indexes only ever compare raw big-endian integer byte strings
//! (`catalog::manager::Catalog::insert_tuple`'s `key_bytes` match arms,
//! restricted to `U32`/`I32`/`U64`/`I64`). This generalizes that into one
//! tagged-variant key so the index B-tree's comparison logic lives in a
//! single place instead of being duplicated per key type.

use std::cmp::Ordering;

use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum IndexKey {
    Int4(i32),
    Int8(i64),
    Real(f32),
    Double(f64),
    Varchar(String),
    Composite(Vec<IndexKey>),
}

impl IndexKey {
    pub fn from_value(value: &Value) -> Option<IndexKey> {
        match value {
            Value::Int4(v) => Some(IndexKey::Int4(*v)),
            Value::Int8(v) => Some(IndexKey::Int8(*v)),
            Value::Real(v) => Some(IndexKey::Real(*v)),
            Value::Double(v) => Some(IndexKey::Double(*v)),
            Value::Varchar(v) | Value::Text(v) => Some(IndexKey::Varchar(v.clone())),
            Value::Boolean(_) | Value::Timestamp(_) => None,
        }
    }

    pub fn composite(parts: Vec<IndexKey>) -> IndexKey {
        IndexKey::Composite(parts)
    }

    /// Byte-size estimate used by the index B-tree's byte-based half-full
    /// split test (spec §4.5).
    pub fn encoded_len(&self) -> usize {
        match self {
            IndexKey::Int4(_) => 4,
            IndexKey::Int8(_) => 8,
            IndexKey::Real(_) => 4,
            IndexKey::Double(_) => 8,
            IndexKey::Varchar(s) => 4 + s.len(),
            IndexKey::Composite(parts) => parts.iter().map(IndexKey::encoded_len).sum(),
        }
    }

    /// Appends the on-disk encoding of this key to `out`. A `Composite` key
    /// encodes each part back to back, no count prefix — the reader walks
    /// the same `kinds` list that produced it.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            IndexKey::Int4(v) => out.extend_from_slice(&v.to_le_bytes()),
            IndexKey::Int8(v) => out.extend_from_slice(&v.to_le_bytes()),
            IndexKey::Real(v) => out.extend_from_slice(&v.to_le_bytes()),
            IndexKey::Double(v) => out.extend_from_slice(&v.to_le_bytes()),
            IndexKey::Varchar(s) => {
                out.extend_from_slice(&(s.len() as u32).to_le_bytes());
                out.extend_from_slice(s.as_bytes());
            }
            IndexKey::Composite(parts) => {
                for part in parts {
                    part.encode_into(out);
                }
            }
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut out);
        out
    }

    /// Decodes one key of shape `kinds` from the front of `bytes`, returning
    /// the key and the number of bytes consumed. `kinds.len() > 1` produces a
    /// `Composite`; `kinds.len() == 1` produces that part's own variant
    /// directly, matching what [`IndexKey::from_value`] would have built.
    pub fn decode(bytes: &[u8], kinds: &[IndexKeyKind]) -> (IndexKey, usize) {
        if kinds.len() == 1 {
            return decode_part(bytes, kinds[0]);
        }
        let mut cursor = 0;
        let mut parts = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let (part, consumed) = decode_part(&bytes[cursor..], *kind);
            cursor += consumed;
            parts.push(part);
        }
        (IndexKey::Composite(parts), cursor)
    }
}

/// The shape of one component of an [`IndexKey`], carried alongside an index
/// descriptor so a stored key's bytes can be decoded back into typed parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKeyKind {
    Int4,
    Int8,
    Real,
    Double,
    Varchar,
}

impl IndexKeyKind {
    pub fn from_column_kind(kind: crate::value::ColumnKind) -> Option<IndexKeyKind> {
        match kind {
            crate::value::ColumnKind::Int4 => Some(IndexKeyKind::Int4),
            crate::value::ColumnKind::Int8 => Some(IndexKeyKind::Int8),
            crate::value::ColumnKind::Real => Some(IndexKeyKind::Real),
            crate::value::ColumnKind::Double => Some(IndexKeyKind::Double),
            crate::value::ColumnKind::Varchar | crate::value::ColumnKind::Text => {
                Some(IndexKeyKind::Varchar)
            }
            crate::value::ColumnKind::Boolean | crate::value::ColumnKind::Timestamp => None,
        }
    }
}

fn decode_part(bytes: &[u8], kind: IndexKeyKind) -> (IndexKey, usize) {
    match kind {
        IndexKeyKind::Int4 => (
            IndexKey::Int4(i32::from_le_bytes(bytes[0..4].try_into().unwrap())),
            4,
        ),
        IndexKeyKind::Int8 => (
            IndexKey::Int8(i64::from_le_bytes(bytes[0..8].try_into().unwrap())),
            8,
        ),
        IndexKeyKind::Real => (
            IndexKey::Real(f32::from_le_bytes(bytes[0..4].try_into().unwrap())),
            4,
        ),
        IndexKeyKind::Double => (
            IndexKey::Double(f64::from_le_bytes(bytes[0..8].try_into().unwrap())),
            8,
        ),
        IndexKeyKind::Varchar => {
            let len = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
            let s = String::from_utf8(bytes[4..4 + len].to_vec())
                .expect("index key varchar bytes are not valid utf-8");
            (IndexKey::Varchar(s), 4 + len)
        }
    }
}

impl Eq for IndexKey {}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Composite keys compare lexicographically over their typed parts; each
/// primitive part compares within its own type. Comparing across different
/// primitive variants is a programmer error (the catalog never builds a
/// column's keys as more than one variant), so it falls back to a stable but
/// otherwise meaningless discriminant order rather than panicking.
impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (IndexKey::Int4(a), IndexKey::Int4(b)) => a.cmp(b),
            (IndexKey::Int8(a), IndexKey::Int8(b)) => a.cmp(b),
            (IndexKey::Real(a), IndexKey::Real(b)) => a.total_cmp(b),
            (IndexKey::Double(a), IndexKey::Double(b)) => a.total_cmp(b),
            (IndexKey::Varchar(a), IndexKey::Varchar(b)) => a.cmp(b),
            (IndexKey::Composite(a), IndexKey::Composite(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.cmp(y) {
                        Ordering::Equal => continue,
                        ord => return ord,
                    }
                }
                a.len().cmp(&b.len())
            }
            (a, b) => discriminant(a).cmp(&discriminant(b)),
        }
    }
}

fn discriminant(key: &IndexKey) -> u8 {
    match key {
        IndexKey::Int4(_) => 0,
        IndexKey::Int8(_) => 1,
        IndexKey::Real(_) => 2,
        IndexKey::Double(_) => 3,
        IndexKey::Varchar(_) => 4,
        IndexKey::Composite(_) => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_key_compares_lexicographically() {
        let a = IndexKey::composite(vec![IndexKey::Int4(1), IndexKey::Varchar("b".into())]);
        let b = IndexKey::composite(vec![IndexKey::Int4(1), IndexKey::Varchar("c".into())]);
        let c = IndexKey::composite(vec![IndexKey::Int4(2), IndexKey::Varchar("a".into())]);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn composite_key_round_trips_through_bytes() {
        let key = IndexKey::composite(vec![IndexKey::Int4(7), IndexKey::Varchar("hi".into())]);
        let bytes = key.encode();
        let (decoded, consumed) =
            IndexKey::decode(&bytes, &[IndexKeyKind::Int4, IndexKeyKind::Varchar]);
        assert_eq!(decoded, key);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn varchar_key_orders_lexicographically() {
        let mut keys = vec![
            IndexKey::Varchar("banana".into()),
            IndexKey::Varchar("apple".into()),
            IndexKey::Varchar("cherry".into()),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                IndexKey::Varchar("apple".into()),
                IndexKey::Varchar("banana".into()),
                IndexKey::Varchar("cherry".into()),
            ]
        );
    }
}
