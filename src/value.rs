//! Column kinds, runtime values and the row codec (spec §3 "Row").
//!
//! Grounded on nimbus's `rt_type::primitives::{AttributeKind, AttributeValue}`
//! for the enum shape and `storage::heap::tuple::Tuple` for the idea of a row
//! being a flat `Vec` of values serialized against a schema, generalized to the
//! spec's null-bitmap-plus-overflow wire format nimbus never needed.

use crate::constants::{MAX_COLUMNS, MAX_INLINE_VARCHAR, MAX_TEXT_LEN};
use crate::error::{DbError, DbResult};
use crate::storage::page::base::PageIdx;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Boolean,
    Int4,
    Int8,
    Real,
    Double,
    Timestamp,
    Varchar,
    Text,
}

impl ColumnKind {
    /// Fixed on-disk width for fixed-size kinds; `None` for the variable-length
    /// Varchar/Text kinds.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            ColumnKind::Boolean => Some(1),
            ColumnKind::Int4 => Some(4),
            ColumnKind::Int8 => Some(8),
            ColumnKind::Real => Some(4),
            ColumnKind::Double => Some(8),
            ColumnKind::Timestamp => Some(8),
            ColumnKind::Varchar | ColumnKind::Text => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ColumnKind::Boolean => "boolean",
            ColumnKind::Int4 => "int4",
            ColumnKind::Int8 => "int8",
            ColumnKind::Real => "real",
            ColumnKind::Double => "double",
            ColumnKind::Timestamp => "timestamp",
            ColumnKind::Varchar => "varchar",
            ColumnKind::Text => "text",
        }
    }

    pub fn from_name(name: &str) -> Option<ColumnKind> {
        match name.to_ascii_lowercase().as_str() {
            "boolean" | "bool" => Some(ColumnKind::Boolean),
            "int4" | "int" | "integer" => Some(ColumnKind::Int4),
            "int8" | "bigint" => Some(ColumnKind::Int8),
            "real" | "float4" => Some(ColumnKind::Real),
            "double" | "float8" => Some(ColumnKind::Double),
            "timestamp" => Some(ColumnKind::Timestamp),
            "varchar" => Some(ColumnKind::Varchar),
            "text" => Some(ColumnKind::Text),
            _ => None,
        }
    }
}

/// A pointer to the first page of an overflow chain plus the logical length
/// of the text it stores, kept inline in place of the text itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextPointer {
    pub first_overflow_page: PageIdx,
    pub total_length: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Boolean(bool),
    Int4(i32),
    Int8(i64),
    Real(f32),
    Double(f64),
    Timestamp(i64),
    Varchar(String),
    Text(String),
}

impl Value {
    pub fn kind(&self) -> ColumnKind {
        match self {
            Value::Boolean(_) => ColumnKind::Boolean,
            Value::Int4(_) => ColumnKind::Int4,
            Value::Int8(_) => ColumnKind::Int8,
            Value::Real(_) => ColumnKind::Real,
            Value::Double(_) => ColumnKind::Double,
            Value::Timestamp(_) => ColumnKind::Timestamp,
            Value::Varchar(_) => ColumnKind::Varchar,
            Value::Text(_) => ColumnKind::Text,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Varchar(s) | Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Coerces a literal parsed without knowledge of its destination column
    /// (every SQL integer parses as `Int8`, every float as `Double`) into the
    /// column's declared kind. Distinct numeric/text kinds never coerce into
    /// each other (an `Int4` column never silently accepts a string).
    pub fn coerce(self, target: ColumnKind) -> DbResult<Value> {
        if self.kind() == target {
            return Ok(self);
        }
        match (self, target) {
            (Value::Int8(v), ColumnKind::Int4) => i32::try_from(v)
                .map(Value::Int4)
                .map_err(|_| DbError::Validate(format!("{v} does not fit in int4"))),
            (Value::Int8(v), ColumnKind::Timestamp) => Ok(Value::Timestamp(v)),
            (Value::Double(v), ColumnKind::Real) => Ok(Value::Real(v as f32)),
            (Value::Varchar(s), ColumnKind::Text) => Ok(Value::Text(s)),
            (Value::Text(s), ColumnKind::Varchar) => Ok(Value::Varchar(s)),
            (v, k) => Err(DbError::Validate(format!(
                "value {:?} cannot be used for a column of type {}",
                v,
                k.name()
            ))),
        }
    }
}

/// A row: one `Option<Value>` per column in the table's column list, `None`
/// standing in for the spec's "value + valid flag" pairing (the validity flag
/// collapses naturally into `Option`).
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub values: Vec<Option<Value>>,
}

impl Row {
    pub fn new(values: Vec<Option<Value>>) -> Self {
        Self { values }
    }

    /// Encodes the row as `8-byte null bitmap + packed non-null values`
    /// (spec §3). Varchars over `MAX_INLINE_VARCHAR` bytes and all `Text`
    /// values are handed to `overflow_writer`, which returns the
    /// `TextPointer` to embed inline instead of the bytes themselves.
    pub fn encode(
        &self,
        kinds: &[ColumnKind],
        mut overflow_writer: impl FnMut(&str) -> DbResult<TextPointer>,
    ) -> DbResult<Vec<u8>> {
        if kinds.len() > MAX_COLUMNS {
            return Err(DbError::Validate(format!(
                "table has {} columns, max is {}",
                kinds.len(),
                MAX_COLUMNS
            )));
        }
        if self.values.len() != kinds.len() {
            return Err(DbError::Validate(format!(
                "row has {} values, schema has {} columns",
                self.values.len(),
                kinds.len()
            )));
        }

        let mut bitmap: u64 = 0;
        let mut body = Vec::new();
        for (i, (value, kind)) in self.values.iter().zip(kinds.iter()).enumerate() {
            let Some(value) = value else { continue };
            bitmap |= 1 << i;
            encode_value(value, *kind, &mut body, &mut overflow_writer)?;
        }

        let mut out = Vec::with_capacity(8 + body.len());
        out.extend_from_slice(&bitmap.to_le_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Every `TextPointer` embedded in a row previously produced by
    /// [`Row::encode`], without resolving any of them to a `String`. Used to
    /// free a row's overflow chains on DELETE/UPDATE without paying for the
    /// UTF-8 decode of text that is about to be discarded.
    pub fn overflow_pointers(bytes: &[u8], kinds: &[ColumnKind]) -> DbResult<Vec<TextPointer>> {
        if bytes.len() < 8 {
            return Err(DbError::CorruptPage {
                page: 0,
                reason: "row shorter than null bitmap".into(),
            });
        }
        let bitmap = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
        let mut cursor = 8usize;
        let mut pointers = Vec::new();

        for (i, kind) in kinds.iter().enumerate() {
            if bitmap & (1 << i) == 0 {
                continue;
            }
            let consumed = skip_value(&bytes[cursor..], *kind, &mut pointers)?;
            cursor += consumed;
        }
        Ok(pointers)
    }

    /// Decodes a row previously produced by [`Row::encode`]. `overflow_reader`
    /// resolves a `TextPointer` back into the text it points at (for `Text`
    /// columns, and for `Varchar` columns that overflowed at encode time).
    pub fn decode(
        bytes: &[u8],
        kinds: &[ColumnKind],
        mut overflow_reader: impl FnMut(TextPointer) -> DbResult<String>,
    ) -> DbResult<Row> {
        if bytes.len() < 8 {
            return Err(DbError::CorruptPage {
                page: 0,
                reason: "row shorter than null bitmap".into(),
            });
        }
        let bitmap = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
        let mut cursor = 8usize;
        let mut values = Vec::with_capacity(kinds.len());

        for (i, kind) in kinds.iter().enumerate() {
            if bitmap & (1 << i) == 0 {
                values.push(None);
                continue;
            }
            let (value, consumed) = decode_value(&bytes[cursor..], *kind, &mut overflow_reader)?;
            cursor += consumed;
            values.push(Some(value));
        }

        Ok(Row::new(values))
    }
}

fn encode_value(
    value: &Value,
    kind: ColumnKind,
    out: &mut Vec<u8>,
    overflow_writer: &mut impl FnMut(&str) -> DbResult<TextPointer>,
) -> DbResult<()> {
    match (value, kind) {
        (Value::Boolean(b), ColumnKind::Boolean) => out.push(*b as u8),
        (Value::Int4(v), ColumnKind::Int4) => out.extend_from_slice(&v.to_le_bytes()),
        (Value::Int8(v), ColumnKind::Int8) => out.extend_from_slice(&v.to_le_bytes()),
        (Value::Real(v), ColumnKind::Real) => out.extend_from_slice(&v.to_le_bytes()),
        (Value::Double(v), ColumnKind::Double) => out.extend_from_slice(&v.to_le_bytes()),
        (Value::Timestamp(v), ColumnKind::Timestamp) => out.extend_from_slice(&v.to_le_bytes()),
        (Value::Varchar(s), ColumnKind::Varchar) => {
            if s.len() > MAX_TEXT_LEN {
                return Err(DbError::Validate(format!(
                    "varchar value of {} bytes exceeds maximum text length {}",
                    s.len(),
                    MAX_TEXT_LEN
                )));
            }
            if s.len() <= MAX_INLINE_VARCHAR {
                out.push(0); // inline tag
                out.extend_from_slice(&(s.len() as u32).to_le_bytes());
                out.extend_from_slice(s.as_bytes());
            } else {
                let ptr = overflow_writer(s)?;
                out.push(1); // overflow tag
                out.extend_from_slice(&ptr.first_overflow_page.to_le_bytes());
                out.extend_from_slice(&ptr.total_length.to_le_bytes());
            }
        }
        (Value::Text(s), ColumnKind::Text) => {
            if s.len() > MAX_TEXT_LEN {
                return Err(DbError::Validate(format!(
                    "text value of {} bytes exceeds maximum text length {}",
                    s.len(),
                    MAX_TEXT_LEN
                )));
            }
            let ptr = overflow_writer(s)?;
            out.extend_from_slice(&ptr.first_overflow_page.to_le_bytes());
            out.extend_from_slice(&ptr.total_length.to_le_bytes());
        }
        (v, k) => {
            return Err(DbError::Validate(format!(
                "value {:?} does not match column kind {:?}",
                v, k
            )));
        }
    }
    Ok(())
}

fn decode_value(
    bytes: &[u8],
    kind: ColumnKind,
    overflow_reader: &mut impl FnMut(TextPointer) -> DbResult<String>,
) -> DbResult<(Value, usize)> {
    let corrupt = |reason: &str| DbError::CorruptPage {
        page: 0,
        reason: reason.to_string(),
    };
    match kind {
        ColumnKind::Boolean => {
            let b = *bytes.first().ok_or_else(|| corrupt("truncated boolean"))?;
            Ok((Value::Boolean(b != 0), 1))
        }
        ColumnKind::Int4 => {
            let b = bytes.get(0..4).ok_or_else(|| corrupt("truncated int4"))?;
            Ok((Value::Int4(i32::from_le_bytes(b.try_into().unwrap())), 4))
        }
        ColumnKind::Int8 => {
            let b = bytes.get(0..8).ok_or_else(|| corrupt("truncated int8"))?;
            Ok((Value::Int8(i64::from_le_bytes(b.try_into().unwrap())), 8))
        }
        ColumnKind::Real => {
            let b = bytes.get(0..4).ok_or_else(|| corrupt("truncated real"))?;
            Ok((Value::Real(f32::from_le_bytes(b.try_into().unwrap())), 4))
        }
        ColumnKind::Double => {
            let b = bytes.get(0..8).ok_or_else(|| corrupt("truncated double"))?;
            Ok((Value::Double(f64::from_le_bytes(b.try_into().unwrap())), 8))
        }
        ColumnKind::Timestamp => {
            let b = bytes
                .get(0..8)
                .ok_or_else(|| corrupt("truncated timestamp"))?;
            Ok((Value::Timestamp(i64::from_le_bytes(b.try_into().unwrap())), 8))
        }
        ColumnKind::Varchar => {
            let tag = *bytes.first().ok_or_else(|| corrupt("truncated varchar tag"))?;
            match tag {
                0 => {
                    let len = u32::from_le_bytes(
                        bytes
                            .get(1..5)
                            .ok_or_else(|| corrupt("truncated varchar length"))?
                            .try_into()
                            .unwrap(),
                    ) as usize;
                    let data = bytes
                        .get(5..5 + len)
                        .ok_or_else(|| corrupt("truncated varchar data"))?;
                    let s = String::from_utf8(data.to_vec())
                        .map_err(|_| corrupt("varchar is not valid utf-8"))?;
                    Ok((Value::Varchar(s), 5 + len))
                }
                1 => {
                    let ptr = read_text_pointer(
                        bytes.get(1..9).ok_or_else(|| corrupt("truncated text pointer"))?,
                    )?;
                    let s = overflow_reader(ptr)?;
                    Ok((Value::Varchar(s), 9))
                }
                _ => Err(corrupt("invalid varchar tag")),
            }
        }
        ColumnKind::Text => {
            let ptr = read_text_pointer(
                bytes.get(0..8).ok_or_else(|| corrupt("truncated text pointer"))?,
            )?;
            let s = overflow_reader(ptr)?;
            Ok((Value::Text(s), 8))
        }
    }
}

/// Mirrors `decode_value`'s cursor walk for one column but only collects the
/// `TextPointer`s it passes over, never resolving them or allocating a
/// `Value`.
fn skip_value(bytes: &[u8], kind: ColumnKind, pointers: &mut Vec<TextPointer>) -> DbResult<usize> {
    let corrupt = |reason: &str| DbError::CorruptPage {
        page: 0,
        reason: reason.to_string(),
    };
    match kind {
        ColumnKind::Boolean => Ok(1),
        ColumnKind::Int4 | ColumnKind::Real => Ok(4),
        ColumnKind::Int8 | ColumnKind::Double | ColumnKind::Timestamp => Ok(8),
        ColumnKind::Varchar => {
            let tag = *bytes.first().ok_or_else(|| corrupt("truncated varchar tag"))?;
            match tag {
                0 => {
                    let len = u32::from_le_bytes(
                        bytes
                            .get(1..5)
                            .ok_or_else(|| corrupt("truncated varchar length"))?
                            .try_into()
                            .unwrap(),
                    ) as usize;
                    Ok(5 + len)
                }
                1 => {
                    let ptr = read_text_pointer(
                        bytes.get(1..9).ok_or_else(|| corrupt("truncated text pointer"))?,
                    )?;
                    pointers.push(ptr);
                    Ok(9)
                }
                _ => Err(corrupt("invalid varchar tag")),
            }
        }
        ColumnKind::Text => {
            let ptr = read_text_pointer(
                bytes.get(0..8).ok_or_else(|| corrupt("truncated text pointer"))?,
            )?;
            pointers.push(ptr);
            Ok(8)
        }
    }
}

/// Reads a `{ first_overflow_page: u32, total_length: u32 }` pair from an
/// exactly 8-byte slice.
fn read_text_pointer(bytes: &[u8]) -> DbResult<TextPointer> {
    Ok(TextPointer {
        first_overflow_page: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
        total_length: u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
    })
}
