//! Descriptor types reconstructed from `minisql_schema` rows (spec §4.6).
//!
//! Grounded on nimbus's `catalog::manager`'s column-metadata structs, but
//! nimbus keeps columns in a dedicated system table of their own; this
//! follows the spec's self-describing design instead, where a table's
//! column list lives only in the `sql` text of its one schema row and is
//! recovered by re-parsing that text on open.

use crate::value::ColumnKind;

/// `minisql_schema.type` values (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaEntryKind {
    Table = 0,
    PrimaryKey = 1,
    UniqueIndex = 2,
    SecondaryIndex = 3,
}

impl SchemaEntryKind {
    pub fn from_i32(v: i32) -> Option<SchemaEntryKind> {
        match v {
            0 => Some(SchemaEntryKind::Table),
            1 => Some(SchemaEntryKind::PrimaryKey),
            2 => Some(SchemaEntryKind::UniqueIndex),
            3 => Some(SchemaEntryKind::SecondaryIndex),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ColumnDescriptor {
    pub name: String,
    pub kind: ColumnKind,
    pub nullable: bool,
    pub primary_key: bool,
    pub unique: bool,
}

#[derive(Debug, Clone)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    pub root_page: u32,
}

impl TableDescriptor {
    pub fn column_kinds(&self) -> Vec<ColumnKind> {
        self.columns.iter().map(|c| c.kind).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// The single-column `INTEGER PRIMARY KEY` acting as a RowID alias, if
    /// this table declares one. Only `Int4`/`Int8` primary keys are aliased
    /// this way (spec §9, "RowID allocation source"); any other primary key
    /// is a plain `UNIQUE NOT NULL` constraint enforced through an ordinary
    /// index instead.
    pub fn rowid_alias_column(&self) -> Option<usize> {
        self.columns.iter().position(|c| {
            c.primary_key && matches!(c.kind, ColumnKind::Int4 | ColumnKind::Int8)
        })
    }
}

#[derive(Debug, Clone)]
pub struct IndexDescriptor {
    pub name: String,
    pub table_name: String,
    pub columns: Vec<String>,
    pub unique: bool,
    pub root_page: u32,
    pub kind: SchemaEntryKind,
}
