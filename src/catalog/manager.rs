//! The schema catalog: a self-describing `minisql_schema` table holding one
//! row per table and index, each carrying the `CREATE` statement that
//! reconstructs it (spec §4.6).
//!
//! Grounded on nimbus's `catalog::manager::Catalog`: an in-memory cache
//! (`table_cache`, `index_meta_cache`, `table_indexes`) built by
//! `init_system_tables`, which tries `load_state` and falls back to
//! `bootstrap_new_db` on a fresh file. nimbus spreads table/column/index
//! metadata across three separate fixed-page system tables; this collapses
//! them into the spec's single self-describing table and recovers a table's
//! column list by re-parsing its stored `sql` text (SQLite's `sqlite_master`
//! design) instead of a dedicated column-metadata table.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::catalog::schema::{ColumnDescriptor, IndexDescriptor, SchemaEntryKind, TableDescriptor};
use crate::constants::{HEADER_PAGE_IDX, PAGE_SIZE, SCHEMA_ROOT_PAGE_IDX, SCHEMA_TABLE_NAME};
use crate::error::{DbError, DbResult};
use crate::key::{IndexKey, IndexKeyKind};
use crate::statement::{ColumnDef, Statement};
use crate::storage::freelist;
use crate::storage::page::base::{PageIdx, PageKind};
use crate::storage::page::header::DatabaseHeader;
use crate::storage::page::{self, PageView};
use crate::storage::index_tree::IndexTree;
use crate::storage::overflow_io;
use crate::storage::pager::Pager;
use crate::storage::table_tree::TableTree;
use crate::value::{ColumnKind, Row, TextPointer, Value};

/// `minisql_schema`'s own fixed column list: `type int4, name varchar,
/// tbl_name varchar, root_page int4, sql text` (spec §4.6).
fn schema_column_kinds() -> Vec<ColumnKind> {
    vec![
        ColumnKind::Int4,
        ColumnKind::Varchar,
        ColumnKind::Varchar,
        ColumnKind::Int4,
        ColumnKind::Text,
    ]
}

struct SchemaRow {
    row_id: u64,
    kind: SchemaEntryKind,
    name: String,
    tbl_name: String,
    root_page: PageIdx,
    sql: String,
}

/// `(n_entries, n_distinct_1..n_distinct_k)` for one index, refreshed by
/// `ANALYZE` (spec §4.9) and consulted by the planner's selectivity formulas
/// (spec §4.8). Held only in memory; a freshly opened catalog starts with no
/// stats for any index, same as SQLite before its first `ANALYZE`.
#[derive(Debug, Clone)]
pub struct IndexStats {
    pub n_entry: u64,
    pub n_distinct: Vec<u64>,
}

pub struct Catalog {
    tables: HashMap<String, TableDescriptor>,
    indexes: HashMap<String, IndexDescriptor>,
    table_indexes: HashMap<String, Vec<String>>,
    next_row_id: HashMap<String, u64>,
    index_stats: HashMap<String, IndexStats>,
    schema_tree: TableTree,
}

impl Catalog {
    /// Opens the catalog against an already-open `pager`. A file with fewer
    /// than two pages has never been initialized (no [`DatabaseHeader`], no
    /// schema root), so it gets bootstrapped from scratch; otherwise the
    /// existing `minisql_schema` table is scanned and every row re-parsed
    /// into a descriptor, mirroring nimbus's `load_state`-then-
    /// `bootstrap_new_db` fallback.
    pub fn open(pager: &mut Pager) -> DbResult<Catalog> {
        if pager.num_pages()? < 2 {
            return Self::bootstrap(pager);
        }

        info!("loading schema catalog from existing minisql_schema table");
        let schema_tree = TableTree::new(SCHEMA_ROOT_PAGE_IDX);
        let mut catalog = Catalog {
            tables: HashMap::new(),
            indexes: HashMap::new(),
            table_indexes: HashMap::new(),
            next_row_id: HashMap::new(),
            index_stats: HashMap::new(),
            schema_tree,
        };

        for raw in catalog.schema_tree.scan(pager)? {
            let row = decode_schema_row(pager, raw.0, &raw.1)?;
            catalog.install_from_sql(&row)?;
        }
        Ok(catalog)
    }

    /// Allocates the header and schema-root pages, writes the
    /// [`DatabaseHeader`], and writes the schema table's own self-describing
    /// row. Runs once, the first time a database file is opened.
    fn bootstrap(pager: &mut Pager) -> DbResult<Catalog> {
        warn!("minisql_schema not found, bootstrapping a fresh database");

        let (header_idx, buf) = pager.new_page(PageKind::Header)?;
        debug_assert_eq!(header_idx, HEADER_PAGE_IDX, "header page must be page 0");
        DatabaseHeader::new(PAGE_SIZE as u32).encode(buf);
        pager.unpin(header_idx, true);

        let (schema_idx, _) = pager.new_page(PageKind::TableLeaf)?;
        debug_assert_eq!(schema_idx, SCHEMA_ROOT_PAGE_IDX, "schema root must be page 1");
        pager.unpin(schema_idx, true);

        let mut schema_tree = TableTree::new(SCHEMA_ROOT_PAGE_IDX);
        let schema_columns = vec![
            ColumnDef { name: "type".into(), kind: ColumnKind::Int4, nullable: false, primary_key: false, unique: false },
            ColumnDef { name: "name".into(), kind: ColumnKind::Varchar, nullable: false, primary_key: false, unique: false },
            ColumnDef { name: "tbl_name".into(), kind: ColumnKind::Varchar, nullable: false, primary_key: false, unique: false },
            ColumnDef { name: "root_page".into(), kind: ColumnKind::Int4, nullable: false, primary_key: false, unique: false },
            ColumnDef { name: "sql".into(), kind: ColumnKind::Text, nullable: false, primary_key: false, unique: false },
        ];
        let sql = render_create_table(SCHEMA_TABLE_NAME, &schema_columns);
        insert_schema_row(
            pager,
            &mut schema_tree,
            0,
            SchemaEntryKind::Table,
            SCHEMA_TABLE_NAME,
            SCHEMA_TABLE_NAME,
            SCHEMA_ROOT_PAGE_IDX,
            &sql,
        )?;

        let mut tables = HashMap::new();
        tables.insert(
            SCHEMA_TABLE_NAME.to_string(),
            TableDescriptor {
                name: SCHEMA_TABLE_NAME.to_string(),
                columns: schema_columns
                    .into_iter()
                    .map(|c| ColumnDescriptor {
                        name: c.name,
                        kind: c.kind,
                        nullable: c.nullable,
                        primary_key: c.primary_key,
                        unique: c.unique,
                    })
                    .collect(),
                root_page: SCHEMA_ROOT_PAGE_IDX,
            },
        );
        let mut table_indexes = HashMap::new();
        table_indexes.insert(SCHEMA_TABLE_NAME.to_string(), Vec::new());

        Ok(Catalog {
            tables,
            indexes: HashMap::new(),
            table_indexes,
            next_row_id: HashMap::from([(SCHEMA_TABLE_NAME.to_string(), 1)]),
            index_stats: HashMap::new(),
            schema_tree,
        })
    }

    pub fn get_table(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables.get(&name.to_ascii_lowercase())
    }

    /// Every user-created table name, excluding `minisql_schema` itself.
    pub fn table_names(&self) -> Vec<String> {
        self.tables.values().map(|d| d.name.clone()).filter(|n| n != SCHEMA_TABLE_NAME).collect()
    }

    pub fn get_index(&self, name: &str) -> Option<&IndexDescriptor> {
        self.indexes.get(&name.to_ascii_lowercase())
    }

    pub fn indexes_for_table(&self, table: &str) -> &[String] {
        self.table_indexes
            .get(&table.to_ascii_lowercase())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn open_table_tree(&self, name: &str) -> Option<TableTree> {
        self.get_table(name).map(|d| TableTree::new(d.root_page))
    }

    pub fn open_index_tree(&self, name: &str) -> Option<IndexTree> {
        let desc = self.get_index(name)?;
        let table = self.get_table(&desc.table_name)?;
        let key_kinds: Vec<IndexKeyKind> = desc
            .columns
            .iter()
            .map(|c| {
                let col = &table.columns[table.column_index(c).unwrap()];
                IndexKeyKind::from_column_kind(col.kind).unwrap()
            })
            .collect();
        Some(IndexTree::new(desc.root_page, key_kinds, desc.unique, desc.name.clone()))
    }

    pub fn index_stats(&self, name: &str) -> Option<&IndexStats> {
        self.index_stats.get(&name.to_ascii_lowercase())
    }

    /// Replaces an index's cached statistics (spec §4.9, `ANALYZE`).
    pub fn record_index_stats(&mut self, name: &str, stats: IndexStats) {
        self.index_stats.insert(name.to_ascii_lowercase(), stats);
    }

    /// Allocates the next RowID for `table`: one past the table's current
    /// maximum, scanning once to seed the counter the first time a table is
    /// touched after catalog load (spec §9, "RowID allocation source").
    pub fn alloc_row_id(&mut self, pager: &mut Pager, table: &str) -> DbResult<u64> {
        let key = table.to_ascii_lowercase();
        if !self.next_row_id.contains_key(&key) {
            let tree = self.open_table_tree(table).ok_or_else(|| DbError::TableNotFound(table.into()))?;
            let max = tree.scan(pager)?.into_iter().map(|(id, _)| id).max().unwrap_or(0);
            self.next_row_id.insert(key.clone(), max + 1);
        }
        let next = self.next_row_id.get_mut(&key).unwrap();
        let id = *next;
        *next += 1;
        Ok(id)
    }

    /// Bumps the RowID counter so a caller-supplied RowID (an `INTEGER
    /// PRIMARY KEY` value given explicitly in an INSERT) isn't reused.
    pub fn observe_row_id(&mut self, table: &str, row_id: u64) {
        let key = table.to_ascii_lowercase();
        let next = self.next_row_id.entry(key).or_insert(1);
        if row_id >= *next {
            *next = row_id + 1;
        }
    }

    pub fn create_table(
        &mut self,
        pager: &mut Pager,
        name: &str,
        columns: Vec<ColumnDef>,
    ) -> DbResult<()> {
        let root_page = freelist::alloc_page(pager, PageKind::TableLeaf)?;
        let sql = render_create_table(name, &columns);
        let row_id = self.alloc_row_id(pager, SCHEMA_TABLE_NAME)?;
        insert_schema_row(
            pager,
            &mut self.schema_tree,
            row_id,
            SchemaEntryKind::Table,
            name,
            name,
            root_page,
            &sql,
        )?;
        let descriptor = TableDescriptor {
            name: name.to_string(),
            columns: columns
                .into_iter()
                .map(|c| ColumnDescriptor {
                    name: c.name,
                    kind: c.kind,
                    nullable: c.nullable,
                    primary_key: c.primary_key,
                    unique: c.unique,
                })
                .collect(),
            root_page,
        };
        self.tables.insert(name.to_ascii_lowercase(), descriptor);
        self.table_indexes.insert(name.to_ascii_lowercase(), Vec::new());
        Ok(())
    }

    pub fn drop_table(&mut self, pager: &mut Pager, name: &str) -> DbResult<()> {
        let desc = self
            .tables
            .remove(&name.to_ascii_lowercase())
            .ok_or_else(|| DbError::TableNotFound(name.into()))?;
        for idx_name in self.table_indexes.remove(&name.to_ascii_lowercase()).unwrap_or_default() {
            self.drop_index(pager, &idx_name)?;
        }
        free_subtree(pager, desc.root_page)?;
        let row = self.find_schema_row(pager, SchemaEntryKind::Table, name, name)?;
        if let Some(row) = row {
            self.schema_tree.delete(pager, row)?;
        }
        self.next_row_id.remove(&name.to_ascii_lowercase());
        Ok(())
    }

    pub fn create_index(
        &mut self,
        pager: &mut Pager,
        name: &str,
        table: &str,
        columns: Vec<String>,
        unique: bool,
    ) -> DbResult<()> {
        let table_desc = self
            .tables
            .get(&table.to_ascii_lowercase())
            .ok_or_else(|| DbError::TableNotFound(table.into()))?
            .clone();
        let key_kinds: Vec<IndexKeyKind> = columns
            .iter()
            .map(|c| {
                let col = &table_desc.columns[table_desc.column_index(c).unwrap()];
                IndexKeyKind::from_column_kind(col.kind).unwrap()
            })
            .collect();

        let root_page = freelist::alloc_page(pager, PageKind::IndexLeaf)?;
        let kind = if unique { SchemaEntryKind::UniqueIndex } else { SchemaEntryKind::SecondaryIndex };
        let sql = render_create_index(name, table, &columns, unique);
        let row_id = self.alloc_row_id(pager, SCHEMA_TABLE_NAME)?;
        insert_schema_row(pager, &mut self.schema_tree, row_id, kind, name, table, root_page, &sql)?;

        let mut tree = IndexTree::new(root_page, key_kinds, unique, name.to_string());
        let table_tree = TableTree::new(table_desc.root_page);
        for (row_id, bytes) in table_tree.scan(pager)? {
            let row = Row::decode(&bytes, &table_desc.column_kinds(), |ptr| {
                let bytes = overflow_io::read_chain(pager, ptr.first_overflow_page, ptr.total_length as usize)?;
                String::from_utf8(bytes).map_err(|_| DbError::CorruptPage { page: 0, reason: "non-utf8 overflow text".into() })
            })?;
            if let Some(key) = index_key_for(&row, &table_desc, &columns) {
                tree.insert(pager, &key, row_id)?;
            }
        }

        let descriptor = IndexDescriptor {
            name: name.to_string(),
            table_name: table.to_string(),
            columns,
            unique,
            root_page: tree.root,
            kind,
        };
        self.indexes.insert(name.to_ascii_lowercase(), descriptor);
        self.table_indexes
            .entry(table.to_ascii_lowercase())
            .or_default()
            .push(name.to_string());
        Ok(())
    }

    pub fn drop_index(&mut self, pager: &mut Pager, name: &str) -> DbResult<()> {
        let desc = self
            .indexes
            .remove(&name.to_ascii_lowercase())
            .ok_or_else(|| DbError::IndexNotFound(name.into()))?;
        if let Some(v) = self.table_indexes.get_mut(&desc.table_name.to_ascii_lowercase()) {
            v.retain(|n| !n.eq_ignore_ascii_case(name));
        }
        free_subtree(pager, desc.root_page)?;
        let row = self.find_schema_row(pager, desc.kind, name, &desc.table_name)?;
        if let Some(row) = row {
            self.schema_tree.delete(pager, row)?;
        }
        self.index_stats.remove(&name.to_ascii_lowercase());
        Ok(())
    }

    fn find_schema_row(
        &self,
        pager: &mut Pager,
        kind: SchemaEntryKind,
        name: &str,
        tbl_name: &str,
    ) -> DbResult<Option<u64>> {
        for (row_id, bytes) in self.schema_tree.scan(pager)? {
            let row = decode_schema_row(pager, row_id, &bytes)?;
            if row.kind == kind && row.name.eq_ignore_ascii_case(name) && row.tbl_name.eq_ignore_ascii_case(tbl_name) {
                return Ok(Some(row_id));
            }
        }
        Ok(None)
    }

    /// Reconstructs a table or index descriptor from one `minisql_schema`
    /// row by re-parsing its `sql` text, exactly as SQLite recovers
    /// `sqlite_master` on open.
    fn install_from_sql(&mut self, row: &SchemaRow) -> DbResult<()> {
        let stmt = crate::parser::parse(&row.sql)?;
        match (row.kind, stmt) {
            (SchemaEntryKind::Table, Statement::CreateTable { name, columns }) => {
                let descriptor = TableDescriptor {
                    name: name.clone(),
                    columns: columns
                        .into_iter()
                        .map(|c| ColumnDescriptor {
                            name: c.name,
                            kind: c.kind,
                            nullable: c.nullable,
                            primary_key: c.primary_key,
                            unique: c.unique,
                        })
                        .collect(),
                    root_page: row.root_page,
                };
                self.tables.insert(name.to_ascii_lowercase(), descriptor);
                self.table_indexes.entry(name.to_ascii_lowercase()).or_default();
            }
            (kind, Statement::CreateIndex { name, table, columns, unique }) => {
                let descriptor = IndexDescriptor {
                    name: name.clone(),
                    table_name: table.clone(),
                    columns,
                    unique,
                    root_page: row.root_page,
                    kind,
                };
                self.indexes.insert(name.to_ascii_lowercase(), descriptor);
                self.table_indexes.entry(table.to_ascii_lowercase()).or_default().push(name);
            }
            _ => {
                return Err(DbError::CorruptPage {
                    page: row.root_page,
                    reason: format!("schema row for {} does not match its stored sql", row.name),
                })
            }
        }
        Ok(())
    }
}

/// Finds the value of an indexed column (or composite of columns) in a
/// decoded row, skipping rows with a `NULL` in any indexed column (spec
/// §4.9, "INSERT ... skipping NULL keys").
pub(crate) fn index_key_for(row: &Row, desc: &TableDescriptor, columns: &[String]) -> Option<IndexKey> {
    let mut parts = Vec::with_capacity(columns.len());
    for col in columns {
        let idx = desc.column_index(col)?;
        let value = row.values[idx].as_ref()?;
        parts.push(IndexKey::from_value(value)?);
    }
    if parts.len() == 1 {
        Some(parts.into_iter().next().unwrap())
    } else {
        Some(IndexKey::composite(parts))
    }
}

fn decode_schema_row(pager: &mut Pager, row_id: u64, bytes: &[u8]) -> DbResult<SchemaRow> {
    let row = Row::decode(bytes, &schema_column_kinds(), |ptr| read_text(pager, ptr))?;
    let kind_val = match &row.values[0] {
        Some(Value::Int4(v)) => *v,
        _ => return Err(DbError::CorruptPage { page: 0, reason: "schema row missing type".into() }),
    };
    let kind = SchemaEntryKind::from_i32(kind_val)
        .ok_or_else(|| DbError::CorruptPage { page: 0, reason: format!("unknown schema entry kind {kind_val}") })?;
    let name = match &row.values[1] {
        Some(Value::Varchar(s)) => s.clone(),
        _ => return Err(DbError::CorruptPage { page: 0, reason: "schema row missing name".into() }),
    };
    let tbl_name = match &row.values[2] {
        Some(Value::Varchar(s)) => s.clone(),
        _ => return Err(DbError::CorruptPage { page: 0, reason: "schema row missing tbl_name".into() }),
    };
    let root_page = match &row.values[3] {
        Some(Value::Int4(v)) => *v as PageIdx,
        _ => return Err(DbError::CorruptPage { page: 0, reason: "schema row missing root_page".into() }),
    };
    let sql = match &row.values[4] {
        Some(Value::Text(s)) => s.clone(),
        _ => return Err(DbError::CorruptPage { page: 0, reason: "schema row missing sql".into() }),
    };
    Ok(SchemaRow { row_id, kind, name, tbl_name, root_page, sql })
}

#[allow(clippy::too_many_arguments)]
fn insert_schema_row(
    pager: &mut Pager,
    tree: &mut TableTree,
    row_id: u64,
    kind: SchemaEntryKind,
    name: &str,
    tbl_name: &str,
    root_page: PageIdx,
    sql: &str,
) -> DbResult<()> {
    let row = Row::new(vec![
        Some(Value::Int4(kind as i32)),
        Some(Value::Varchar(name.to_string())),
        Some(Value::Varchar(tbl_name.to_string())),
        Some(Value::Int4(root_page as i32)),
        Some(Value::Text(sql.to_string())),
    ]);
    let bytes = row.encode(&schema_column_kinds(), |s| write_text(pager, s))?;
    tree.insert(pager, row_id, &bytes)
}

fn write_text(pager: &mut Pager, s: &str) -> DbResult<TextPointer> {
    let first_overflow_page = overflow_io::write_chain(pager, s.as_bytes())?;
    Ok(TextPointer { first_overflow_page, total_length: s.len() as u32 })
}

fn read_text(pager: &mut Pager, ptr: TextPointer) -> DbResult<String> {
    let bytes = overflow_io::read_chain(pager, ptr.first_overflow_page, ptr.total_length as usize)?;
    String::from_utf8(bytes).map_err(|_| DbError::CorruptPage { page: 0, reason: "non-utf8 overflow text".into() })
}

fn render_create_table(name: &str, columns: &[ColumnDef]) -> String {
    let cols: Vec<String> = columns
        .iter()
        .map(|c| {
            let mut s = format!("{} {}", c.name, sql_type_name(c.kind));
            if c.primary_key {
                s.push_str(" PRIMARY KEY");
            } else if !c.nullable {
                s.push_str(" NOT NULL");
            }
            if c.unique {
                s.push_str(" UNIQUE");
            }
            s
        })
        .collect();
    format!("CREATE TABLE {name} ({})", cols.join(", "))
}

fn render_create_index(name: &str, table: &str, columns: &[String], unique: bool) -> String {
    let keyword = if unique { "UNIQUE INDEX" } else { "INDEX" };
    format!("CREATE {keyword} {name} ON {table} ({})", columns.join(", "))
}

fn sql_type_name(kind: ColumnKind) -> &'static str {
    match kind {
        ColumnKind::Boolean => "BOOLEAN",
        ColumnKind::Int4 => "INTEGER",
        ColumnKind::Int8 => "BIGINT",
        ColumnKind::Real => "REAL",
        ColumnKind::Double => "DOUBLE",
        ColumnKind::Timestamp => "TIMESTAMP",
        ColumnKind::Varchar => "VARCHAR",
        ColumnKind::Text => "TEXT",
    }
}

/// Frees every page of a table-tree or index-tree rooted at `root`. Walks
/// both internal-page shapes uniformly since both expose the same
/// `num_cells`/`cell`/`right_child` surface.
fn free_subtree(pager: &mut Pager, root: PageIdx) -> DbResult<()> {
    let buf = pager.fetch(root)?;
    let children: Vec<PageIdx> = match page::view(buf) {
        PageView::TableInternal(mut p) => {
            let n = p.num_cells();
            let mut v: Vec<PageIdx> = (0..n).map(|i| p.cell(i).1).collect();
            v.push(p.right_child());
            v
        }
        PageView::IndexInternal(mut p) => {
            let n = p.num_cells();
            let mut v: Vec<PageIdx> = (0..n).map(|i| p.cell(i).1).collect();
            v.push(p.right_child());
            v
        }
        _ => Vec::new(),
    };
    pager.unpin(root, false);
    for child in children {
        free_subtree(pager, child)?;
    }
    freelist::free_page(pager, root)
}
