//! The bound, validated statement model sitting between the parser and the
//! planner (spec §4.7 "Statement validation").
//!
//! Grounded on nimbus's `parser::AstStatement`/`AstValue` sum types for the
//! overall shape (one variant per SQL form, literals carried as a small
//! value enum), expanded well past nimbus's four-variant, no-`WHERE`
//! subset into the full grammar this crate accepts, plus a validation pass
//! nimbus never had at all.

use crate::catalog::manager::Catalog;
use crate::constants::{MAX_COLUMNS, MAX_TEXT_LEN};
use crate::error::{DbError, DbResult};
use crate::value::{ColumnKind, Value};

#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum BinOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

/// A scalar expression appearing in a `WHERE`/`SET`/`VALUES` clause. Columns
/// resolve against whichever table the enclosing statement names; there is
/// no cross-table join support (spec Non-goal).
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(String),
    Literal(Value),
    Null,
    /// `NOW()`, substituted for the wall-clock time at bind time.
    Now,
    /// A `?` positional parameter, replaced by [`Statement::bind`].
    Placeholder(usize),
    BinaryOp(Box<Expr>, BinOp, Box<Expr>),
    Not(Box<Expr>),
    IsNull(Box<Expr>),
    IsNotNull(Box<Expr>),
}

impl Expr {
    /// Column names this expression reads, for validating a `WHERE`/`SET`
    /// clause references columns that actually exist.
    pub fn referenced_columns(&self, out: &mut Vec<String>) {
        match self {
            Expr::Column(c) => out.push(c.clone()),
            Expr::BinaryOp(l, _, r) => {
                l.referenced_columns(out);
                r.referenced_columns(out);
            }
            Expr::Not(e) | Expr::IsNull(e) | Expr::IsNotNull(e) => e.referenced_columns(out),
            Expr::Literal(_) | Expr::Null | Expr::Now | Expr::Placeholder(_) => {}
        }
    }

    fn bind(self, params: &[Value]) -> DbResult<Expr> {
        Ok(match self {
            Expr::Placeholder(i) => {
                let v = params.get(i).ok_or_else(|| {
                    DbError::Validate(format!("missing value for parameter ?{}", i + 1))
                })?;
                Expr::Literal(v.clone())
            }
            Expr::BinaryOp(l, op, r) => {
                Expr::BinaryOp(Box::new(l.bind(params)?), op, Box::new(r.bind(params)?))
            }
            Expr::Not(e) => Expr::Not(Box::new(e.bind(params)?)),
            Expr::IsNull(e) => Expr::IsNull(Box::new(e.bind(params)?)),
            Expr::IsNotNull(e) => Expr::IsNotNull(Box::new(e.bind(params)?)),
            other => other,
        })
    }

    /// Substitutes `NOW()` with the supplied wall-clock reading. Kept as a
    /// separate pass from [`Expr::bind`] since the executor, not the caller,
    /// owns "now".
    fn substitute_now(self, now: i64) -> Expr {
        match self {
            Expr::Now => Expr::Literal(Value::Timestamp(now)),
            Expr::BinaryOp(l, op, r) => Expr::BinaryOp(
                Box::new(l.substitute_now(now)),
                op,
                Box::new(r.substitute_now(now)),
            ),
            Expr::Not(e) => Expr::Not(Box::new(e.substitute_now(now))),
            Expr::IsNull(e) => Expr::IsNull(Box::new(e.substitute_now(now))),
            Expr::IsNotNull(e) => Expr::IsNotNull(Box::new(e.substitute_now(now))),
            other => other,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: String,
    pub kind: ColumnKind,
    pub nullable: bool,
    pub primary_key: bool,
    pub unique: bool,
}

#[derive(Debug, Clone)]
pub struct OrderByItem {
    pub column: String,
    pub descending: bool,
}

#[derive(Debug, Clone)]
pub enum Projection {
    All,
    Columns(Vec<String>),
    CountStar,
}

#[derive(Debug, Clone)]
pub struct Assignment {
    pub column: String,
    pub value: Expr,
}

#[derive(Debug, Clone)]
pub enum Statement {
    CreateTable {
        name: String,
        columns: Vec<ColumnDef>,
    },
    DropTable {
        name: String,
        if_exists: bool,
    },
    CreateIndex {
        name: String,
        table: String,
        columns: Vec<String>,
        unique: bool,
    },
    DropIndex {
        name: String,
        if_exists: bool,
    },
    Insert {
        table: String,
        columns: Option<Vec<String>>,
        rows: Vec<Vec<Expr>>,
    },
    Select {
        table: String,
        projection: Projection,
        filter: Option<Expr>,
        order_by: Vec<OrderByItem>,
        limit: Option<i64>,
        offset: Option<i64>,
    },
    Update {
        table: String,
        assignments: Vec<Assignment>,
        filter: Option<Expr>,
    },
    Delete {
        table: String,
        filter: Option<Expr>,
    },
}

impl Statement {
    /// Replaces every `?` placeholder with the corresponding positional
    /// parameter. A no-op for statements with none.
    pub fn bind(self, params: &[Value]) -> DbResult<Statement> {
        let bind_opt = |e: Option<Expr>, params: &[Value]| -> DbResult<Option<Expr>> {
            e.map(|e| e.bind(params)).transpose()
        };
        Ok(match self {
            Statement::Insert { table, columns, rows } => {
                let rows = rows
                    .into_iter()
                    .map(|row| row.into_iter().map(|e| e.bind(params)).collect())
                    .collect::<DbResult<Vec<_>>>()?;
                Statement::Insert { table, columns, rows }
            }
            Statement::Select { table, projection, filter, order_by, limit, offset } => {
                Statement::Select {
                    table,
                    projection,
                    filter: bind_opt(filter, params)?,
                    order_by,
                    limit,
                    offset,
                }
            }
            Statement::Update { table, assignments, filter } => {
                let assignments = assignments
                    .into_iter()
                    .map(|a| Ok(Assignment { column: a.column, value: a.value.bind(params)? }))
                    .collect::<DbResult<Vec<_>>>()?;
                Statement::Update { table, assignments, filter: bind_opt(filter, params)? }
            }
            Statement::Delete { table, filter } => {
                Statement::Delete { table, filter: bind_opt(filter, params)? }
            }
            other => other,
        })
    }

    /// Substitutes every `NOW()` call with `now` (milliseconds since the
    /// epoch), the executor's one "ambient" input besides the catalog.
    pub fn substitute_now(self, now: i64) -> Statement {
        match self {
            Statement::Insert { table, columns, rows } => Statement::Insert {
                table,
                columns,
                rows: rows
                    .into_iter()
                    .map(|row| row.into_iter().map(|e| e.substitute_now(now)).collect())
                    .collect(),
            },
            Statement::Select { table, projection, filter, order_by, limit, offset } => {
                Statement::Select {
                    table,
                    projection,
                    filter: filter.map(|f| f.substitute_now(now)),
                    order_by,
                    limit,
                    offset,
                }
            }
            Statement::Update { table, assignments, filter } => Statement::Update {
                table,
                assignments: assignments
                    .into_iter()
                    .map(|a| Assignment { column: a.column, value: a.value.substitute_now(now) })
                    .collect(),
                filter: filter.map(|f| f.substitute_now(now)),
            },
            Statement::Delete { table, filter } => {
                Statement::Delete { table, filter: filter.map(|f| f.substitute_now(now)) }
            }
            other => other,
        }
    }

    /// Full validation against the current catalog (spec §4.7). Run once,
    /// after binding/substitution, before handing the statement to the
    /// planner.
    pub fn validate(&self, catalog: &Catalog) -> DbResult<()> {
        match self {
            Statement::CreateTable { name, columns } => {
                if catalog.get_table(name).is_some() {
                    return Err(DbError::TableExists(name.clone()));
                }
                if columns.is_empty() {
                    return Err(DbError::Validate("table must have at least one column".into()));
                }
                if columns.len() > MAX_COLUMNS {
                    return Err(DbError::Validate(format!(
                        "table has {} columns, max is {}",
                        columns.len(),
                        MAX_COLUMNS
                    )));
                }
                let mut seen = std::collections::HashSet::new();
                let mut pk_count = 0;
                for c in columns {
                    if !seen.insert(c.name.to_ascii_lowercase()) {
                        return Err(DbError::Validate(format!("duplicate column {}", c.name)));
                    }
                    if c.primary_key {
                        pk_count += 1;
                    }
                }
                if pk_count > 1 {
                    return Err(DbError::Validate("at most one PRIMARY KEY column is supported".into()));
                }
                Ok(())
            }
            Statement::DropTable { name, if_exists } => {
                if catalog.get_table(name).is_none() && !if_exists {
                    return Err(DbError::TableNotFound(name.clone()));
                }
                Ok(())
            }
            Statement::CreateIndex { name, table, columns, unique } => {
                if catalog.get_index(name).is_some() {
                    return Err(DbError::IndexExists(name.clone()));
                }
                let desc = catalog
                    .get_table(table)
                    .ok_or_else(|| DbError::TableNotFound(table.clone()))?;
                if columns.is_empty() {
                    return Err(DbError::Validate("index must name at least one column".into()));
                }
                if *unique && columns.len() > 1 {
                    // Composite unique indexes are not supported; keep that
                    // restriction rather than half-implement multi-column
                    // uniqueness checking.
                    return Err(DbError::Validate(
                        "composite UNIQUE indexes are not supported".into(),
                    ));
                }
                for col in columns {
                    let c = desc
                        .columns
                        .iter()
                        .find(|c| c.name.eq_ignore_ascii_case(col))
                        .ok_or_else(|| {
                            DbError::Validate(format!("no column {col} on table {table}"))
                        })?;
                    if crate::key::IndexKeyKind::from_column_kind(c.kind).is_none() {
                        return Err(DbError::Validate(format!(
                            "column {col} of type {} cannot be indexed",
                            c.kind.name()
                        )));
                    }
                }
                Ok(())
            }
            Statement::DropIndex { name, if_exists } => {
                if catalog.get_index(name).is_none() && !if_exists {
                    return Err(DbError::IndexNotFound(name.clone()));
                }
                Ok(())
            }
            Statement::Insert { table, columns, rows } => {
                let desc = catalog
                    .get_table(table)
                    .ok_or_else(|| DbError::TableNotFound(table.clone()))?;
                let target_columns: Vec<&str> = match columns {
                    Some(cols) => cols.iter().map(String::as_str).collect(),
                    None => desc.columns.iter().map(|c| c.name.as_str()).collect(),
                };
                for name in &target_columns {
                    if desc.column_index(name).is_none() {
                        return Err(DbError::Validate(format!("no column {name} on table {table}")));
                    }
                }
                for row in rows {
                    if row.len() != target_columns.len() {
                        return Err(DbError::Validate(format!(
                            "expected {} values, found {}",
                            target_columns.len(),
                            row.len()
                        )));
                    }
                    for (name, expr) in target_columns.iter().zip(row.iter()) {
                        let col = &desc.columns[desc.column_index(name).unwrap()];
                        validate_literal_expr(expr, col.kind, col.nullable, name)?;
                    }
                }
                Ok(())
            }
            Statement::Select { table, projection, filter, order_by, .. } => {
                let desc = catalog
                    .get_table(table)
                    .ok_or_else(|| DbError::TableNotFound(table.clone()))?;
                if let Projection::Columns(cols) = projection {
                    for c in cols {
                        if desc.column_index(c).is_none() {
                            return Err(DbError::Validate(format!("no column {c} on table {table}")));
                        }
                    }
                }
                if matches!(projection, Projection::CountStar) && !order_by.is_empty() {
                    return Err(DbError::Validate(
                        "ORDER BY cannot be combined with COUNT(*)".into(),
                    ));
                }
                if let Some(f) = filter {
                    validate_filter_columns(f, desc)?;
                }
                for ob in order_by {
                    if desc.column_index(&ob.column).is_none() {
                        return Err(DbError::Validate(format!(
                            "no column {} on table {table}",
                            ob.column
                        )));
                    }
                }
                Ok(())
            }
            Statement::Update { table, assignments, filter } => {
                let desc = catalog
                    .get_table(table)
                    .ok_or_else(|| DbError::TableNotFound(table.clone()))?;
                if assignments.is_empty() {
                    return Err(DbError::Validate("UPDATE requires at least one assignment".into()));
                }
                for a in assignments {
                    let col = desc
                        .columns
                        .iter()
                        .find(|c| c.name.eq_ignore_ascii_case(&a.column))
                        .ok_or_else(|| {
                            DbError::Validate(format!("no column {} on table {table}", a.column))
                        })?;
                    validate_literal_expr(&a.value, col.kind, col.nullable, &a.column)?;
                }
                if let Some(f) = filter {
                    validate_filter_columns(f, desc)?;
                }
                Ok(())
            }
            Statement::Delete { table, filter } => {
                let desc = catalog
                    .get_table(table)
                    .ok_or_else(|| DbError::TableNotFound(table.clone()))?;
                if let Some(f) = filter {
                    validate_filter_columns(f, desc)?;
                }
                Ok(())
            }
        }
    }
}

fn validate_filter_columns(
    expr: &Expr,
    desc: &crate::catalog::schema::TableDescriptor,
) -> DbResult<()> {
    let mut cols = Vec::new();
    expr.referenced_columns(&mut cols);
    for c in cols {
        if desc.column_index(&c).is_none() {
            return Err(DbError::Validate(format!("no column {c} on table {}", desc.name)));
        }
    }
    Ok(())
}

/// Checks a literal/`NULL` expression destined for column `name` against its
/// declared kind and nullability. `NOW()` and placeholders are resolved
/// before validation runs, so only `Literal`/`Null` should reach here.
fn validate_literal_expr(
    expr: &Expr,
    kind: ColumnKind,
    nullable: bool,
    name: &str,
) -> DbResult<()> {
    match expr {
        Expr::Null => {
            if !nullable {
                return Err(DbError::ConstraintNull(name.to_string()));
            }
            Ok(())
        }
        Expr::Literal(v) => {
            let coerced = v.clone().coerce(kind).map_err(|_| {
                DbError::Validate(format!(
                    "column {name} expects {}, found {}",
                    kind.name(),
                    v.kind().name()
                ))
            })?;
            if let Some(text) = coerced.as_text() {
                if text.len() > MAX_TEXT_LEN {
                    return Err(DbError::Validate(format!(
                        "value for column {name} exceeds maximum text length"
                    )));
                }
            }
            Ok(())
        }
        _ => Err(DbError::Validate(format!(
            "column {name} must bind to a literal value"
        ))),
    }
}
