//! SQL front end: `sqlparser`'s generic-dialect AST converted into
//! [`Statement`] (spec §6 "SQL surface").
//!
//! Grounded on nimbus's `parser::parse` directly — same crate, same
//! one-function-plus-per-node-kind-converters shape, `item.to_string()` used
//! for projection items exactly as nimbus does for its `selection` list —
//! extended from nimbus's four-statement, no-`WHERE`-combinators subset to
//! the fuller grammar this crate accepts.

use sqlparser::ast::{
    self, Assignment, ColumnOption, DataType, Expr as SqlExpr, FromTable, ObjectType, OrderByExpr,
    SelectItem, SetExpr, Statement as SqlStatement, TableFactor, Value as SqlValue,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::error::{DbError, DbResult};
use crate::statement::{Assignment as AsAssignment, BinOp, ColumnDef, Expr, OrderByItem, Projection, Statement};
use crate::value::{ColumnKind, Value};

pub fn parse(sql: &str) -> DbResult<Statement> {
    let dialect = GenericDialect {};
    let mut parsed = Parser::parse_sql(&dialect, sql).map_err(|e| DbError::Parse(e.to_string()))?;
    if parsed.len() != 1 {
        return Err(DbError::Parse("expected exactly one SQL statement".into()));
    }
    convert_statement(parsed.remove(0))
}

fn convert_statement(stmt: SqlStatement) -> DbResult<Statement> {
    match stmt {
        SqlStatement::CreateTable { name, columns, .. } => convert_create_table(name, columns),
        SqlStatement::Drop { object_type: ObjectType::Table, if_exists, mut names, .. } => {
            let name = object_name(names.remove(0))?;
            Ok(Statement::DropTable { name, if_exists })
        }
        SqlStatement::Drop { object_type: ObjectType::Index, if_exists, mut names, .. } => {
            let name = object_name(names.remove(0))?;
            Ok(Statement::DropIndex { name, if_exists })
        }
        SqlStatement::CreateIndex { name, table_name, columns, unique, .. } => {
            convert_create_index(name, table_name, columns, unique)
        }
        SqlStatement::Insert { table_name, columns, source, .. } => {
            convert_insert(table_name, columns, source)
        }
        SqlStatement::Query(query) => convert_select(*query),
        SqlStatement::Update { table, assignments, selection, .. } => {
            convert_update(table, assignments, selection)
        }
        SqlStatement::Delete { tables: _, from, selection, .. } => convert_delete(from, selection),
        other => Err(DbError::Parse(format!("unsupported statement: {other}"))),
    }
}

fn object_name(name: ast::ObjectName) -> DbResult<String> {
    name.0
        .last()
        .map(|ident| ident.value.clone())
        .ok_or_else(|| DbError::Parse("empty identifier".into()))
}

fn convert_create_table(name: ast::ObjectName, table_columns: Vec<ast::ColumnDef>) -> DbResult<Statement> {
    let name = object_name(name)?;
    let mut columns = Vec::with_capacity(table_columns.len());
    for col in table_columns {
        let kind = convert_data_type(&col.data_type)?;
        let mut nullable = true;
        let mut primary_key = false;
        let mut unique = false;
        for opt in &col.options {
            match &opt.option {
                ColumnOption::NotNull => nullable = false,
                ColumnOption::Null => nullable = true,
                ColumnOption::Unique { is_primary, .. } => {
                    if *is_primary {
                        primary_key = true;
                        nullable = false;
                    } else {
                        unique = true;
                    }
                }
                _ => {}
            }
        }
        columns.push(ColumnDef { name: col.name.value, kind, nullable, primary_key, unique });
    }
    Ok(Statement::CreateTable { name, columns })
}

fn convert_data_type(dt: &DataType) -> DbResult<ColumnKind> {
    Ok(match dt {
        DataType::Boolean | DataType::Bool => ColumnKind::Boolean,
        DataType::Int(_) | DataType::Integer(_) | DataType::Int4(_) => ColumnKind::Int4,
        DataType::BigInt(_) | DataType::Int8(_) => ColumnKind::Int8,
        DataType::Real | DataType::Float4 | DataType::Float(_) => ColumnKind::Real,
        DataType::Double | DataType::DoublePrecision | DataType::Float8 => ColumnKind::Double,
        DataType::Timestamp(_, _) => ColumnKind::Timestamp,
        DataType::Varchar(_) | DataType::CharVarying(_) | DataType::Character(_) => ColumnKind::Varchar,
        DataType::Text => ColumnKind::Text,
        other => return Err(DbError::Parse(format!("unsupported column type: {other}"))),
    })
}

fn convert_create_index(
    name: Option<ast::ObjectName>,
    table_name: ast::ObjectName,
    columns: Vec<OrderByExpr>,
    unique: bool,
) -> DbResult<Statement> {
    let name = name
        .map(object_name)
        .transpose()?
        .ok_or_else(|| DbError::Parse("CREATE INDEX requires a name".into()))?;
    let table = object_name(table_name)?;
    let columns = columns.into_iter().map(|c: OrderByExpr| c.expr.to_string()).collect();
    Ok(Statement::CreateIndex { name, table, columns, unique })
}

fn convert_insert(
    table_name: ast::ObjectName,
    insert_columns: Vec<ast::Ident>,
    source: Option<Box<ast::Query>>,
) -> DbResult<Statement> {
    let table = object_name(table_name)?;
    let columns = if insert_columns.is_empty() {
        None
    } else {
        Some(insert_columns.into_iter().map(|c| c.value).collect())
    };
    let source = source.ok_or_else(|| DbError::Parse("INSERT must have a VALUES clause".into()))?;
    let rows = match *source.body {
        SetExpr::Values(values) => {
            let mut next_placeholder = 0usize;
            values
                .rows
                .into_iter()
                .map(|row| {
                    row.into_iter()
                        .map(|e| convert_expr(e, &mut next_placeholder))
                        .collect::<DbResult<Vec<_>>>()
                })
                .collect::<DbResult<Vec<_>>>()?
        }
        _ => return Err(DbError::Parse("INSERT source must be VALUES".into())),
    };
    Ok(Statement::Insert { table, columns, rows })
}

fn convert_select(query: ast::Query) -> DbResult<Statement> {
    let select = match *query.body {
        SetExpr::Select(select) => *select,
        _ => return Err(DbError::Parse("only plain SELECT queries are supported".into())),
    };
    let table = match select.from.first() {
        Some(twj) => match &twj.relation {
            TableFactor::Table { name, .. } => object_name(name.clone())?,
            other => return Err(DbError::Parse(format!("unsupported FROM clause: {other}"))),
        },
        None => return Err(DbError::Parse("SELECT must have a FROM clause".into())),
    };

    let projection = convert_projection(&select.projection)?;

    let mut next_placeholder = 0usize;
    let filter = select
        .selection
        .map(|e| convert_expr(e, &mut next_placeholder))
        .transpose()?;

    let order_by = query
        .order_by
        .into_iter()
        .map(|item| {
            Ok(OrderByItem {
                column: item.expr.to_string(),
                descending: item.asc == Some(false),
            })
        })
        .collect::<DbResult<Vec<_>>>()?;

    let limit = query
        .limit
        .map(|e| match e {
            SqlExpr::Value(SqlValue::Number(n, _)) => n
                .parse::<i64>()
                .map_err(|_| DbError::Parse(format!("invalid LIMIT: {n}"))),
            other => Err(DbError::Parse(format!("unsupported LIMIT: {other}"))),
        })
        .transpose()?;
    let offset = query
        .offset
        .map(|o| match o.value {
            SqlExpr::Value(SqlValue::Number(n, _)) => n
                .parse::<i64>()
                .map_err(|_| DbError::Parse(format!("invalid OFFSET: {n}"))),
            other => Err(DbError::Parse(format!("unsupported OFFSET: {other}"))),
        })
        .transpose()?;

    Ok(Statement::Select { table, projection, filter, order_by, limit, offset })
}

fn convert_projection(items: &[SelectItem]) -> DbResult<Projection> {
    if items.len() == 1 {
        if let SelectItem::Wildcard(_) = &items[0] {
            return Ok(Projection::All);
        }
        let text = items[0].to_string();
        if text.to_ascii_lowercase().replace(' ', "") == "count(*)" {
            return Ok(Projection::CountStar);
        }
    }
    let mut cols = Vec::with_capacity(items.len());
    for item in items {
        match item {
            SelectItem::Wildcard(_) => {
                return Err(DbError::Parse("`*` cannot be mixed with other columns".into()))
            }
            SelectItem::UnnamedExpr(e) => cols.push(e.to_string()),
            SelectItem::ExprWithAlias { expr, .. } => cols.push(expr.to_string()),
            other => return Err(DbError::Parse(format!("unsupported select item: {other}"))),
        }
    }
    Ok(Projection::Columns(cols))
}

fn convert_update(
    table: ast::TableWithJoins,
    assignments: Vec<Assignment>,
    selection: Option<SqlExpr>,
) -> DbResult<Statement> {
    let table_name = match &table.relation {
        TableFactor::Table { name, .. } => object_name(name.clone())?,
        other => return Err(DbError::Parse(format!("unsupported UPDATE target: {other}"))),
    };
    let mut next_placeholder = 0usize;
    let assignments = assignments
        .into_iter()
        .map(|a| {
            let column = a
                .id
                .last()
                .map(|i| i.value.clone())
                .ok_or_else(|| DbError::Parse("empty assignment target".into()))?;
            let value = convert_expr(a.value, &mut next_placeholder)?;
            Ok(AsAssignment { column, value })
        })
        .collect::<DbResult<Vec<_>>>()?;
    let filter = selection.map(|e| convert_expr(e, &mut next_placeholder)).transpose()?;
    Ok(Statement::Update { table: table_name, assignments, filter })
}

fn convert_delete(from: FromTable, selection: Option<SqlExpr>) -> DbResult<Statement> {
    let tables = match from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    let table = match tables.first().map(|t| &t.relation) {
        Some(TableFactor::Table { name, .. }) => object_name(name.clone())?,
        _ => return Err(DbError::Parse("DELETE requires a FROM table".into())),
    };
    let mut next_placeholder = 0usize;
    let filter = selection.map(|e| convert_expr(e, &mut next_placeholder)).transpose()?;
    Ok(Statement::Delete { table, filter })
}

fn convert_expr(expr: SqlExpr, next_placeholder: &mut usize) -> DbResult<Expr> {
    Ok(match expr {
        SqlExpr::Identifier(ident) => Expr::Column(ident.value),
        SqlExpr::CompoundIdentifier(parts) => Expr::Column(
            parts.last().map(|i| i.value.clone()).unwrap_or_default(),
        ),
        SqlExpr::Value(v) => convert_value(v, next_placeholder)?,
        SqlExpr::Nested(inner) => convert_expr(*inner, next_placeholder)?,
        SqlExpr::BinaryOp { left, op, right } => {
            let op = convert_binop(op)?;
            Expr::BinaryOp(
                Box::new(convert_expr(*left, next_placeholder)?),
                op,
                Box::new(convert_expr(*right, next_placeholder)?),
            )
        }
        SqlExpr::UnaryOp { op: ast::UnaryOperator::Not, expr } => {
            Expr::Not(Box::new(convert_expr(*expr, next_placeholder)?))
        }
        SqlExpr::IsNull(e) => Expr::IsNull(Box::new(convert_expr(*e, next_placeholder)?)),
        SqlExpr::IsNotNull(e) => Expr::IsNotNull(Box::new(convert_expr(*e, next_placeholder)?)),
        SqlExpr::Function(f) if f.name.to_string().eq_ignore_ascii_case("now") => Expr::Now,
        other => return Err(DbError::Parse(format!("unsupported expression: {other}"))),
    })
}

fn convert_value(v: SqlValue, next_placeholder: &mut usize) -> DbResult<Expr> {
    Ok(match v {
        SqlValue::Number(s, _) => {
            if let Ok(i) = s.parse::<i64>() {
                Expr::Literal(Value::Int8(i))
            } else {
                Expr::Literal(Value::Double(
                    s.parse::<f64>()
                        .map_err(|_| DbError::Parse(format!("invalid number literal {s}")))?,
                ))
            }
        }
        SqlValue::SingleQuotedString(s) | SqlValue::DoubleQuotedString(s) => {
            Expr::Literal(Value::Varchar(s))
        }
        SqlValue::Boolean(b) => Expr::Literal(Value::Boolean(b)),
        SqlValue::Null => Expr::Null,
        SqlValue::Placeholder(_) => {
            let idx = *next_placeholder;
            *next_placeholder += 1;
            Expr::Placeholder(idx)
        }
        other => return Err(DbError::Parse(format!("unsupported literal: {other}"))),
    })
}

fn convert_binop(op: ast::BinaryOperator) -> DbResult<BinOp> {
    use ast::BinaryOperator::*;
    Ok(match op {
        Eq => BinOp::Eq,
        NotEq => BinOp::NotEq,
        Lt => BinOp::Lt,
        LtEq => BinOp::LtEq,
        Gt => BinOp::Gt,
        GtEq => BinOp::GtEq,
        And => BinOp::And,
        Or => BinOp::Or,
        other => return Err(DbError::Parse(format!("unsupported operator: {other:?}"))),
    })
}
