//! REPL command dispatch and result formatting for the `ashdb` binary.
//!
//! Grounded on nimbus's `cli::display_query_result`/`main.rs` readline loop:
//! dot-commands handled before falling through to the SQL engine, SELECT
//! results rendered as a `tabled` table, DML results printed as an
//! affected-row count. nimbus hardcodes its one dot-command (`.exit`)
//! directly in `main`; this factors dispatch out into its own module so
//! `main.rs` only owns the editor loop.

use tabled::builder::Builder;
use tabled::settings::Style;

use ashdb::database::{Database, QueryResult};
use ashdb::value::Value;

/// Runs one line of REPL input against `db`. Returns `false` when the
/// session should end (`.exit`).
pub fn handle_line(db: &mut Database, line: &str) -> bool {
    if line.eq_ignore_ascii_case(".exit") {
        return false;
    }
    if line.eq_ignore_ascii_case(".tables") {
        let mut names = db.table_names();
        names.sort();
        for name in names {
            println!("{name}");
        }
        return true;
    }
    if let Some(table) = line.strip_prefix(".analyze ") {
        match db.analyze(table.trim()) {
            Ok(()) => println!("OK"),
            Err(e) => println!("Error: {e}"),
        }
        return true;
    }

    match db.execute(line, &[]) {
        Ok(result) => print_result(&result),
        Err(e) => println!("Error: {e}"),
    }
    true
}

fn print_result(result: &QueryResult) {
    if result.columns.is_empty() {
        println!("OK");
        return;
    }
    if result.columns.len() == 1 && result.columns[0] == "affected" {
        let count = match result.rows.first().and_then(|r| r.first()) {
            Some(Some(Value::Int8(n))) => *n,
            _ => 0,
        };
        println!("OK, {count} row{} affected", if count == 1 { "" } else { "s" });
        return;
    }

    let mut builder = Builder::default();
    builder.push_record(result.columns.clone());
    for row in &result.rows {
        builder.push_record(row.iter().map(value_to_string).collect::<Vec<_>>());
    }
    let mut table = builder.build();
    table.with(Style::rounded());
    println!("{table}");
    println!("{} row{} returned", result.rows.len(), if result.rows.len() == 1 { "" } else { "s" });
}

fn value_to_string(value: &Option<Value>) -> String {
    match value {
        None => "NULL".to_string(),
        Some(Value::Boolean(b)) => b.to_string(),
        Some(Value::Int4(v)) => v.to_string(),
        Some(Value::Int8(v)) => v.to_string(),
        Some(Value::Real(v)) => v.to_string(),
        Some(Value::Double(v)) => v.to_string(),
        Some(Value::Timestamp(v)) => v.to_string(),
        Some(Value::Varchar(s)) | Some(Value::Text(s)) => s.clone(),
    }
}
