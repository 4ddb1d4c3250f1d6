//! The `ashdb` REPL binary (spec §5).
//!
//! Grounded on nimbus's `main.rs`: a `rustyline` readline loop over a single
//! open database, flushing on exit. nimbus builds its buffer pool and
//! catalog inline in `main`; this opens a [`Database`] instead and leaves
//! every statement's dispatch to [`cli::handle_line`].

mod cli;

use ashdb::database::Database;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let db_path = std::env::args().nth(1).unwrap_or_else(|| "ashdb.db".to_string());
    let mut db = match Database::open(&db_path) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("failed to open {db_path}: {e}");
            std::process::exit(1);
        }
    };

    println!("ashdb (v0.1.0)");
    println!("Type '.exit' to quit, '.tables' to list tables, '.analyze <table>' to refresh index stats.");

    let mut rl = DefaultEditor::new().expect("failed to start line editor");
    loop {
        match rl.readline("ashdb> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                rl.add_history_entry(line).ok();
                if !cli::handle_line(&mut db, line) {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("readline error: {e}");
                break;
            }
        }
    }

    if let Err(e) = db.close() {
        eprintln!("error flushing database: {e}");
    }
}
