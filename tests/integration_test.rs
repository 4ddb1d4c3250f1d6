//! End-to-end tests against the `Database` façade, the same level nimbus's
//! own `tests/execution_tests.rs` drives its engine from, just through SQL
//! text instead of hand-built executor chains.

use ashdb::database::Database;
use ashdb::error::DbError;
use ashdb::value::Value;

fn open_db() -> (tempfile::TempDir, Database) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("test.db");
    let db = Database::open(path.to_str().unwrap()).expect("open database");
    (dir, db)
}

#[test]
fn create_insert_select_roundtrip() {
    let (_dir, mut db) = open_db();
    db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, age INTEGER)", &[])
        .expect("create table");
    db.execute("INSERT INTO users (name, age) VALUES ('Alice', 30)", &[]).expect("insert alice");
    db.execute("INSERT INTO users (name, age) VALUES ('Bob', 20)", &[]).expect("insert bob");

    let result = db.execute("SELECT name, age FROM users WHERE age > 25", &[]).expect("select");
    assert_eq!(result.columns, vec!["name".to_string(), "age".to_string()]);
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0][0], Some(Value::Text("Alice".to_string())));
    assert_eq!(result.rows[0][1], Some(Value::Int4(30)));
}

#[test]
fn autoincrement_row_id_sequencing() {
    let (_dir, mut db) = open_db();
    db.execute("CREATE TABLE items (id INTEGER PRIMARY KEY, label TEXT)", &[]).expect("create table");

    // Leaving `id` unset lets the table allocate the next RowID, starting at 1.
    db.execute("INSERT INTO items (label) VALUES ('first')", &[]).expect("insert first");
    db.execute("INSERT INTO items (label) VALUES ('second')", &[]).expect("insert second");
    // An explicit RowID above the allocator's cursor must bump future allocations past it.
    db.execute("INSERT INTO items (id, label) VALUES (10, 'explicit')", &[]).expect("insert explicit");
    db.execute("INSERT INTO items (label) VALUES ('after-explicit')", &[]).expect("insert after explicit");

    let result = db.execute("SELECT id, label FROM items ORDER BY id", &[]).expect("select");
    let ids: Vec<i32> = result
        .rows
        .iter()
        .map(|row| match row[0] {
            Some(Value::Int4(n)) => n,
            _ => panic!("expected Int4 id"),
        })
        .collect();
    assert_eq!(ids, vec![1, 2, 10, 11]);
}

#[test]
fn unique_index_rejects_duplicate_key() {
    let (_dir, mut db) = open_db();
    db.execute("CREATE TABLE accounts (id INTEGER PRIMARY KEY, email TEXT NOT NULL)", &[]).expect("create table");
    db.execute("CREATE UNIQUE INDEX idx_email ON accounts (email)", &[]).expect("create index");
    db.execute("INSERT INTO accounts (email) VALUES ('a@example.com')", &[]).expect("first insert");

    let err = db
        .execute("INSERT INTO accounts (email) VALUES ('a@example.com')", &[])
        .expect_err("duplicate email must be rejected");
    assert!(matches!(err, DbError::DuplicateKey { .. }), "expected DuplicateKey, got {err:?}");

    // The failed statement's transaction must have rolled back cleanly: the
    // table still holds only the first row.
    let result = db.execute("SELECT email FROM accounts", &[]).expect("select");
    assert_eq!(result.rows.len(), 1);
}

#[test]
fn not_null_violation_is_rejected() {
    let (_dir, mut db) = open_db();
    db.execute("CREATE TABLE accounts (id INTEGER PRIMARY KEY, email TEXT NOT NULL)", &[]).expect("create table");

    let err = db.execute("INSERT INTO accounts (id) VALUES (1)", &[]).expect_err("missing email must fail");
    assert!(matches!(err, DbError::ConstraintNull(_)), "expected ConstraintNull, got {err:?}");
}

#[test]
fn overflow_text_round_trips() {
    let (_dir, mut db) = open_db();
    db.execute("CREATE TABLE docs (id INTEGER PRIMARY KEY, body TEXT NOT NULL)", &[]).expect("create table");

    // Comfortably larger than a 4 KiB page so the row is forced through the
    // overflow chain rather than storing inline.
    let big = "x".repeat(20_000);
    db.execute(&format!("INSERT INTO docs (id, body) VALUES (1, '{big}')"), &[]).expect("insert big doc");

    let result = db.execute("SELECT body FROM docs WHERE id = 1", &[]).expect("select");
    assert_eq!(result.rows.len(), 1);
    match &result.rows[0][0] {
        Some(Value::Text(s)) => assert_eq!(s.len(), big.len()),
        other => panic!("expected overflowed text, got {other:?}"),
    }
}

#[test]
fn update_and_delete_maintain_indexes() {
    let (_dir, mut db) = open_db();
    db.execute("CREATE TABLE items (id INTEGER PRIMARY KEY, tag TEXT NOT NULL)", &[]).expect("create table");
    db.execute("CREATE INDEX idx_tag ON items (tag)", &[]).expect("create index");
    db.execute("INSERT INTO items (id, tag) VALUES (1, 'a')", &[]).expect("insert 1");
    db.execute("INSERT INTO items (id, tag) VALUES (2, 'b')", &[]).expect("insert 2");

    db.execute("UPDATE items SET tag = 'z' WHERE id = 1", &[]).expect("update");
    let moved = db.execute("SELECT id FROM items WHERE tag = 'z'", &[]).expect("select updated tag");
    assert_eq!(moved.rows.len(), 1);
    assert_eq!(moved.rows[0][0], Some(Value::Int4(1)));

    let stale = db.execute("SELECT id FROM items WHERE tag = 'a'", &[]).expect("select stale tag");
    assert!(stale.rows.is_empty(), "old index entry must not resolve after update");

    db.execute("DELETE FROM items WHERE id = 2", &[]).expect("delete");
    let after_delete = db.execute("SELECT id FROM items WHERE tag = 'b'", &[]).expect("select deleted tag");
    assert!(after_delete.rows.is_empty(), "index entry for deleted row must be gone");
}

#[test]
fn planner_switches_between_index_and_sequential_scan() {
    let (_dir, mut db) = open_db();
    db.execute("CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT NOT NULL)", &[]).expect("create table");
    db.execute("CREATE INDEX idx_name ON people (name)", &[]).expect("create index");
    for (id, name) in [(1, "Ann"), (2, "Bo"), (3, "Cy")] {
        db.execute(&format!("INSERT INTO people (id, name) VALUES ({id}, '{name}')"), &[]).expect("insert");
    }

    // Equality on an indexed column: the planner should pick the index.
    let by_index = db.execute("SELECT id FROM people WHERE name = 'Bo'", &[]).expect("select by index");
    assert_eq!(by_index.rows, vec![vec![Some(Value::Int4(2))]]);

    // No usable predicate: falls back to a sequential scan but still returns
    // every row.
    let all = db.execute("SELECT id FROM people", &[]).expect("select all");
    assert_eq!(all.rows.len(), 3);
}

#[test]
fn placeholder_binding_substitutes_params() {
    let (_dir, mut db) = open_db();
    db.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, val INTEGER)", &[]).expect("create table");
    db.execute("INSERT INTO t (id, val) VALUES (1, 5)", &[]).expect("insert");

    let result = db
        .execute("SELECT id FROM t WHERE val = ?", &[Value::Int8(5)])
        .expect("select with placeholder");
    assert_eq!(result.rows, vec![vec![Some(Value::Int4(1))]]);
}

#[test]
fn analyze_refreshes_index_stats_without_error() {
    let (_dir, mut db) = open_db();
    db.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, val TEXT)", &[]).expect("create table");
    db.execute("CREATE INDEX idx_val ON t (val)", &[]).expect("create index");
    db.execute("INSERT INTO t (id, val) VALUES (1, 'a')", &[]).expect("insert 1");
    db.execute("INSERT INTO t (id, val) VALUES (2, 'a')", &[]).expect("insert 2");
    db.execute("INSERT INTO t (id, val) VALUES (3, 'b')", &[]).expect("insert 3");

    db.analyze("t").expect("analyze");
    // table_names should list the user table but never the schema table.
    assert_eq!(db.table_names(), vec!["t".to_string()]);
}

#[test]
fn drop_table_removes_it_from_catalog() {
    let (_dir, mut db) = open_db();
    db.execute("CREATE TABLE temp (id INTEGER PRIMARY KEY)", &[]).expect("create table");
    db.execute("DROP TABLE temp", &[]).expect("drop table");
    assert!(db.table_names().is_empty());

    let err = db.execute("SELECT * FROM temp", &[]).expect_err("table should be gone");
    assert!(matches!(err, DbError::TableNotFound(_)));
}

#[test]
fn reopen_after_close_preserves_data() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("persist.db");
    let path_str = path.to_str().unwrap().to_string();

    {
        let mut db = Database::open(&path_str).expect("open database");
        db.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, val TEXT NOT NULL)", &[]).expect("create table");
        db.execute("INSERT INTO t (id, val) VALUES (1, 'hello')", &[]).expect("insert");
        db.close().expect("close");
    }

    let mut db = Database::open(&path_str).expect("reopen database");
    let result = db.execute("SELECT val FROM t WHERE id = 1", &[]).expect("select after reopen");
    assert_eq!(result.rows, vec![vec![Some(Value::Text("hello".to_string()))]]);
}
