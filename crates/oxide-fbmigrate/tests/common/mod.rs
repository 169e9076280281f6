#![allow(dead_code)]

use oxide_fbmigrate::prelude::*;

pub type SqliteProcessor = Processor<SqliteBackend, SqliteDialect>;

pub fn memory_backend() -> SqliteBackend {
    SqliteBackend::connect("sqlite::memory:")
        .unwrap_or_else(|e| panic!("Failed to open in-memory database: {e}"))
}

pub fn processor(model: TransactionModel) -> SqliteProcessor {
    Processor::new(
        memory_backend(),
        SqliteDialect::new(),
        ProcessorOptions::new().transaction_model(model),
    )
}

/// Runs setup statements outside any logical transaction.
pub fn exec(processor: &mut SqliteProcessor, statements: &[&str]) {
    for sql in statements {
        processor
            .backend_mut()
            .execute(sql, None)
            .unwrap_or_else(|e| panic!("Setup failed: {sql}\nError: {e}"));
    }
}

/// `posts(id, title, views)` with two rows, an index and an insert trigger.
pub fn seed_posts(processor: &mut SqliteProcessor) {
    exec(
        processor,
        &[
            "CREATE TABLE audit (post_id INTEGER)",
            "CREATE TABLE posts (id INTEGER PRIMARY KEY, title TEXT NOT NULL, views INTEGER DEFAULT 0)",
            "CREATE INDEX idx_posts_title ON posts (title)",
            "CREATE TRIGGER trg_posts_audit AFTER INSERT ON posts FOR EACH ROW BEGIN INSERT INTO audit (post_id) VALUES (NEW.id); END",
            "INSERT INTO posts (id, title, views) VALUES (1, 'Hello', 10)",
            "INSERT INTO posts (id, title, views) VALUES (2, 'It''s me', 20)",
        ],
    );
}

pub fn table(processor: &mut SqliteProcessor, name: &str) -> TableSchema {
    processor
        .backend_mut()
        .read_table(name)
        .unwrap_or_else(|e| panic!("Failed to read table {name}: {e}"))
}

pub fn rows(processor: &mut SqliteProcessor, name: &str) -> Vec<Row> {
    processor
        .backend_mut()
        .read_rows(name)
        .unwrap_or_else(|e| panic!("Failed to read rows of {name}: {e}"))
}

pub fn snapshot(processor: &mut SqliteProcessor, name: &str) -> (TableSchema, Vec<Row>) {
    (table(processor, name), rows(processor, name))
}

pub fn column_names(processor: &mut SqliteProcessor, name: &str) -> Vec<String> {
    table(processor, name)
        .columns
        .into_iter()
        .map(|c| c.name)
        .collect()
}

pub fn table_names(processor: &mut SqliteProcessor) -> Vec<String> {
    processor
        .backend_mut()
        .table_names()
        .unwrap_or_else(|e| panic!("Failed to list tables: {e}"))
}

/// A reversible statement that fails when it runs.
pub fn failing_step() -> Operation {
    Operation::run_sql(
        "INSERT INTO no_such_table VALUES (1)",
        Some("DELETE FROM no_such_table".to_string()),
    )
}

/// Applies `operation`, flushes it and then fails, so the logical
/// transaction is rolled back through the compensating operations.
pub fn apply_flushed_then_fail(processor: &mut SqliteProcessor, operation: Operation) {
    processor.begin_transaction().expect("begin");
    processor.process(operation).expect("operation");
    processor.flush().expect("flush");

    let err = processor.process(failing_step()).unwrap_err();
    assert!(
        matches!(err, MigrateError::Execution { .. }),
        "unexpected error: {err}"
    );
    assert!(processor.is_running_out_of_migration_scope());
}
