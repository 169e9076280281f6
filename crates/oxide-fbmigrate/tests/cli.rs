//! Command-line runs against plan files.

use std::process::Command;

use oxide_fbmigrate::prelude::*;

fn write_plan(dir: &std::path::Path) -> std::path::PathBuf {
    let plan = vec![ExecutableMigration::new("shop", "0001_initial").operation(
        Operation::create_table(
            "orders",
            vec![
                ColumnSchema::new("id", SqlType::BigInt)
                    .primary_key()
                    .auto_increment(),
                ColumnSchema::new("total", SqlType::Decimal(10, 2)).not_null(),
            ],
            vec!["id".to_string()],
        ),
    )];
    let path = dir.join("plan.json");
    std::fs::write(&path, serde_json::to_string_pretty(&plan).unwrap()).unwrap();
    path
}

#[test]
fn test_sql_prints_firebird_statements() {
    let dir = tempfile::tempdir().unwrap();
    let plan = write_plan(dir.path());

    let output = Command::new(env!("CARGO_BIN_EXE_oxide-fbmigrate"))
        .arg("sql")
        .arg("--plan")
        .arg(&plan)
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("CREATE TABLE \"orders\""));
    assert!(stdout.contains("CREATE SEQUENCE \"GEN_orders_id\""));
    assert!(stdout.contains("CREATE TRIGGER \"TRG_orders_id\""));
}

#[test]
fn test_apply_creates_tables() {
    let dir = tempfile::tempdir().unwrap();
    let plan = write_plan(dir.path());
    let db = dir.path().join("app.db");
    let url = format!("sqlite://{}", db.display());

    let status = Command::new(env!("CARGO_BIN_EXE_oxide-fbmigrate"))
        .arg("apply")
        .arg("--plan")
        .arg(&plan)
        .arg("--database")
        .arg(&url)
        .arg("--transaction-model")
        .arg("auto-commit")
        .status()
        .unwrap();
    assert!(status.success());

    let mut backend = SqliteBackend::connect(&url).unwrap();
    assert_eq!(backend.table_names().unwrap(), vec!["orders"]);
}

#[test]
fn test_missing_plan_fails() {
    let dir = tempfile::tempdir().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_oxide-fbmigrate"))
        .arg("sql")
        .arg("--plan")
        .arg(dir.path().join("missing.json"))
        .output()
        .unwrap();

    assert!(!output.status.success());
}
