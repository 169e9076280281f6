//! Migration executor.
//!
//! This module runs whole migrations through a [`Processor`]: each
//! migration is one logical transaction, committed when every operation
//! succeeded and rolled back otherwise.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::backend::Backend;
use crate::dialect::MigrationDialect;
use crate::error::{MigrateError, Result};
use crate::operations::Operation;
use crate::options::ProcessorOptions;
use crate::processor::{identity_columns, Processor};

/// A migration ready to be executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutableMigration {
    /// Application/module name.
    pub app: String,
    /// Migration name.
    pub name: String,
    /// Migration operations.
    #[serde(default)]
    pub operations: Vec<Operation>,
}

impl ExecutableMigration {
    /// Creates a new executable migration.
    #[must_use]
    pub fn new(app: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            name: name.into(),
            operations: Vec::new(),
        }
    }

    /// Adds an operation to this migration.
    #[must_use]
    pub fn operation(mut self, op: Operation) -> Self {
        self.operations.push(op);
        self
    }

    /// Adds operations to this migration.
    #[must_use]
    pub fn operations(mut self, ops: Vec<Operation>) -> Self {
        self.operations.extend(ops);
        self
    }

    /// Returns the full migration identifier.
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}/{}", self.app, self.name)
    }
}

/// Reads a JSON plan: an array of migrations.
pub fn load_plan(path: &Path) -> Result<Vec<ExecutableMigration>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Generates the SQL a migration would run, without a database.
///
/// Includes the identity emulation statements the dialect adds after
/// tables or columns with auto-increment columns.
#[must_use]
pub fn sql_for<D: MigrationDialect>(dialect: &D, migration: &ExecutableMigration) -> Vec<String> {
    let mut all_sql = Vec::new();
    for operation in &migration.operations {
        all_sql.extend(dialect.generate_sql(operation));
        if let Some((table, columns)) = identity_columns(operation) {
            for column in columns {
                for identity in dialect.identity_operations(table, column) {
                    all_sql.extend(dialect.generate_sql(&identity));
                }
            }
        }
    }
    all_sql
}

/// Executes migrations against one backend.
pub struct MigrationExecutor<B, D> {
    processor: Processor<B, D>,
}

impl<B: Backend, D: MigrationDialect> MigrationExecutor<B, D> {
    /// Creates a new migration executor.
    pub fn new(backend: B, dialect: D, options: ProcessorOptions) -> Self {
        Self {
            processor: Processor::new(backend, dialect, options),
        }
    }

    /// Returns the processor.
    #[must_use]
    pub fn processor(&self) -> &Processor<B, D> {
        &self.processor
    }

    /// Returns the processor mutably.
    pub fn processor_mut(&mut self) -> &mut Processor<B, D> {
        &mut self.processor
    }

    /// Consumes the executor, returning the backend.
    pub fn into_backend(self) -> B {
        self.processor.into_backend()
    }

    /// Applies a single migration in its own logical transaction.
    pub fn apply(&mut self, migration: &ExecutableMigration) -> Result<()> {
        info!(
            app = %migration.app,
            name = %migration.name,
            operations = migration.operations.len(),
            "Applying migration"
        );

        self.processor.begin_transaction()?;
        for operation in &migration.operations {
            if let Err(err) = self.processor.process(operation.clone()) {
                return Err(self.abandon(migration, err));
            }
        }
        self.processor.commit_transaction()?;

        info!(
            app = %migration.app,
            name = %migration.name,
            "Migration applied successfully"
        );
        Ok(())
    }

    /// Applies multiple migrations in order, stopping at the first failure.
    ///
    /// Returns the number of migrations applied.
    pub fn apply_all(&mut self, migrations: &[ExecutableMigration]) -> Result<usize> {
        for migration in migrations {
            self.apply(migration)?;
        }
        Ok(migrations.len())
    }

    /// Generates SQL for a migration without executing it.
    #[must_use]
    pub fn sql_for(&self, migration: &ExecutableMigration) -> Vec<String> {
        sql_for(self.processor.dialect(), migration)
    }

    /// Rolls back whatever the processor left open after a failure.
    fn abandon(&mut self, migration: &ExecutableMigration, cause: MigrateError) -> MigrateError {
        warn!(
            migration = %migration.id(),
            error = %cause,
            "Migration failed"
        );
        if self.processor.is_running_out_of_migration_scope() {
            return cause;
        }
        match self.processor.rollback_transaction() {
            Ok(()) => cause,
            Err(rollback) => MigrateError::RollbackFailed {
                cause: Box::new(cause),
                rollback: Box::new(rollback),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SqliteBackend;
    use crate::data::{row, DataValue};
    use crate::dialect::{FirebirdDialect, SqliteDialect};
    use crate::options::TransactionModel;
    use crate::schema::{ColumnSchema, SqlType};

    fn executor(model: TransactionModel) -> MigrationExecutor<SqliteBackend, SqliteDialect> {
        let backend = SqliteBackend::connect("sqlite::memory:").unwrap();
        MigrationExecutor::new(
            backend,
            SqliteDialect::new(),
            ProcessorOptions::new().transaction_model(model),
        )
    }

    fn create_users_migration() -> ExecutableMigration {
        ExecutableMigration::new("users", "0001_initial").operation(Operation::create_table(
            "users",
            vec![
                ColumnSchema::new("id", SqlType::BigInt)
                    .primary_key()
                    .auto_increment(),
                ColumnSchema::new("username", SqlType::Varchar(255)).not_null(),
            ],
            vec!["id".to_string()],
        ))
    }

    #[test]
    fn test_apply_migration() {
        let mut executor = executor(TransactionModel::AutoCommitOnConflict);
        executor.apply(&create_users_migration()).unwrap();

        assert!(executor.processor().is_running_out_of_migration_scope());
        let mut backend = executor.into_backend();
        assert_eq!(backend.table_names().unwrap(), vec!["users"]);
    }

    #[test]
    fn test_failed_migration_rolls_back_flushed_work() {
        let mut executor = executor(TransactionModel::AutoCommit);
        let migration = create_users_migration()
            .operation(Operation::insert_data(
                "users",
                vec![row([("id", DataValue::from(1_i64)), ("username", "ann".into())])],
            ))
            .operation(Operation::run_sql("INSERT INTO missing VALUES (1)", None));

        // Raw SQL without a backward statement is refused before it runs.
        let err = executor.apply(&migration).unwrap_err();
        assert!(matches!(err, MigrateError::NotReversible(_)));

        let mut backend = executor.into_backend();
        assert!(backend.table_names().unwrap().is_empty());
    }

    #[test]
    fn test_execution_error_propagates_after_rollback() {
        let mut executor = executor(TransactionModel::AutoCommit);
        let migration = create_users_migration().operation(Operation::run_sql(
            "INSERT INTO missing VALUES (1)",
            Some("DELETE FROM missing".to_string()),
        ));

        let err = executor.apply(&migration).unwrap_err();
        assert!(matches!(err, MigrateError::Execution { .. }));

        let mut backend = executor.into_backend();
        assert!(backend.table_names().unwrap().is_empty());
    }

    #[test]
    fn test_lock_conflict_abandons_migration() {
        let mut executor = executor(TransactionModel::None);
        let migration = create_users_migration().operation(Operation::create_column(
            "users",
            ColumnSchema::new("email", SqlType::Text),
        ));

        let err = executor.apply(&migration).unwrap_err();
        assert!(err.is_lock_conflict());
        assert!(executor.processor().is_running_out_of_migration_scope());

        let mut backend = executor.into_backend();
        assert!(backend.table_names().unwrap().is_empty());
    }

    #[test]
    fn test_apply_all() {
        let mut executor = executor(TransactionModel::AutoCommitOnConflict);
        let second = ExecutableMigration::new("users", "0002_add_email").operation(
            Operation::create_column("users", ColumnSchema::new("email", SqlType::Text)),
        );

        let applied = executor
            .apply_all(&[create_users_migration(), second])
            .unwrap();
        assert_eq!(applied, 2);

        let mut backend = executor.into_backend();
        let users = crate::backend::SchemaReader::read_table(&mut backend, "users").unwrap();
        assert!(users.get_column("email").is_some());
    }

    #[test]
    fn test_sql_for_includes_identity_emulation() {
        let sql = sql_for(&FirebirdDialect::new(), &create_users_migration());

        assert_eq!(sql.len(), 3);
        assert!(sql[0].starts_with("CREATE TABLE \"users\""));
        assert_eq!(
            sql[1],
            "CREATE SEQUENCE \"GEN_users_id\" START WITH 0 INCREMENT BY 1"
        );
        assert!(sql[2].starts_with("CREATE TRIGGER \"TRG_users_id\" FOR \"users\""));
    }

    #[test]
    fn test_plan_json_round_trip() {
        let plan = vec![create_users_migration()];
        let json = serde_json::to_string_pretty(&plan).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        std::fs::write(&path, json).unwrap();

        assert_eq!(load_plan(&path).unwrap(), plan);
    }
}
