//! Transactional DDL emulation for database migrations.
//!
//! Engines such as Firebird cannot run most DDL inside a transaction that
//! also uses the objects it creates. `oxide-fbmigrate` lets a migration
//! behave as one logical transaction anyway:
//! - Work is flushed (committed and reopened) whenever the engine needs it
//! - Every flushed operation is recorded with compensating operations,
//!   synthesized from the database state read just before it ran
//! - Rolling back undoes the open frame through the database and replays
//!   the compensating operations of flushed frames, newest first
//!
//! # Architecture
//!
//! - **Operations** - Schema and data changes like `CreateTable`, `DeleteColumn`, `UpdateData`
//! - **Lock** - Virtual locks on tables/columns touched since the last flush
//! - **Policy** - When to flush, and what to do on a lock conflict
//! - **Undo** - Synthesizes compensating operations from pre-images
//! - **Journal** - The stack of frames recorded for the logical transaction
//! - **Processor** - Dispatches operations, flushes and rolls back
//! - **Executor** - Runs whole migrations through a processor
//! - **Dialect** - Database-specific SQL generation (Firebird, SQLite)
//! - **Backend** - Statement execution and schema reads on one connection
//!
//! # Example
//!
//! ```rust,no_run
//! use oxide_fbmigrate::prelude::*;
//!
//! # fn main() -> oxide_fbmigrate::error::Result<()> {
//! let backend = SqliteBackend::connect("sqlite://app.db")?;
//! let options = ProcessorOptions::new().transaction_model(TransactionModel::AutoCommit);
//! let mut executor = MigrationExecutor::new(backend, SqliteDialect::new(), options);
//!
//! let migration = ExecutableMigration::new("users", "0001_initial").operation(
//!     Operation::create_table(
//!         "users",
//!         vec![
//!             ColumnSchema::new("id", SqlType::BigInt).primary_key(),
//!             ColumnSchema::new("name", SqlType::Varchar(100)).not_null(),
//!         ],
//!         vec!["id".to_string()],
//!     ),
//! );
//! executor.apply(&migration)?;
//! # Ok(())
//! # }
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Apply a JSON migration plan
//! oxide-fbmigrate apply --plan plan.json --database sqlite://app.db
//!
//! # Print the Firebird SQL of a plan
//! oxide-fbmigrate sql --plan plan.json
//! ```

pub mod backend;
pub mod data;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod journal;
pub mod lock;
pub mod operations;
pub mod options;
pub mod policy;
pub mod processor;
pub mod schema;
pub mod undo;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::backend::{Backend, Connection, SchemaReader, SqliteBackend};
    pub use crate::data::{row, DataValue, Row, RowSelection};
    pub use crate::dialect::{FirebirdDialect, MigrationDialect, SqliteDialect};
    pub use crate::error::{MigrateError, Result};
    pub use crate::executor::{load_plan, sql_for, ExecutableMigration, MigrationExecutor};
    pub use crate::operations::{
        ColumnChanges, ForeignKeyBuilder, IndexBuilder, Operation, RawOperation,
    };
    pub use crate::options::{ProcessorOptions, TransactionModel};
    pub use crate::processor::Processor;
    pub use crate::schema::{
        ColumnSchema, DefaultValue, ForeignKeyAction, ForeignKeySchema, IndexSchema, SqlType,
        TableSchema, TriggerEvent, TriggerSchema, TriggerTiming, UniqueConstraint,
    };
}

/// Trait for migrations defined in Rust code.
///
/// This trait is implemented by migration structs to define schema changes.
pub trait OxideMigration {
    /// Application/module name (e.g., "users", "posts").
    const APP: &'static str;

    /// Migration name (e.g., "0001_initial", "0002_add_email").
    const NAME: &'static str;

    /// Returns the migration operations.
    fn operations() -> Vec<operations::Operation>;

    /// Converts to an executable migration.
    fn to_executable() -> executor::ExecutableMigration {
        executor::ExecutableMigration::new(Self::APP, Self::NAME).operations(Self::operations())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::*;

    struct TestMigration;

    impl OxideMigration for TestMigration {
        const APP: &'static str = "test";
        const NAME: &'static str = "0001_initial";

        fn operations() -> Vec<Operation> {
            vec![Operation::create_table(
                "test_table",
                vec![ColumnSchema::new("id", SqlType::BigInt).primary_key()],
                vec!["id".to_string()],
            )]
        }
    }

    #[test]
    fn test_migration_trait() {
        assert_eq!(TestMigration::APP, "test");
        assert_eq!(TestMigration::NAME, "0001_initial");

        let ops = TestMigration::operations();
        assert_eq!(ops.len(), 1);
    }

    #[test]
    fn test_to_executable() {
        let executable = TestMigration::to_executable();
        assert_eq!(executable.app, "test");
        assert_eq!(executable.name, "0001_initial");
        assert_eq!(executable.id(), "test/0001_initial");
        assert_eq!(executable.operations.len(), 1);
    }
}
