//! Database backends.
//!
//! The processor talks to the target database through two traits that are
//! implemented by the same object, because both must use one physical
//! connection: pre-images have to be read inside the transaction that is
//! about to change them.

mod sqlite;

pub use sqlite::SqliteBackend;

use std::time::Duration;

use crate::data::Row;
use crate::error::Result;
use crate::schema::{SequenceSchema, TableSchema};

/// Raw statement execution and transaction control on one connection.
pub trait Connection {
    /// Executes one statement.
    fn execute(&mut self, sql: &str, timeout: Option<Duration>) -> Result<()>;

    /// Opens a transaction.
    fn begin(&mut self) -> Result<()>;

    /// Commits the open transaction.
    fn commit(&mut self) -> Result<()>;

    /// Rolls back the open transaction.
    fn rollback(&mut self) -> Result<()>;
}

/// Point-in-time reads of schema objects and rows.
pub trait SchemaReader {
    /// Reads the full definition of a table.
    fn read_table(&mut self, name: &str) -> Result<TableSchema>;

    /// Reads the current state of a sequence.
    fn read_sequence(&mut self, name: &str) -> Result<SequenceSchema>;

    /// Reads every row of a table.
    fn read_rows(&mut self, table: &str) -> Result<Vec<Row>>;
}

/// A connection that can also read the schema it is connected to.
pub trait Backend: Connection + SchemaReader {}

impl<T: Connection + SchemaReader> Backend for T {}
