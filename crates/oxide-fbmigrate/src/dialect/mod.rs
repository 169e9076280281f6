//! Database dialect implementations.
//!
//! Each dialect knows how to turn an [`Operation`] into SQL statements for
//! its database. Generation is deterministic: the same operation always
//! yields the same statements, which is what lets compensating operations
//! be regenerated during rollback.

mod firebird;
mod sqlite;

pub use firebird::FirebirdDialect;
pub use sqlite::SqliteDialect;

use crate::data::{Row, RowSelection};
use crate::operations::Operation;
use crate::schema::{ColumnSchema, SqlType};

/// Trait for database-specific SQL generation.
pub trait MigrationDialect: Send + Sync {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// Generates SQL for a migration operation.
    ///
    /// Statements starting with `--` describe work the dialect cannot do and
    /// are skipped by the processor. An empty list means there is nothing to
    /// execute.
    fn generate_sql(&self, operation: &Operation) -> Vec<String>;

    /// Returns the SQL type name for the given type.
    fn type_name(&self, sql_type: &SqlType) -> String;

    /// Operations that emulate an identity column, run right after the
    /// column is created.
    fn identity_operations(&self, _table: &str, _column: &ColumnSchema) -> Vec<Operation> {
        Vec::new()
    }

    /// Quote an identifier (table name, column name, etc.).
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Generates column definition SQL.
    fn column_definition(&self, column: &ColumnSchema) -> String {
        let mut parts = vec![
            self.quote_identifier(&column.name),
            self.type_name(&column.sql_type),
        ];

        if let Some(default_sql) = column.default.to_sql() {
            parts.push(format!("DEFAULT {default_sql}"));
        }

        if !column.nullable && !column.primary_key {
            parts.push("NOT NULL".to_string());
        }

        if column.primary_key {
            parts.push("PRIMARY KEY".to_string());
        }

        if column.unique && !column.primary_key {
            parts.push("UNIQUE".to_string());
        }

        parts.join(" ")
    }

    /// Generates the column list of a CREATE TABLE, including a trailing
    /// PRIMARY KEY clause when the key is not declared inline.
    fn table_body(&self, columns: &[ColumnSchema], primary_key: &[String]) -> String {
        let mut defs: Vec<String> = columns.iter().map(|c| self.column_definition(c)).collect();

        let inline = primary_key.len() == 1
            && columns
                .iter()
                .any(|c| c.primary_key && c.name == primary_key[0]);
        if !primary_key.is_empty() && !inline {
            let quoted: Vec<String> = primary_key
                .iter()
                .map(|c| self.quote_identifier(c))
                .collect();
            defs.push(format!("PRIMARY KEY ({})", quoted.join(", ")));
        }

        format!("(\n  {}\n)", defs.join(",\n  "))
    }

    /// Generates one INSERT per row.
    fn insert_sql(&self, table: &str, rows: &[Row]) -> Vec<String> {
        rows.iter()
            .map(|row| {
                let columns: Vec<String> = row.keys().map(|c| self.quote_identifier(c)).collect();
                let values: Vec<String> = row.values().map(|v| v.to_sql()).collect();
                format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    self.quote_identifier(table),
                    columns.join(", "),
                    values.join(", ")
                )
            })
            .collect()
    }

    /// Generates an UPDATE statement.
    fn update_sql(&self, table: &str, set: &Row, selection: &RowSelection) -> String {
        let assignments: Vec<String> = set
            .iter()
            .map(|(c, v)| format!("{} = {}", self.quote_identifier(c), v.to_sql()))
            .collect();
        format!(
            "UPDATE {} SET {}{}",
            self.quote_identifier(table),
            assignments.join(", "),
            self.where_clause(selection)
        )
    }

    /// Generates a DELETE statement.
    fn delete_sql(&self, table: &str, selection: &RowSelection) -> String {
        format!(
            "DELETE FROM {}{}",
            self.quote_identifier(table),
            self.where_clause(selection)
        )
    }

    /// Generates the WHERE clause for a row selection (with a leading space).
    fn where_clause(&self, selection: &RowSelection) -> String {
        let conditions = match selection {
            RowSelection::AllRows => return String::new(),
            RowSelection::Matching(conditions) => conditions,
        };
        if conditions.is_empty() {
            return " WHERE 1 = 0".to_string();
        }

        let alternatives: Vec<String> = conditions
            .iter()
            .map(|condition| {
                if condition.is_empty() {
                    return "1 = 1".to_string();
                }
                let terms: Vec<String> = condition
                    .iter()
                    .map(|(c, v)| {
                        if v.is_null() {
                            format!("{} IS NULL", self.quote_identifier(c))
                        } else {
                            format!("{} = {}", self.quote_identifier(c), v.to_sql())
                        }
                    })
                    .collect();
                format!("({})", terms.join(" AND "))
            })
            .collect();
        format!(" WHERE {}", alternatives.join(" OR "))
    }
}
