//! Virtual locks.
//!
//! Firebird makes DDL visible to the connection's metadata cache before the
//! transaction commits. Touching the same table or column twice between two
//! commits can leave that cache inconsistent, so the processor remembers
//! what it touched since the last flush and asks the flush policy what to
//! do when something is touched again.

use std::collections::{HashMap, HashSet};

/// Tables and columns touched since the last flush.
#[derive(Debug, Default, Clone)]
pub struct LockManager {
    tables: HashSet<String>,
    columns: HashMap<String, HashSet<String>>,
}

impl LockManager {
    /// Creates an empty lock manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a table as touched.
    pub fn touch(&mut self, table: &str) {
        self.tables.insert(table.to_string());
    }

    /// Records a column as touched.
    pub fn touch_column(&mut self, table: &str, column: &str) {
        self.columns
            .entry(table.to_string())
            .or_default()
            .insert(column.to_string());
    }

    /// Returns true if the table was touched since the last flush.
    #[must_use]
    pub fn is_touched(&self, table: &str) -> bool {
        self.tables.contains(table)
    }

    /// Returns true if the column, or its table, was touched since the last flush.
    #[must_use]
    pub fn is_column_touched(&self, table: &str, column: &str) -> bool {
        self.is_touched(table)
            || self
                .columns
                .get(table)
                .is_some_and(|columns| columns.contains(column))
    }

    /// Forgets everything.
    pub fn reset(&mut self) {
        self.tables.clear();
        self.columns.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touch_and_check() {
        let mut locks = LockManager::new();
        assert!(!locks.is_touched("users"));

        locks.touch("users");
        locks.touch("users");
        assert!(locks.is_touched("users"));
        assert!(!locks.is_touched("posts"));
    }

    #[test]
    fn test_column_touch_is_scoped_to_table() {
        let mut locks = LockManager::new();
        locks.touch_column("users", "age");

        assert!(locks.is_column_touched("users", "age"));
        assert!(!locks.is_column_touched("users", "name"));
        assert!(!locks.is_column_touched("posts", "age"));
        assert!(!locks.is_touched("users"));
    }

    #[test]
    fn test_table_touch_covers_columns() {
        let mut locks = LockManager::new();
        locks.touch("users");
        assert!(locks.is_column_touched("users", "anything"));
    }

    #[test]
    fn test_reset() {
        let mut locks = LockManager::new();
        locks.touch("users");
        locks.touch_column("posts", "title");
        locks.reset();

        assert!(!locks.is_touched("users"));
        assert!(!locks.is_column_touched("posts", "title"));
    }
}
