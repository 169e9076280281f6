//! Error types for the migration system.

/// Errors that can occur while processing migration operations.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// A table or column was touched again before a flush.
    #[error("{object} is locked; flush the transaction before touching it again")]
    Locked {
        /// The locked object (`table` or `table.column`).
        object: String,
    },

    /// An operation cannot be undone while undo is enabled.
    #[error("Operation is not reversible: {0}")]
    NotReversible(String),

    /// A statement failed on the target database.
    #[error("Failed to execute '{sql}': {message}")]
    Execution {
        /// The statement that failed.
        sql: String,
        /// Message reported by the database.
        message: String,
    },

    /// A compensating step failed while rolling back.
    #[error(
        "Rollback incomplete: {completed} compensating step(s) applied, {remaining} remaining: {source}"
    )]
    RollbackIncomplete {
        /// Compensating steps that were applied and committed.
        completed: usize,
        /// Compensating steps that were not applied.
        remaining: usize,
        /// The failure that stopped the replay, or the failed physical rollback.
        source: Box<MigrateError>,
    },

    /// An operation failed and the implicit rollback failed as well.
    #[error("{cause}; rollback also failed: {rollback}")]
    RollbackFailed {
        /// The original failure.
        cause: Box<MigrateError>,
        /// The rollback failure.
        rollback: Box<MigrateError>,
    },

    /// A schema object could not be found while reading its definition.
    #[error("{kind} '{name}' does not exist")]
    ObjectNotFound {
        /// Object kind (table, sequence, index, ...).
        kind: &'static str,
        /// Object name.
        name: String,
    },

    /// The backend cannot serve the request.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Invalid processor state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Database driver error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error (reading plan or option files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MigrateError {
    /// Creates an execution error for a statement.
    pub fn execution(sql: impl Into<String>, message: impl ToString) -> Self {
        Self::Execution {
            sql: sql.into(),
            message: message.to_string(),
        }
    }

    /// Returns true if this error is a virtual lock conflict.
    #[must_use]
    pub fn is_lock_conflict(&self) -> bool {
        matches!(self, Self::Locked { .. })
    }
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
