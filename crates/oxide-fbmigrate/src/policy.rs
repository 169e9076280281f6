//! Flush policy.
//!
//! Decides, per [`TransactionModel`], whether a lock conflict flushes the
//! transaction, fails the run, or is ignored, and whether an applied
//! operation is followed by a flush.

use crate::error::{MigrateError, Result};
use crate::operations::Operation;
use crate::options::{ProcessorOptions, TransactionModel};

/// What to do about a re-touched object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Flush, then continue with the operation.
    Flush,
    /// Continue without flushing.
    Ignore,
}

/// Flush decisions for one run.
#[derive(Debug, Clone, Copy)]
pub struct FlushPolicy {
    model: TransactionModel,
    virtual_lock: bool,
}

impl FlushPolicy {
    /// Creates a policy from the run options.
    #[must_use]
    pub fn new(options: &ProcessorOptions) -> Self {
        Self {
            model: options.transaction_model,
            virtual_lock: options.virtual_lock,
        }
    }

    /// Resolves a conflict on `object`.
    pub fn on_conflict(&self, object: &str) -> Result<ConflictResolution> {
        match self.model {
            TransactionModel::AutoCommitOnConflict => Ok(ConflictResolution::Flush),
            TransactionModel::AutoCommit | TransactionModel::None if self.virtual_lock => {
                Err(MigrateError::Locked {
                    object: object.to_string(),
                })
            }
            TransactionModel::AutoCommit | TransactionModel::None => Ok(ConflictResolution::Ignore),
        }
    }

    /// Returns true if `operation` must be followed by a flush once applied.
    #[must_use]
    pub fn flush_after(&self, operation: &Operation) -> bool {
        self.model == TransactionModel::AutoCommit && operation.is_ddl()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(model: TransactionModel, virtual_lock: bool) -> FlushPolicy {
        FlushPolicy::new(
            &ProcessorOptions::new()
                .transaction_model(model)
                .virtual_lock(virtual_lock),
        )
    }

    #[test]
    fn test_auto_commit_on_conflict_always_flushes() {
        for virtual_lock in [true, false] {
            let p = policy(TransactionModel::AutoCommitOnConflict, virtual_lock);
            assert_eq!(p.on_conflict("users").unwrap(), ConflictResolution::Flush);
        }
    }

    #[test]
    fn test_virtual_lock_conflicts_are_errors() {
        for model in [TransactionModel::AutoCommit, TransactionModel::None] {
            let err = policy(model, true).on_conflict("users.age").unwrap_err();
            assert!(err.is_lock_conflict());
            assert!(err.to_string().contains("users.age"));
        }
    }

    #[test]
    fn test_conflicts_ignored_without_virtual_lock() {
        for model in [TransactionModel::AutoCommit, TransactionModel::None] {
            assert_eq!(
                policy(model, false).on_conflict("users").unwrap(),
                ConflictResolution::Ignore
            );
        }
    }

    #[test]
    fn test_flush_after() {
        let ddl = Operation::delete_table("users");
        let dml = Operation::insert_data("users", vec![]);

        assert!(policy(TransactionModel::AutoCommit, true).flush_after(&ddl));
        assert!(!policy(TransactionModel::AutoCommit, true).flush_after(&dml));
        assert!(!policy(TransactionModel::AutoCommitOnConflict, true).flush_after(&ddl));
        assert!(!policy(TransactionModel::None, true).flush_after(&ddl));
    }
}
