//! Operation processor.
//!
//! Applies operations one at a time on a single connection while keeping
//! one logical transaction open for the caller. Work may be flushed
//! (committed and reopened) several times inside that transaction; the
//! transaction log keeps the compensating operations of every flushed frame
//! so the whole logical transaction can still be rolled back.

use tracing::{debug, error, info, warn};

use crate::backend::Backend;
use crate::dialect::MigrationDialect;
use crate::error::{MigrateError, Result};
use crate::journal::{Frame, TransactionLog};
use crate::lock::LockManager;
use crate::operations::{Operation, RawOperation};
use crate::options::ProcessorOptions;
use crate::policy::{ConflictResolution, FlushPolicy};
use crate::schema::ColumnSchema;
use crate::undo;

/// A table or column guarded by a virtual lock.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LockTarget {
    Table(String),
    Column(String, String),
}

impl LockTarget {
    fn table(name: &str) -> Self {
        Self::Table(name.to_string())
    }

    fn column(table: &str, column: &str) -> Self {
        Self::Column(table.to_string(), column.to_string())
    }

    fn is_locked(&self, locks: &LockManager) -> bool {
        match self {
            Self::Table(table) => locks.is_touched(table),
            Self::Column(table, column) => locks.is_column_touched(table, column),
        }
    }

    fn touch(&self, locks: &mut LockManager) {
        match self {
            Self::Table(table) => locks.touch(table),
            Self::Column(table, column) => locks.touch_column(table, column),
        }
    }
}

impl std::fmt::Display for LockTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table(table) => write!(f, "Table '{table}'"),
            Self::Column(table, column) => write!(f, "Column '{table}.{column}'"),
        }
    }
}

/// Objects an operation must not re-touch before a flush, and whether it
/// touches them itself.
fn lock_targets(operation: &Operation) -> (Vec<LockTarget>, bool) {
    match operation {
        Operation::CreateTable { name, .. }
        | Operation::AlterTable { name, .. }
        | Operation::DeleteTable { name } => (vec![LockTarget::table(name)], true),
        Operation::RenameTable { old_name, new_name } => (
            vec![LockTarget::table(old_name), LockTarget::table(new_name)],
            true,
        ),
        Operation::CreateColumn { table, column } => {
            (vec![LockTarget::column(table, &column.name)], true)
        }
        Operation::AlterColumn {
            table, column_name, ..
        }
        | Operation::AlterDefaultConstraint {
            table, column_name, ..
        }
        | Operation::DeleteDefaultConstraint { table, column_name } => {
            (vec![LockTarget::column(table, column_name)], true)
        }
        Operation::RenameColumn {
            table,
            old_name,
            new_name,
        } => (
            vec![
                LockTarget::column(table, old_name),
                LockTarget::column(table, new_name),
            ],
            true,
        ),
        Operation::DeleteColumn {
            table,
            column_names,
        } => (
            column_names
                .iter()
                .map(|column| LockTarget::column(table, column))
                .collect(),
            true,
        ),
        Operation::CreateIndex { table, .. }
        | Operation::DeleteIndex { table, .. }
        | Operation::CreateConstraint { table, .. }
        | Operation::DeleteConstraint { table, .. }
        | Operation::DeleteForeignKey { table, .. }
        | Operation::InsertData { table, .. }
        | Operation::UpdateData { table, .. }
        | Operation::DeleteData { table, .. }
        | Operation::Raw(RawOperation::DeleteTrigger { table, .. }) => {
            (vec![LockTarget::table(table)], false)
        }
        Operation::CreateForeignKey { table, foreign_key } => (
            vec![
                LockTarget::table(table),
                LockTarget::table(&foreign_key.references_table),
            ],
            false,
        ),
        Operation::Raw(RawOperation::CreateTrigger(trigger)) => {
            (vec![LockTarget::table(&trigger.table)], false)
        }
        Operation::CreateSchema { .. }
        | Operation::AlterSchema { .. }
        | Operation::DeleteSchema { .. }
        | Operation::CreateSequence { .. }
        | Operation::DeleteSequence { .. }
        | Operation::Raw(RawOperation::RestartSequence { .. })
        | Operation::Raw(RawOperation::Sql { .. }) => (Vec::new(), false),
    }
}

/// Identity columns created by `operation`, with their table.
pub(crate) fn identity_columns(operation: &Operation) -> Option<(&str, Vec<&ColumnSchema>)> {
    let (table, columns): (&str, Vec<&ColumnSchema>) = match operation {
        Operation::CreateTable { name, columns, .. } => (name.as_str(), columns.iter().collect()),
        Operation::CreateColumn { table, column } => (table.as_str(), vec![column]),
        _ => return None,
    };
    let identity: Vec<&ColumnSchema> = columns.into_iter().filter(|c| c.auto_increment).collect();
    if identity.is_empty() {
        None
    } else {
        Some((table, identity))
    }
}

/// Applies operations against one backend.
pub struct Processor<B, D> {
    backend: B,
    dialect: D,
    options: ProcessorOptions,
    policy: FlushPolicy,
    locks: LockManager,
    log: TransactionLog,
}

impl<B: Backend, D: MigrationDialect> Processor<B, D> {
    /// Creates a processor. No transaction is open.
    pub fn new(backend: B, dialect: D, options: ProcessorOptions) -> Self {
        let policy = FlushPolicy::new(&options);
        Self {
            backend,
            dialect,
            options,
            policy,
            locks: LockManager::new(),
            log: TransactionLog::new(),
        }
    }

    /// Returns the run options.
    #[must_use]
    pub fn options(&self) -> &ProcessorOptions {
        &self.options
    }

    /// Returns the dialect.
    #[must_use]
    pub fn dialect(&self) -> &D {
        &self.dialect
    }

    /// Returns the backend.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the backend mutably.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Consumes the processor, returning the backend.
    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Number of frames in the transaction log (0 outside a transaction).
    #[must_use]
    pub fn frame_depth(&self) -> usize {
        self.log.depth()
    }

    /// Returns true when no logical transaction is open, so nothing applied
    /// now can be undone by [`Processor::rollback_transaction`].
    #[must_use]
    pub fn is_running_out_of_migration_scope(&self) -> bool {
        !self.log.is_active()
    }

    /// Opens a logical transaction.
    pub fn begin_transaction(&mut self) -> Result<()> {
        if self.log.is_active() {
            return Err(MigrateError::InvalidState(
                "a transaction is already open".to_string(),
            ));
        }
        self.locks.reset();
        self.backend.begin()?;
        self.log.reset();
        info!("Transaction started");
        Ok(())
    }

    /// Commits the logical transaction. Nothing applied so far can be undone
    /// afterwards.
    pub fn commit_transaction(&mut self) -> Result<()> {
        if !self.log.is_active() {
            return Err(MigrateError::InvalidState(
                "no transaction to commit".to_string(),
            ));
        }
        self.backend.commit()?;
        info!(frames = self.log.depth(), "Transaction committed");
        self.log.clear();
        self.locks.reset();
        Ok(())
    }

    /// Rolls back the logical transaction.
    ///
    /// The open frame is rolled back by the database. Flushed frames are
    /// reversed by replaying their compensating operations, newest first,
    /// each step in its own transaction. A failing step stops the replay;
    /// steps already replayed stay committed.
    pub fn rollback_transaction(&mut self) -> Result<()> {
        if !self.log.is_active() {
            return Ok(());
        }
        info!(
            frames = self.log.depth(),
            steps = self.log.pending_undo_steps(),
            "Rolling back transaction"
        );

        let frames = self.log.drain_newest_first();
        self.locks.reset();
        // Committed frames still need their compensations if this fails.
        let physical = self.backend.rollback().err();
        if let Some(err) = &physical {
            error!(error = %err, "Physical rollback failed");
        }

        // The newest frame was never committed; the database already undid it.
        let steps: Vec<Operation> = frames
            .into_iter()
            .skip(1)
            .flat_map(Frame::into_rev_iter)
            .flat_map(|tracked| tracked.undo_operations)
            .collect();

        let total = steps.len();
        for (completed, step) in steps.iter().enumerate() {
            if let Err(err) = self.replay(step) {
                error!(
                    operation = %step.description(),
                    error = %err,
                    completed,
                    "Compensating step failed"
                );
                if let Err(rollback) = self.backend.rollback() {
                    error!(error = %rollback, "Could not roll back failed compensating step");
                }
                return Err(MigrateError::RollbackIncomplete {
                    completed,
                    remaining: total - completed,
                    source: Box::new(err),
                });
            }
        }

        if let Some(err) = physical {
            return Err(MigrateError::RollbackIncomplete {
                completed: total,
                remaining: 0,
                source: Box::new(err),
            });
        }
        info!(steps = total, "Transaction rolled back");
        Ok(())
    }

    /// Commits the work done so far and reopens the transaction, keeping
    /// it undoable as part of the logical transaction.
    pub fn flush(&mut self) -> Result<()> {
        if self.log.is_active() {
            self.backend.commit()?;
            self.backend.begin()?;
            self.log.push_frame();
            info!(frames = self.log.depth(), "Transaction flushed");
        }
        self.locks.reset();
        Ok(())
    }

    /// Applies one operation.
    ///
    /// Any failure other than a lock conflict rolls the logical transaction
    /// back before it is returned.
    pub fn process(&mut self, operation: Operation) -> Result<()> {
        match self.try_process(operation) {
            Ok(()) => Ok(()),
            Err(err) if err.is_lock_conflict() => Err(err),
            Err(err) => Err(self.abort(err)),
        }
    }

    fn try_process(&mut self, operation: Operation) -> Result<()> {
        let (targets, touches) = lock_targets(&operation);
        for target in &targets {
            self.check_lock(target)?;
        }

        let identity = identity_columns(&operation).map(|(table, columns)| {
            columns
                .into_iter()
                .flat_map(|column| self.dialect.identity_operations(table, column))
                .collect::<Vec<_>>()
        });
        let flush_after = self.policy.flush_after(&operation);

        debug!(operation = %operation.description(), "Processing operation");
        self.register(operation.clone())?;
        self.run(&operation)?;

        if touches {
            for target in &targets {
                target.touch(&mut self.locks);
            }
        }

        if let Some(identity) = identity {
            // Later statements must see the new column before its
            // sequence and trigger are created.
            self.flush()?;
            for op in identity {
                self.register(op.clone())?;
                self.run(&op)?;
            }
        }

        if flush_after {
            self.flush()?;
        }
        Ok(())
    }

    fn check_lock(&mut self, target: &LockTarget) -> Result<()> {
        if !target.is_locked(&self.locks) {
            return Ok(());
        }
        match self.policy.on_conflict(&target.to_string())? {
            ConflictResolution::Flush => {
                debug!(object = %target, "Lock conflict, flushing");
                self.flush()
            }
            ConflictResolution::Ignore => {
                warn!(object = %target, "Lock conflict ignored");
                Ok(())
            }
        }
    }

    fn register(&mut self, operation: Operation) -> Result<()> {
        if !self.options.undo_enabled || !self.log.is_active() {
            return Ok(());
        }
        let tracked = undo::synthesize(operation, &mut self.backend)?;
        if !tracked.can_undo {
            return Err(MigrateError::NotReversible(tracked.operation.description()));
        }
        if let Some(frame) = self.log.current_mut() {
            frame.push(tracked);
        }
        Ok(())
    }

    fn run(&mut self, operation: &Operation) -> Result<()> {
        for sql in self.dialect.generate_sql(operation) {
            if sql.starts_with("--") {
                warn!(comment = %sql, "Skipping comment (unsupported operation)");
                continue;
            }
            debug!(sql = %sql, "Executing SQL");
            self.backend.execute(&sql, self.options.command_timeout)?;
        }
        Ok(())
    }

    fn replay(&mut self, step: &Operation) -> Result<()> {
        debug!(operation = %step.description(), "Replaying compensating step");
        self.backend.begin()?;
        self.run(step)?;
        self.backend.commit()
    }

    fn abort(&mut self, cause: MigrateError) -> MigrateError {
        if !self.log.is_active() {
            return cause;
        }
        warn!(error = %cause, "Operation failed, rolling back");
        match self.rollback_transaction() {
            Ok(()) => cause,
            Err(rollback) => MigrateError::RollbackFailed {
                cause: Box::new(cause),
                rollback: Box::new(rollback),
            },
        }
    }
}
