//! Transaction log.
//!
//! One frame per flush interval. The top frame holds work the database can
//! still roll back by itself; every frame below it was committed by a flush
//! and can only be reversed by replaying its compensating operations.

use crate::undo::TrackedOperation;

/// Operations registered between two flush points, oldest first.
#[derive(Debug, Default, Clone)]
pub struct Frame {
    operations: Vec<TrackedOperation>,
}

impl Frame {
    /// Creates an empty frame.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a tracked operation.
    pub fn push(&mut self, operation: TrackedOperation) {
        self.operations.push(operation);
    }

    /// Tracked operations, oldest first.
    #[must_use]
    pub fn operations(&self) -> &[TrackedOperation] {
        &self.operations
    }

    /// Consumes the frame, yielding operations newest first.
    pub fn into_rev_iter(self) -> impl Iterator<Item = TrackedOperation> {
        self.operations.into_iter().rev()
    }
}

/// Stack of frames for the open logical transaction.
///
/// Holds at least one frame while a transaction is open and none outside.
#[derive(Debug, Default, Clone)]
pub struct TransactionLog {
    frames: Vec<Frame>,
}

impl TransactionLog {
    /// Creates an empty log (no transaction).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops all frames and starts over with a single empty frame.
    pub fn reset(&mut self) {
        self.frames.clear();
        self.frames.push(Frame::new());
    }

    /// Drops all frames.
    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// Pushes a new empty frame (flush point).
    pub fn push_frame(&mut self) {
        self.frames.push(Frame::new());
    }

    /// Returns true while a logical transaction is open.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.frames.is_empty()
    }

    /// Number of frames.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// The frame receiving new registrations.
    pub fn current_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    /// Removes every frame and returns them newest first.
    pub fn drain_newest_first(&mut self) -> Vec<Frame> {
        let mut frames = std::mem::take(&mut self.frames);
        frames.reverse();
        frames
    }

    /// Total number of compensating operations held by the log.
    #[must_use]
    pub fn pending_undo_steps(&self) -> usize {
        self.frames
            .iter()
            .flat_map(|f| f.operations())
            .map(|t| t.undo_operations.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::Operation;

    fn tracked(table: &str) -> TrackedOperation {
        let op = Operation::create_table(table, vec![], vec![]);
        TrackedOperation::undoable(op.clone(), op.reverse().into_iter().collect())
    }

    #[test]
    fn test_reset_leaves_single_empty_frame() {
        let mut log = TransactionLog::new();
        assert!(!log.is_active());

        log.reset();
        log.current_mut().unwrap().push(tracked("a"));
        log.push_frame();
        log.reset();

        assert_eq!(log.depth(), 1);
        assert_eq!(log.pending_undo_steps(), 0);
    }

    #[test]
    fn test_drain_newest_first() {
        let mut log = TransactionLog::new();
        log.reset();
        log.current_mut().unwrap().push(tracked("a"));
        log.push_frame();
        log.current_mut().unwrap().push(tracked("b"));
        log.current_mut().unwrap().push(tracked("c"));
        assert_eq!(log.pending_undo_steps(), 3);

        let frames = log.drain_newest_first();
        assert!(!log.is_active());
        assert_eq!(frames.len(), 2);

        let newest: Vec<String> = frames[0]
            .clone()
            .into_rev_iter()
            .map(|t| t.operation.description())
            .collect();
        assert_eq!(newest, vec!["Create table 'c'", "Create table 'b'"]);
        assert_eq!(frames[1].operations().len(), 1);
    }
}
