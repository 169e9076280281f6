//! Processor options.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// When the processor flushes (commits and reopens) the physical transaction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionModel {
    /// Flush only when an operation re-touches a locked object.
    #[default]
    AutoCommitOnConflict,
    /// Flush after every DDL or raw statement.
    AutoCommit,
    /// Never flush automatically.
    None,
}

/// Options fixed for the lifetime of one migration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorOptions {
    /// Flush policy.
    pub transaction_model: TransactionModel,
    /// Report re-touches of tables/columns before a flush as conflicts.
    pub virtual_lock: bool,
    /// Record compensating operations and refuse irreversible ones.
    pub undo_enabled: bool,
    /// Truncate identifiers longer than the engine allows.
    pub truncate_long_names: bool,
    /// Shorten long constraint/index names with a hash suffix instead of cutting them.
    pub pack_key_names: bool,
    /// Per-statement timeout.
    #[serde(with = "timeout_secs")]
    pub command_timeout: Option<Duration>,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            transaction_model: TransactionModel::AutoCommitOnConflict,
            virtual_lock: true,
            undo_enabled: true,
            truncate_long_names: true,
            pack_key_names: false,
            command_timeout: None,
        }
    }
}

impl ProcessorOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the transaction model.
    #[must_use]
    pub fn transaction_model(mut self, model: TransactionModel) -> Self {
        self.transaction_model = model;
        self
    }

    /// Enables or disables virtual locking.
    #[must_use]
    pub fn virtual_lock(mut self, enabled: bool) -> Self {
        self.virtual_lock = enabled;
        self
    }

    /// Enables or disables the undo log.
    #[must_use]
    pub fn undo_enabled(mut self, enabled: bool) -> Self {
        self.undo_enabled = enabled;
        self
    }

    /// Sets the per-statement timeout.
    #[must_use]
    pub fn command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Loads options from a JSON file; missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

mod timeout_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs = Option::<f64>::deserialize(d)?;
        Ok(secs.filter(|s| *s > 0.0).map(Duration::from_secs_f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ProcessorOptions::default();
        assert_eq!(
            options.transaction_model,
            TransactionModel::AutoCommitOnConflict
        );
        assert!(options.virtual_lock);
        assert!(options.undo_enabled);
        assert!(options.command_timeout.is_none());
    }

    #[test]
    fn test_partial_json() {
        let options: ProcessorOptions = serde_json::from_str(
            r#"{"transaction_model": "auto-commit", "undo_enabled": false, "command_timeout": 2.5}"#,
        )
        .unwrap();
        assert_eq!(options.transaction_model, TransactionModel::AutoCommit);
        assert!(!options.undo_enabled);
        assert!(options.virtual_lock);
        assert_eq!(options.command_timeout, Some(Duration::from_millis(2500)));
    }
}
