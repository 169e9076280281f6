//! Migration operations.
//!
//! [`Operation`] is the closed set of schema and data changes the processor
//! accepts. Operations that have a context-free inverse expose it through
//! [`Operation::reverse`]; everything else needs a pre-image and is handled
//! by the undo synthesizer.

use serde::{Deserialize, Serialize};

use crate::data::{Row, RowSelection};
use crate::schema::{
    ColumnSchema, DefaultValue, ForeignKeyAction, ForeignKeySchema, IndexSchema, SqlType,
    TriggerSchema, UniqueConstraint,
};

/// Changes to apply to an existing column.
///
/// Each facet is applied by its own statement, so each facet is also undone
/// on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ColumnChanges {
    /// New data type (if changing).
    #[serde(default)]
    pub sql_type: Option<SqlType>,
    /// New nullability (if changing).
    #[serde(default)]
    pub nullable: Option<bool>,
    /// New default value (if changing).
    #[serde(default)]
    pub default: Option<DefaultValue>,
}

impl ColumnChanges {
    /// Creates empty column changes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a new type.
    #[must_use]
    pub fn set_type(mut self, sql_type: SqlType) -> Self {
        self.sql_type = Some(sql_type);
        self
    }

    /// Sets nullability.
    #[must_use]
    pub fn set_nullable(mut self, nullable: bool) -> Self {
        self.nullable = Some(nullable);
        self
    }

    /// Sets default value.
    #[must_use]
    pub fn set_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }
}

/// Work with no declarative form, kept as structured data so it can be
/// regenerated and replayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawOperation {
    /// Create a trigger.
    CreateTrigger(TriggerSchema),

    /// Drop a trigger.
    DeleteTrigger {
        /// Table the trigger belongs to.
        table: String,
        /// Trigger name.
        name: String,
    },

    /// Set a sequence's current value.
    RestartSequence {
        /// Sequence name.
        name: String,
        /// New current value.
        value: i64,
    },

    /// Run raw SQL.
    Sql {
        /// Forward SQL statement.
        forward: String,
        /// Statement that reverses `forward`, if known.
        #[serde(default)]
        backward: Option<String>,
    },
}

/// A single migration operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Create a new table.
    CreateTable {
        /// Table name.
        name: String,
        /// Column definitions.
        columns: Vec<ColumnSchema>,
        /// Primary key column(s).
        #[serde(default)]
        primary_key: Vec<String>,
    },

    /// Change table-level metadata.
    AlterTable {
        /// Table name.
        name: String,
        /// New table description.
        #[serde(default)]
        description: Option<String>,
    },

    /// Add a column to a table.
    CreateColumn {
        /// Table name.
        table: String,
        /// Column definition.
        column: ColumnSchema,
    },

    /// Alter a column's properties.
    AlterColumn {
        /// Table name.
        table: String,
        /// Column name.
        column_name: String,
        /// Changes to apply.
        changes: ColumnChanges,
    },

    /// Rename a column.
    RenameColumn {
        /// Table name.
        table: String,
        /// Old column name.
        old_name: String,
        /// New column name.
        new_name: String,
    },

    /// Drop one or more columns from a table.
    DeleteColumn {
        /// Table name.
        table: String,
        /// Column names.
        column_names: Vec<String>,
    },

    /// Rename a table.
    RenameTable {
        /// Old table name.
        old_name: String,
        /// New table name.
        new_name: String,
    },

    /// Drop a table.
    DeleteTable {
        /// Table name.
        name: String,
    },

    /// Create an index.
    CreateIndex {
        /// Table name.
        table: String,
        /// Index definition.
        index: IndexSchema,
    },

    /// Drop an index.
    DeleteIndex {
        /// Table name.
        table: String,
        /// Index name.
        name: String,
    },

    /// Create a schema.
    CreateSchema {
        /// Schema name.
        name: String,
    },

    /// Move a table into another schema.
    AlterSchema {
        /// Table name.
        table: String,
        /// Destination schema.
        destination: String,
    },

    /// Drop a schema.
    DeleteSchema {
        /// Schema name.
        name: String,
    },

    /// Add a unique constraint.
    CreateConstraint {
        /// Table name.
        table: String,
        /// Constraint definition.
        constraint: UniqueConstraint,
    },

    /// Drop a unique constraint.
    DeleteConstraint {
        /// Table name.
        table: String,
        /// Constraint name.
        name: String,
    },

    /// Add a foreign key constraint.
    CreateForeignKey {
        /// Table name.
        table: String,
        /// Foreign key definition.
        foreign_key: ForeignKeySchema,
    },

    /// Drop a foreign key constraint.
    DeleteForeignKey {
        /// Table name.
        table: String,
        /// Constraint name.
        name: String,
    },

    /// Create a sequence.
    CreateSequence {
        /// Sequence name.
        name: String,
        /// Initial current value.
        #[serde(default)]
        start_with: i64,
        /// Increment.
        #[serde(default = "default_increment")]
        increment: i64,
    },

    /// Drop a sequence.
    DeleteSequence {
        /// Sequence name.
        name: String,
    },

    /// Set a column default.
    AlterDefaultConstraint {
        /// Table name.
        table: String,
        /// Column name.
        column_name: String,
        /// New default.
        default: DefaultValue,
    },

    /// Remove a column default.
    DeleteDefaultConstraint {
        /// Table name.
        table: String,
        /// Column name.
        column_name: String,
    },

    /// Insert rows.
    InsertData {
        /// Table name.
        table: String,
        /// Rows to insert.
        rows: Vec<Row>,
    },

    /// Update rows.
    UpdateData {
        /// Table name.
        table: String,
        /// Column values to set.
        set: Row,
        /// Rows to update.
        selection: RowSelection,
    },

    /// Delete rows.
    DeleteData {
        /// Table name.
        table: String,
        /// Rows to delete.
        selection: RowSelection,
    },

    /// Structured raw work (triggers, sequence restarts, raw SQL).
    Raw(RawOperation),
}

fn default_increment() -> i64 {
    1
}

impl Operation {
    /// Creates a CreateTable operation.
    #[must_use]
    pub fn create_table(
        name: impl Into<String>,
        columns: Vec<ColumnSchema>,
        primary_key: Vec<String>,
    ) -> Self {
        Self::CreateTable {
            name: name.into(),
            columns,
            primary_key,
        }
    }

    /// Creates a DeleteTable operation.
    #[must_use]
    pub fn delete_table(name: impl Into<String>) -> Self {
        Self::DeleteTable { name: name.into() }
    }

    /// Creates a RenameTable operation.
    #[must_use]
    pub fn rename_table(old_name: impl Into<String>, new_name: impl Into<String>) -> Self {
        Self::RenameTable {
            old_name: old_name.into(),
            new_name: new_name.into(),
        }
    }

    /// Creates a CreateColumn operation.
    #[must_use]
    pub fn create_column(table: impl Into<String>, column: ColumnSchema) -> Self {
        Self::CreateColumn {
            table: table.into(),
            column,
        }
    }

    /// Creates a DeleteColumn operation for a single column.
    #[must_use]
    pub fn delete_column(table: impl Into<String>, column_name: impl Into<String>) -> Self {
        Self::DeleteColumn {
            table: table.into(),
            column_names: vec![column_name.into()],
        }
    }

    /// Creates a RenameColumn operation.
    #[must_use]
    pub fn rename_column(
        table: impl Into<String>,
        old_name: impl Into<String>,
        new_name: impl Into<String>,
    ) -> Self {
        Self::RenameColumn {
            table: table.into(),
            old_name: old_name.into(),
            new_name: new_name.into(),
        }
    }

    /// Creates an AlterColumn operation.
    #[must_use]
    pub fn alter_column(
        table: impl Into<String>,
        column_name: impl Into<String>,
        changes: ColumnChanges,
    ) -> Self {
        Self::AlterColumn {
            table: table.into(),
            column_name: column_name.into(),
            changes,
        }
    }

    /// Creates a CreateIndex operation.
    #[must_use]
    pub fn create_index(table: impl Into<String>, index: IndexSchema) -> Self {
        Self::CreateIndex {
            table: table.into(),
            index,
        }
    }

    /// Creates a DeleteIndex operation.
    #[must_use]
    pub fn delete_index(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self::DeleteIndex {
            table: table.into(),
            name: name.into(),
        }
    }

    /// Creates a CreateForeignKey operation.
    #[must_use]
    pub fn create_foreign_key(table: impl Into<String>, foreign_key: ForeignKeySchema) -> Self {
        Self::CreateForeignKey {
            table: table.into(),
            foreign_key,
        }
    }

    /// Creates a DeleteForeignKey operation.
    #[must_use]
    pub fn delete_foreign_key(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self::DeleteForeignKey {
            table: table.into(),
            name: name.into(),
        }
    }

    /// Creates a CreateSequence operation.
    #[must_use]
    pub fn create_sequence(name: impl Into<String>, start_with: i64) -> Self {
        Self::CreateSequence {
            name: name.into(),
            start_with,
            increment: 1,
        }
    }

    /// Creates a DeleteSequence operation.
    #[must_use]
    pub fn delete_sequence(name: impl Into<String>) -> Self {
        Self::DeleteSequence { name: name.into() }
    }

    /// Creates an InsertData operation.
    #[must_use]
    pub fn insert_data(table: impl Into<String>, rows: Vec<Row>) -> Self {
        Self::InsertData {
            table: table.into(),
            rows,
        }
    }

    /// Creates an UpdateData operation.
    #[must_use]
    pub fn update_data(table: impl Into<String>, set: Row, selection: RowSelection) -> Self {
        Self::UpdateData {
            table: table.into(),
            set,
            selection,
        }
    }

    /// Creates a DeleteData operation.
    #[must_use]
    pub fn delete_data(table: impl Into<String>, selection: RowSelection) -> Self {
        Self::DeleteData {
            table: table.into(),
            selection,
        }
    }

    /// Creates a trigger operation.
    #[must_use]
    pub fn create_trigger(trigger: TriggerSchema) -> Self {
        Self::Raw(RawOperation::CreateTrigger(trigger))
    }

    /// Creates a raw SQL operation.
    #[must_use]
    pub fn run_sql(forward: impl Into<String>, backward: Option<String>) -> Self {
        Self::Raw(RawOperation::Sql {
            forward: forward.into(),
            backward,
        })
    }

    /// Returns the context-free reverse of this operation.
    ///
    /// Returns `None` when reversing needs the state of the database before
    /// the operation ran.
    #[must_use]
    pub fn reverse(&self) -> Option<Self> {
        match self {
            Self::CreateTable { name, .. } => Some(Self::delete_table(name.clone())),
            Self::CreateColumn { table, column } => {
                Some(Self::delete_column(table.clone(), column.name.clone()))
            }
            Self::RenameTable { old_name, new_name } => {
                Some(Self::rename_table(new_name.clone(), old_name.clone()))
            }
            Self::RenameColumn {
                table,
                old_name,
                new_name,
            } => Some(Self::rename_column(
                table.clone(),
                new_name.clone(),
                old_name.clone(),
            )),
            Self::CreateIndex { table, index } => {
                Some(Self::delete_index(table.clone(), index.name.clone()))
            }
            Self::CreateConstraint { table, constraint } => Some(Self::DeleteConstraint {
                table: table.clone(),
                name: constraint.name.clone(),
            }),
            Self::CreateForeignKey { table, foreign_key } => Some(Self::delete_foreign_key(
                table.clone(),
                foreign_key.name.clone(),
            )),
            Self::CreateSequence { name, .. } => Some(Self::delete_sequence(name.clone())),
            Self::InsertData { table, rows } => Some(Self::delete_data(
                table.clone(),
                RowSelection::Matching(rows.clone()),
            )),
            Self::Raw(RawOperation::CreateTrigger(trigger)) => {
                Some(Self::Raw(RawOperation::DeleteTrigger {
                    table: trigger.table.clone(),
                    name: trigger.name.clone(),
                }))
            }
            Self::Raw(RawOperation::Sql { forward, backward }) => {
                backward.as_ref().map(|bwd| {
                    Self::Raw(RawOperation::Sql {
                        forward: bwd.clone(),
                        backward: Some(forward.clone()),
                    })
                })
            }
            _ => None,
        }
    }

    /// Returns true for statements that change structure rather than rows.
    #[must_use]
    pub fn is_ddl(&self) -> bool {
        !matches!(
            self,
            Self::InsertData { .. } | Self::UpdateData { .. } | Self::DeleteData { .. }
        )
    }

    /// Returns a human-readable description of this operation.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::CreateTable { name, .. } => format!("Create table '{name}'"),
            Self::AlterTable { name, .. } => format!("Alter table '{name}'"),
            Self::CreateColumn { table, column } => {
                format!("Create column '{}' on table '{table}'", column.name)
            }
            Self::AlterColumn {
                table, column_name, ..
            } => format!("Alter column '{column_name}' on table '{table}'"),
            Self::RenameColumn {
                table,
                old_name,
                new_name,
            } => format!("Rename column '{old_name}' to '{new_name}' on table '{table}'"),
            Self::DeleteColumn {
                table,
                column_names,
            } => format!(
                "Delete column(s) '{}' from table '{table}'",
                column_names.join("', '")
            ),
            Self::RenameTable { old_name, new_name } => {
                format!("Rename table '{old_name}' to '{new_name}'")
            }
            Self::DeleteTable { name } => format!("Delete table '{name}'"),
            Self::CreateIndex { table, index } => {
                format!("Create index '{}' on table '{table}'", index.name)
            }
            Self::DeleteIndex { table, name } => {
                format!("Delete index '{name}' from table '{table}'")
            }
            Self::CreateSchema { name } => format!("Create schema '{name}'"),
            Self::AlterSchema { table, destination } => {
                format!("Move table '{table}' to schema '{destination}'")
            }
            Self::DeleteSchema { name } => format!("Delete schema '{name}'"),
            Self::CreateConstraint { table, constraint } => {
                format!("Create constraint '{}' on table '{table}'", constraint.name)
            }
            Self::DeleteConstraint { table, name } => {
                format!("Delete constraint '{name}' from table '{table}'")
            }
            Self::CreateForeignKey { table, foreign_key } => {
                format!("Create foreign key '{}' on table '{table}'", foreign_key.name)
            }
            Self::DeleteForeignKey { table, name } => {
                format!("Delete foreign key '{name}' from table '{table}'")
            }
            Self::CreateSequence { name, .. } => format!("Create sequence '{name}'"),
            Self::DeleteSequence { name } => format!("Delete sequence '{name}'"),
            Self::AlterDefaultConstraint {
                table, column_name, ..
            } => format!("Alter default of column '{column_name}' on table '{table}'"),
            Self::DeleteDefaultConstraint { table, column_name } => {
                format!("Delete default of column '{column_name}' on table '{table}'")
            }
            Self::InsertData { table, rows } => {
                format!("Insert {} row(s) into table '{table}'", rows.len())
            }
            Self::UpdateData { table, .. } => format!("Update rows of table '{table}'"),
            Self::DeleteData { table, .. } => format!("Delete rows from table '{table}'"),
            Self::Raw(RawOperation::CreateTrigger(trigger)) => format!(
                "Create trigger '{}' on table '{}'",
                trigger.name, trigger.table
            ),
            Self::Raw(RawOperation::DeleteTrigger { table, name }) => {
                format!("Delete trigger '{name}' from table '{table}'")
            }
            Self::Raw(RawOperation::RestartSequence { name, value }) => {
                format!("Restart sequence '{name}' at {value}")
            }
            Self::Raw(RawOperation::Sql { .. }) => "Run custom SQL".to_string(),
        }
    }
}

/// Builder for foreign key schema.
pub struct ForeignKeyBuilder {
    schema: ForeignKeySchema,
}

impl ForeignKeyBuilder {
    /// Creates a new foreign key builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: ForeignKeySchema {
                name: name.into(),
                columns: Vec::new(),
                references_table: String::new(),
                references_columns: Vec::new(),
                on_delete: ForeignKeyAction::NoAction,
                on_update: ForeignKeyAction::NoAction,
            },
        }
    }

    /// Sets the local columns.
    #[must_use]
    pub fn columns(mut self, columns: Vec<String>) -> Self {
        self.schema.columns = columns;
        self
    }

    /// Sets the referenced table and columns.
    #[must_use]
    pub fn references(mut self, table: impl Into<String>, columns: Vec<String>) -> Self {
        self.schema.references_table = table.into();
        self.schema.references_columns = columns;
        self
    }

    /// Sets the ON DELETE action.
    #[must_use]
    pub fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.schema.on_delete = action;
        self
    }

    /// Builds the foreign key schema.
    #[must_use]
    pub fn build(self) -> ForeignKeySchema {
        self.schema
    }
}

/// Builder for index schema.
pub struct IndexBuilder {
    schema: IndexSchema,
}

impl IndexBuilder {
    /// Creates a new index builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: IndexSchema {
                name: name.into(),
                columns: Vec::new(),
                unique: false,
                condition: None,
            },
        }
    }

    /// Sets the columns to index.
    #[must_use]
    pub fn columns(mut self, columns: Vec<String>) -> Self {
        self.schema.columns = columns;
        self
    }

    /// Makes this a unique index.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.schema.unique = true;
        self
    }

    /// Builds the index schema.
    #[must_use]
    pub fn build(self) -> IndexSchema {
        self.schema
    }
}
