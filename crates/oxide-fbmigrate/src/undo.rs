//! Undo synthesis.
//!
//! Builds, for an operation that is about to run, the operations that would
//! reverse it. Context-free inverses come from [`Operation::reverse`]; the
//! rest are built from a pre-image read through the [`SchemaReader`] before
//! the destructive statement executes. Nothing here touches the database
//! beyond those reads.

use tracing::debug;

use crate::backend::SchemaReader;
use crate::data::{project, Row, RowSelection};
use crate::error::{MigrateError, Result};
use crate::operations::{ColumnChanges, Operation, RawOperation};
use crate::schema::{ColumnSchema, DefaultValue, TableSchema, UniqueConstraint};

/// An operation together with what it takes to reverse it.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedOperation {
    /// The operation as registered.
    pub operation: Operation,
    /// Whether `undo_operations` fully reverses the operation.
    pub can_undo: bool,
    /// Compensating operations, in the order they must run.
    pub undo_operations: Vec<Operation>,
}

impl TrackedOperation {
    /// An operation reversed by `undo_operations`.
    #[must_use]
    pub fn undoable(operation: Operation, undo_operations: Vec<Operation>) -> Self {
        Self {
            operation,
            can_undo: true,
            undo_operations,
        }
    }

    /// An operation that cannot be reversed.
    #[must_use]
    pub fn irreversible(operation: Operation) -> Self {
        Self {
            operation,
            can_undo: false,
            undo_operations: Vec::new(),
        }
    }
}

/// Synthesizes the compensating operations for `operation`.
///
/// Must be called before `operation` executes.
pub fn synthesize<R>(operation: Operation, reader: &mut R) -> Result<TrackedOperation>
where
    R: SchemaReader + ?Sized,
{
    if let Some(inverse) = operation.reverse() {
        return Ok(TrackedOperation::undoable(operation, vec![inverse]));
    }

    let undo = match &operation {
        Operation::AlterTable { .. }
        | Operation::CreateSchema { .. }
        | Operation::AlterSchema { .. }
        | Operation::DeleteSchema { .. } => Some(Vec::new()),

        Operation::DeleteTable { name } => {
            let table = reader.read_table(name)?;
            let rows = reader.read_rows(name)?;
            Some(restore_table(&table, rows))
        }

        Operation::DeleteColumn {
            table,
            column_names,
        } => restore_columns(reader, table, column_names)?,

        Operation::AlterColumn {
            table,
            column_name,
            changes,
        } => {
            let snapshot = reader.read_table(table)?;
            let column = find_column(&snapshot, column_name)?;
            Some(restore_column_facets(table, column, changes))
        }

        Operation::AlterDefaultConstraint {
            table, column_name, ..
        }
        | Operation::DeleteDefaultConstraint { table, column_name } => {
            let snapshot = reader.read_table(table)?;
            let column = find_column(&snapshot, column_name)?;
            Some(restore_default(table, column, &operation))
        }

        Operation::DeleteIndex { table, name } => {
            let snapshot = reader.read_table(table)?;
            snapshot
                .get_index(name)
                .map(|index| vec![Operation::create_index(table.clone(), index.clone())])
        }

        Operation::DeleteConstraint { table, name } => {
            let snapshot = reader.read_table(table)?;
            // Engines without named constraints report them as unique indexes.
            let constraint = snapshot.get_unique_constraint(name).cloned().or_else(|| {
                snapshot
                    .get_index(name)
                    .filter(|index| index.unique && index.condition.is_none())
                    .map(|index| UniqueConstraint {
                        name: index.name.clone(),
                        columns: index.columns.clone(),
                    })
            });
            constraint.map(|constraint| {
                vec![Operation::CreateConstraint {
                    table: table.clone(),
                    constraint,
                }]
            })
        }

        Operation::DeleteForeignKey { table, name } => {
            let snapshot = reader.read_table(table)?;
            snapshot
                .get_foreign_key(name)
                .map(|fk| vec![Operation::create_foreign_key(table.clone(), fk.clone())])
        }

        Operation::DeleteSequence { name } => {
            let sequence = reader.read_sequence(name)?;
            Some(vec![Operation::CreateSequence {
                name: sequence.name,
                start_with: sequence.current_value,
                increment: sequence.increment,
            }])
        }

        Operation::Raw(RawOperation::DeleteTrigger { table, name }) => {
            let snapshot = reader.read_table(table)?;
            snapshot
                .get_trigger(name)
                .map(|trigger| vec![Operation::create_trigger(trigger.clone())])
        }

        Operation::UpdateData {
            table,
            set,
            selection,
        } => restore_updated_rows(reader, table, set, selection)?,

        Operation::DeleteData { table, selection } => {
            restore_deleted_rows(reader, table, selection)?
        }

        _ => None,
    };

    let tracked = match undo {
        Some(undo) => TrackedOperation::undoable(operation, undo),
        None => TrackedOperation::irreversible(operation),
    };
    debug!(
        operation = %tracked.operation.description(),
        can_undo = tracked.can_undo,
        steps = tracked.undo_operations.len(),
        "Synthesized undo"
    );
    Ok(tracked)
}

fn find_column<'a>(table: &'a TableSchema, column: &str) -> Result<&'a ColumnSchema> {
    table
        .get_column(column)
        .ok_or_else(|| MigrateError::ObjectNotFound {
            kind: "column",
            name: format!("{}.{}", table.name, column),
        })
}

/// Everything needed to bring a dropped table back, dependencies first.
fn restore_table(table: &TableSchema, rows: Vec<Row>) -> Vec<Operation> {
    let mut undo = vec![Operation::create_table(
        table.name.clone(),
        table.columns.clone(),
        table.primary_key.clone(),
    )];
    undo.extend(
        table
            .indexes
            .iter()
            .map(|index| Operation::create_index(table.name.clone(), index.clone())),
    );
    undo.extend(
        table
            .unique_constraints
            .iter()
            .map(|constraint| Operation::CreateConstraint {
                table: table.name.clone(),
                constraint: constraint.clone(),
            }),
    );
    undo.extend(
        table
            .foreign_keys
            .iter()
            .map(|fk| Operation::create_foreign_key(table.name.clone(), fk.clone())),
    );
    if !rows.is_empty() {
        undo.push(Operation::insert_data(table.name.clone(), rows));
    }
    undo.extend(
        table
            .triggers
            .iter()
            .map(|trigger| Operation::create_trigger(trigger.clone())),
    );
    undo
}

fn restore_columns<R>(
    reader: &mut R,
    table: &str,
    column_names: &[String],
) -> Result<Option<Vec<Operation>>>
where
    R: SchemaReader + ?Sized,
{
    let snapshot = reader.read_table(table)?;
    if !snapshot.has_primary_key() {
        return Ok(None);
    }

    let mut undo = Vec::with_capacity(column_names.len());
    let mut tighten = Vec::new();
    for name in column_names {
        let column = find_column(&snapshot, name)?;
        let mut restored = column.clone();
        // A NOT NULL column without a default cannot be added to a table with
        // rows; it comes back nullable until its values are in place.
        if !column.nullable
            && !column.primary_key
            && matches!(column.default, DefaultValue::None | DefaultValue::Null)
        {
            restored.nullable = true;
            tighten.push(Operation::alter_column(
                table,
                name.clone(),
                ColumnChanges::new().set_nullable(false),
            ));
        }
        undo.push(Operation::create_column(table, restored));
    }

    for row in reader.read_rows(table)? {
        undo.push(Operation::update_data(
            table,
            project(&row, column_names),
            RowSelection::Matching(vec![project(&row, &snapshot.primary_key)]),
        ));
    }
    undo.extend(tighten);
    Ok(Some(undo))
}

/// One compensating alteration per facet that actually changes.
fn restore_column_facets(
    table: &str,
    before: &ColumnSchema,
    changes: &ColumnChanges,
) -> Vec<Operation> {
    let mut undo = Vec::new();
    let mut push = |facet: ColumnChanges| {
        undo.push(Operation::alter_column(table, before.name.clone(), facet));
    };

    if changes
        .sql_type
        .as_ref()
        .is_some_and(|t| *t != before.sql_type)
    {
        push(ColumnChanges::new().set_type(before.sql_type.clone()));
    }
    if changes.nullable.is_some_and(|n| n != before.nullable) {
        push(ColumnChanges::new().set_nullable(before.nullable));
    }
    if changes
        .default
        .as_ref()
        .is_some_and(|d| *d != before.default)
    {
        push(ColumnChanges::new().set_default(before.default.clone()));
    }
    undo
}

fn restore_default(table: &str, before: &ColumnSchema, operation: &Operation) -> Vec<Operation> {
    let unchanged = match operation {
        Operation::AlterDefaultConstraint { default, .. } => *default == before.default,
        _ => before.default.is_none(),
    };
    if unchanged {
        return Vec::new();
    }

    if before.default.is_none() {
        vec![Operation::DeleteDefaultConstraint {
            table: table.to_string(),
            column_name: before.name.clone(),
        }]
    } else {
        vec![Operation::AlterDefaultConstraint {
            table: table.to_string(),
            column_name: before.name.clone(),
            default: before.default.clone(),
        }]
    }
}

fn restore_updated_rows<R>(
    reader: &mut R,
    table: &str,
    set: &Row,
    selection: &RowSelection,
) -> Result<Option<Vec<Operation>>>
where
    R: SchemaReader + ?Sized,
{
    let snapshot = reader.read_table(table)?;
    if !snapshot.has_primary_key() {
        return Ok(None);
    }

    let set_columns: Vec<String> = set.keys().cloned().collect();
    let undo = reader
        .read_rows(table)?
        .into_iter()
        .filter(|row| selection.selects(row))
        .map(|row| {
            // The update may rewrite key columns; the restore must find the row by its new key.
            let key: Row = snapshot
                .primary_key
                .iter()
                .map(|column| {
                    let value = set
                        .get(column)
                        .or_else(|| row.get(column))
                        .cloned()
                        .unwrap_or(crate::data::DataValue::Null);
                    (column.clone(), value)
                })
                .collect();
            Operation::update_data(
                table,
                project(&row, &set_columns),
                RowSelection::Matching(vec![key]),
            )
        })
        .collect();
    Ok(Some(undo))
}

fn restore_deleted_rows<R>(
    reader: &mut R,
    table: &str,
    selection: &RowSelection,
) -> Result<Option<Vec<Operation>>>
where
    R: SchemaReader + ?Sized,
{
    let snapshot = reader.read_table(table)?;
    if !snapshot.has_primary_key() {
        return Ok(None);
    }

    let undo = reader
        .read_rows(table)?
        .into_iter()
        .filter(|row| selection.selects(row))
        .map(|row| Operation::insert_data(table, vec![row]))
        .collect();
    Ok(Some(undo))
}
