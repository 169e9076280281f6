//! Schema snapshot types.
//!
//! A [`TableSchema`] is what the schema reader returns for a live table: the
//! pre-image the undo synthesizer captures before a destructive statement
//! runs. The same column/index/constraint types are the payloads of the
//! create operations, so a snapshot can be turned back into operations
//! without conversion.

use serde::{Deserialize, Serialize};

/// SQL data types understood by the dialects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    /// Integer (32-bit).
    Integer,
    /// Big integer (64-bit).
    BigInt,
    /// Small integer (16-bit).
    SmallInt,
    /// Unbounded text (BLOB SUB_TYPE TEXT on Firebird).
    Text,
    /// Variable-length character string.
    Varchar(usize),
    /// Fixed-length character string.
    Char(usize),
    /// Boolean.
    Boolean,
    /// Date only.
    Date,
    /// Time only.
    Time,
    /// Timestamp.
    Timestamp,
    /// Floating point (single precision).
    Real,
    /// Floating point (double precision).
    Double,
    /// Decimal with precision and scale.
    Decimal(u8, u8),
    /// Numeric with precision and scale.
    Numeric(u8, u8),
    /// Binary large object.
    Blob,
}

/// Default value for a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum DefaultValue {
    /// No default value.
    #[default]
    None,
    /// NULL default.
    Null,
    /// Boolean default.
    Bool(bool),
    /// Integer default.
    Integer(i64),
    /// Float default.
    Float(f64),
    /// String default.
    String(String),
    /// SQL expression (e.g., "CURRENT_TIMESTAMP").
    Expression(String),
}

impl DefaultValue {
    /// Returns the SQL representation of this default value.
    #[must_use]
    pub fn to_sql(&self) -> Option<String> {
        match self {
            Self::None => None,
            Self::Null => Some("NULL".to_string()),
            Self::Bool(b) => Some(if *b { "TRUE" } else { "FALSE" }.to_string()),
            Self::Integer(i) => Some(i.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::String(s) => Some(format!("'{}'", s.replace('\'', "''"))),
            Self::Expression(expr) => Some(expr.clone()),
        }
    }

    /// Returns true if there is no default.
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// Foreign key action (ON DELETE, ON UPDATE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ForeignKeyAction {
    /// No action (error if referenced row is deleted/updated).
    #[default]
    NoAction,
    /// Cascade the delete/update to referencing rows.
    Cascade,
    /// Set the foreign key column to NULL.
    SetNull,
    /// Set the foreign key column to its default value.
    SetDefault,
}

impl ForeignKeyAction {
    /// Returns the SQL representation of this action.
    #[must_use]
    pub fn to_sql(&self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }

    /// Parses an action name as reported by catalog tables.
    #[must_use]
    pub fn from_catalog(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "CASCADE" => Self::Cascade,
            "SET NULL" => Self::SetNull,
            "SET DEFAULT" => Self::SetDefault,
            _ => Self::NoAction,
        }
    }
}

/// Schema definition for a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// Column name.
    pub name: String,
    /// SQL data type.
    pub sql_type: SqlType,
    /// Whether the column allows NULL values.
    pub nullable: bool,
    /// Default value.
    #[serde(default)]
    pub default: DefaultValue,
    /// Whether this column alone forms the primary key.
    #[serde(default)]
    pub primary_key: bool,
    /// Whether this column is an identity column.
    #[serde(default)]
    pub auto_increment: bool,
    /// Whether this column has a UNIQUE constraint.
    #[serde(default)]
    pub unique: bool,
}

impl ColumnSchema {
    /// Creates a new nullable column schema.
    #[must_use]
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            nullable: true,
            default: DefaultValue::None,
            primary_key: false,
            auto_increment: false,
            unique: false,
        }
    }

    /// Sets the column as NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default(mut self, value: DefaultValue) -> Self {
        self.default = value;
        self
    }

    /// Sets the column as the primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Marks the column as an identity column.
    #[must_use]
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Sets the column as unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Schema definition for a foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKeySchema {
    /// Constraint name.
    pub name: String,
    /// Column(s) in the referencing table.
    pub columns: Vec<String>,
    /// Referenced table name.
    pub references_table: String,
    /// Referenced column(s).
    pub references_columns: Vec<String>,
    /// Action on delete.
    #[serde(default)]
    pub on_delete: ForeignKeyAction,
    /// Action on update.
    #[serde(default)]
    pub on_update: ForeignKeyAction,
}

/// Schema definition for an index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexSchema {
    /// Index name.
    pub name: String,
    /// Columns included in the index.
    pub columns: Vec<String>,
    /// Whether this is a unique index.
    #[serde(default)]
    pub unique: bool,
    /// Partial index condition (WHERE clause).
    #[serde(default)]
    pub condition: Option<String>,
}

/// Schema definition for a named unique constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UniqueConstraint {
    /// Constraint name.
    pub name: String,
    /// Columns that form the unique constraint.
    pub columns: Vec<String>,
}

/// When a trigger fires relative to the row change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TriggerTiming {
    /// Before the row change.
    #[default]
    Before,
    /// After the row change.
    After,
}

impl TriggerTiming {
    /// Returns the SQL keyword.
    #[must_use]
    pub fn to_sql(&self) -> &'static str {
        match self {
            Self::Before => "BEFORE",
            Self::After => "AFTER",
        }
    }
}

/// Row event a trigger reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TriggerEvent {
    /// INSERT.
    #[default]
    Insert,
    /// UPDATE.
    Update,
    /// DELETE.
    Delete,
}

impl TriggerEvent {
    /// Returns the SQL keyword.
    #[must_use]
    pub fn to_sql(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

/// Schema definition for a table trigger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TriggerSchema {
    /// Trigger name.
    pub name: String,
    /// Table the trigger belongs to.
    pub table: String,
    /// BEFORE or AFTER.
    #[serde(default)]
    pub timing: TriggerTiming,
    /// Row event.
    #[serde(default)]
    pub event: TriggerEvent,
    /// Columns of an `UPDATE OF` trigger; empty for any column.
    #[serde(default)]
    pub columns: Vec<String>,
    /// `WHEN` condition.
    #[serde(default)]
    pub condition: Option<String>,
    /// Firing position among triggers of the same kind.
    #[serde(default)]
    pub position: i32,
    /// Whether the trigger is active.
    #[serde(default = "default_active")]
    pub active: bool,
    /// Statements between BEGIN and END.
    pub body: String,
}

fn default_active() -> bool {
    true
}

impl TriggerSchema {
    /// Creates an active trigger at position 0.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        table: impl Into<String>,
        timing: TriggerTiming,
        event: TriggerEvent,
        body: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            timing,
            event,
            columns: Vec::new(),
            condition: None,
            position: 0,
            active: true,
            body: body.into(),
        }
    }

    /// Restricts an update trigger to changes of `columns`.
    #[must_use]
    pub fn update_of(mut self, columns: Vec<String>) -> Self {
        self.columns = columns;
        self
    }

    /// Fires only when `condition` holds for the row.
    #[must_use]
    pub fn when(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }
}

/// Point-in-time definition of a sequence (generator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceSchema {
    /// Sequence name.
    pub name: String,
    /// Current value.
    pub current_value: i64,
    /// Increment applied by NEXT VALUE FOR.
    pub increment: i64,
}

/// Complete definition of a live table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Column definitions, in ordinal order.
    pub columns: Vec<ColumnSchema>,
    /// Primary key column(s).
    pub primary_key: Vec<String>,
    /// Index definitions (not including constraint-backing indexes).
    pub indexes: Vec<IndexSchema>,
    /// Named unique constraints.
    pub unique_constraints: Vec<UniqueConstraint>,
    /// Foreign key definitions.
    pub foreign_keys: Vec<ForeignKeySchema>,
    /// Triggers defined on the table.
    pub triggers: Vec<TriggerSchema>,
}

impl TableSchema {
    /// Creates an empty table schema.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            indexes: Vec::new(),
            unique_constraints: Vec::new(),
            foreign_keys: Vec::new(),
            triggers: Vec::new(),
        }
    }

    /// Adds a column to the table.
    #[must_use]
    pub fn column(mut self, column: ColumnSchema) -> Self {
        if column.primary_key && !self.primary_key.contains(&column.name) {
            self.primary_key.push(column.name.clone());
        }
        self.columns.push(column);
        self
    }

    /// Adds an index.
    #[must_use]
    pub fn index(mut self, index: IndexSchema) -> Self {
        self.indexes.push(index);
        self
    }

    /// Adds a foreign key.
    #[must_use]
    pub fn foreign_key(mut self, fk: ForeignKeySchema) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    /// Adds a trigger.
    #[must_use]
    pub fn trigger(mut self, trigger: TriggerSchema) -> Self {
        self.triggers.push(trigger);
        self
    }

    /// Gets a column by name.
    #[must_use]
    pub fn get_column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Gets an index by name.
    #[must_use]
    pub fn get_index(&self, name: &str) -> Option<&IndexSchema> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// Gets a foreign key by constraint name.
    #[must_use]
    pub fn get_foreign_key(&self, name: &str) -> Option<&ForeignKeySchema> {
        self.foreign_keys.iter().find(|fk| fk.name == name)
    }

    /// Gets a unique constraint by name.
    #[must_use]
    pub fn get_unique_constraint(&self, name: &str) -> Option<&UniqueConstraint> {
        self.unique_constraints.iter().find(|c| c.name == name)
    }

    /// Gets a trigger by name.
    #[must_use]
    pub fn get_trigger(&self, name: &str) -> Option<&TriggerSchema> {
        self.triggers.iter().find(|t| t.name == name)
    }

    /// Returns true if the table has a primary key.
    #[must_use]
    pub fn has_primary_key(&self) -> bool {
        !self.primary_key.is_empty()
    }
}
