//! Firebird dialect for migrations.
//!
//! Firebird limits identifiers to 31 characters and has no identity columns
//! before version 3 in the form migrations need, so identity columns are
//! emulated with a sequence and a BEFORE INSERT trigger. Firebird has no
//! schemas; schema operations generate nothing.

use sha2::{Digest, Sha256};

use crate::operations::{ColumnChanges, Operation, RawOperation};
use crate::options::ProcessorOptions;
use crate::schema::{
    ColumnSchema, DefaultValue, ForeignKeySchema, IndexSchema, SqlType, TriggerEvent,
    TriggerSchema, TriggerTiming,
};

use super::MigrationDialect;

/// Maximum identifier length.
pub const MAX_NAME_LENGTH: usize = 31;

/// Firebird migration dialect.
#[derive(Debug, Clone)]
pub struct FirebirdDialect {
    truncate_long_names: bool,
    pack_key_names: bool,
}

impl Default for FirebirdDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl FirebirdDialect {
    /// Creates a dialect that truncates long names.
    #[must_use]
    pub fn new() -> Self {
        Self {
            truncate_long_names: true,
            pack_key_names: false,
        }
    }

    /// Creates a dialect configured from the run options.
    #[must_use]
    pub fn with_options(options: &ProcessorOptions) -> Self {
        Self {
            truncate_long_names: options.truncate_long_names,
            pack_key_names: options.pack_key_names,
        }
    }

    /// Shortens a table or column name to the engine limit.
    #[must_use]
    pub fn object_name(&self, name: &str) -> String {
        if self.truncate_long_names && name.chars().count() > MAX_NAME_LENGTH {
            name.chars().take(MAX_NAME_LENGTH).collect()
        } else {
            name.to_string()
        }
    }

    /// Shortens an index, constraint, trigger or sequence name.
    ///
    /// With packing enabled the name keeps a prefix and gets a hash suffix,
    /// so two long names sharing a prefix stay distinct.
    #[must_use]
    pub fn key_name(&self, name: &str) -> String {
        if !self.pack_key_names || name.chars().count() <= MAX_NAME_LENGTH {
            return self.object_name(name);
        }
        let prefix: String = name.chars().take(MAX_NAME_LENGTH - 9).collect();
        format!("{prefix}_{}", name_hash(name))
    }

    fn quote_key(&self, name: &str) -> String {
        quote(&self.key_name(name))
    }

    fn sequence_name(&self, table: &str, column: &str) -> String {
        self.key_name(&format!("GEN_{table}_{column}"))
    }

    fn create_table_sql(
        &self,
        name: &str,
        columns: &[ColumnSchema],
        primary_key: &[String],
    ) -> String {
        format!(
            "CREATE TABLE {} {}",
            self.quote_identifier(name),
            self.table_body(columns, primary_key)
        )
    }

    fn alter_column_sql(&self, table: &str, column: &str, changes: &ColumnChanges) -> Vec<String> {
        let prefix = format!(
            "ALTER TABLE {} ALTER COLUMN {}",
            self.quote_identifier(table),
            self.quote_identifier(column)
        );
        let mut statements = Vec::new();
        if let Some(sql_type) = &changes.sql_type {
            statements.push(format!("{prefix} TYPE {}", self.type_name(sql_type)));
        }
        if let Some(nullable) = changes.nullable {
            let action = if nullable { "DROP" } else { "SET" };
            statements.push(format!("{prefix} {action} NOT NULL"));
        }
        if let Some(default) = &changes.default {
            statements.push(self.default_sql(table, column, default));
        }
        statements
    }

    fn default_sql(&self, table: &str, column: &str, default: &DefaultValue) -> String {
        let action = match default.to_sql() {
            Some(sql) => format!("SET DEFAULT {sql}"),
            None => "DROP DEFAULT".to_string(),
        };
        format!(
            "ALTER TABLE {} ALTER COLUMN {} {action}",
            self.quote_identifier(table),
            self.quote_identifier(column)
        )
    }

    fn create_index_sql(&self, table: &str, index: &IndexSchema) -> String {
        let mut sql = String::from("CREATE ");
        if index.unique {
            sql.push_str("UNIQUE ");
        }
        sql.push_str("INDEX ");
        sql.push_str(&self.quote_key(&index.name));
        sql.push_str(" ON ");
        sql.push_str(&self.quote_identifier(table));
        sql.push_str(" (");
        sql.push_str(&self.column_list(&index.columns));
        sql.push(')');
        if let Some(condition) = &index.condition {
            sql.push_str(" WHERE ");
            sql.push_str(condition);
        }
        sql
    }

    fn create_foreign_key_sql(&self, table: &str, fk: &ForeignKeySchema) -> String {
        format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
            self.quote_identifier(table),
            self.quote_key(&fk.name),
            self.column_list(&fk.columns),
            self.quote_identifier(&fk.references_table),
            self.column_list(&fk.references_columns),
            fk.on_delete.to_sql(),
            fk.on_update.to_sql()
        )
    }

    fn drop_constraint_sql(&self, table: &str, name: &str) -> String {
        format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            self.quote_identifier(table),
            self.quote_key(name)
        )
    }

    fn create_trigger_sql(&self, trigger: &TriggerSchema) -> String {
        // Firebird has no UPDATE OF or WHEN clause; both become a guard in the body.
        let mut guards = Vec::new();
        if !trigger.columns.is_empty() {
            let changed: Vec<String> = trigger
                .columns
                .iter()
                .map(|c| {
                    let column = self.quote_identifier(c);
                    format!("NEW.{column} IS DISTINCT FROM OLD.{column}")
                })
                .collect();
            guards.push(format!("({})", changed.join(" OR ")));
        }
        if let Some(cond) = &trigger.condition {
            guards.push(format!("({cond})"));
        }
        let body = if guards.is_empty() {
            trigger.body.trim().to_string()
        } else {
            format!(
                "IF ({}) THEN\nBEGIN\n{}\nEND",
                guards.join(" AND "),
                trigger.body.trim()
            )
        };

        format!(
            "CREATE TRIGGER {} FOR {} {} {} {} POSITION {} AS\nBEGIN\n{}\nEND",
            self.quote_key(&trigger.name),
            self.quote_identifier(&trigger.table),
            if trigger.active { "ACTIVE" } else { "INACTIVE" },
            trigger.timing.to_sql(),
            trigger.event.to_sql(),
            trigger.position,
            body
        )
    }

    fn column_list(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl MigrationDialect for FirebirdDialect {
    fn name(&self) -> &'static str {
        "firebird"
    }

    fn generate_sql(&self, operation: &Operation) -> Vec<String> {
        match operation {
            Operation::CreateTable {
                name,
                columns,
                primary_key,
            } => vec![self.create_table_sql(name, columns, primary_key)],

            Operation::AlterTable { name, description } => description
                .iter()
                .map(|d| {
                    format!(
                        "COMMENT ON TABLE {} IS '{}'",
                        self.quote_identifier(name),
                        d.replace('\'', "''")
                    )
                })
                .collect(),

            Operation::CreateColumn { table, column } => vec![format!(
                "ALTER TABLE {} ADD {}",
                self.quote_identifier(table),
                self.column_definition(column)
            )],

            Operation::AlterColumn {
                table,
                column_name,
                changes,
            } => self.alter_column_sql(table, column_name, changes),

            Operation::RenameColumn {
                table,
                old_name,
                new_name,
            } => vec![format!(
                "ALTER TABLE {} ALTER COLUMN {} TO {}",
                self.quote_identifier(table),
                self.quote_identifier(old_name),
                self.quote_identifier(new_name)
            )],

            Operation::DeleteColumn {
                table,
                column_names,
            } => column_names
                .iter()
                .map(|c| {
                    format!(
                        "ALTER TABLE {} DROP {}",
                        self.quote_identifier(table),
                        self.quote_identifier(c)
                    )
                })
                .collect(),

            Operation::RenameTable { old_name, new_name } => vec![format!(
                "-- RENAME TABLE is not supported by Firebird: {old_name} -> {new_name}"
            )],

            Operation::DeleteTable { name } => {
                vec![format!("DROP TABLE {}", self.quote_identifier(name))]
            }

            Operation::CreateIndex { table, index } => vec![self.create_index_sql(table, index)],

            Operation::DeleteIndex { name, .. } => {
                vec![format!("DROP INDEX {}", self.quote_key(name))]
            }

            Operation::CreateSchema { .. }
            | Operation::AlterSchema { .. }
            | Operation::DeleteSchema { .. } => Vec::new(),

            Operation::CreateConstraint { table, constraint } => vec![format!(
                "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({})",
                self.quote_identifier(table),
                self.quote_key(&constraint.name),
                self.column_list(&constraint.columns)
            )],

            Operation::DeleteConstraint { table, name }
            | Operation::DeleteForeignKey { table, name } => {
                vec![self.drop_constraint_sql(table, name)]
            }

            Operation::CreateForeignKey { table, foreign_key } => {
                vec![self.create_foreign_key_sql(table, foreign_key)]
            }

            Operation::CreateSequence {
                name,
                start_with,
                increment,
            } => vec![format!(
                "CREATE SEQUENCE {} START WITH {start_with} INCREMENT BY {increment}",
                self.quote_key(name)
            )],

            Operation::DeleteSequence { name } => {
                vec![format!("DROP SEQUENCE {}", self.quote_key(name))]
            }

            Operation::AlterDefaultConstraint {
                table,
                column_name,
                default,
            } => vec![self.default_sql(table, column_name, default)],

            Operation::DeleteDefaultConstraint { table, column_name } => {
                vec![self.default_sql(table, column_name, &DefaultValue::None)]
            }

            Operation::InsertData { table, rows } => self.insert_sql(table, rows),

            Operation::UpdateData {
                table,
                set,
                selection,
            } => vec![self.update_sql(table, set, selection)],

            Operation::DeleteData { table, selection } => {
                vec![self.delete_sql(table, selection)]
            }

            Operation::Raw(RawOperation::CreateTrigger(trigger)) => {
                vec![self.create_trigger_sql(trigger)]
            }

            Operation::Raw(RawOperation::DeleteTrigger { name, .. }) => {
                vec![format!("DROP TRIGGER {}", self.quote_key(name))]
            }

            Operation::Raw(RawOperation::RestartSequence { name, value }) => vec![format!(
                "ALTER SEQUENCE {} RESTART WITH {value}",
                self.quote_key(name)
            )],

            Operation::Raw(RawOperation::Sql { forward, .. }) => vec![forward.clone()],
        }
    }

    fn type_name(&self, sql_type: &SqlType) -> String {
        match sql_type {
            SqlType::Integer => "INTEGER".to_string(),
            SqlType::BigInt => "BIGINT".to_string(),
            SqlType::SmallInt => "SMALLINT".to_string(),
            SqlType::Text => "BLOB SUB_TYPE TEXT".to_string(),
            SqlType::Varchar(len) => format!("VARCHAR({len})"),
            SqlType::Char(len) => format!("CHAR({len})"),
            SqlType::Boolean => "BOOLEAN".to_string(),
            SqlType::Date => "DATE".to_string(),
            SqlType::Time => "TIME".to_string(),
            SqlType::Timestamp => "TIMESTAMP".to_string(),
            SqlType::Real => "FLOAT".to_string(),
            SqlType::Double => "DOUBLE PRECISION".to_string(),
            SqlType::Decimal(p, s) => format!("DECIMAL({p}, {s})"),
            SqlType::Numeric(p, s) => format!("NUMERIC({p}, {s})"),
            SqlType::Blob => "BLOB".to_string(),
        }
    }

    fn identity_operations(&self, table: &str, column: &ColumnSchema) -> Vec<Operation> {
        let sequence = self.sequence_name(table, &column.name);
        let body = format!(
            "  IF (NEW.{col} IS NULL) THEN NEW.{col} = NEXT VALUE FOR {seq};",
            col = self.quote_identifier(&column.name),
            seq = quote(&sequence)
        );
        vec![
            Operation::create_sequence(sequence, 0),
            Operation::create_trigger(TriggerSchema::new(
                format!("TRG_{table}_{}", column.name),
                table,
                TriggerTiming::Before,
                TriggerEvent::Insert,
                body,
            )),
        ]
    }

    fn quote_identifier(&self, name: &str) -> String {
        quote(&self.object_name(name))
    }
}

fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// First four bytes of the SHA-256 of `value`, as 8 uppercase hex digits.
fn name_hash(value: &str) -> String {
    Sha256::digest(value.as_bytes())
        .iter()
        .take(4)
        .map(|b| format!("{b:02X}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{row, RowSelection};
    use crate::operations::IndexBuilder;

    fn dialect() -> FirebirdDialect {
        FirebirdDialect::new()
    }

    #[test]
    fn test_create_table_with_composite_key() {
        let op = Operation::create_table(
            "ORDER_LINES",
            vec![
                ColumnSchema::new("ORDER_ID", SqlType::Integer).not_null(),
                ColumnSchema::new("LINE", SqlType::SmallInt).not_null(),
                ColumnSchema::new("NOTE", SqlType::Text),
            ],
            vec!["ORDER_ID".into(), "LINE".into()],
        );

        let sql = dialect().generate_sql(&op);
        assert_eq!(
            sql[0],
            "CREATE TABLE \"ORDER_LINES\" (\n  \"ORDER_ID\" INTEGER NOT NULL,\n  \"LINE\" SMALLINT NOT NULL,\n  \"NOTE\" BLOB SUB_TYPE TEXT,\n  PRIMARY KEY (\"ORDER_ID\", \"LINE\")\n)"
        );
    }

    #[test]
    fn test_create_table_inline_primary_key() {
        let op = Operation::create_table(
            "USERS",
            vec![
                ColumnSchema::new("ID", SqlType::BigInt).primary_key(),
                ColumnSchema::new("NAME", SqlType::Varchar(50))
                    .not_null()
                    .default(DefaultValue::String("x".into())),
            ],
            vec!["ID".into()],
        );

        let sql = dialect().generate_sql(&op);
        assert!(sql[0].contains("\"ID\" BIGINT PRIMARY KEY"));
        assert!(sql[0].contains("\"NAME\" VARCHAR(50) DEFAULT 'x' NOT NULL"));
        assert!(!sql[0].contains("PRIMARY KEY (\"ID\")"));
    }

    #[test]
    fn test_alter_column_one_statement_per_facet() {
        let op = Operation::alter_column(
            "USERS",
            "AGE",
            ColumnChanges::new()
                .set_type(SqlType::BigInt)
                .set_nullable(false)
                .set_default(DefaultValue::None),
        );

        assert_eq!(
            dialect().generate_sql(&op),
            vec![
                "ALTER TABLE \"USERS\" ALTER COLUMN \"AGE\" TYPE BIGINT",
                "ALTER TABLE \"USERS\" ALTER COLUMN \"AGE\" SET NOT NULL",
                "ALTER TABLE \"USERS\" ALTER COLUMN \"AGE\" DROP DEFAULT",
            ]
        );
    }

    #[test]
    fn test_rename_column() {
        let op = Operation::rename_column("USERS", "NAME", "FULL_NAME");
        assert_eq!(
            dialect().generate_sql(&op),
            vec!["ALTER TABLE \"USERS\" ALTER COLUMN \"NAME\" TO \"FULL_NAME\""]
        );
    }

    #[test]
    fn test_rename_table_is_a_comment() {
        let sql = dialect().generate_sql(&Operation::rename_table("A", "B"));
        assert!(sql[0].starts_with("--"));
    }

    #[test]
    fn test_schema_operations_generate_nothing() {
        let op = Operation::CreateSchema { name: "app".into() };
        assert!(dialect().generate_sql(&op).is_empty());
    }

    #[test]
    fn test_sequence_and_trigger() {
        assert_eq!(
            dialect().generate_sql(&Operation::create_sequence("GEN_USERS", 7)),
            vec!["CREATE SEQUENCE \"GEN_USERS\" START WITH 7 INCREMENT BY 1"]
        );

        let trigger = TriggerSchema::new(
            "TRG_AUDIT",
            "USERS",
            TriggerTiming::After,
            TriggerEvent::Delete,
            "INSERT INTO AUDIT (ID) VALUES (OLD.ID);",
        );
        assert_eq!(
            dialect().generate_sql(&Operation::create_trigger(trigger)),
            vec![
                "CREATE TRIGGER \"TRG_AUDIT\" FOR \"USERS\" ACTIVE AFTER DELETE POSITION 0 AS\nBEGIN\nINSERT INTO AUDIT (ID) VALUES (OLD.ID);\nEND"
            ]
        );
    }

    #[test]
    fn test_update_of_and_when_become_guard() {
        let trigger = TriggerSchema::new(
            "TRG_PRICE",
            "ITEMS",
            TriggerTiming::After,
            TriggerEvent::Update,
            "INSERT INTO PRICE_LOG (ID) VALUES (NEW.ID);",
        )
        .update_of(vec!["PRICE".to_string()])
        .when("NEW.PRICE > 0");

        assert_eq!(
            dialect().generate_sql(&Operation::create_trigger(trigger)),
            vec![
                "CREATE TRIGGER \"TRG_PRICE\" FOR \"ITEMS\" ACTIVE AFTER UPDATE POSITION 0 AS\nBEGIN\nIF ((NEW.\"PRICE\" IS DISTINCT FROM OLD.\"PRICE\") AND (NEW.PRICE > 0)) THEN\nBEGIN\nINSERT INTO PRICE_LOG (ID) VALUES (NEW.ID);\nEND\nEND"
            ]
        );
    }

    #[test]
    fn test_identity_operations() {
        let column = ColumnSchema::new("ID", SqlType::BigInt)
            .primary_key()
            .auto_increment();
        let ops = dialect().identity_operations("USERS", &column);

        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0], Operation::create_sequence("GEN_USERS_ID", 0));
        let sql = dialect().generate_sql(&ops[1]);
        assert!(sql[0].contains("BEFORE INSERT"));
        assert!(sql[0].contains("NEXT VALUE FOR \"GEN_USERS_ID\""));
    }

    #[test]
    fn test_long_names_truncated() {
        let long = "A_VERY_LONG_TABLE_NAME_THAT_EXCEEDS_THE_LIMIT";
        let d = dialect();
        assert_eq!(d.object_name(long).len(), MAX_NAME_LENGTH);
        assert_eq!(d.key_name(long).len(), MAX_NAME_LENGTH);
        assert_eq!(d.object_name("SHORT"), "SHORT");
    }

    #[test]
    fn test_packed_key_names_stay_distinct() {
        let options = ProcessorOptions {
            pack_key_names: true,
            ..ProcessorOptions::default()
        };
        let d = FirebirdDialect::with_options(&options);
        let a = d.key_name("IDX_CUSTOMER_ADDRESSES_POSTAL_CODE_COUNTRY");
        let b = d.key_name("IDX_CUSTOMER_ADDRESSES_POSTAL_CODE_REGION");

        assert_eq!(a.len(), MAX_NAME_LENGTH);
        assert_ne!(a, b);
        assert_eq!(a, d.key_name("IDX_CUSTOMER_ADDRESSES_POSTAL_CODE_COUNTRY"));
    }

    #[test]
    fn test_truncation_disabled() {
        let options = ProcessorOptions {
            truncate_long_names: false,
            ..ProcessorOptions::default()
        };
        let long = "A_VERY_LONG_TABLE_NAME_THAT_EXCEEDS_THE_LIMIT";
        assert_eq!(FirebirdDialect::with_options(&options).object_name(long), long);
    }

    #[test]
    fn test_index_and_data() {
        let index = IndexBuilder::new("IDX_USERS_NAME")
            .columns(vec!["NAME".into()])
            .unique()
            .build();
        assert_eq!(
            dialect().generate_sql(&Operation::create_index("USERS", index)),
            vec!["CREATE UNIQUE INDEX \"IDX_USERS_NAME\" ON \"USERS\" (\"NAME\")"]
        );

        let op = Operation::update_data(
            "USERS",
            row([("AGE", 3_i64)]),
            RowSelection::Matching(vec![row([("ID", 1_i64)])]),
        );
        assert_eq!(
            dialect().generate_sql(&op),
            vec!["UPDATE \"USERS\" SET \"AGE\" = 3 WHERE (\"ID\" = 1)"]
        );
    }
}
