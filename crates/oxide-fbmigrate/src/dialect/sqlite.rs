//! SQLite dialect for migrations.
//!
//! SQLite has limited ALTER TABLE support: column changes, defaults, foreign
//! keys and sequences cannot be altered after table creation. Those
//! operations generate a `--` comment describing the limitation and are
//! skipped at execution time.

use crate::operations::{Operation, RawOperation};
use crate::schema::{ColumnSchema, IndexSchema, SqlType, TriggerSchema};

use super::MigrationDialect;

/// SQLite migration dialect.
#[derive(Debug, Clone, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn create_index_sql(&self, table: &str, index: &IndexSchema) -> String {
        let mut sql = String::from("CREATE ");
        if index.unique {
            sql.push_str("UNIQUE ");
        }
        sql.push_str("INDEX ");
        sql.push_str(&self.quote_identifier(&index.name));
        sql.push_str(" ON ");
        sql.push_str(&self.quote_identifier(table));
        sql.push_str(" (");

        let quoted: Vec<String> = index
            .columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect();
        sql.push_str(&quoted.join(", "));
        sql.push(')');

        if let Some(cond) = &index.condition {
            sql.push_str(" WHERE ");
            sql.push_str(cond);
        }

        sql
    }

    fn drop_index_sql(&self, name: &str) -> String {
        format!("DROP INDEX {}", self.quote_identifier(name))
    }

    fn create_trigger_sql(&self, trigger: &TriggerSchema) -> String {
        let mut sql = format!(
            "CREATE TRIGGER {} {} {}",
            self.quote_identifier(&trigger.name),
            trigger.timing.to_sql(),
            trigger.event.to_sql()
        );
        if !trigger.columns.is_empty() {
            let quoted: Vec<String> = trigger
                .columns
                .iter()
                .map(|c| self.quote_identifier(c))
                .collect();
            sql.push_str(" OF ");
            sql.push_str(&quoted.join(", "));
        }
        sql.push_str(" ON ");
        sql.push_str(&self.quote_identifier(&trigger.table));
        sql.push_str(" FOR EACH ROW");
        if let Some(cond) = &trigger.condition {
            sql.push_str(" WHEN ");
            sql.push_str(cond);
        }
        sql.push_str("\nBEGIN\n");
        sql.push_str(trigger.body.trim());
        sql.push_str("\nEND");
        sql
    }

    fn unsupported(what: &str, target: &str) -> Vec<String> {
        vec![format!(
            "-- {what} not supported in SQLite. Table recreation required for: {target}"
        )]
    }
}

impl MigrationDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn generate_sql(&self, operation: &Operation) -> Vec<String> {
        match operation {
            Operation::CreateTable {
                name,
                columns,
                primary_key,
            } => vec![format!(
                "CREATE TABLE {} {}",
                self.quote_identifier(name),
                self.table_body(columns, primary_key)
            )],

            Operation::AlterTable { name, .. } => {
                vec![format!("-- Table comments not supported in SQLite: {name}")]
            }

            Operation::CreateColumn { table, column } => vec![format!(
                "ALTER TABLE {} ADD COLUMN {}",
                self.quote_identifier(table),
                self.column_definition(column)
            )],

            Operation::AlterColumn {
                table, column_name, ..
            } => Self::unsupported("ALTER COLUMN", &format!("{table}.{column_name}")),

            Operation::RenameColumn {
                table,
                old_name,
                new_name,
            } => vec![format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {}",
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
                        "ALTER TABLE {} DROP COLUMN {}",
                        self.quote_identifier(table),
                        self.quote_identifier(c)
                    )
                })
                .collect(),

            Operation::RenameTable { old_name, new_name } => vec![format!(
                "ALTER TABLE {} RENAME TO {}",
                self.quote_identifier(old_name),
                self.quote_identifier(new_name)
            )],

            Operation::DeleteTable { name } => {
                vec![format!("DROP TABLE {}", self.quote_identifier(name))]
            }

            Operation::CreateIndex { table, index } => vec![self.create_index_sql(table, index)],

            Operation::DeleteIndex { name, .. } => vec![self.drop_index_sql(name)],

            Operation::CreateSchema { .. }
            | Operation::AlterSchema { .. }
            | Operation::DeleteSchema { .. } => Vec::new(),

            Operation::CreateConstraint { table, constraint } => {
                // Unique constraints after creation are done via unique indexes.
                let index = IndexSchema {
                    name: constraint.name.clone(),
                    columns: constraint.columns.clone(),
                    unique: true,
                    condition: None,
                };
                vec![self.create_index_sql(table, &index)]
            }

            Operation::DeleteConstraint { name, .. } => vec![self.drop_index_sql(name)],

            Operation::CreateForeignKey { table, foreign_key } => Self::unsupported(
                "Adding foreign keys",
                &format!("{table}.{}", foreign_key.name),
            ),

            Operation::DeleteForeignKey { table, name } => {
                Self::unsupported("Dropping foreign keys", &format!("{table}.{name}"))
            }

            Operation::CreateSequence { name, .. } | Operation::DeleteSequence { name } => {
                vec![format!("-- Sequences not supported in SQLite: {name}")]
            }

            Operation::AlterDefaultConstraint {
                table, column_name, ..
            }
            | Operation::DeleteDefaultConstraint { table, column_name } => {
                Self::unsupported("Changing defaults", &format!("{table}.{column_name}"))
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
                vec![format!("DROP TRIGGER {}", self.quote_identifier(name))]
            }

            Operation::Raw(RawOperation::RestartSequence { name, .. }) => {
                vec![format!("-- Sequences not supported in SQLite: {name}")]
            }

            Operation::Raw(RawOperation::Sql { forward, .. }) => vec![forward.clone()],
        }
    }

    fn type_name(&self, sql_type: &SqlType) -> String {
        match sql_type {
            SqlType::Integer | SqlType::SmallInt | SqlType::BigInt => "INTEGER".to_string(),
            SqlType::Boolean => "BOOLEAN".to_string(),
            SqlType::Text => "TEXT".to_string(),
            SqlType::Varchar(len) => format!("VARCHAR({len})"),
            SqlType::Char(len) => format!("CHAR({len})"),
            SqlType::Date => "DATE".to_string(),
            SqlType::Time => "TIME".to_string(),
            SqlType::Timestamp => "TIMESTAMP".to_string(),
            SqlType::Real | SqlType::Double => "REAL".to_string(),
            SqlType::Decimal(_, _) | SqlType::Numeric(_, _) => "NUMERIC".to_string(),
            SqlType::Blob => "BLOB".to_string(),
        }
    }

    fn column_definition(&self, column: &ColumnSchema) -> String {
        let mut parts = vec![
            self.quote_identifier(&column.name),
            self.type_name(&column.sql_type),
        ];

        if let Some(default_sql) = column.default.to_sql() {
            parts.push(format!("DEFAULT {default_sql}"));
        }

        if !column.nullable && !column.primary_key {
            parts.push("NOT NULL".to_string());
        }

        if column.primary_key {
            parts.push("PRIMARY KEY".to_string());
            if column.auto_increment {
                parts.push("AUTOINCREMENT".to_string());
            }
        }

        if column.unique && !column.primary_key {
            parts.push("UNIQUE".to_string());
        }

        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::{ColumnChanges, IndexBuilder};
    use crate::schema::{DefaultValue, TriggerEvent, TriggerTiming};

    fn dialect() -> SqliteDialect {
        SqliteDialect::new()
    }

    #[test]
    fn test_create_table_simple() {
        let op = Operation::create_table(
            "users",
            vec![
                ColumnSchema::new("id", SqlType::BigInt)
                    .primary_key()
                    .auto_increment(),
                ColumnSchema::new("name", SqlType::Varchar(255)).not_null(),
            ],
            vec!["id".to_string()],
        );

        let sql = dialect().generate_sql(&op);
        assert_eq!(sql.len(), 1);
        assert_eq!(
            sql[0],
            "CREATE TABLE \"users\" (\n  \"id\" INTEGER PRIMARY KEY AUTOINCREMENT,\n  \"name\" VARCHAR(255) NOT NULL\n)"
        );
    }

    #[test]
    fn test_rename_table() {
        let sql = dialect().generate_sql(&Operation::rename_table("users", "accounts"));
        assert_eq!(sql[0], "ALTER TABLE \"users\" RENAME TO \"accounts\"");
    }

    #[test]
    fn test_add_column_with_default() {
        let op = Operation::create_column(
            "users",
            ColumnSchema::new("is_active", SqlType::Boolean)
                .not_null()
                .default(DefaultValue::Integer(1)),
        );

        let sql = dialect().generate_sql(&op);
        assert_eq!(
            sql[0],
            "ALTER TABLE \"users\" ADD COLUMN \"is_active\" BOOLEAN DEFAULT 1 NOT NULL"
        );
    }

    #[test]
    fn test_drop_columns() {
        let op = Operation::DeleteColumn {
            table: "users".into(),
            column_names: vec!["a".into(), "b".into()],
        };

        assert_eq!(
            dialect().generate_sql(&op),
            vec![
                "ALTER TABLE \"users\" DROP COLUMN \"a\"",
                "ALTER TABLE \"users\" DROP COLUMN \"b\"",
            ]
        );
    }

    #[test]
    fn test_alter_column_is_comment() {
        let op = Operation::alter_column(
            "users",
            "age",
            ColumnChanges::new().set_nullable(false),
        );
        let sql = dialect().generate_sql(&op);
        assert!(sql[0].starts_with("--"));
        assert!(sql[0].contains("users.age"));
    }

    #[test]
    fn test_partial_index() {
        let mut index = IndexBuilder::new("idx_active_users")
            .columns(vec!["email".to_string()])
            .build();
        index.condition = Some("is_active = 1".to_string());

        let sql = dialect().generate_sql(&Operation::create_index("users", index));
        assert_eq!(
            sql[0],
            "CREATE INDEX \"idx_active_users\" ON \"users\" (\"email\") WHERE is_active = 1"
        );
    }

    #[test]
    fn test_trigger() {
        let trigger = TriggerSchema::new(
            "trg_users",
            "users",
            TriggerTiming::After,
            TriggerEvent::Insert,
            "UPDATE counters SET n = n + 1;",
        );
        let sql = dialect().generate_sql(&Operation::create_trigger(trigger));
        assert_eq!(
            sql[0],
            "CREATE TRIGGER \"trg_users\" AFTER INSERT ON \"users\" FOR EACH ROW\nBEGIN\nUPDATE counters SET n = n + 1;\nEND"
        );
    }

    #[test]
    fn test_update_of_trigger_with_condition() {
        let trigger = TriggerSchema::new(
            "trg_price",
            "items",
            TriggerTiming::After,
            TriggerEvent::Update,
            "INSERT INTO price_log (id) VALUES (NEW.id);",
        )
        .update_of(vec!["price".to_string(), "currency".to_string()])
        .when("NEW.price > OLD.price");

        let sql = dialect().generate_sql(&Operation::create_trigger(trigger));
        assert_eq!(
            sql[0],
            "CREATE TRIGGER \"trg_price\" AFTER UPDATE OF \"price\", \"currency\" ON \"items\" FOR EACH ROW WHEN NEW.price > OLD.price\nBEGIN\nINSERT INTO price_log (id) VALUES (NEW.id);\nEND"
        );
    }

    #[test]
    fn test_run_sql() {
        let op = Operation::run_sql(
            "INSERT INTO config VALUES ('key', 'value')",
            Some("DELETE FROM config WHERE key = 'key'".to_string()),
        );

        let sql = dialect().generate_sql(&op);
        assert_eq!(sql[0], "INSERT INTO config VALUES ('key', 'value')");
    }

    #[test]
    fn test_type_names() {
        let d = dialect();
        assert_eq!(d.type_name(&SqlType::BigInt), "INTEGER");
        assert_eq!(d.type_name(&SqlType::Varchar(255)), "VARCHAR(255)");
        assert_eq!(d.type_name(&SqlType::Double), "REAL");
        assert_eq!(d.type_name(&SqlType::Blob), "BLOB");
    }
}
