//! SQLite backend.
//!
//! Wraps one `sqlx` connection and a current-thread runtime so the
//! processor can drive it synchronously. Catalog reads go through the
//! `pragma_*` table-valued functions and `sqlite_master`.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column, ConnectOptions, Row as _, TypeInfo, ValueRef};
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, warn};

use crate::data::{DataValue, Row};
use crate::error::{MigrateError, Result};
use crate::schema::{
    ColumnSchema, DefaultValue, ForeignKeyAction, ForeignKeySchema, IndexSchema, SequenceSchema,
    SqlType, TableSchema, TriggerEvent, TriggerSchema, TriggerTiming, UniqueConstraint,
};

use super::{Connection, SchemaReader};

/// A SQLite database reached through a single connection.
pub struct SqliteBackend {
    runtime: Runtime,
    conn: SqliteConnection,
    in_transaction: bool,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("in_transaction", &self.in_transaction)
            .finish_non_exhaustive()
    }
}

impl SqliteBackend {
    /// Opens a connection, creating the database file if it is missing.
    pub fn connect(url: &str) -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let conn = runtime.block_on(options.connect())?;
        debug!(url = %url, "Connected to SQLite");
        Ok(Self {
            runtime,
            conn,
            in_transaction: false,
        })
    }

    /// Returns true while a transaction opened by [`Connection::begin`] is open.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Lists user tables, sorted by name.
    pub fn table_names(&mut self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = self.runtime.block_on(
            sqlx::query_as(
                "SELECT name FROM sqlite_master WHERE type = 'table' \
                 AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )
            .fetch_all(&mut self.conn),
        )?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    fn object_sql(&mut self, kind: &str, name: &str) -> Result<Option<String>> {
        let row: Option<(Option<String>,)> = self.runtime.block_on(
            sqlx::query_as("SELECT sql FROM sqlite_master WHERE type = ? AND name = ?")
                .bind(kind)
                .bind(name)
                .fetch_optional(&mut self.conn),
        )?;
        Ok(row.and_then(|(sql,)| sql))
    }

    fn read_columns(
        &mut self,
        table: &str,
        create_sql: &str,
    ) -> Result<(Vec<ColumnSchema>, Vec<String>)> {
        let rows: Vec<(i64, String, String, i64, Option<String>, i64)> = self.runtime.block_on(
            sqlx::query_as(
                "SELECT cid, name, type, \"notnull\", dflt_value, pk \
                 FROM pragma_table_info(?) ORDER BY cid",
            )
            .bind(table)
            .fetch_all(&mut self.conn),
        )?;

        let mut keyed: Vec<(i64, String)> = rows
            .iter()
            .filter(|row| row.5 > 0)
            .map(|row| (row.5, row.1.clone()))
            .collect();
        keyed.sort();
        let primary_key: Vec<String> = keyed.into_iter().map(|(_, name)| name).collect();
        let autoincrement = create_sql.to_ascii_uppercase().contains("AUTOINCREMENT");

        let columns = rows
            .into_iter()
            .map(|(_, name, declared, not_null, default, _)| {
                let sole_key = primary_key.len() == 1 && primary_key[0] == name;
                ColumnSchema {
                    sql_type: parse_type(&declared),
                    nullable: not_null == 0 && !sole_key,
                    default: default.as_deref().map_or(DefaultValue::None, parse_default),
                    primary_key: sole_key,
                    auto_increment: sole_key && autoincrement,
                    unique: false,
                    name,
                }
            })
            .collect();
        Ok((columns, primary_key))
    }

    /// Reads explicit indexes and the indexes behind UNIQUE clauses.
    ///
    /// A single-column UNIQUE marks its column; a composite one becomes a
    /// unique constraint.
    fn read_indexes(
        &mut self,
        table: &str,
        columns: &mut [ColumnSchema],
    ) -> Result<(Vec<IndexSchema>, Vec<UniqueConstraint>)> {
        let list: Vec<(String, i64, String, i64)> = self.runtime.block_on(
            sqlx::query_as(
                "SELECT name, \"unique\", origin, partial FROM pragma_index_list(?) ORDER BY name",
            )
            .bind(table)
            .fetch_all(&mut self.conn),
        )?;

        let mut indexes = Vec::new();
        let mut unique_constraints = Vec::new();
        for (name, unique, origin, partial) in list {
            let indexed: Vec<(Option<String>,)> = self.runtime.block_on(
                sqlx::query_as("SELECT name FROM pragma_index_info(?) ORDER BY seqno")
                    .bind(&name)
                    .fetch_all(&mut self.conn),
            )?;
            let index_columns: Vec<String> = indexed.into_iter().filter_map(|(c,)| c).collect();

            match origin.as_str() {
                "c" => {
                    let condition = if partial == 1 {
                        self.object_sql("index", &name)?
                            .and_then(|sql| partial_condition(&sql))
                    } else {
                        None
                    };
                    indexes.push(IndexSchema {
                        name,
                        columns: index_columns,
                        unique: unique == 1,
                        condition,
                    });
                }
                "u" if index_columns.len() == 1 => {
                    if let Some(column) = columns.iter_mut().find(|c| c.name == index_columns[0]) {
                        column.unique = true;
                    }
                }
                "u" => {
                    // Autoindex names are reserved; the constraint gets a usable one.
                    unique_constraints.push(UniqueConstraint {
                        name: format!("uq_{table}_{}", index_columns.join("_")),
                        columns: index_columns,
                    });
                }
                _ => {}
            }
        }
        Ok((indexes, unique_constraints))
    }

    fn read_foreign_keys(&mut self, table: &str) -> Result<Vec<ForeignKeySchema>> {
        let rows: Vec<(i64, String, String, Option<String>, String, String)> =
            self.runtime.block_on(
                sqlx::query_as(
                    "SELECT id, \"table\", \"from\", \"to\", on_update, on_delete \
                     FROM pragma_foreign_key_list(?) ORDER BY id, seq",
                )
                .bind(table)
                .fetch_all(&mut self.conn),
            )?;

        let mut foreign_keys: Vec<(i64, ForeignKeySchema)> = Vec::new();
        for (id, referenced, from, to, on_update, on_delete) in rows {
            if foreign_keys.last().map(|(last, _)| *last) != Some(id) {
                foreign_keys.push((
                    id,
                    ForeignKeySchema {
                        name: format!("fk_{table}_{id}"),
                        columns: Vec::new(),
                        references_table: referenced,
                        references_columns: Vec::new(),
                        on_delete: ForeignKeyAction::from_catalog(&on_delete),
                        on_update: ForeignKeyAction::from_catalog(&on_update),
                    },
                ));
            }
            if let Some((_, fk)) = foreign_keys.last_mut() {
                fk.columns.push(from);
                fk.references_columns.extend(to);
            }
        }
        Ok(foreign_keys.into_iter().map(|(_, fk)| fk).collect())
    }

    fn read_triggers(&mut self, table: &str) -> Result<Vec<TriggerSchema>> {
        let rows: Vec<(String, Option<String>)> = self.runtime.block_on(
            sqlx::query_as(
                "SELECT name, sql FROM sqlite_master WHERE type = 'trigger' AND tbl_name = ? \
                 ORDER BY name",
            )
            .bind(table)
            .fetch_all(&mut self.conn),
        )?;

        let mut triggers = Vec::new();
        for (name, sql) in rows {
            match sql.as_deref().and_then(|sql| parse_trigger(&name, table, sql)) {
                Some(trigger) => triggers.push(trigger),
                None => warn!(trigger = %name, "Could not parse trigger definition"),
            }
        }
        Ok(triggers)
    }
}

impl Connection for SqliteBackend {
    fn execute(&mut self, sql: &str, timeout: Option<Duration>) -> Result<()> {
        let query = sqlx::query(sql).persistent(false).execute(&mut self.conn);
        let result = match timeout {
            Some(limit) => self
                .runtime
                .block_on(async { tokio::time::timeout(limit, query).await })
                .map_err(|_| MigrateError::execution(sql, format!("timed out after {limit:?}")))?,
            None => self.runtime.block_on(query),
        };
        result.map_err(|e| MigrateError::execution(sql, e))?;
        Ok(())
    }

    fn begin(&mut self) -> Result<()> {
        self.execute("BEGIN", None)?;
        self.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.execute("COMMIT", None)?;
        self.in_transaction = false;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Ok(());
        }
        self.in_transaction = false;
        self.execute("ROLLBACK", None)
    }
}

impl SchemaReader for SqliteBackend {
    fn read_table(&mut self, name: &str) -> Result<TableSchema> {
        let create_sql = self
            .object_sql("table", name)?
            .ok_or_else(|| MigrateError::ObjectNotFound {
                kind: "table",
                name: name.to_string(),
            })?;

        let (mut columns, primary_key) = self.read_columns(name, &create_sql)?;
        let (indexes, unique_constraints) = self.read_indexes(name, &mut columns)?;
        let foreign_keys = self.read_foreign_keys(name)?;
        let triggers = self.read_triggers(name)?;

        Ok(TableSchema {
            name: name.to_string(),
            columns,
            primary_key,
            indexes,
            unique_constraints,
            foreign_keys,
            triggers,
        })
    }

    fn read_sequence(&mut self, name: &str) -> Result<SequenceSchema> {
        Err(MigrateError::Unsupported(format!("SQLite has no sequences: {name}")))
    }

    fn read_rows(&mut self, table: &str) -> Result<Vec<Row>> {
        // The column list changes with DDL; a cached statement would go stale.
        let sql = format!("SELECT * FROM \"{}\"", table.replace('"', "\"\""));
        let rows: Vec<SqliteRow> = self.runtime.block_on(
            sqlx::query(&sql)
                .persistent(false)
                .fetch_all(&mut self.conn),
        )?;
        rows.iter().map(decode_row).collect()
    }
}

fn decode_row(row: &SqliteRow) -> Result<Row> {
    let mut decoded = Row::new();
    for (i, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(i)?;
        let value = if raw.is_null() {
            DataValue::Null
        } else {
            let storage = raw.type_info().name().to_string();
            match storage.as_str() {
                "INTEGER" | "BOOLEAN" => DataValue::Integer(row.try_get(i)?),
                "REAL" => DataValue::Float(row.try_get(i)?),
                "BLOB" => DataValue::Blob(row.try_get(i)?),
                _ => DataValue::Text(row.try_get(i)?),
            }
        };
        decoded.insert(column.name().to_string(), value);
    }
    Ok(decoded)
}

/// Maps a declared column type back to a [`SqlType`].
fn parse_type(declared: &str) -> SqlType {
    let upper = declared.trim().to_ascii_uppercase();
    let (base, args) = match upper.find('(') {
        Some(open) => (
            upper[..open].trim(),
            upper[open + 1..].trim_end_matches(')').trim(),
        ),
        None => (upper.as_str(), ""),
    };
    let mut numbers = args.split(',').filter_map(|a| a.trim().parse::<u64>().ok());
    let first = numbers.next();
    let second = numbers.next();

    match base {
        "INTEGER" | "INT" => SqlType::Integer,
        "BIGINT" => SqlType::BigInt,
        "SMALLINT" => SqlType::SmallInt,
        "BOOLEAN" | "BOOL" => SqlType::Boolean,
        "VARCHAR" => first.map_or(SqlType::Text, |n| SqlType::Varchar(n as usize)),
        "CHAR" => SqlType::Char(first.unwrap_or(1) as usize),
        "DATE" => SqlType::Date,
        "TIME" => SqlType::Time,
        "TIMESTAMP" | "DATETIME" => SqlType::Timestamp,
        "REAL" | "FLOAT" | "DOUBLE" | "DOUBLE PRECISION" => SqlType::Double,
        "DECIMAL" => SqlType::Decimal(first.unwrap_or(18) as u8, second.unwrap_or(0) as u8),
        "NUMERIC" => SqlType::Numeric(first.unwrap_or(18) as u8, second.unwrap_or(0) as u8),
        "BLOB" | "" => SqlType::Blob,
        _ => SqlType::Text,
    }
}

/// Maps a catalog default expression back to a [`DefaultValue`].
fn parse_default(raw: &str) -> DefaultValue {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("NULL") {
        return DefaultValue::Null;
    }
    if let Ok(i) = raw.parse::<i64>() {
        return DefaultValue::Integer(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return DefaultValue::Float(f);
    }
    if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        return DefaultValue::String(raw[1..raw.len() - 1].replace("''", "'"));
    }
    DefaultValue::Expression(raw.to_string())
}

fn partial_condition(sql: &str) -> Option<String> {
    let upper = sql.to_ascii_uppercase();
    upper
        .rfind(" WHERE ")
        .map(|pos| sql[pos + " WHERE ".len()..].trim().to_string())
}

/// Byte ranges of the whitespace-separated words of `sql`. Quoted
/// identifiers and string literals stay in one word.
fn words(sql: &str) -> Vec<(usize, usize)> {
    let bytes = sql.as_bytes();
    let mut words = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_whitespace() {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
            let close = match bytes[i] {
                b'"' => Some(b'"'),
                b'`' => Some(b'`'),
                b'[' => Some(b']'),
                b'\'' => Some(b'\''),
                _ => None,
            };
            i += 1;
            if let Some(close) = close {
                while i < bytes.len() && bytes[i] != close {
                    i += 1;
                }
                i += 1;
            }
        }
        words.push((start, i.min(bytes.len())));
    }
    words
}

fn unquote(identifier: &str) -> String {
    let inner = identifier
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| identifier.strip_prefix('`').and_then(|s| s.strip_suffix('`')))
        .or_else(|| identifier.strip_prefix('[').and_then(|s| s.strip_suffix(']')));
    match inner {
        Some(inner) => inner.replace("\"\"", "\""),
        None => identifier.to_string(),
    }
}

/// Parses `CREATE TRIGGER [IF NOT EXISTS] name timing event [OF cols] ON
/// table [FOR EACH ROW] [WHEN cond] BEGIN body END`.
fn parse_trigger(name: &str, table: &str, sql: &str) -> Option<TriggerSchema> {
    let spans = words(sql);
    let keyword = |i: usize, kw: &str| {
        let (start, end) = spans[i];
        sql[start..end].trim_end_matches(';').eq_ignore_ascii_case(kw)
    };

    let mut at = (0..spans.len()).find(|&i| keyword(i, "TRIGGER"))? + 1;
    if at + 2 < spans.len()
        && keyword(at, "IF")
        && keyword(at + 1, "NOT")
        && keyword(at + 2, "EXISTS")
    {
        at += 3;
    }
    // Skip the trigger name so keywords inside it are never matched.
    let header = at + 1;
    let on = (header..spans.len()).find(|&i| keyword(i, "ON"))?;
    let begin = (on + 1..spans.len()).find(|&i| keyword(i, "BEGIN"))?;
    let end = (begin + 1..spans.len()).rev().find(|&i| keyword(i, "END"))?;

    let timing = if (header..on).any(|i| keyword(i, "AFTER")) {
        TriggerTiming::After
    } else {
        TriggerTiming::Before
    };
    let event_at = (header..on)
        .find(|&i| keyword(i, "INSERT") || keyword(i, "UPDATE") || keyword(i, "DELETE"))?;
    let event = if keyword(event_at, "DELETE") {
        TriggerEvent::Delete
    } else if keyword(event_at, "UPDATE") {
        TriggerEvent::Update
    } else {
        TriggerEvent::Insert
    };

    let mut trigger = TriggerSchema::new(
        name,
        table,
        timing,
        event,
        sql[spans[begin].1..spans[end].0].trim(),
    );
    if event == TriggerEvent::Update && event_at + 1 < on && keyword(event_at + 1, "OF") {
        trigger.columns = sql[spans[event_at + 1].1..spans[on].0]
            .split(',')
            .map(|c| unquote(c.trim()))
            .filter(|c| !c.is_empty())
            .collect();
    }
    // The word after ON is the table name.
    trigger.condition = (on + 2..begin)
        .find(|&i| keyword(i, "WHEN"))
        .map(|when| sql[spans[when].1..spans[begin].0].trim().to_string());
    Some(trigger)
}
