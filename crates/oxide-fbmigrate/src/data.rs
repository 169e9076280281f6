//! Row values used by the data operations and by row pre-images.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A single column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataValue {
    /// SQL NULL.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Integer(i64),
    /// Floating point.
    Float(f64),
    /// Text.
    Text(String),
    /// Binary data.
    Blob(Vec<u8>),
    /// Timestamp without time zone.
    Timestamp(NaiveDateTime),
}

impl DataValue {
    /// Returns the SQL literal for this value.
    #[must_use]
    pub fn to_sql(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => {
                let s = f.to_string();
                if s.contains(['.', 'e', 'E']) || !f.is_finite() {
                    s
                } else {
                    format!("{s}.0")
                }
            }
            Self::Text(s) => format!("'{}'", s.replace('\'', "''")),
            Self::Blob(bytes) => {
                let mut hex = String::with_capacity(bytes.len() * 2 + 3);
                hex.push_str("X'");
                for b in bytes {
                    let _ = write!(hex, "{b:02X}");
                }
                hex.push('\'');
                hex
            }
            Self::Timestamp(ts) => format!("'{}'", ts.format("%Y-%m-%d %H:%M:%S%.f")),
        }
    }

    /// Returns true if the value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<i64> for DataValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for DataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for DataValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for DataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// A row: column name to value.
pub type Row = BTreeMap<String, DataValue>;

/// Builds a row from `(column, value)` pairs.
pub fn row<I, K, V>(pairs: I) -> Row
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<DataValue>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Which rows an update or delete applies to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RowSelection {
    /// Every row of the table.
    AllRows,
    /// Rows equal to any of the conditions on every column the condition names.
    Matching(Vec<Row>),
}

impl RowSelection {
    /// Returns true if `row` is selected.
    #[must_use]
    pub fn selects(&self, row: &Row) -> bool {
        match self {
            Self::AllRows => true,
            Self::Matching(conditions) => conditions.iter().any(|cond| matches_condition(row, cond)),
        }
    }
}

/// Returns true if `row` carries every value of `condition`.
#[must_use]
pub fn matches_condition(row: &Row, condition: &Row) -> bool {
    condition
        .iter()
        .all(|(column, expected)| row.get(column) == Some(expected))
}

/// Projects `row` onto `columns`; missing columns become NULL.
#[must_use]
pub fn project(row: &Row, columns: &[String]) -> Row {
    columns
        .iter()
        .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(DataValue::Null)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literals() {
        assert_eq!(DataValue::Integer(5).to_sql(), "5");
        assert_eq!(DataValue::Float(2.0).to_sql(), "2.0");
        assert_eq!(DataValue::Text("O'Brien".into()).to_sql(), "'O''Brien'");
        assert_eq!(DataValue::Blob(vec![0x0a, 0xff]).to_sql(), "X'0AFF'");
        assert_eq!(DataValue::Null.to_sql(), "NULL");
    }

    #[test]
    fn test_selection() {
        let r = row([("id", 1_i64), ("age", 30)]);
        assert!(RowSelection::AllRows.selects(&r));
        assert!(RowSelection::Matching(vec![row([("id", 2_i64)]), row([("id", 1_i64)])]).selects(&r));
        assert!(!RowSelection::Matching(vec![row([("id", 1_i64), ("age", 31)])]).selects(&r));
        assert!(!RowSelection::Matching(vec![]).selects(&r));
    }

    #[test]
    fn test_project_fills_nulls() {
        let r = row([("id", 1_i64)]);
        let key = project(&r, &["id".to_string(), "tenant".to_string()]);
        assert_eq!(key.get("id"), Some(&DataValue::Integer(1)));
        assert_eq!(key.get("tenant"), Some(&DataValue::Null));
    }
}
