//! Values, rows and result sets exchanged with a [`Connection`](crate::Connection).

use std::fmt;

use base64::Engine as _;
use serde::de::DeserializeOwned;

use crate::DbError;

/// A single SQL value, used both for bound parameters and for result cells.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Real(f) => Some(*f as i64),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            Value::Blob(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// JSON view of the value. Non UTF-8 blobs are base64 encoded.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Integer(i) => serde_json::Value::from(*i),
            Value::Real(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Blob(b) => match std::str::from_utf8(b) {
                Ok(s) => serde_json::Value::String(s.to_string()),
                Err(_) => serde_json::Value::String(
                    base64::engine::general_purpose::STANDARD.encode(b),
                ),
            },
        }
    }

    /// Map a JSON scalar onto a bindable value.
    ///
    /// Arrays and objects are stored as their JSON text, booleans as `0`/`1`.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::from(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => n.as_f64().map(Value::Real).unwrap_or(Value::Null),
            },
            serde_json::Value::String(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// One result row, with column names shared positionally with its values.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Cell by column name.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    /// Text cell by column name, `None` for NULL or a missing column.
    pub fn text(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Value::as_text)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Map the row onto `T` by going through a JSON object keyed by column.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, DbError> {
        let map: serde_json::Map<String, serde_json::Value> = self
            .columns
            .iter()
            .zip(self.values.iter())
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();

        Ok(serde_json::from_value(serde_json::Value::Object(map))?)
    }
}

/// Rows returned by a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    /// Build a result from column names and raw value rows.
    pub fn from_values(columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        let rows = rows
            .into_iter()
            .map(|values| Row::new(columns.clone(), values))
            .collect();
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter()
    }

    pub fn deserialize_all<T: DeserializeOwned>(&self) -> Result<Vec<T>, DbError> {
        self.rows.iter().map(Row::deserialize).collect()
    }
}

const TYPE_STOP_WORDS: &[&str] = &[
    "not",
    "null",
    "default",
    "collate",
    "character",
    "charset",
    "primary",
    "auto_increment",
    "comment",
    "unique",
];

/// Reduce a column definition to the type MySQL reports in `SHOW COLUMNS`.
///
/// `"VARCHAR(255) NOT NULL default ''"` becomes `"varchar(255)"`. Modifiers
/// that are part of the type, such as `unsigned`, are kept.
pub fn normalize_column_type(definition: &str) -> String {
    definition
        .split_whitespace()
        .map(str::to_lowercase)
        .take_while(|token| !TYPE_STOP_WORDS.contains(&token.as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_normalize_column_type() {
        assert_eq!(normalize_column_type("VARCHAR(255) NOT NULL"), "varchar(255)");
        assert_eq!(
            normalize_column_type("int(11) NOT NULL default '0'"),
            "int(11)"
        );
        assert_eq!(normalize_column_type("int(11) unsigned"), "int(11) unsigned");
        assert_eq!(normalize_column_type("  double "), "double");
    }

    #[test]
    fn test_row_deserialize() {
        #[derive(Deserialize)]
        struct StoreRow {
            id: i64,
            data: String,
        }

        let result = QueryResult::from_values(
            &["id", "data"],
            vec![vec![Value::Integer(7), Value::Text("{}".into())]],
        );
        let row: StoreRow = result.first().unwrap().deserialize().unwrap();
        assert_eq!(row.id, 7);
        assert_eq!(row.data, "{}");
    }

    #[test]
    fn test_value_json_conversion() {
        assert_eq!(Value::from_json(&serde_json::json!(true)), Value::Integer(1));
        assert_eq!(Value::from_json(&serde_json::json!(1.5)), Value::Real(1.5));
        assert_eq!(
            Value::from_json(&serde_json::json!([1, 2])),
            Value::Text("[1,2]".into())
        );
        assert_eq!(Value::Blob(vec![0xff, 0x00]).to_json(), serde_json::json!("/wA="));
    }

    #[test]
    fn test_text_cell_parses_as_integer() {
        assert_eq!(Value::Text(" 42 ".into()).as_integer(), Some(42));
        assert_eq!(Value::Null.as_integer(), None);
    }
}
