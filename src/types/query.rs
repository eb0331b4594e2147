use base64::{engine::general_purpose, Engine as _};
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqliteValue, ValueRef};
use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value as JsonValue};

/// A single cell as returned by SQLite
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<SqliteValue> for Value {
    fn from(v: SqliteValue) -> Self {
        match v {
            SqliteValue::Null => Value::Null,
            SqliteValue::Integer(i) => Value::Integer(i),
            SqliteValue::Real(r) => Value::Real(r),
            SqliteValue::Text(t) => Value::Text(t),
            SqliteValue::Blob(b) => Value::Blob(b),
        }
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(v: ValueRef<'_>) -> Self {
        match v {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(r) => Value::Real(r),
            // Text that is not valid UTF-8 is decoded lossily rather than failing the row
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<Value> for SqliteValue {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => SqliteValue::Null,
            Value::Integer(i) => SqliteValue::Integer(i),
            Value::Real(r) => SqliteValue::Real(r),
            Value::Text(t) => SqliteValue::Text(t),
            Value::Blob(b) => SqliteValue::Blob(b),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let borrowed = match self {
            Value::Null => ValueRef::Null,
            Value::Integer(i) => ValueRef::Integer(*i),
            Value::Real(r) => ValueRef::Real(*r),
            Value::Text(t) => ValueRef::Text(t.as_bytes()),
            Value::Blob(b) => ValueRef::Blob(b),
        };
        Ok(ToSqlOutput::Borrowed(borrowed))
    }
}

impl Value {
    /// JSON form used by every output format; blobs become base64
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Integer(i) => json!(i),
            Value::Real(r) => json!(r),
            Value::Text(t) => json!(t),
            Value::Blob(b) => json!(general_purpose::STANDARD.encode(b)),
        }
    }

    /// Plain string form, as used in cursor tokens, row paths and CSV cells
    pub fn to_key_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Integer(i) => i.to_string(),
            Value::Real(r) => r.to_string(),
            Value::Text(t) => t.clone(),
            Value::Blob(b) => general_purpose::STANDARD.encode(b),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Real(r) => serializer.serialize_f64(*r),
            Value::Text(t) => serializer.serialize_str(t),
            Value::Blob(b) => serializer.serialize_str(&general_purpose::STANDARD.encode(b)),
        }
    }
}

/// Query execution result
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    /// Column names in the order the statement reported them
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// More rows matched than the truncation limit allowed
    pub truncated: bool,
    pub exec_ms: u64,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>, exec_ms: u64) -> Self {
        Self {
            columns,
            rows,
            truncated: false,
            exec_ms,
        }
    }

    pub fn with_truncation(mut self, truncated: bool) -> Self {
        self.truncated = truncated;
        self
    }

    /// Rows as objects keyed by column name (the `.jsono` shape)
    pub fn rows_as_objects(&self) -> Vec<Map<String, JsonValue>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row)
                    .map(|(column, value)| (column.clone(), value.to_json()))
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_as_objects_zips_columns() {
        let result = QueryResult::new(
            vec!["id".to_string(), "name".to_string()],
            vec![
                vec![Value::Integer(1), Value::Text("a".to_string())],
                vec![Value::Integer(2), Value::Null],
            ],
            0,
        );
        let objects = result.rows_as_objects();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0]["id"], json!(1));
        assert_eq!(objects[0]["name"], json!("a"));
        assert_eq!(objects[1]["name"], JsonValue::Null);
    }

    #[test]
    fn invalid_utf8_text_is_replaced() {
        let value = Value::from(ValueRef::Text(&[b'o', b'k', 0xff]));
        assert_eq!(value, Value::Text("ok\u{fffd}".to_string()));
    }

    #[test]
    fn serializes_as_plain_json() {
        let row = vec![Value::Integer(3), Value::Real(1.5), Value::Blob(vec![1, 2])];
        let encoded = serde_json::to_string(&row).unwrap();
        assert_eq!(encoded, r#"[3,1.5,"AQI="]"#);
    }
}
