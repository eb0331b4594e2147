//! Keyset pagination over tables and offset pagination over views.
//!
//! A cursor token is a flat string. Its meaning depends on the ordering of the
//! relation that produced it: comma-joined, percent-escaped primary key values,
//! a rowid, or a numeric offset for views. A token applied to a different
//! table, ordering or filter set gives undefined (but non-failing) pagination.
//!
//! Key components keep their storage class. Numbers are written bare and
//! decode back to numbers; text that would read as a number (or that starts
//! with `~`) is prefixed with `~`. Untyped key columns compare by storage
//! class, so binding `'2'` where `2` is stored would never match.

use crate::db::quote_identifier;
use crate::filters::WhereClause;
use crate::types::{TableSchema, Value};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tracing::debug;

/// Characters left alone when escaping key values, as in form encoding
const KEY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// How rows of a relation are ordered for paging
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableShape {
    /// Declared primary key columns, in key order
    PrimaryKeys(Vec<String>),
    /// No declared key; the implicit rowid orders the table
    RowId,
    /// No stable key at all
    View,
}

impl TableShape {
    pub fn from_schema(schema: &TableSchema) -> Self {
        if schema.is_view {
            TableShape::View
        } else if schema.primary_keys.is_empty() {
            TableShape::RowId
        } else {
            TableShape::PrimaryKeys(schema.primary_keys.clone())
        }
    }

    pub fn uses_rowid(&self) -> bool {
        matches!(self, TableShape::RowId)
    }

    /// Column names that identify a row, as used in row paths
    pub fn key_columns(&self) -> Vec<String> {
        match self {
            TableShape::PrimaryKeys(keys) => keys.clone(),
            TableShape::RowId => vec!["rowid".to_string()],
            TableShape::View => Vec::new(),
        }
    }

    pub(crate) fn select_list(&self) -> &'static str {
        match self {
            TableShape::RowId => "rowid, *",
            _ => "*",
        }
    }

    fn order_by(&self) -> Option<String> {
        match self {
            TableShape::PrimaryKeys(keys) => Some(
                keys.iter()
                    .map(|k| quote_identifier(k))
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
            TableShape::RowId => Some("rowid".to_string()),
            // A view's own query decides its order
            TableShape::View => None,
        }
    }
}

/// Marks a text key component that would otherwise decode as a number
const TEXT_TAG: char = '~';

/// Decoded form of a cursor token, tagged with the ordering it resumes
#[derive(Debug, Clone, PartialEq)]
pub enum Cursor {
    Keys(Vec<Value>),
    RowId(i64),
    Offset(u64),
}

impl Cursor {
    /// Interpret `token` for a relation of the given shape.
    ///
    /// Tokens that do not fit the shape (wrong key arity, non-numeric rowid or
    /// offset) decode to `None` and paging continues from the start.
    pub fn decode(token: &str, shape: &TableShape) -> Option<Self> {
        let cursor = match shape {
            TableShape::PrimaryKeys(keys) => {
                let values = decode_path(token);
                if values.len() != keys.len() {
                    debug!(
                        token,
                        expected = keys.len(),
                        found = values.len(),
                        "ignoring cursor with mismatched key arity"
                    );
                    return None;
                }
                Cursor::Keys(values)
            }
            TableShape::RowId => match decode_key(token.trim()) {
                Value::Integer(rowid) => Cursor::RowId(rowid),
                _ => return None,
            },
            TableShape::View => Cursor::Offset(token.trim().parse().ok()?),
        };
        Some(cursor)
    }

    pub fn encode(&self) -> String {
        match self {
            Cursor::Keys(values) => encode_path(values),
            Cursor::RowId(rowid) => rowid.to_string(),
            Cursor::Offset(offset) => offset.to_string(),
        }
    }
}

/// Form-style escaping: spaces become `+`, everything but `-_.~` and
/// alphanumerics is percent-encoded
pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, KEY_VALUE)
        .to_string()
        .replace("%20", "+")
}

fn decode_component(part: &str) -> String {
    percent_decode_str(&part.replace('+', " "))
        .decode_utf8_lossy()
        .into_owned()
}

/// How an untagged component reads: integer, then finite real, else text
fn classify(raw: String) -> Value {
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Integer(i);
    }
    let numeric = !raw.is_empty()
        && raw
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'+' | b'e' | b'E'));
    match raw.parse::<f64>() {
        Ok(r) if numeric && r.is_finite() => Value::Real(r),
        _ => Value::Text(raw),
    }
}

/// One key component, escaped and tagged so it decodes to the same storage class
pub fn encode_key(value: &Value) -> String {
    match value {
        Value::Integer(_) | Value::Real(_) => value.to_key_string(),
        Value::Text(text) => {
            let escaped = encode_component(text);
            let ambiguous = text.starts_with(TEXT_TAG)
                || !matches!(classify(text.clone()), Value::Text(_));
            if ambiguous {
                format!("{}{}", TEXT_TAG, escaped)
            } else {
                escaped
            }
        }
        Value::Null | Value::Blob(_) => encode_component(&value.to_key_string()),
    }
}

/// Inverse of [`encode_key`]
pub fn decode_key(part: &str) -> Value {
    match part.strip_prefix(TEXT_TAG) {
        Some(rest) => Value::Text(decode_component(rest)),
        None => classify(decode_component(part)),
    }
}

/// Encode each value and join with commas
pub fn encode_path(values: &[Value]) -> String {
    values.iter().map(encode_key).collect::<Vec<_>>().join(",")
}

/// Split on commas and decode each component
pub fn decode_path(path: &str) -> Vec<Value> {
    path.split(',').map(decode_key).collect()
}

/// Extend `base` with the predicate that resumes after `token`.
/// Returns the extended clause and, for views, the row offset to skip.
pub fn apply_cursor(
    mut base: WhereClause,
    token: Option<&str>,
    shape: &TableShape,
) -> (WhereClause, Option<u64>) {
    let Some(cursor) = token.and_then(|t| Cursor::decode(t, shape)) else {
        return (base, None);
    };

    match (cursor, shape) {
        (Cursor::Offset(offset), _) => return (base, Some(offset)),
        (Cursor::RowId(rowid), _) => {
            let name = base.params.push_positional(rowid);
            base.clauses.push(format!("rowid > :{}", name));
        }
        (Cursor::Keys(values), TableShape::PrimaryKeys(keys)) => {
            let names: Vec<String> = values
                .into_iter()
                .map(|v| base.params.push_positional(v))
                .collect();
            base.clauses.push(keyset_predicate(keys, &names));
        }
        (Cursor::Keys(_), _) => {}
    }
    (base, None)
}

/// Rows strictly after the cursor in `(k1, k2, ...)` order:
/// `k1 > c1 or (k1 = c1 and k2 > c2) or ...`
fn keyset_predicate(keys: &[String], params: &[String]) -> String {
    let quoted: Vec<String> = keys.iter().map(|k| quote_identifier(k)).collect();
    if quoted.len() == 1 {
        return format!("{} > :{}", quoted[0], params[0]);
    }

    let alternatives: Vec<String> = (0..quoted.len())
        .map(|i| {
            let mut terms: Vec<String> = (0..i)
                .map(|j| format!("{} = :{}", quoted[j], params[j]))
                .collect();
            terms.push(format!("{} > :{}", quoted[i], params[i]));
            format!("({})", terms.join(" and "))
        })
        .collect();
    format!("({})", alternatives.join(" or "))
}

/// `select` for one page, asking for a single lookahead row past the page size
pub fn build_page_sql(
    table: &str,
    shape: &TableShape,
    clause: &WhereClause,
    page_size: usize,
    offset: Option<u64>,
) -> String {
    let order_by = shape
        .order_by()
        .map(|o| format!("order by {} ", o))
        .unwrap_or_default();
    let offset = offset.map(|o| format!(" offset {}", o)).unwrap_or_default();
    format!(
        "select {} from {} {}{}limit {}{}",
        shape.select_list(),
        quote_identifier(table),
        clause.to_sql(),
        order_by,
        page_size + 1,
        offset,
    )
}

/// Key path of one row: escaped primary key values or the rowid
pub fn row_path(row: &[Value], columns: &[String], shape: &TableShape) -> Option<String> {
    let values = shape
        .key_columns()
        .iter()
        .map(|key| {
            let index = if shape.uses_rowid() {
                Some(0)
            } else {
                columns.iter().position(|c| c == key)
            };
            index.and_then(|i| row.get(i)).cloned()
        })
        .collect::<Option<Vec<_>>>()?;
    if values.is_empty() {
        return None;
    }
    Some(encode_path(&values))
}

/// Cursor for the page after `rows`, or `None` when `rows` holds no lookahead row.
///
/// `rows` is the untrimmed result, so the last displayed row is at
/// `page_size - 1`, never the lookahead row itself.
pub fn next_cursor(
    rows: &[Vec<Value>],
    columns: &[String],
    shape: &TableShape,
    page_size: usize,
    offset: Option<u64>,
) -> Option<String> {
    if page_size == 0 || rows.len() <= page_size {
        return None;
    }
    match shape {
        TableShape::View => {
            Some(Cursor::Offset(offset.unwrap_or(0) + page_size as u64).encode())
        }
        _ => row_path(&rows[page_size - 1], columns, shape),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(names: &[&str]) -> TableShape {
        TableShape::PrimaryKeys(names.iter().map(|n| n.to_string()).collect())
    }

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn path_escapes_commas_and_spaces() {
        let values = vec![text("a,b"), text("two words"), text("x/y")];
        let path = encode_path(&values);
        assert_eq!(path, "a%2Cb,two+words,x%2Fy");
        assert_eq!(decode_path(&path), values);
    }

    #[test]
    fn key_components_keep_their_storage_class() {
        let values = vec![
            Value::Integer(-3),
            Value::Real(2.5),
            text("10"),
            text("~home"),
            text("inf"),
            text("plain"),
        ];
        let path = encode_path(&values);
        assert_eq!(path, "-3,2.5,~10,~~home,inf,plain");
        assert_eq!(decode_path(&path), values);
        assert_eq!(decode_path("1,2"), vec![Value::Integer(1), Value::Integer(2)]);
    }

    #[test]
    fn compound_cursor_requires_full_arity() {
        let shape = keys(&["a", "b"]);
        assert_eq!(
            Cursor::decode("1,2", &shape),
            Some(Cursor::Keys(vec![Value::Integer(1), Value::Integer(2)]))
        );
        assert_eq!(Cursor::decode("1", &shape), None);
        assert_eq!(Cursor::decode("1,2,3", &shape), None);
    }

    #[test]
    fn mismatched_cursor_leaves_clause_untouched() {
        let shape = keys(&["a", "b"]);
        let (clause, offset) = apply_cursor(WhereClause::default(), Some("7"), &shape);
        assert!(clause.clauses.is_empty());
        assert!(clause.params.is_empty());
        assert_eq!(offset, None);

        let (clause, _) = apply_cursor(WhereClause::default(), Some("abc"), &TableShape::RowId);
        assert!(clause.clauses.is_empty());
    }

    #[test]
    fn compound_predicate_is_lexicographic() {
        let shape = keys(&["a", "b"]);
        let (clause, _) = apply_cursor(WhereClause::default(), Some("1,2"), &shape);
        assert_eq!(
            clause.clauses,
            vec!["((\"a\" > :p0) or (\"a\" = :p0 and \"b\" > :p1))"]
        );
        assert_eq!(clause.params.get("p1"), Some(&Value::Integer(2)));
    }

    #[test]
    fn cursor_params_follow_filter_params() {
        let mut base = WhereClause::default();
        base.clauses.push("\"name\" = :p0".to_string());
        base.params.insert("p0", "x");
        let (clause, _) = apply_cursor(base, Some("10"), &TableShape::RowId);
        assert_eq!(clause.clauses[1], "rowid > :p1");
        assert_eq!(clause.params.get("p1"), Some(&Value::Integer(10)));
    }

    #[test]
    fn views_page_by_offset() {
        let (clause, offset) = apply_cursor(WhereClause::default(), Some("200"), &TableShape::View);
        assert!(clause.clauses.is_empty());
        assert_eq!(offset, Some(200));

        let sql = build_page_sql("v", &TableShape::View, &clause, 100, offset);
        assert_eq!(sql, "select * from \"v\" limit 101 offset 200");
    }

    #[test]
    fn page_sql_orders_by_key() {
        let sql = build_page_sql("t", &keys(&["a", "b"]), &WhereClause::default(), 2, None);
        assert_eq!(sql, "select * from \"t\" order by \"a\", \"b\" limit 3");

        let sql = build_page_sql("t", &TableShape::RowId, &WhereClause::default(), 2, None);
        assert_eq!(sql, "select rowid, * from \"t\" order by rowid limit 3");
    }

    #[test]
    fn next_cursor_uses_last_displayed_row() {
        let columns = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let rows = vec![
            vec![Value::Integer(1), Value::Integer(1), Value::Null],
            vec![Value::Integer(1), Value::Integer(2), Value::Null],
            vec![Value::Integer(2), Value::Integer(1), Value::Null],
        ];
        let shape = keys(&["a", "b"]);
        assert_eq!(next_cursor(&rows, &columns, &shape, 2, None), Some("1,2".to_string()));
        assert_eq!(next_cursor(&rows, &columns, &shape, 3, None), None);

        assert_eq!(
            next_cursor(&rows, &columns, &TableShape::View, 2, Some(4)),
            Some("6".to_string())
        );
        assert_eq!(
            next_cursor(&rows, &columns, &TableShape::RowId, 2, None),
            Some("1".to_string())
        );
    }
}
