pub mod error;
pub mod functions;
pub mod query;
pub mod safety;
pub mod schema;

use functions::{register_functions, ScalarFunction};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;

pub use error::{format_sql_error, Error, Result, SqlOrigin};
pub use query::{effective_time_limit, execute_query, QueryRequest};
pub use safety::{named_parameters, validate_select};

/// Quote a table or column name for interpolation into SQL text
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `file:` URI that tells SQLite the file can never change underneath it
fn immutable_uri(path: &Path) -> String {
    let mut uri = String::from("file:");
    for c in path.to_string_lossy().chars() {
        match c {
            '%' => uri.push_str("%25"),
            '?' => uri.push_str("%3f"),
            '#' => uri.push_str("%23"),
            _ => uri.push(c),
        }
    }
    uri.push_str("?immutable=1");
    uri
}

/// Open a read-only connection against an immutable database file.
///
/// SQLite skips locking and change detection in this mode, so writes made to
/// the file by another process while it is open are undefined behaviour.
pub fn open_immutable(path: &Path, functions: &[ScalarFunction]) -> rusqlite::Result<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let conn = Connection::open_with_flags(immutable_uri(path), flags)?;
    conn.pragma_update(None, "query_only", true)?;
    register_functions(&conn, functions)?;
    Ok(conn)
}
