use std::path::PathBuf;
use thiserror::Error;

/// Who wrote the SQL that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlOrigin {
    /// Supplied by the caller as a custom query
    Caller,
    /// Generated by the table browser or row lookup
    Internal,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Database not found: {0}")]
    DatabaseNotFound(String),
    #[error("Table not found: {0}")]
    TableNotFound(String),
    #[error("Record not found: {0}")]
    RowNotFound(String),
    #[error("{message}")]
    QueryFailed { message: String, origin: SqlOrigin },
    #[error("Invalid SQL: {0}")]
    UnsafeQuery(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Database unavailable: {0}")]
    DatabaseUnavailable(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Failed to inspect {}: {message}", path.display())]
    Inspect { path: PathBuf, message: String },
    #[error("Worker pool is not running")]
    WorkerUnavailable,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub(crate) fn query(error: &rusqlite::Error, sql: &str, origin: SqlOrigin) -> Self {
        Error::QueryFailed {
            message: format_sql_error(error, sql),
            origin,
        }
    }

    /// HTTP-equivalent status for the routing layer
    pub fn status_code(&self) -> u16 {
        match self {
            Error::DatabaseNotFound(_) | Error::TableNotFound(_) | Error::RowNotFound(_) => 404,
            Error::QueryFailed { .. } | Error::UnsafeQuery(_) | Error::BadRequest(_) => 400,
            Error::DatabaseUnavailable(_)
            | Error::Configuration(_)
            | Error::Inspect { .. }
            | Error::WorkerUnavailable => 500,
        }
    }

    /// Whether the message may be shown verbatim to the caller
    pub fn is_user_facing(&self) -> bool {
        self.status_code() < 500
    }
}

/// Whether SQLite stopped the statement because the progress handler asked it to
pub fn is_interrupt_error(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ErrorCode::OperationInterrupted,
                ..
            },
            _
        )
    )
}

/// User-friendly SQL error formatting
pub fn format_sql_error(error: &rusqlite::Error, query: &str) -> String {
    if is_interrupt_error(error) {
        return format!(
            "Query interrupted: time limit exceeded\n\nQuery: {}",
            truncate_query(query)
        );
    }
    match error {
        rusqlite::Error::SqliteFailure(err, Some(msg)) => {
            format_sqlite_error(err.extended_code, msg, query)
        }
        rusqlite::Error::SqliteFailure(err, None) => {
            format!("SQL error (code {}): SQLite error", err.code as i32)
        }
        rusqlite::Error::InvalidColumnName(name) => {
            format!("Unknown column: '{}'", name)
        }
        rusqlite::Error::MultipleStatement => {
            "Multiple statements are not allowed".to_string()
        }
        _ => {
            format!("SQL error: {}\n\nQuery: {}", error, truncate_query(query))
        }
    }
}

fn format_sqlite_error(code: i32, message: &str, query: &str) -> String {
    let mut result = String::new();

    match code {
        1 => {
            // SQLITE_ERROR
            if message.contains("no such table") {
                result.push_str("Table not found\n\n");
                result.push_str(&detail_after_colon(message, "Unknown table"));
            } else if message.contains("no such column") {
                result.push_str("Column not found\n\n");
                result.push_str(&detail_after_colon(message, "Unknown column"));
            } else {
                result.push_str(&format!("SQL error: {}\n", message));
            }
        }
        8 | 1032 => {
            // SQLITE_READONLY and SQLITE_READONLY_DBMOVED
            result.push_str("Database is read-only\n");
        }
        _ => {
            result.push_str(&format!("SQL error (code {}): {}\n", code, message));
        }
    }

    result.push_str(&format!("\nQuery: {}", truncate_query(query)));
    result
}

fn detail_after_colon(message: &str, label: &str) -> String {
    match message.find(": ") {
        Some(start) => format!("{}: {}\n", label, &message[start + 2..]),
        None => format!("{}\n", message),
    }
}

fn truncate_query(query: &str) -> String {
    if query.chars().count() > 100 {
        let head: String = query.chars().take(97).collect();
        format!("{}...", head)
    } else {
        query.to_string()
    }
}
