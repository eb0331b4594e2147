use super::error::{Error, Result, SqlOrigin};
use crate::types::{Params, QueryResult, Value};
use rusqlite::{Connection, Statement};
use std::time::{Duration, Instant};
use tracing::{error, warn};

/// SQLite virtual-machine instructions between deadline checks
const PROGRESS_HANDLER_OPS: i32 = 1000;

/// A statement to run on a worker connection
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub sql: String,
    pub params: Params,
    /// Keep at most this many rows and report whether more existed
    pub truncate_limit: Option<usize>,
    pub time_limit: Duration,
    pub origin: SqlOrigin,
}

impl QueryRequest {
    pub fn new(sql: impl Into<String>, params: Params, origin: SqlOrigin) -> Self {
        Self {
            sql: sql.into(),
            params,
            truncate_limit: None,
            time_limit: Duration::from_millis(1000),
            origin,
        }
    }

    pub fn truncate(mut self, limit: Option<usize>) -> Self {
        self.truncate_limit = limit;
        self
    }

    pub fn time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = limit;
        self
    }
}

/// The configured limit, shortened (never lengthened) by a per-request override
pub fn effective_time_limit(default_ms: u64, override_ms: Option<u64>) -> Duration {
    let ms = match override_ms {
        Some(ms) if ms < default_ms => ms,
        _ => default_ms,
    };
    Duration::from_millis(ms)
}

/// Aborts the running statement once the deadline passes and removes
/// itself from the connection when dropped.
struct DeadlineGuard<'c> {
    conn: &'c Connection,
}

impl<'c> DeadlineGuard<'c> {
    fn install(conn: &'c Connection, limit: Duration) -> Self {
        let deadline = Instant::now() + limit;
        conn.progress_handler(PROGRESS_HANDLER_OPS, Some(move || Instant::now() >= deadline));
        Self { conn }
    }
}

impl Drop for DeadlineGuard<'_> {
    fn drop(&mut self) {
        self.conn.progress_handler(0, None::<fn() -> bool>);
    }
}

/// Execute a SQL query under the request's time limit and return results
pub fn execute_query(conn: &Connection, request: &QueryRequest) -> Result<QueryResult> {
    let start = Instant::now();
    let _deadline = DeadlineGuard::install(conn, request.time_limit);

    run(conn, request, start).map_err(|e| {
        match request.origin {
            SqlOrigin::Caller => {
                warn!(sql = %request.sql, error = %e, "custom query failed");
            }
            SqlOrigin::Internal => {
                error!(sql = %request.sql, error = %e, "generated query failed");
            }
        }
        Error::query(&e, &request.sql, request.origin)
    })
}

fn run(conn: &Connection, request: &QueryRequest, start: Instant) -> rusqlite::Result<QueryResult> {
    let mut stmt = conn.prepare(&request.sql)?;
    bind_params(&mut stmt, &request.params)?;

    // Column names come from the statement so computed columns work too
    let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
    let column_count = columns.len();

    // One extra row tells us whether the limit cut anything off
    let fetch_cap = request.truncate_limit.map(|limit| limit.saturating_add(1));
    let mut rows = Vec::new();
    let mut row_iter = stmt.raw_query();
    while let Some(row) = row_iter.next()? {
        let mut values = Vec::with_capacity(column_count);
        for i in 0..column_count {
            values.push(Value::from(row.get_ref(i)?));
        }
        rows.push(values);
        if Some(rows.len()) == fetch_cap {
            break;
        }
    }

    let truncated = match request.truncate_limit {
        Some(limit) if rows.len() > limit => {
            rows.truncate(limit);
            true
        }
        _ => false,
    };

    let exec_ms = start.elapsed().as_millis() as u64;
    Ok(QueryResult::new(columns, rows, exec_ms).with_truncation(truncated))
}

/// Bind every supplied parameter the statement actually references
fn bind_params(stmt: &mut Statement<'_>, params: &Params) -> rusqlite::Result<()> {
    for (name, value) in params.iter() {
        if let Some(index) = stmt.parameter_index(&format!(":{}", name))? {
            stmt.raw_bind_parameter(index, value)?;
        }
    }
    Ok(())
}
