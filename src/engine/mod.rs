//! Request-level operations: browse a table, run caller SQL, fetch a row,
//! describe a database and hand out the raw file.
//!
//! The engine owns the registry and the worker pool. Everything that touches
//! SQLite is dispatched to a worker; the async methods here only build SQL and
//! shape results.

mod args;
mod pages;

use crate::config::{Config, Metadata};
use crate::db::{
    effective_time_limit, named_parameters, quote_identifier, validate_select, Error,
    QueryRequest, Result, SqlOrigin,
};
use crate::filters::build_where;
use crate::pagination::{apply_cursor, build_page_sql, decode_path, next_cursor, TableShape};
use crate::registry::{DatabaseSummary, Inventory, Registry, Resolved, RouteTail};
use crate::types::{Params, Value};
use crate::worker::WorkerPool;
use std::fs::File;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub use args::RequestArgs;
pub use pages::{
    CustomQueryPage, DatabasePage, Download, HasResult, QueryEcho, RowPage, TableOverview,
    TablePage,
};

/// Cursor for the next page
pub const NEXT_ARG: &str = "_next";
/// Per-request time limit override, in milliseconds
pub const TIME_LIMIT_ARG: &str = "_sql_time_limit_ms";
/// Per-request page size, capped at `max_returned_rows`
pub const SIZE_ARG: &str = "_size";

pub struct Engine {
    config: Config,
    registry: Arc<Registry>,
    pool: WorkerPool,
}

impl Engine {
    /// Validate `config`, set up the registry and start the workers.
    ///
    /// With an `inspect_file` the registry is seeded from it; otherwise the
    /// files are scanned on first use.
    pub fn new(mut config: Config) -> Result<Self> {
        config.validate()?;

        let registry = match &config.inspect_file {
            Some(path) => Registry::from_inspect_file(config.files.clone(), path)?,
            None => Registry::new(config.files.clone()),
        };
        let registry = Arc::new(registry);
        let functions = Arc::new(std::mem::take(&mut config.functions));
        let pool = WorkerPool::new(config.num_threads, Arc::clone(&registry), functions)?;

        info!(
            databases = config.files.len(),
            workers = config.num_threads,
            "engine ready"
        );
        Ok(Self {
            config,
            registry,
            pool,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metadata(&self) -> &Metadata {
        &self.config.metadata
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn inspect(&self) -> Result<Arc<Inventory>> {
        self.registry.inspect()
    }

    pub fn resolve(&self, segment: &str, tail: &RouteTail) -> Result<Resolved> {
        self.registry.resolve(segment, tail)
    }

    /// Index listing, one summary per database
    pub fn databases(&self) -> Result<Vec<DatabaseSummary>> {
        self.registry.summaries()
    }

    /// Tables with their columns and row counts, plus views
    pub async fn database(&self, name: &str) -> Result<DatabasePage> {
        let info = self.registry.database(name)?;
        let catalog = self.pool.catalog(name).await?;

        let tables = catalog
            .tables
            .into_iter()
            .map(|table| TableOverview {
                table_rows: info.tables.get(&table.name).map(|t| t.row_count),
                name: table.name,
                columns: table.columns,
            })
            .collect();

        Ok(DatabasePage {
            database: info.name.clone(),
            hash: info.hash_prefix().to_string(),
            tables,
            views: catalog.views,
        })
    }

    /// The time limit for one request, honouring `_sql_time_limit_ms`
    pub fn time_limit(&self, args: &RequestArgs) -> Result<Duration> {
        let requested = match args.special(TIME_LIMIT_ARG) {
            Some(raw) => Some(raw.parse::<u64>().map_err(|_| {
                Error::BadRequest(format!("{} must be an integer, got {:?}", TIME_LIMIT_ARG, raw))
            })?),
            None => None,
        };
        Ok(effective_time_limit(self.config.sql_time_limit_ms, requested))
    }

    fn page_size(&self, args: &RequestArgs) -> Result<usize> {
        let size = match args.special(SIZE_ARG) {
            Some(raw) => match raw.parse::<usize>() {
                Ok(size) if size > 0 => size,
                _ => {
                    return Err(Error::BadRequest(format!(
                        "{} must be a positive integer, got {:?}",
                        SIZE_ARG, raw
                    )))
                }
            },
            None => self.config.page_size,
        };
        Ok(size.min(self.config.max_returned_rows.max(1)))
    }

    /// One page of a table or view, filtered by `args` and resumed from `_next`
    pub async fn browse_table(
        &self,
        database: &str,
        table: &str,
        args: &RequestArgs,
    ) -> Result<TablePage> {
        let started = Instant::now();
        let info = self.registry.database(database)?;
        let time_limit = self.time_limit(args)?;
        let page_size = self.page_size(args)?;

        let schema = self.pool.describe(database, table).await?;
        let shape = TableShape::from_schema(&schema);

        let filters = build_where(&args.filters());
        let (clause, offset) = apply_cursor(filters, args.special(NEXT_ARG), &shape);
        let sql = build_page_sql(table, &shape, &clause, page_size, offset);
        debug!(database, table, sql = %sql, "browsing table");

        let request = QueryRequest::new(sql.clone(), clause.params.clone(), SqlOrigin::Internal)
            .truncate(Some(page_size + 1))
            .time_limit(time_limit);
        let mut result = self.pool.execute(database, request).await?;

        let next = next_cursor(&result.rows, &result.columns, &shape, page_size, offset);
        result.rows.truncate(page_size);
        result.truncated = false;
        let next_url = next
            .as_deref()
            .map(|cursor| args.query_string_with(NEXT_ARG, cursor));

        let (view_definition, table_definition) = if schema.is_view {
            (schema.definition.clone(), None)
        } else {
            (None, schema.definition.clone())
        };

        Ok(TablePage {
            database: info.name.clone(),
            table: schema.name.clone(),
            is_view: schema.is_view,
            view_definition,
            table_definition,
            result,
            table_row_count: info.tables.get(table).map(|t| t.row_count),
            primary_keys: schema.primary_keys.clone(),
            use_rowid: shape.uses_rowid(),
            query: QueryEcho {
                sql,
                params: clause.params,
            },
            next_cursor: next,
            next_url,
            query_ms: elapsed_ms(started),
        })
    }

    /// Run a caller-supplied SELECT. Every `:name` in the SQL is bound from
    /// `args`, defaulting to the empty string.
    pub async fn custom_sql(
        &self,
        database: &str,
        sql: &str,
        args: &RequestArgs,
    ) -> Result<CustomQueryPage> {
        let started = Instant::now();
        let info = self.registry.database(database)?;
        validate_select(sql)?;
        let time_limit = self.time_limit(args)?;

        let params: Params = named_parameters(sql)
            .into_iter()
            .map(|name| {
                let value = args.get(&name).unwrap_or_default().to_string();
                (name, Value::Text(value))
            })
            .collect();

        let request = QueryRequest::new(sql, params.clone(), SqlOrigin::Caller)
            .truncate(Some(self.config.max_returned_rows))
            .time_limit(time_limit);
        let result = self.pool.execute(database, request).await?;

        Ok(CustomQueryPage {
            database: info.name.clone(),
            result,
            query: QueryEcho {
                sql: sql.to_string(),
                params,
            },
            query_ms: elapsed_ms(started),
        })
    }

    /// A single row addressed by its comma-joined, escaped key values
    pub async fn fetch_row(&self, database: &str, table: &str, pk_path: &str) -> Result<RowPage> {
        let started = Instant::now();
        let info = self.registry.database(database)?;
        let schema = self.pool.describe(database, table).await?;
        let shape = TableShape::from_schema(&schema);
        let not_found = || Error::RowNotFound(format!("{}/{}", table, pk_path));

        let keys = shape.key_columns();
        let values = decode_path(pk_path);
        if keys.is_empty() || keys.len() != values.len() {
            return Err(not_found());
        }

        let mut params = Params::new();
        let mut clauses = Vec::with_capacity(keys.len());
        if shape.uses_rowid() {
            let Value::Integer(rowid) = &values[0] else {
                return Err(not_found());
            };
            let name = params.push_positional(*rowid);
            clauses.push(format!("rowid = :{}", name));
        } else {
            for (key, value) in keys.iter().zip(&values) {
                let name = params.push_positional(value.clone());
                clauses.push(format!("{} = :{}", quote_identifier(key), name));
            }
        }
        let sql = format!(
            "select {} from {} where {}",
            shape.select_list(),
            quote_identifier(table),
            clauses.join(" and ")
        );

        let request = QueryRequest::new(sql, params, SqlOrigin::Internal)
            .truncate(Some(1))
            .time_limit(Duration::from_millis(self.config.sql_time_limit_ms));
        let result = self.pool.execute(database, request).await?;
        if result.rows.is_empty() {
            return Err(not_found());
        }

        Ok(RowPage {
            database: info.name.clone(),
            table: schema.name,
            result,
            primary_keys: keys,
            primary_key_values: values,
            query_ms: elapsed_ms(started),
        })
    }

    /// Open the backing file for a raw download; no SQL is involved
    pub fn download(&self, database: &str) -> Result<Download> {
        let info = self.registry.database(database)?;
        let unavailable =
            |e: std::io::Error| Error::DatabaseUnavailable(format!("{}: {}", info.name, e));

        let file = File::open(&info.file_path).map_err(unavailable)?;
        let len = file.metadata().map_err(unavailable)?.len();
        let filename = info
            .file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.db", info.name));

        Ok(Download {
            filename,
            len,
            file,
        })
    }

    /// Stop the workers
    pub fn shutdown(self) -> Result<()> {
        self.pool.shutdown()
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
