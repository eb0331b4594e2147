mod connections;

use crate::db::functions::ScalarFunction;
use crate::db::{execute_query, schema, Error, QueryRequest, Result, SqlOrigin};
use crate::registry::Registry;
use crate::types::{DatabaseCatalog, QueryResult, TableSchema};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use tokio::sync::oneshot;
use tracing::{debug, warn};

pub use connections::ConnectionCache;

type Reply<T> = oneshot::Sender<Result<T>>;

/// Messages sent to the worker threads
#[derive(Debug)]
pub enum WorkerMessage {
    Execute {
        database: String,
        request: QueryRequest,
        reply: Reply<QueryResult>,
    },
    Describe {
        database: String,
        table: String,
        reply: Reply<TableSchema>,
    },
    LoadCatalog {
        database: String,
        reply: Reply<DatabaseCatalog>,
    },
    Shutdown,
}

/// Fixed set of threads that run SQL. Each thread owns its connections; the
/// async side only ever waits on a reply channel.
pub struct WorkerPool {
    sender: Sender<WorkerMessage>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers sharing one job queue
    pub fn new(
        size: usize,
        registry: Arc<Registry>,
        functions: Arc<Vec<ScalarFunction>>,
    ) -> Result<Self> {
        let (sender, receiver) = unbounded();
        let mut handles = Vec::with_capacity(size);

        for worker_id in 0..size {
            let receiver = receiver.clone();
            let cache = ConnectionCache::new(worker_id, Arc::clone(&registry), Arc::clone(&functions));
            let handle = thread::Builder::new()
                .name(format!("sqlglass-worker-{}", worker_id))
                .spawn(move || worker_loop(cache, receiver))
                .map_err(|e| Error::Configuration(format!("Failed to spawn worker: {}", e)))?;
            handles.push(handle);
        }

        debug!(workers = size, "worker pool started");
        Ok(Self { sender, handles })
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    async fn dispatch<T>(&self, message: impl FnOnce(Reply<T>) -> WorkerMessage) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(message(reply))
            .map_err(|_| Error::WorkerUnavailable)?;
        response.await.map_err(|_| Error::WorkerUnavailable)?
    }

    /// Run a statement on whichever worker is free
    pub async fn execute(&self, database: &str, request: QueryRequest) -> Result<QueryResult> {
        self.dispatch(|reply| WorkerMessage::Execute {
            database: database.to_string(),
            request,
            reply,
        })
        .await
    }

    /// Table or view shape, `TableNotFound` if neither exists
    pub async fn describe(&self, database: &str, table: &str) -> Result<TableSchema> {
        self.dispatch(|reply| WorkerMessage::Describe {
            database: database.to_string(),
            table: table.to_string(),
            reply,
        })
        .await
    }

    pub async fn catalog(&self, database: &str) -> Result<DatabaseCatalog> {
        self.dispatch(|reply| WorkerMessage::LoadCatalog {
            database: database.to_string(),
            reply,
        })
        .await
    }

    /// Stop every worker and wait for it to exit
    pub fn shutdown(mut self) -> Result<()> {
        for _ in 0..self.handles.len() {
            self.sender
                .send(WorkerMessage::Shutdown)
                .map_err(|_| Error::WorkerUnavailable)?;
        }
        for handle in self.handles.drain(..) {
            handle.join().map_err(|_| Error::WorkerUnavailable)?;
        }
        Ok(())
    }
}

fn catalog_error(error: rusqlite::Error) -> Error {
    Error::query(&error, "sqlite_master", SqlOrigin::Internal)
}

fn worker_loop(mut cache: ConnectionCache, receiver: Receiver<WorkerMessage>) {
    // Ends on Shutdown or once every sender is gone
    while let Ok(message) = receiver.recv() {
        match message {
            WorkerMessage::Execute {
                database,
                request,
                reply,
            } => {
                debug!(worker = cache.worker_id(), database = %database, sql = %request.sql, "executing");
                let result = cache
                    .get_connection(&database)
                    .and_then(|conn| execute_query(conn, &request));
                if reply.send(result).is_err() {
                    warn!(worker = cache.worker_id(), "caller went away before the query finished");
                }
            }
            WorkerMessage::Describe {
                database,
                table,
                reply,
            } => {
                let result = cache.get_connection(&database).and_then(|conn| {
                    schema::describe(conn, &table)
                        .map_err(catalog_error)?
                        .ok_or_else(|| Error::TableNotFound(table.clone()))
                });
                let _ = reply.send(result);
            }
            WorkerMessage::LoadCatalog { database, reply } => {
                let result = cache
                    .get_connection(&database)
                    .and_then(|conn| schema::get_catalog(conn).map_err(catalog_error));
                let _ = reply.send(result);
            }
            WorkerMessage::Shutdown => break,
        }
    }
    debug!(worker = cache.worker_id(), "worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Params, Value};
    use rusqlite::Connection;
    use std::time::{Duration, Instant};

    fn pool(dir: &std::path::Path, size: usize) -> WorkerPool {
        let path = dir.join("pool.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch(
                "CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT);
                 INSERT INTO t VALUES (1, 'a'), (2, 'b');
                 CREATE VIEW vt AS SELECT v FROM t;",
            )
            .unwrap();
        let registry = Arc::new(Registry::new(vec![path]));
        WorkerPool::new(size, registry, Arc::new(Vec::new())).unwrap()
    }

    #[tokio::test]
    async fn executes_on_workers() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(dir.path(), 2);
        assert_eq!(pool.size(), 2);

        let request = QueryRequest::new("select v from t order by id", Params::new(), SqlOrigin::Internal);
        let result = pool.execute("pool", request).await.unwrap();
        assert_eq!(result.rows, vec![vec![Value::Text("a".into())], vec![Value::Text("b".into())]]);

        let schema = pool.describe("pool", "vt").await.unwrap();
        assert!(schema.is_view);
        assert!(matches!(
            pool.describe("pool", "missing").await,
            Err(Error::TableNotFound(_))
        ));

        let catalog = pool.catalog("pool").await.unwrap();
        assert_eq!(catalog.views, vec!["vt"]);

        pool.shutdown().unwrap();
    }

    #[tokio::test]
    async fn concurrent_requests_all_complete() {
        let dir = tempfile::tempdir().unwrap();
        let pool = Arc::new(pool(dir.path(), 3));

        let mut tasks = Vec::new();
        for i in 0..12i64 {
            let pool = Arc::clone(&pool);
            tasks.push(tokio::spawn(async move {
                let mut params = Params::new();
                params.insert("i", i);
                let request = QueryRequest::new("select :i + count(*) from t", params, SqlOrigin::Caller);
                pool.execute("pool", request).await
            }));
        }
        for (i, task) in tasks.into_iter().enumerate() {
            let result = task.await.unwrap().unwrap();
            assert_eq!(result.rows[0][0], Value::Integer(i as i64 + 2));
        }
    }

    #[tokio::test]
    async fn timed_out_worker_serves_the_next_request() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(dir.path(), 1);

        let endless = "with recursive c(x) as (select 1 union all select x + 1 from c) select count(*) from c";
        let request = QueryRequest::new(endless, Params::new(), SqlOrigin::Caller)
            .time_limit(Duration::from_millis(25));
        let started = Instant::now();
        let err = pool.execute("pool", request).await.unwrap_err();
        assert!(matches!(err, Error::QueryFailed { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));

        let request = QueryRequest::new("select count(*) from t", Params::new(), SqlOrigin::Caller);
        let result = pool.execute("pool", request).await.unwrap();
        assert_eq!(result.rows[0][0], Value::Integer(2));
    }
}
