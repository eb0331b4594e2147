use crate::db::functions::ScalarFunction;
use crate::db::{open_immutable, Error, Result};
use crate::registry::Registry;
use rusqlite::Connection;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

/// Connections owned by a single worker thread, opened on first use.
///
/// The cache never leaves its thread, so a connection only ever runs one
/// statement at a time and needs no lock.
pub struct ConnectionCache {
    worker_id: usize,
    registry: Arc<Registry>,
    functions: Arc<Vec<ScalarFunction>>,
    connections: HashMap<String, Connection>,
}

impl ConnectionCache {
    pub fn new(
        worker_id: usize,
        registry: Arc<Registry>,
        functions: Arc<Vec<ScalarFunction>>,
    ) -> Self {
        Self {
            worker_id,
            registry,
            functions,
            connections: HashMap::new(),
        }
    }

    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// Number of databases this worker has opened so far
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// This worker's connection to `db_name`, opening it if needed
    pub fn get_connection(&mut self, db_name: &str) -> Result<&Connection> {
        match self.connections.entry(db_name.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let info = self.registry.database(db_name)?;
                let conn = open_immutable(&info.file_path, &self.functions).map_err(|e| {
                    error!(
                        worker = self.worker_id,
                        database = db_name,
                        path = %info.file_path.display(),
                        error = %e,
                        "failed to open database"
                    );
                    Error::DatabaseUnavailable(db_name.to_string())
                })?;
                debug!(worker = self.worker_id, database = db_name, "opened connection");
                Ok(entry.insert(conn))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;
    use std::path::PathBuf;

    fn registry_with(dir: &std::path::Path) -> (Arc<Registry>, PathBuf) {
        let path = dir.join("cache.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE t (a); INSERT INTO t VALUES (1);")
            .unwrap();
        (Arc::new(Registry::new(vec![path.clone()])), path)
    }

    #[test]
    fn reuses_connection_per_database() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, _) = registry_with(dir.path());
        let functions = Arc::new(vec![ScalarFunction::new("one", 0, |_| Ok(Value::Integer(1)))]);
        let mut cache = ConnectionCache::new(3, registry, functions);
        assert!(cache.is_empty());

        let first = cache.get_connection("cache").unwrap() as *const Connection;
        let second = cache.get_connection("cache").unwrap() as *const Connection;
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.worker_id(), 3);

        let conn = cache.get_connection("cache").unwrap();
        let one: i64 = conn.query_row("select one()", [], |r| r.get(0)).unwrap();
        assert_eq!(one, 1);
    }

    #[test]
    fn unknown_database_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, _) = registry_with(dir.path());
        let mut cache = ConnectionCache::new(0, registry, Arc::new(Vec::new()));
        assert!(matches!(
            cache.get_connection("nope"),
            Err(Error::DatabaseNotFound(_))
        ));
    }

    #[test]
    fn vanished_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, path) = registry_with(dir.path());
        registry.inspect().unwrap();
        std::fs::remove_file(&path).unwrap();

        let mut cache = ConnectionCache::new(0, registry, Arc::new(Vec::new()));
        assert!(matches!(
            cache.get_connection("cache"),
            Err(Error::DatabaseUnavailable(_))
        ));
    }
}
