//! Discovers the configured database files and caches what is known about
//! them: content hash, tables, row counts, views and foreign keys.
//!
//! The inventory is built once, on first use, and published as a whole behind
//! an `Arc`. Readers never see a half-built inventory; a refresh replaces it.

use crate::db::{open_immutable, schema, Error, Result};
use crate::types::{DatabaseInfo, TableInfo};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info};

/// Files are hashed in blocks of this size so they never need to fit in memory
pub const HASH_BLOCK_SIZE: usize = 1024 * 1024;

/// Length of the hash prefix used in URLs
pub const HASH_PREFIX_LEN: usize = 7;

/// Everything known about every database, keyed by name
pub type Inventory = BTreeMap<String, DatabaseInfo>;

pub struct Registry {
    files: Vec<PathBuf>,
    inventory: RwLock<Option<Arc<Inventory>>>,
    /// Held while building so only one thread ever scans the files
    build_lock: Mutex<()>,
}

impl Registry {
    /// A registry that scans `files` lazily, on first access
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self {
            files,
            inventory: RwLock::new(None),
            build_lock: Mutex::new(()),
        }
    }

    /// A registry seeded with inventory computed earlier, skipping the scan
    pub fn with_inventory(files: Vec<PathBuf>, inventory: Inventory) -> Self {
        Self {
            files,
            inventory: RwLock::new(Some(Arc::new(inventory))),
            build_lock: Mutex::new(()),
        }
    }

    /// Load inventory previously written by `sqlglass inspect --out`
    pub fn from_inspect_file(files: Vec<PathBuf>, path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Inspect {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let inventory: Inventory = serde_json::from_str(&raw).map_err(|e| Error::Inspect {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        info!(path = %path.display(), databases = inventory.len(), "loaded inspect data");
        Ok(Self::with_inventory(files, inventory))
    }

    fn published(&self) -> Option<Arc<Inventory>> {
        self.inventory
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn publish(&self, inventory: Inventory) -> Arc<Inventory> {
        let inventory = Arc::new(inventory);
        *self
            .inventory
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&inventory));
        inventory
    }

    /// The inventory, scanning the files the first time it is asked for
    pub fn inspect(&self) -> Result<Arc<Inventory>> {
        if let Some(inventory) = self.published() {
            return Ok(inventory);
        }
        let _building = self.build_lock.lock().unwrap_or_else(PoisonError::into_inner);
        // Another thread may have finished while we waited
        if let Some(inventory) = self.published() {
            return Ok(inventory);
        }
        Ok(self.publish(inspect_files(&self.files)?))
    }

    /// Rescan every file and replace the inventory wholesale
    pub fn refresh(&self) -> Result<Arc<Inventory>> {
        let _building = self.build_lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.publish(inspect_files(&self.files)?))
    }

    pub fn database(&self, name: &str) -> Result<DatabaseInfo> {
        self.inspect()?
            .get(name)
            .cloned()
            .ok_or_else(|| Error::DatabaseNotFound(name.to_string()))
    }

    /// Split a `name-hash` path segment and check the hash against the current file.
    ///
    /// A stale or missing hash is not an error: the result carries the path to
    /// redirect to instead. Only an unknown name fails.
    pub fn resolve(&self, segment: &str, tail: &RouteTail) -> Result<Resolved> {
        let inventory = self.inspect()?;

        // The segment may be a bare name that itself contains a hyphen
        let (name, hash) = match segment.rsplit_once('-') {
            Some((name, hash)) if inventory.contains_key(name) => (name, Some(hash)),
            _ => (segment, None),
        };
        let info = inventory
            .get(name)
            .ok_or_else(|| Error::DatabaseNotFound(name.to_string()))?;

        let expected = info.hash_prefix().to_string();
        let redirect = if hash == Some(expected.as_str()) {
            None
        } else {
            debug!(name, requested = ?hash, current = %expected, "redirecting to current hash");
            Some(tail.redirect_path(name, &expected))
        };

        Ok(Resolved {
            name: name.to_string(),
            hash: expected,
            redirect,
        })
    }

    /// Per-database summaries for an index listing, sorted by name
    pub fn summaries(&self) -> Result<Vec<DatabaseSummary>> {
        Ok(self.inspect()?.values().map(DatabaseSummary::from_info).collect())
    }
}

/// The parts of a request path after the database segment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteTail {
    pub table: Option<String>,
    pub pk_path: Option<String>,
    /// Format suffix such as `.json`, `.jsono` or `.db`
    pub suffix: Option<String>,
    pub query_string: Option<String>,
}

impl RouteTail {
    fn redirect_path(&self, name: &str, hash: &str) -> String {
        let mut path = format!("/{}-{}", name, hash);
        if let Some(table) = &self.table {
            path.push('/');
            path.push_str(table);
        }
        if let Some(pk_path) = &self.pk_path {
            path.push('/');
            path.push_str(pk_path);
        }
        if let Some(suffix) = &self.suffix {
            path.push_str(suffix);
        }
        if let Some(query) = self.query_string.as_deref().filter(|q| !q.is_empty()) {
            path.push('?');
            path.push_str(query);
        }
        path
    }
}

/// Canonical name and hash prefix for a request, plus where to go if it was stale
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolved {
    pub name: String,
    pub hash: String,
    pub redirect: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCount {
    pub name: String,
    pub row_count: u64,
}

/// What an index page shows for one database
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseSummary {
    pub name: String,
    pub hash: String,
    /// `name-hashprefix`
    pub path: String,
    /// The five largest tables
    pub tables_truncated: Vec<TableCount>,
    pub tables_count: usize,
    pub tables_more: bool,
    pub table_rows: u64,
}

impl DatabaseSummary {
    fn from_info(info: &DatabaseInfo) -> Self {
        let mut tables: Vec<TableCount> = info
            .tables
            .iter()
            .map(|(name, table)| TableCount {
                name: name.clone(),
                row_count: table.row_count,
            })
            .collect();
        tables.sort_by(|a, b| b.row_count.cmp(&a.row_count));
        let tables_count = tables.len();
        tables.truncate(5);

        Self {
            name: info.name.clone(),
            hash: info.content_hash.clone(),
            path: format!("{}-{}", info.name, info.hash_prefix()),
            tables_truncated: tables,
            tables_count,
            tables_more: tables_count > 5,
            table_rows: info.total_rows(),
        }
    }
}

/// Name a database after its file stem
pub fn database_name(path: &Path) -> Result<String> {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Configuration(format!("No file name in {}", path.display())))
}

/// Inspect every file; two files with the same stem is a configuration error
pub fn inspect_files(files: &[PathBuf]) -> Result<Inventory> {
    let mut inventory = Inventory::new();
    for path in files {
        let name = database_name(path)?;
        if inventory.contains_key(&name) {
            return Err(Error::Configuration(format!(
                "Multiple files with the same name: {}",
                name
            )));
        }
        let info = inspect_file(&name, path)?;
        inventory.insert(name, info);
    }
    Ok(inventory)
}

/// Hash one file and read its catalog
pub fn inspect_file(name: &str, path: &Path) -> Result<DatabaseInfo> {
    let failed = |message: String| Error::Inspect {
        path: path.to_path_buf(),
        message,
    };

    let file_path = path.canonicalize().map_err(|e| failed(e.to_string()))?;
    let content_hash = content_hash(&file_path).map_err(|e| failed(e.to_string()))?;

    let conn = open_immutable(&file_path, &[]).map_err(|e| failed(e.to_string()))?;
    let table_names = schema::get_table_names(&conn, false).map_err(|e| failed(e.to_string()))?;
    let views = schema::get_view_names(&conn).map_err(|e| failed(e.to_string()))?;
    let mut foreign_keys =
        schema::get_all_foreign_keys(&conn, &table_names).map_err(|e| failed(e.to_string()))?;

    let mut tables = BTreeMap::new();
    for table in &table_names {
        let row_count =
            schema::get_table_row_count(&conn, table).map_err(|e| failed(e.to_string()))?;
        tables.insert(
            table.clone(),
            TableInfo {
                row_count,
                foreign_keys: foreign_keys.remove(table).unwrap_or_default(),
            },
        );
    }

    info!(
        name,
        path = %file_path.display(),
        hash = %content_hash,
        tables = tables.len(),
        "inspected database"
    );

    Ok(DatabaseInfo {
        name: name.to_string(),
        file_path,
        content_hash,
        tables,
        views,
    })
}

/// SHA-256 of a file, read in fixed-size blocks
pub fn content_hash(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut block = vec![0u8; HASH_BLOCK_SIZE];
    loop {
        let read = file.read(&mut block)?;
        if read == 0 {
            break;
        }
        hasher.update(&block[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
