use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Everything the registry knows about one database file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub name: String,
    pub file_path: PathBuf,
    /// SHA-256 of the file contents, lowercase hex
    pub content_hash: String,
    pub tables: BTreeMap<String, TableInfo>,
    #[serde(default)]
    pub views: Vec<String>,
}

impl DatabaseInfo {
    /// Short hash used in URLs
    pub fn hash_prefix(&self) -> &str {
        let end = self.content_hash.len().min(crate::registry::HASH_PREFIX_LEN);
        self.content_hash.get(..end).unwrap_or(&self.content_hash)
    }

    pub fn total_rows(&self) -> u64 {
        self.tables.values().map(|t| t.row_count).sum()
    }
}

/// Information about a database table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub row_count: u64,
    #[serde(default)]
    pub foreign_keys: ForeignKeys,
}

/// Foreign keys touching a table, in both directions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeys {
    pub incoming: Vec<ForeignKeyInfo>,
    pub outgoing: Vec<ForeignKeyInfo>,
}

/// Information about a foreign key constraint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyInfo {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
}

/// Shape of a browsable relation, looked up on a worker connection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSchema {
    pub name: String,
    pub is_view: bool,
    /// Declared primary key columns in key order; empty for rowid tables and views
    pub primary_keys: Vec<String>,
    /// The stored CREATE statement
    pub definition: Option<String>,
}

/// A table name with its column names, for database overviews
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableColumns {
    pub name: String,
    pub columns: Vec<String>,
}

/// Tables (with their columns) and views of one database, read from a live connection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseCatalog {
    pub tables: Vec<TableColumns>,
    pub views: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(content_hash: &str) -> DatabaseInfo {
        DatabaseInfo {
            name: "db".to_string(),
            file_path: PathBuf::from("/tmp/db.sqlite"),
            content_hash: content_hash.to_string(),
            tables: BTreeMap::new(),
            views: Vec::new(),
        }
    }

    #[test]
    fn hash_prefix_is_cut_short() {
        assert_eq!(info("abcdef0123456789").hash_prefix(), "abcdef0");
        assert_eq!(info("abc").hash_prefix(), "abc");
    }

    #[test]
    fn hash_prefix_survives_loaded_non_hex_hashes() {
        // An inspect file is free to carry anything in this field
        let odd = info("ééééé");
        assert_eq!(odd.hash_prefix(), "ééééé");
    }
}
