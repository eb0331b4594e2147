use crate::db::functions::ScalarFunction;
use crate::db::{Error, Result};
use crate::registry::database_name;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Descriptive metadata shown alongside the data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub source: Option<String>,
    pub source_url: Option<String>,
    pub license: Option<String>,
    pub license_url: Option<String>,
}

impl Metadata {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Failed to read metadata {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            Error::Configuration(format!("Invalid metadata {}: {}", path.display(), e))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database files to serve
    pub files: Vec<PathBuf>,
    /// Threads executing SQL
    pub num_threads: usize,
    /// Rows per table page
    pub page_size: usize,
    /// Cap on rows returned by any single query
    pub max_returned_rows: usize,
    /// Default and maximum time a statement may run; requests can only lower it
    pub sql_time_limit_ms: u64,
    /// Pre-computed inspection output, loaded instead of scanning the files
    pub inspect_file: Option<PathBuf>,
    pub metadata: Metadata,
    #[serde(skip)]
    pub functions: Vec<ScalarFunction>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            num_threads: 3,
            page_size: 100,
            max_returned_rows: 1000,
            sql_time_limit_ms: 1000,
            inspect_file: None,
            metadata: Metadata::default(),
            functions: Vec::new(),
        }
    }
}

impl Config {
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self {
            files,
            ..Self::default()
        }
    }

    /// Attach a scalar function to every connection
    pub fn with_function(mut self, function: ScalarFunction) -> Self {
        self.functions.push(function);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.files.is_empty() {
            return Err(Error::Configuration("No database files given".to_string()));
        }
        // Names come from file stems and must be unique
        let mut names = HashSet::new();
        for path in &self.files {
            let name = database_name(path)?;
            if !names.insert(name.clone()) {
                return Err(Error::Configuration(format!(
                    "Multiple files with the same name: {}",
                    name
                )));
            }
        }
        if self.num_threads == 0 {
            return Err(Error::Configuration("num_threads must be at least 1".to_string()));
        }
        if self.page_size == 0 {
            return Err(Error::Configuration("page_size must be at least 1".to_string()));
        }
        if self.sql_time_limit_ms == 0 {
            return Err(Error::Configuration(
                "sql_time_limit_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"files": ["a.db"], "page_size": 20}"#).unwrap();
        assert_eq!(config.page_size, 20);
        assert_eq!(config.num_threads, 3);
        assert_eq!(config.sql_time_limit_ms, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_unusable_settings() {
        assert!(Config::default().validate().is_err());
        let mut config = Config::new(vec![PathBuf::from("a.db")]);
        config.num_threads = 0;
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn duplicate_stems_are_rejected_before_any_scan() {
        // Neither file exists: the check only looks at names
        let config = Config::new(vec![
            PathBuf::from("/data/census.db"),
            PathBuf::from("/archive/census.sqlite"),
        ]);
        match config.validate() {
            Err(Error::Configuration(message)) => assert!(message.contains("census")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn metadata_reads_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        std::fs::write(&path, r#"{"title": "Fixtures", "license": "CC0"}"#).unwrap();
        let metadata = Metadata::from_file(&path).unwrap();
        assert_eq!(metadata.title.as_deref(), Some("Fixtures"));
        assert_eq!(metadata.license.as_deref(), Some("CC0"));
        assert_eq!(metadata.source, None);
    }
}
