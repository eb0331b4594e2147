mod csv;
mod json;

use crate::engine::HasResult;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub use self::csv::write_csv;
pub use json::{write_json, write_jsono};

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// The page as-is, rows as arrays
    Json,
    /// The page with each row as an object keyed by column name
    Jsono,
    /// Just the rows, with a header line
    Csv,
}

impl ExportFormat {
    /// Pick a format from a path suffix such as `.jsono`
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix.trim_start_matches('.') {
            "json" => Some(ExportFormat::Json),
            "jsono" => Some(ExportFormat::Jsono),
            "csv" => Some(ExportFormat::Csv),
            _ => None,
        }
    }
}

/// Render a page to `writer`
pub fn export<P, W>(page: &P, format: ExportFormat, writer: W) -> Result<()>
where
    P: Serialize + HasResult,
    W: Write,
{
    match format {
        ExportFormat::Json => write_json(page, writer),
        ExportFormat::Jsono => write_jsono(page, writer),
        ExportFormat::Csv => write_csv(page.result(), writer),
    }
}

/// Render a page into a new file at `output_path`
pub fn export_to_path<P>(page: &P, format: ExportFormat, output_path: &Path) -> Result<()>
where
    P: Serialize + HasResult,
{
    let file = File::create(output_path)
        .with_context(|| format!("Failed to create output file: {}", output_path.display()))?;
    let mut writer = BufWriter::new(file);
    export(page, format, &mut writer)?;
    writer.flush().context("Failed to flush output file")?;
    Ok(())
}
