use crate::types::{QueryResult, Value};
use anyhow::{Context, Result};
use std::io::Write;

/// Write the rows of `result` as CSV, header first
pub fn write_csv<W: Write>(result: &QueryResult, writer: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);

    writer
        .write_record(&result.columns)
        .context("Failed to write CSV header")?;

    for row in &result.rows {
        writer
            .write_record(row.iter().map(Value::to_key_string))
            .context("Failed to write CSV row")?;
    }

    writer.flush().context("Failed to flush CSV writer")?;
    Ok(())
}
