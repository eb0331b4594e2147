use crate::engine::HasResult;
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::io::Write;

/// Write the page as pretty-printed JSON
pub fn write_json<P: Serialize, W: Write>(page: &P, mut writer: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, page).context("Failed to serialize JSON")?;
    writer.write_all(b"\n").context("Failed to write JSON")?;
    Ok(())
}

/// Write the page with `rows` replaced by objects keyed by column name
pub fn write_jsono<P, W>(page: &P, writer: W) -> Result<()>
where
    P: Serialize + HasResult,
    W: Write,
{
    let mut value = serde_json::to_value(page).context("Failed to serialize JSON")?;
    if let JsonValue::Object(fields) = &mut value {
        let rows = page
            .rows_as_objects()
            .into_iter()
            .map(JsonValue::Object)
            .collect();
        fields.insert("rows".to_string(), JsonValue::Array(rows));
    }
    write_json(&value, writer)
}
