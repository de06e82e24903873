//! Output formatting for CLI commands.

use comfy_table::{Cell, Color, ContentArrangement, Table};
use serde::Serialize;
use serde_json::{Map, Value as Json};
use tapline_common::types::{Row, RowSchema, Value};

/// Output format selection.
#[derive(Clone, Copy)]
pub enum Format {
    Table,
    Json,
}

impl From<crate::OutputFormat> for Format {
    fn from(f: crate::OutputFormat) -> Self {
        match f {
            crate::OutputFormat::Table => Format::Table,
            crate::OutputFormat::Json => Format::Json,
        }
    }
}

/// Print any serializable value as pretty JSON.
pub fn print_json<T: Serialize>(data: &T, quiet: bool) -> anyhow::Result<()> {
    if !quiet {
        println!("{}", serde_json::to_string_pretty(data)?);
    }
    Ok(())
}

/// Create a styled table with consistent formatting.
pub fn create_table() -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.load_preset(comfy_table::presets::UTF8_FULL_CONDENSED);
    table
}

/// Add a header row to a table.
pub fn add_header(table: &mut Table, headers: &[&str]) {
    table.set_header(
        headers
            .iter()
            .map(|h| Cell::new(h).fg(Color::Cyan))
            .collect::<Vec<_>>(),
    );
}

/// Print a key-value table (for summaries).
pub fn print_key_value_table(items: &[(&str, String)], format: Format, quiet: bool) -> anyhow::Result<()> {
    if quiet {
        return Ok(());
    }

    match format {
        Format::Json => {
            let map: Map<String, Json> = items
                .iter()
                .map(|(k, v)| ((*k).to_string(), Json::String(v.clone())))
                .collect();
            println!("{}", serde_json::to_string_pretty(&map)?);
        }
        Format::Table => {
            let mut table = create_table();
            add_header(&mut table, &["Property", "Value"]);
            for (key, value) in items {
                table.add_row(vec![Cell::new(key).fg(Color::Green), Cell::new(value)]);
            }
            println!("{table}");
        }
    }
    Ok(())
}

/// Render result rows as a table, nulls shown as `NULL`.
pub fn rows_table(schema: &RowSchema, rows: &[Row]) -> Table {
    let mut table = create_table();
    add_header(&mut table, &schema.names());
    for row in rows {
        table.add_row(
            row.values()
                .iter()
                .map(|v| match v {
                    Value::Null => Cell::new("NULL").fg(Color::DarkGrey),
                    other => Cell::new(other.to_string()),
                })
                .collect::<Vec<_>>(),
        );
    }
    table
}

/// Render result rows as JSON objects keyed by column name.
pub fn rows_json(schema: &RowSchema, rows: &[Row]) -> Vec<Json> {
    rows.iter()
        .map(|row| {
            let object: Map<String, Json> = schema
                .names()
                .into_iter()
                .zip(row.values())
                .map(|(name, value)| (name.to_string(), value.to_json()))
                .collect();
            Json::Object(object)
        })
        .collect()
}

/// Print a status message (respects quiet mode).
pub fn status(msg: &str, quiet: bool) {
    if !quiet {
        eprintln!("{msg}");
    }
}

/// Print a success message.
pub fn success(msg: &str, quiet: bool) {
    if !quiet {
        println!("✓ {msg}");
    }
}

/// Print an error message.
pub fn error(msg: &str) {
    eprintln!("✗ {msg}");
}
