//! Markdown rendering of journal rows.

use std::io::{self, Write};

use rowline_core::{Row, Schema};
use rowline_engine::engine::{ColumnType, format_value};

/// Identity first, then every data column.
fn columns(schema: &Schema) -> Vec<(String, String, ColumnType)> {
    std::iter::once((
        schema.identity_field.clone(),
        schema.identity_field.clone(),
        ColumnType::Number,
    ))
    .chain(
        schema
            .data_columns()
            .map(|(_, c)| (c.field.clone(), c.label().to_string(), c.kind)),
    )
    .collect()
}

pub fn write_rows<W: Write>(out: &mut W, schema: &Schema, rows: &[Row]) -> io::Result<()> {
    let columns = columns(schema);

    write!(out, "|")?;
    for (_, label, _) in &columns {
        write!(out, " {} |", escape_markdown(label))?;
    }
    writeln!(out)?;

    write!(out, "|")?;
    for _ in &columns {
        write!(out, "---|")?;
    }
    writeln!(out)?;

    for row in rows {
        write!(out, "|")?;
        for (field, _, kind) in &columns {
            let display = if row.is_loading() {
                "…".to_string()
            } else {
                format_value(&row.get(field), *kind)
            };
            write!(out, " {} |", escape_markdown(&display))?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn escape_markdown(s: &str) -> String {
    s.replace('|', "\\|").replace('\n', " ")
}
