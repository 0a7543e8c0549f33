//! CSV-file journal table.
//!
//! The first line is a header naming the identity column and the schema's
//! data columns. Values are written in their canonical text form and read
//! back through the column type, so a file edited by hand still loads.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rowline_engine::engine::{Record, Schema, Value};

use super::{persistable, stored_identity};
use crate::error::{Error, Result};
use crate::provider::{ItemsProvider, RowStore, identity_of};

pub struct CsvStore {
    path: PathBuf,
    table: String,
    schema: Arc<Schema>,
    // Serializes read-modify-write cycles.
    lock: Mutex<()>,
}

impl CsvStore {
    /// Open `path`, creating it with a header row if it does not exist.
    pub fn open(path: &Path, table: &str, schema: Arc<Schema>) -> Result<CsvStore> {
        let store = CsvStore {
            path: path.to_path_buf(),
            table: table.to_string(),
            schema,
            lock: Mutex::new(()),
        };
        if !path.exists() {
            store.write_all(&[])?;
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn header(&self) -> Vec<String> {
        std::iter::once(self.schema.identity_field.clone())
            .chain(self.schema.data_columns().map(|(_, c)| c.field.clone()))
            .collect()
    }

    /// Every record in file order.
    pub fn read_all(&self) -> Result<Vec<Record>> {
        let content = std::fs::read_to_string(&self.path)?;
        let mut lines = parse_csv(&content)?.into_iter();
        let Some((_, header)) = lines.next() else {
            return Ok(Vec::new());
        };
        if !header.iter().any(|h| self.schema.is_identity(h)) {
            return Err(Error::Csv {
                line: 1,
                message: format!("missing identity column '{}'", self.schema.identity_field),
            });
        }

        let mut records = Vec::new();
        for (line, fields) in lines {
            if fields.iter().all(|f| f.is_empty()) {
                continue;
            }
            let mut record = Record::new();
            for (name, text) in header.iter().zip(fields) {
                if self.schema.is_identity(name) {
                    let id = text.trim().parse::<i64>().map_err(|_| Error::Csv {
                        line,
                        message: format!("invalid identity '{}'", text),
                    })?;
                    record.insert(self.schema.identity_field.clone(), Value::Integer(id));
                } else if let Some(column) = self.schema.column(name) {
                    let text = if column.kind.is_textual() {
                        unguard_formula(&text)
                    } else {
                        text.as_str()
                    };
                    record.insert(column.field.clone(), Value::from_input(text, column.kind));
                }
            }
            records.push(record);
        }
        Ok(records)
    }

    fn write_all(&self, records: &[Record]) -> Result<()> {
        let header = self.header();
        let tmp = self.path.with_extension("csv.tmp");
        {
            let mut file = std::fs::File::create(&tmp)?;
            let line: Vec<String> = header.iter().map(|h| escape_csv_field(h)).collect();
            writeln!(file, "{}", line.join(","))?;
            for record in records {
                let line: Vec<String> = header
                    .iter()
                    .map(|field| {
                        let textual = self.schema.column(field).is_some_and(|c| c.kind.is_textual());
                        match record.get(field) {
                            Some(Value::Text(s)) if textual => escape_csv_field(&guard_formula(s)),
                            Some(value) => escape_csv_field(&value.to_string()),
                            None => String::new(),
                        }
                    })
                    .collect();
                writeln!(file, "{}", line.join(","))?;
            }
            file.flush()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn sorted_newest_first(&self) -> Result<Vec<Record>> {
        let mut records = self.read_all()?;
        records.sort_by_key(|r| std::cmp::Reverse(stored_identity(r, &self.schema)));
        Ok(records)
    }
}

impl ItemsProvider for CsvStore {
    fn fetch_count(&self) -> Result<usize> {
        Ok(self.read_all()?.len())
    }

    fn fetch_range(&self, offset: usize, limit: usize) -> Result<Vec<Record>> {
        Ok(self
            .sorted_newest_first()?
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect())
    }
}

impl RowStore for CsvStore {
    fn upsert(&self, table: &str, record: &Record, schema: &Schema) -> Result<Option<i64>> {
        if table != self.table {
            return Err(Error::UnknownTable(table.to_string()));
        }
        let _guard = self
            .lock
            .lock()
            .map_err(|_| Error::Provider("csv store lock poisoned".to_string()))?;

        let mut records = self.read_all()?;
        let generated = match identity_of(record, schema) {
            Some(id) => {
                let Some(existing) = records
                    .iter_mut()
                    .find(|r| stored_identity(r, &self.schema) == id)
                else {
                    return Err(Error::Provider(format!("no record with identity {}", id)));
                };
                *existing = persistable(record, schema, id);
                None
            }
            None => {
                let id = records
                    .iter()
                    .map(|r| stored_identity(r, &self.schema))
                    .max()
                    .unwrap_or(0)
                    + 1;
                records.push(persistable(record, schema, id));
                Some(id)
            }
        };
        self.write_all(&records)?;
        Ok(generated)
    }
}

/// Split CSV content into records, honouring quoted fields that span lines.
/// Each record carries its 1-based starting line number.
pub(crate) fn parse_csv(content: &str) -> Result<Vec<(usize, Vec<String>)>> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut field_was_quoted = false;
    let mut line = 1;
    let mut record_line = 1;
    let mut chars = content.chars().peekable();

    let finish_field = |current: &mut String, quoted: bool, fields: &mut Vec<String>| {
        let field = std::mem::take(current);
        fields.push(if quoted { field } else { field.trim().to_string() });
    };

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                // Check for escaped quote
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                if c == '\n' {
                    line += 1;
                }
                current.push(c);
            }
            continue;
        }

        match c {
            '"' => {
                in_quotes = true;
                field_was_quoted = true;
            }
            ',' => {
                finish_field(&mut current, field_was_quoted, &mut fields);
                field_was_quoted = false;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                finish_field(&mut current, field_was_quoted, &mut fields);
                field_was_quoted = false;
                records.push((record_line, std::mem::take(&mut fields)));
                line += 1;
                record_line = line;
            }
            _ => current.push(c),
        }
    }

    if in_quotes {
        return Err(Error::Csv {
            line: record_line,
            message: "unterminated quoted field".to_string(),
        });
    }
    if !current.is_empty() || field_was_quoted || !fields.is_empty() {
        finish_field(&mut current, field_was_quoted, &mut fields);
        records.push((record_line, fields));
    }
    Ok(records)
}

/// Text that a spreadsheet would run as a formula, or that already starts
/// with the guard apostrophe and would otherwise lose it on read.
fn needs_guard(field: &str) -> bool {
    field.starts_with('\'')
        || matches!(
            field.trim_start_matches([' ', '\t']).chars().next(),
            Some('=' | '+' | '-' | '@')
        )
}

fn guard_formula(field: &str) -> String {
    // Guard against CSV formula injection in spreadsheet apps.
    if needs_guard(field) {
        format!("'{}", field)
    } else {
        field.to_string()
    }
}

fn unguard_formula(field: &str) -> &str {
    match field.strip_prefix('\'') {
        Some(rest) if needs_guard(rest) => rest,
        _ => field,
    }
}

fn escape_csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
