//! Journal storage backends.
//!
//! Both backends implement [`ItemsProvider`](crate::provider::ItemsProvider)
//! and [`RowStore`](crate::provider::RowStore) for a single table.

mod csv;
mod memory;

pub use csv::CsvStore;
pub use memory::MemoryStore;

use rowline_engine::engine::{Record, Schema, Value};

/// The record as persisted: identity first, then every data column in
/// schema order. Section headers and internal keys are dropped.
pub(crate) fn persistable(record: &Record, schema: &Schema, identity: i64) -> Record {
    let mut out = Record::new();
    out.insert(schema.identity_field.clone(), Value::Integer(identity));
    for (_, column) in schema.data_columns() {
        let value = record.get(&column.field).cloned().unwrap_or_default();
        out.insert(column.field.clone(), value);
    }
    out
}

/// Identity stored in a persisted record.
pub(crate) fn stored_identity(record: &Record, schema: &Schema) -> i64 {
    record
        .get(&schema.identity_field)
        .and_then(Value::as_i64)
        .unwrap_or(0)
}
