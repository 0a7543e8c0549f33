//! In-memory journal table.

use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use rowline_engine::engine::{Record, Schema};

use super::{persistable, stored_identity};
use crate::error::{Error, Result};
use crate::provider::{ItemsProvider, RowStore, identity_of};

/// One table held in a concurrent map keyed by identity.
pub struct MemoryStore {
    table: String,
    records: DashMap<i64, Record>,
    last_id: AtomicI64,
}

impl MemoryStore {
    pub fn new(table: &str) -> MemoryStore {
        MemoryStore {
            table: table.to_string(),
            records: DashMap::new(),
            last_id: AtomicI64::new(0),
        }
    }

    /// Seed the table with already persisted records.
    pub fn with_records(table: &str, records: Vec<Record>, schema: &Schema) -> MemoryStore {
        let store = MemoryStore::new(table);
        for record in records {
            let id = match stored_identity(&record, schema) {
                id if id > 0 => id,
                _ => store.next_id(),
            };
            store.last_id.fetch_max(id, Ordering::SeqCst);
            store.records.insert(id, persistable(&record, schema, id));
        }
        store
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn get(&self, id: i64) -> Option<Record> {
        self.records.get(&id).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn next_id(&self) -> i64 {
        self.last_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl ItemsProvider for MemoryStore {
    fn fetch_count(&self) -> Result<usize> {
        Ok(self.records.len())
    }

    fn fetch_range(&self, offset: usize, limit: usize) -> Result<Vec<Record>> {
        let mut ids: Vec<i64> = self.records.iter().map(|e| *e.key()).collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        Ok(ids
            .into_iter()
            .skip(offset)
            .take(limit)
            .filter_map(|id| self.get(id))
            .collect())
    }
}

impl RowStore for MemoryStore {
    fn upsert(&self, table: &str, record: &Record, schema: &Schema) -> Result<Option<i64>> {
        if table != self.table {
            return Err(Error::UnknownTable(table.to_string()));
        }
        match identity_of(record, schema) {
            Some(id) => {
                let Some(mut entry) = self.records.get_mut(&id) else {
                    return Err(Error::Provider(format!("no record with identity {}", id)));
                };
                *entry = persistable(record, schema, id);
                Ok(None)
            }
            None => {
                let id = self.next_id();
                self.records.insert(id, persistable(record, schema, id));
                Ok(Some(id))
            }
        }
    }
}
