//! Contracts for the persistence backend.
//!
//! The data source never owns storage. It reads through an
//! [`ItemsProvider`] and writes through a [`RowStore`], both called from
//! background jobs, so implementations must tolerate concurrent calls.

use rowline_engine::engine::{Record, Schema};

use crate::error::Result;

/// Read side: count and paged range fetches.
pub trait ItemsProvider: Send + Sync {
    fn fetch_count(&self) -> Result<usize>;

    /// Up to `limit` records starting at `offset`, newest (highest identity) first.
    fn fetch_range(&self, offset: usize, limit: usize) -> Result<Vec<Record>>;
}

/// Write side.
pub trait RowStore: Send + Sync {
    /// Insert or update one record.
    ///
    /// A record whose identity is a positive integer updates that record;
    /// anything else inserts a new one and returns its generated identity.
    fn upsert(&self, table: &str, record: &Record, schema: &Schema) -> Result<Option<i64>>;
}

/// Positive identity stored in `record`, if any. The identity key matches case-insensitively.
pub fn identity_of(record: &Record, schema: &Schema) -> Option<i64> {
    record
        .iter()
        .find(|(key, _)| schema.is_identity(key))
        .and_then(|(_, value)| value.as_i64())
        .filter(|id| *id > 0)
}
