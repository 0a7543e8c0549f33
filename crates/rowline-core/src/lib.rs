//! rowline-core - Virtualized paged rows, change orchestration and storage.

pub mod cache;
pub mod changes;
pub mod dispatch;
pub mod error;
pub mod provider;
pub mod rows;
pub mod session;
pub mod settings;
pub mod storage;

pub use cache::{Clock, ManualClock, PageCache, SystemClock};
pub use changes::{ChangeLog, CollectionChange, Notification};
pub use dispatch::{Completion, Dispatcher, InlineSpawner, Spawn, ThreadSpawner};
pub use error::{Error, FieldError, Result};
pub use provider::{ItemsProvider, RowStore};
pub use rows::{PlaceholderFactory, VirtualRows};
pub use session::{CommitOutcome, Session, SessionOptions};
pub use settings::Settings;
pub use storage::{CsvStore, MemoryStore};

pub use rowline_engine::engine::{Record, Row, RowEvent, Schema, Template, Value};
