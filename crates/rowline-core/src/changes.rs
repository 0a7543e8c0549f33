//! Notifications delivered to the view layer.

use std::cell::RefCell;
use std::rc::Rc;

use rowline_engine::engine::{Row, RowEvent};

/// A change to the visible row sequence.
#[derive(Clone, Debug)]
pub enum CollectionChange {
    /// Everything may have changed; re-query the count and all items.
    Reset,
    Replace { old: Row, new: Row, index: usize },
    Add { item: Row, index: usize },
    Remove { item: Row, index: usize },
}

/// Anything the view layer may want to react to.
#[derive(Clone, Debug)]
pub enum Notification {
    Collection(CollectionChange),
    Row(RowEvent),
    Saved { row: Row, identity: Option<i64> },
    SaveFailed { row: Row, message: String },
}

/// Ordered log of collection changes, shared by the page cache and the index space.
#[derive(Clone, Default)]
pub struct ChangeLog(Rc<RefCell<Vec<CollectionChange>>>);

impl ChangeLog {
    pub fn new() -> ChangeLog {
        ChangeLog::default()
    }

    pub fn push(&self, change: CollectionChange) {
        self.0.borrow_mut().push(change);
    }

    pub fn take(&self) -> Vec<CollectionChange> {
        std::mem::take(&mut *self.0.borrow_mut())
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}
