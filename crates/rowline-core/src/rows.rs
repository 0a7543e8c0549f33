//! Virtualizing index space.
//!
//! One linear index over three regions, in order:
//!
//! ```text
//! [0, persisted)                   persisted rows, served by the page cache
//! [persisted, persisted + staged)  staged new rows, not yet saved
//! persisted + staged               the new-row placeholder
//! ```
//!
//! The sequence only grows at the tail. Inserting or removing anywhere else
//! would shift every page offset, so those calls fail with
//! [`Error::UnsupportedMutation`].

use std::rc::Rc;
use std::time::Duration;

use rowline_engine::engine::{EventQueue, Row};

use crate::cache::PageCache;
use crate::changes::{ChangeLog, CollectionChange};
use crate::dispatch::{Completion, Dispatcher};
use crate::error::{Error, Result};

/// Builds a fresh new-row placeholder.
pub type PlaceholderFactory = Rc<dyn Fn() -> Row>;

pub struct VirtualRows {
    cache: PageCache,
    dispatcher: Rc<Dispatcher>,
    staged: Vec<Row>,
    placeholder: Row,
    factory: PlaceholderFactory,
    changes: ChangeLog,
    events: EventQueue,
}

impl VirtualRows {
    /// `cache` must share `dispatcher`, `changes` and `events` with this index space.
    pub fn new(
        cache: PageCache,
        dispatcher: Rc<Dispatcher>,
        factory: PlaceholderFactory,
        changes: ChangeLog,
        events: EventQueue,
    ) -> VirtualRows {
        let placeholder = factory();
        placeholder.subscribe(&events);
        VirtualRows {
            cache,
            dispatcher,
            staged: Vec::new(),
            placeholder,
            factory,
            changes,
            events,
        }
    }

    /// Total number of visible rows. Starts a count load when unknown.
    pub fn item_count(&mut self) -> usize {
        self.cache.persisted_count() + self.staged.len() + 1
    }

    /// Row at `index`, or None past the tail.
    pub fn item(&mut self, index: usize) -> Option<Row> {
        let persisted = self.cache.persisted_count();
        let tail = persisted + self.staged.len();
        if index == tail {
            Some(self.placeholder.clone())
        } else if index > tail {
            None
        } else if index >= persisted {
            self.staged.get(index - persisted).cloned()
        } else {
            Some(self.cache.get(index))
        }
    }

    pub fn placeholder(&self) -> Row {
        self.placeholder.clone()
    }

    pub fn staged(&self) -> &[Row] {
        &self.staged
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    fn persisted(&self) -> usize {
        self.cache.known_count().unwrap_or(0)
    }

    fn tail_index(&self) -> usize {
        self.persisted() + self.staged.len()
    }

    /// Append a real row to the staged region. Returns its index.
    pub fn append(&mut self, row: Row) -> Result<usize> {
        if row.is_placeholder() {
            return Err(Error::PlaceholderAppend);
        }
        row.subscribe(&self.events);
        self.staged.push(row.clone());
        let index = self.tail_index() - 1;
        self.changes.push(CollectionChange::Add { item: row, index });
        Ok(index)
    }

    /// Only tail insertion is supported; it behaves like [`VirtualRows::append`].
    pub fn insert(&mut self, index: usize, row: Row) -> Result<usize> {
        let tail = self.tail_index();
        if index != tail {
            return Err(Error::UnsupportedMutation {
                index,
                count: tail + 1,
            });
        }
        self.append(row)
    }

    /// Always fails: rows cannot be removed by position.
    pub fn remove_at(&mut self, index: usize) -> Result<Row> {
        Err(Error::UnsupportedMutation {
            index,
            count: self.tail_index() + 1,
        })
    }

    /// Remove a staged row. Returns its former index, or None if `row` is not visible here.
    pub fn remove(&mut self, row: &Row) -> Result<Option<usize>> {
        if let Some(position) = self.staged.iter().position(|r| r.ptr_eq(row)) {
            let index = self.persisted() + position;
            let item = self.staged.remove(position);
            item.unsubscribe();
            self.changes.push(CollectionChange::Remove { item, index });
            return Ok(Some(index));
        }
        match self.index_of(row) {
            Some(index) => Err(Error::UnsupportedMutation {
                index,
                count: self.tail_index() + 1,
            }),
            None => Ok(None),
        }
    }

    pub fn index_of(&self, row: &Row) -> Option<usize> {
        if row.ptr_eq(&self.placeholder) {
            return Some(self.tail_index());
        }
        if let Some(position) = self.staged.iter().position(|r| r.ptr_eq(row)) {
            return Some(self.persisted() + position);
        }
        self.cache.index_of(row)
    }

    pub fn contains(&self, row: &Row) -> bool {
        self.index_of(row).is_some()
    }

    /// Turn the placeholder into a staged row and open a fresh placeholder.
    ///
    /// Emits `Replace` at the old placeholder index (placeholder → staged
    /// row) followed by `Add` of the new placeholder at the next index.
    pub fn promote_placeholder(&mut self) -> Row {
        let index = self.tail_index();
        let old = self.placeholder.clone();
        old.unsubscribe();

        let promoted = Row::from_record(old.to_record());
        promoted.mark_dirty();
        promoted.subscribe(&self.events);
        self.staged.push(promoted.clone());

        let fresh = (self.factory)();
        fresh.subscribe(&self.events);
        self.placeholder = fresh.clone();

        self.changes.push(CollectionChange::Replace {
            old,
            new: promoted.clone(),
            index,
        });
        self.changes.push(CollectionChange::Add {
            item: fresh,
            index: index + 1,
        });
        promoted
    }

    /// Swap in a freshly built placeholder, e.g. after defaults changed.
    pub fn reset_placeholder(&mut self) -> Row {
        let old = std::mem::replace(&mut self.placeholder, (self.factory)());
        old.unsubscribe();
        self.placeholder.subscribe(&self.events);
        self.changes.push(CollectionChange::Replace {
            old,
            new: self.placeholder.clone(),
            index: self.tail_index(),
        });
        self.placeholder.clone()
    }

    /// Resynchronize with the store after a staged row was persisted.
    ///
    /// Drops staged rows and every cached page, forgets the persisted count
    /// and reloads it. The placeholder stays and moves to the new tail.
    /// The reloaded count announces the single [`CollectionChange::Reset`].
    pub fn refresh_after_save(&mut self) {
        for row in self.staged.drain(..) {
            row.unsubscribe();
        }
        self.cache.reset();
        self.cache.load_count();
    }

    /// Drop everything loaded or staged and reload the count.
    pub fn clear(&mut self) {
        self.refresh_after_save();
    }

    /// Apply every completion queued so far. Completions that do not belong
    /// to the cache (saves) are returned to the caller.
    pub fn pump(&mut self) -> Vec<Completion> {
        let mut unhandled = Vec::new();
        while let Some(completion) = self.dispatcher.try_recv() {
            unhandled.extend(self.cache.apply(completion));
        }
        unhandled
    }

    /// Like [`VirtualRows::pump`], but first waits up to `timeout` for one completion.
    pub fn pump_blocking(&mut self, timeout: Duration) -> Vec<Completion> {
        let mut unhandled = Vec::new();
        if let Some(completion) = self.dispatcher.recv_timeout(timeout) {
            unhandled.extend(self.cache.apply(completion));
        }
        unhandled.extend(self.pump());
        unhandled
    }

    pub fn take_changes(&self) -> Vec<CollectionChange> {
        self.changes.take()
    }
}
