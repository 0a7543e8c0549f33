//! Page cache over an [`ItemsProvider`].
//!
//! Persisted rows are fetched in fixed-size pages keyed by
//! `index / page_size`. A page that is being fetched is installed up front
//! as a full page of distinct loading placeholders, which both answers
//! `get` immediately and suppresses duplicate requests. When the fetch
//! completes the placeholders are replaced slot by slot, with one
//! [`CollectionChange::Replace`] per slot in ascending order.
//!
//! Loaded pages expire once they have not been touched for the TTL; pages
//! still in flight never expire. The persisted row count is loaded the same
//! way and announced with a single [`CollectionChange::Reset`].
//!
//! Every reset bumps an epoch; completions carrying an older epoch are
//! dropped unapplied.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rowline_engine::engine::{EventQueue, Record, Row};

use crate::changes::{ChangeLog, CollectionChange};
use crate::dispatch::{Completion, Dispatcher};
use crate::error::Result;
use crate::provider::ItemsProvider;

/// Time source for page expiry.
pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Clone, Debug)]
pub struct ManualClock(Rc<Cell<Instant>>);

impl ManualClock {
    pub fn new() -> ManualClock {
        ManualClock(Rc::new(Cell::new(Instant::now())))
    }

    pub fn advance(&self, by: Duration) {
        self.0.set(self.0.get() + by);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.0.get()
    }
}

enum PageState {
    /// Fetch in flight; one placeholder per slot.
    Loading(Vec<Row>),
    /// Real rows, possibly fewer than `page_size` on the last page.
    Loaded(Vec<Row>),
}

struct Page {
    state: PageState,
    touched: Instant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CountState {
    Unknown,
    Loading,
    Known(usize),
}

pub struct PageCache {
    provider: Arc<dyn ItemsProvider>,
    dispatcher: Rc<Dispatcher>,
    clock: Rc<dyn Clock>,
    page_size: usize,
    ttl: Duration,
    pages: HashMap<usize, Page>,
    count: CountState,
    epoch: u64,
    changes: ChangeLog,
    events: EventQueue,
}

impl PageCache {
    pub fn new(
        provider: Arc<dyn ItemsProvider>,
        dispatcher: Rc<Dispatcher>,
        clock: Rc<dyn Clock>,
        page_size: usize,
        ttl: Duration,
        changes: ChangeLog,
        events: EventQueue,
    ) -> PageCache {
        PageCache {
            provider,
            dispatcher,
            clock,
            page_size: page_size.max(1),
            ttl,
            pages: HashMap::new(),
            count: CountState::Unknown,
            epoch: 0,
            changes,
            events,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Persisted row count, or None while it is unknown.
    pub fn known_count(&self) -> Option<usize> {
        match self.count {
            CountState::Known(n) => Some(n),
            _ => None,
        }
    }

    /// Persisted row count; 0 until it resolves. Starts a load when unknown.
    pub fn persisted_count(&mut self) -> usize {
        if self.count == CountState::Unknown {
            self.load_count();
        }
        self.known_count().unwrap_or(0)
    }

    /// Start a count fetch unless one is in flight.
    pub fn load_count(&mut self) {
        if self.count == CountState::Loading {
            return;
        }
        self.count = CountState::Loading;
        let provider = self.provider.clone();
        let epoch = self.epoch;
        self.dispatcher.dispatch("count", move || Completion::Count {
            epoch,
            result: provider.fetch_count(),
        });
    }

    /// Row at a persisted index: the cached row, or a loading placeholder.
    pub fn get(&mut self, index: usize) -> Row {
        let page_index = index / self.page_size;
        let offset = index % self.page_size;
        let now = self.clock.now();

        if let Some(page) = self.pages.get_mut(&page_index) {
            page.touched = now;
            let slot = match &page.state {
                PageState::Loading(rows) | PageState::Loaded(rows) => rows.get(offset).cloned(),
            };
            return slot.unwrap_or_else(Row::loading);
        }

        self.request_page(page_index);
        match self.pages.get(&page_index).map(|p| &p.state) {
            Some(PageState::Loading(rows)) => rows.get(offset).cloned().unwrap_or_else(Row::loading),
            _ => Row::loading(),
        }
    }

    /// Fetch a page unless it is cached or already in flight.
    pub fn request_page(&mut self, page_index: usize) {
        if self.pages.contains_key(&page_index) {
            return;
        }

        let placeholders = (0..self.page_size).map(|_| Row::loading()).collect();
        self.pages.insert(
            page_index,
            Page {
                state: PageState::Loading(placeholders),
                touched: self.clock.now(),
            },
        );

        let provider = self.provider.clone();
        let epoch = self.epoch;
        let offset = page_index * self.page_size;
        let limit = self.page_size;
        log::debug!("fetching page {} ({}..{})", page_index, offset, offset + limit);
        self.dispatcher.dispatch("page", move || Completion::Page {
            epoch,
            page: page_index,
            result: provider.fetch_range(offset, limit),
        });
    }

    /// Apply a completion. Completions this cache does not own are handed back.
    pub fn apply(&mut self, completion: Completion) -> Option<Completion> {
        match completion {
            Completion::Count { epoch, result } => {
                if epoch != self.epoch {
                    log::debug!("dropping count from epoch {}", epoch);
                } else {
                    self.complete_count(result);
                }
                None
            }
            Completion::Page {
                epoch,
                page,
                result,
            } => {
                if epoch != self.epoch {
                    log::debug!("dropping page {} from epoch {}", page, epoch);
                } else {
                    self.complete_page(page, result);
                }
                None
            }
            other => Some(other),
        }
    }

    fn complete_count(&mut self, result: Result<usize>) {
        match result {
            Ok(count) => {
                self.count = CountState::Known(count);
                self.changes.push(CollectionChange::Reset);
            }
            Err(e) => {
                log::warn!("count fetch failed: {}", e);
                self.count = CountState::Unknown;
            }
        }
    }

    /// Install a fetched page, replacing its placeholders.
    pub fn complete_page(&mut self, page_index: usize, result: Result<Vec<Record>>) {
        let records = match result {
            Ok(records) => records,
            Err(e) => {
                log::warn!("page {} fetch failed: {}", page_index, e);
                self.pages.remove(&page_index);
                return;
            }
        };

        let rows: Vec<Row> = records
            .into_iter()
            .take(self.page_size)
            .map(|record| {
                let row = Row::from_record(record);
                row.subscribe(&self.events);
                row
            })
            .collect();

        let now = self.clock.now();
        let previous = self.pages.insert(
            page_index,
            Page {
                state: PageState::Loaded(rows.clone()),
                touched: now,
            },
        );

        let base = page_index * self.page_size;
        for (offset, new) in rows.into_iter().enumerate() {
            let old = match &previous {
                Some(Page {
                    state: PageState::Loading(placeholders) | PageState::Loaded(placeholders),
                    ..
                }) => placeholders.get(offset).cloned(),
                None => None,
            }
            .unwrap_or_else(Row::loading);
            self.changes.push(CollectionChange::Replace {
                old,
                new,
                index: base + offset,
            });
        }

        self.evict_stale(now);
    }

    /// Drop loaded pages not touched within the TTL. Returns how many were dropped.
    pub fn evict_stale(&mut self, now: Instant) -> usize {
        let ttl = self.ttl;
        let before = self.pages.len();
        self.pages.retain(|_, page| match page.state {
            PageState::Loading(_) => true,
            PageState::Loaded(_) => now.saturating_duration_since(page.touched) <= ttl,
        });
        let evicted = before - self.pages.len();
        if evicted > 0 {
            log::debug!("evicted {} stale page(s)", evicted);
        }
        evicted
    }

    pub fn is_cached(&self, page_index: usize) -> bool {
        self.pages.contains_key(&page_index)
    }

    pub fn is_loading(&self, page_index: usize) -> bool {
        matches!(
            self.pages.get(&page_index),
            Some(Page {
                state: PageState::Loading(_),
                ..
            })
        )
    }

    /// Persisted index of a loaded row.
    pub fn index_of(&self, row: &Row) -> Option<usize> {
        self.pages.iter().find_map(|(page_index, page)| match &page.state {
            PageState::Loaded(rows) => rows
                .iter()
                .position(|r| r.ptr_eq(row))
                .map(|offset| page_index * self.page_size + offset),
            PageState::Loading(_) => None,
        })
    }

    /// Forget every page and the count, and ignore completions already in flight.
    pub fn reset(&mut self) {
        self.epoch += 1;
        for page in self.pages.values() {
            if let PageState::Loaded(rows) = &page.state {
                rows.iter().for_each(Row::unsubscribe);
            }
        }
        self.pages.clear();
        self.count = CountState::Unknown;
    }
}
