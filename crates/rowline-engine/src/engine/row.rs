//! Row handles with change notification.
//!
//! A [`Row`] is a cheap, clonable handle to one record's ordered field map.
//! Clones share storage, so the handle a view received for an index stays the
//! same object until the data source replaces it. Rows are confined to the
//! thread that owns the data source (`Rc`); plain [`Record`]s are what cross
//! thread boundaries to and from storage.
//!
//! Mutations that change a value mark the row dirty and push two
//! [`RowEvent`]s onto the row's [`EventQueue`], if it has one: a generic
//! `Indexer` event and a field-specific `Field` event.

use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use super::value::Value;

/// Plain field map, ordered by insertion.
pub type Record = IndexMap<String, Value>;

/// Prefix reserved for internal marker keys.
pub const INTERNAL_KEY_PREFIX: &str = "__";

pub fn is_internal_key(key: &str) -> bool {
    key.starts_with(INTERNAL_KEY_PREFIX)
}

/// What a row stands for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RowKind {
    /// Real data: persisted, or staged for saving.
    Record,
    /// Stand-in for a slot whose page has not arrived yet.
    Loading,
    /// The open slot at the tail that accepts a new row.
    NewPlaceholder,
}

/// Who caused a change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeOrigin {
    User,
    Rule,
    Recompute,
    /// Defaults, identities written back after a save, and similar bookkeeping.
    System,
}

impl ChangeOrigin {
    /// Whether a change from this origin should run on-change rules.
    pub fn triggers_rules(self) -> bool {
        matches!(self, ChangeOrigin::User | ChangeOrigin::Rule)
    }
}

/// Change notification emitted by a row.
#[derive(Clone, Debug)]
pub enum RowEvent {
    /// Something in the row changed.
    Indexer { row: Row, origin: ChangeOrigin },
    /// A specific field changed.
    Field {
        row: Row,
        field: String,
        origin: ChangeOrigin,
    },
}

impl RowEvent {
    pub fn row(&self) -> &Row {
        match self {
            RowEvent::Indexer { row, .. } | RowEvent::Field { row, .. } => row,
        }
    }

    pub fn origin(&self) -> ChangeOrigin {
        match self {
            RowEvent::Indexer { origin, .. } | RowEvent::Field { origin, .. } => *origin,
        }
    }
}

/// FIFO of row events, drained on the owning thread. Clones share the queue.
#[derive(Clone, Default)]
pub struct EventQueue(Rc<RefCell<VecDeque<RowEvent>>>);

impl EventQueue {
    pub fn new() -> EventQueue {
        EventQueue::default()
    }

    pub fn push(&self, event: RowEvent) {
        self.0.borrow_mut().push_back(event);
    }

    pub fn pop(&self) -> Option<RowEvent> {
        self.0.borrow_mut().pop_front()
    }

    pub fn drain(&self) -> Vec<RowEvent> {
        self.0.borrow_mut().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}

struct RowData {
    kind: RowKind,
    fields: Record,
    dirty: bool,
    events: Option<EventQueue>,
}

/// Shared handle to one row.
#[derive(Clone)]
pub struct Row(Rc<RefCell<RowData>>);

impl Row {
    fn with_kind(kind: RowKind, fields: Record) -> Row {
        Row(Rc::new(RefCell::new(RowData {
            kind,
            fields,
            dirty: false,
            events: None,
        })))
    }

    pub fn new() -> Row {
        Row::with_kind(RowKind::Record, Record::new())
    }

    pub fn from_record(fields: Record) -> Row {
        Row::with_kind(RowKind::Record, fields)
    }

    /// A fresh loading placeholder. Every call returns a distinct row.
    pub fn loading() -> Row {
        Row::with_kind(RowKind::Loading, Record::new())
    }

    pub fn new_placeholder(defaults: Record) -> Row {
        Row::with_kind(RowKind::NewPlaceholder, defaults)
    }

    pub fn kind(&self) -> RowKind {
        self.0.borrow().kind
    }

    pub fn is_loading(&self) -> bool {
        self.kind() == RowKind::Loading
    }

    pub fn is_new_placeholder(&self) -> bool {
        self.kind() == RowKind::NewPlaceholder
    }

    pub fn is_placeholder(&self) -> bool {
        self.kind() != RowKind::Record
    }

    /// Identity comparison: do both handles point at the same row?
    pub fn ptr_eq(&self, other: &Row) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Stable identity for the lifetime of the row.
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    /// Read a field. Absent keys read as null.
    pub fn get(&self, field: &str) -> Value {
        self.0.borrow().fields.get(field).cloned().unwrap_or_default()
    }

    pub fn contains_key(&self, field: &str) -> bool {
        self.0.borrow().fields.contains_key(field)
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.borrow().fields.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().fields.is_empty()
    }

    /// User edit. See [`Row::set_with_origin`].
    pub fn set(&self, field: &str, value: impl Into<Value>) -> bool {
        self.set_with_origin(field, value.into(), ChangeOrigin::User)
    }

    /// Assign a field. Returns whether the value changed.
    ///
    /// Assigning the current value emits nothing; an absent key is still
    /// materialized so the field shows up when the row is serialized.
    pub fn set_with_origin(&self, field: &str, value: Value, origin: ChangeOrigin) -> bool {
        let events = {
            let mut data = self.0.borrow_mut();
            let unchanged = match data.fields.get(field) {
                Some(current) => *current == value,
                None => value.is_null(),
            };
            if unchanged {
                if !data.fields.contains_key(field) {
                    data.fields.insert(field.to_string(), value);
                }
                return false;
            }
            data.fields.insert(field.to_string(), value);
            data.dirty = true;
            data.events.clone()
        };

        // Queue borrow is separate from the row borrow so observers may read the row.
        if let Some(queue) = events {
            queue.push(RowEvent::Indexer {
                row: self.clone(),
                origin,
            });
            queue.push(RowEvent::Field {
                row: self.clone(),
                field: field.to_string(),
                origin,
            });
        }
        true
    }

    /// Snapshot of the row's data, without internal marker keys.
    pub fn to_record(&self) -> Record {
        self.0
            .borrow()
            .fields
            .iter()
            .filter(|(k, _)| !is_internal_key(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        self.0.borrow().dirty
    }

    pub fn mark_dirty(&self) {
        self.0.borrow_mut().dirty = true;
    }

    /// Acknowledge that the current contents are persisted (or are defaults).
    pub fn mark_saved(&self) {
        self.0.borrow_mut().dirty = false;
    }

    /// Route this row's change events to `queue`.
    pub fn subscribe(&self, queue: &EventQueue) {
        self.0.borrow_mut().events = Some(queue.clone());
    }

    pub fn unsubscribe(&self) {
        self.0.borrow_mut().events = None;
    }

    pub fn is_subscribed(&self) -> bool {
        self.0.borrow().events.is_some()
    }
}

impl Default for Row {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.0.borrow();
        f.debug_struct("Row")
            .field("kind", &data.kind)
            .field("dirty", &data.dirty)
            .field("fields", &data.fields)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_key_reads_null() {
        let row = Row::new();
        assert_eq!(row.get("Missing"), Value::Null);
    }

    #[test]
    fn test_set_emits_indexer_then_field() {
        let queue = EventQueue::new();
        let row = Row::new();
        row.subscribe(&queue);

        assert!(row.set("Price", 10.5));
        assert!(row.is_dirty());

        let events = queue.drain();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], RowEvent::Indexer { origin: ChangeOrigin::User, .. }));
        match &events[1] {
            RowEvent::Field { row: r, field, .. } => {
                assert_eq!(field, "Price");
                assert!(r.ptr_eq(&row));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_setting_equal_value_is_silent() {
        let queue = EventQueue::new();
        let row = Row::from_record(Record::from([("Name".to_string(), Value::text("a"))]));
        row.subscribe(&queue);

        assert!(!row.set("Name", "a"));
        assert!(queue.is_empty());
        assert!(!row.is_dirty());
    }

    #[test]
    fn test_null_on_absent_key_materializes_silently() {
        let queue = EventQueue::new();
        let row = Row::new();
        row.subscribe(&queue);

        assert!(!row.set_with_origin("Note", Value::Null, ChangeOrigin::User));
        assert!(row.contains_key("Note"));
        assert!(queue.is_empty());
        assert!(!row.is_dirty());
    }

    #[test]
    fn test_to_record_skips_internal_keys() {
        let row = Row::new();
        row.set("__marker", true);
        row.set("Name", "x");
        let record = row.to_record();
        assert_eq!(record.len(), 1);
        assert_eq!(record.get("Name"), Some(&Value::text("x")));
    }

    #[test]
    fn test_loading_rows_are_distinct() {
        let a = Row::loading();
        let b = Row::loading();
        assert!(!a.ptr_eq(&b));
        assert!(a.ptr_eq(&a.clone()));
        assert_ne!(a.id(), b.id());
        assert!(a.is_placeholder());
    }

    #[test]
    fn test_mark_saved_clears_dirty() {
        let row = Row::new();
        row.set("A", 1_i64);
        assert!(row.is_dirty());
        row.mark_saved();
        assert!(!row.is_dirty());
    }
}
