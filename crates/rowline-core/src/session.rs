//! The change orchestrator.
//!
//! A [`Session`] binds one journal table to its template. It owns the
//! calculator, the virtualized row sequence and the row event queue, and it
//! is the only place where edits turn into rule runs, recomputes and saves.
//!
//! Everything here runs on the thread that owns the session. Provider calls
//! go through the dispatcher and come back when the session is pumped.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use rowline_engine::engine::{
    Calculator, ChangeOrigin, ColumnType, EventQueue, Record, Row, RowEvent, Schema, Template,
    Value,
};

use crate::cache::{Clock, PageCache, SystemClock};
use crate::changes::{ChangeLog, Notification};
use crate::dispatch::{Completion, Dispatcher, Spawn, ThreadSpawner};
use crate::error::{Error, FieldError, Result};
use crate::provider::{ItemsProvider, RowStore, identity_of};
use crate::rows::{PlaceholderFactory, VirtualRows};
use crate::settings::Settings;

pub struct SessionOptions {
    /// Table name passed to the store; defaults to the template id.
    pub table: Option<String>,
    pub settings: Settings,
    pub spawner: Box<dyn Spawn>,
    pub clock: Rc<dyn Clock>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            table: None,
            settings: Settings::default(),
            spawner: Box::new(ThreadSpawner),
            clock: Rc::new(SystemClock),
        }
    }
}

/// What a commit did.
#[derive(Debug)]
pub enum CommitOutcome {
    /// The placeholder was untouched or empty; nothing was saved.
    Discarded,
    /// An upsert for this row is in flight.
    Submitted(Row),
}

struct PendingSave {
    row: Row,
    is_new: bool,
}

type SessionValues = Rc<RefCell<HashMap<String, Value>>>;

pub struct Session {
    template: Arc<Template>,
    schema: Arc<Schema>,
    table: String,
    settings: Settings,
    calculator: Rc<Calculator>,
    rows: VirtualRows,
    dispatcher: Rc<Dispatcher>,
    store: Arc<dyn RowStore>,
    events: EventQueue,
    session_values: SessionValues,
    notifications: Vec<Notification>,
    pending_saves: HashMap<u64, PendingSave>,
    next_ticket: u64,
}

impl Session {
    pub fn new(
        template: Arc<Template>,
        provider: Arc<dyn ItemsProvider>,
        store: Arc<dyn RowStore>,
        options: SessionOptions,
    ) -> Result<Session> {
        let schema = Arc::new(template.schema());
        let calculator = Rc::new(Calculator::new(schema.clone())?);
        let session_values: SessionValues =
            Rc::new(RefCell::new(template.default_session_values()));

        let dispatcher = Rc::new(Dispatcher::new(options.spawner));
        let changes = ChangeLog::new();
        let events = EventQueue::new();
        let cache = PageCache::new(
            provider,
            dispatcher.clone(),
            options.clock,
            options.settings.page_size,
            options.settings.page_ttl(),
            changes.clone(),
            events.clone(),
        );
        let factory = placeholder_factory(calculator.clone(), session_values.clone());
        let rows = VirtualRows::new(cache, dispatcher.clone(), factory, changes, events.clone());

        let table = options.table.unwrap_or_else(|| template.id.clone());
        log::debug!(
            "session for table {} with {} columns",
            table,
            schema.columns.len()
        );

        Ok(Session {
            template,
            schema,
            table,
            settings: options.settings,
            calculator,
            rows,
            dispatcher,
            store,
            events,
            session_values,
            notifications: Vec::new(),
            pending_saves: HashMap::new(),
            next_ticket: 0,
        })
    }

    pub fn template(&self) -> &Arc<Template> {
        &self.template
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn calculator(&self) -> &Calculator {
        &self.calculator
    }

    pub fn rows(&self) -> &VirtualRows {
        &self.rows
    }

    pub fn item_count(&mut self) -> usize {
        self.rows.item_count()
    }

    pub fn item(&mut self, index: usize) -> Option<Row> {
        self.rows.item(index)
    }

    pub fn placeholder(&self) -> Row {
        self.rows.placeholder()
    }

    pub fn session_values(&self) -> HashMap<String, Value> {
        self.session_values.borrow().clone()
    }

    /// Update session constants. An untouched placeholder is rebuilt so it
    /// picks up the new defaults.
    pub fn set_session_values(&mut self, values: HashMap<String, Value>) {
        {
            let mut current = self.session_values.borrow_mut();
            for (key, value) in values {
                let kind = self
                    .template
                    .constants
                    .iter()
                    .find(|c| c.key == key)
                    .map(|c| c.kind);
                let value = match kind {
                    Some(kind) => value.coerce(kind).unwrap_or(value),
                    None => value,
                };
                current.insert(key, value);
            }
        }
        if !self.rows.placeholder().is_dirty() {
            self.rows.reset_placeholder();
        }
    }

    /// A new row with defaults applied and derived columns computed.
    pub fn create_row(&self) -> Row {
        let row = Row::from_record(initial_record(
            &self.calculator,
            &self.session_values.borrow(),
        ));
        row.mark_saved();
        row
    }

    /// Stage a row built elsewhere (usually by [`Session::create_row`]).
    pub fn add_row(&mut self, row: Row) -> Result<usize> {
        self.rows.append(row)
    }

    /// User edit. Runs the resulting rule/recompute cascade before returning.
    pub fn set_field(&mut self, row: &Row, field: &str, value: Value) -> Result<bool> {
        self.editable_kind(row, field)?;
        let changed = row.set_with_origin(field, value, ChangeOrigin::User);
        self.process_events();
        Ok(changed)
    }

    /// User edit from raw text, parsed for the column type.
    pub fn set_field_input(&mut self, row: &Row, field: &str, input: &str) -> Result<bool> {
        let kind = self.editable_kind(row, field)?;
        self.set_field(row, field, Value::from_input(input, kind))
    }

    fn editable_kind(&self, row: &Row, field: &str) -> Result<ColumnType> {
        if row.is_loading() {
            return Err(Error::LoadingRow);
        }
        if self.schema.is_identity(field) {
            return Err(Error::ReadOnlyField(field.to_string()));
        }
        let column = self
            .schema
            .column(field)
            .ok_or_else(|| Error::UnknownField(field.to_string()))?;
        if column.has_formula() || column.kind.is_decorative() {
            return Err(Error::ReadOnlyField(field.to_string()));
        }
        Ok(column.kind)
    }

    /// Whether a change to `field` should cascade into rules and a recompute.
    fn cascades(&self, field: &str) -> bool {
        !self.schema.is_identity(field)
            && self
                .schema
                .column(field)
                .is_some_and(|c| !c.has_formula() && !c.kind.is_decorative())
    }

    /// Drain the row event queue, running rules and recomputes for field
    /// changes made by the user or by a rule. Every drained event is
    /// forwarded as a notification.
    pub fn process_events(&mut self) {
        let max_depth = self.settings.max_cascade_depth;
        let mut passes: HashMap<usize, usize> = HashMap::new();

        while let Some(event) = self.events.pop() {
            let trigger = match &event {
                RowEvent::Field { row, field, origin }
                    if origin.triggers_rules() && !row.is_loading() && self.cascades(field) =>
                {
                    Some((row.clone(), field.clone()))
                }
                _ => None,
            };
            self.notify(Notification::Row(event));

            let Some((row, field)) = trigger else {
                continue;
            };
            let count = passes.entry(row.id()).or_insert(0);
            if *count >= max_depth {
                if *count == max_depth {
                    log::warn!(
                        "cascade depth {} exceeded at field {}; dropping further rule runs",
                        max_depth,
                        field
                    );
                    *count += 1;
                }
                continue;
            }
            *count += 1;

            if let Err(e) = self.calculator.apply_rules(&field, &row) {
                log::warn!("rules for {}: {}", field, e);
            }
            self.calculator.recompute(&row);
        }
    }

    /// Required data columns left empty. Formula, identity and section
    /// header columns are never required.
    pub fn validate(&self, row: &Row) -> Vec<FieldError> {
        self.schema
            .data_columns()
            .filter(|(_, c)| c.required && !c.has_formula())
            .filter(|(_, c)| row.get(&c.field).is_empty_for(c.kind))
            .map(|(_, c)| FieldError::new(&c.field, format!("{} is required", c.label())))
            .collect()
    }

    /// True when no data column holds a value.
    pub fn is_row_empty(&self, row: &Row) -> bool {
        self.schema
            .data_columns()
            .all(|(_, c)| row.get(&c.field).is_empty_for(c.kind))
    }

    /// Commit a row: discard an untouched placeholder, validate, promote
    /// the placeholder if needed, recompute and dispatch the upsert.
    pub fn commit(&mut self, row: &Row) -> Result<CommitOutcome> {
        if row.is_loading() {
            return Err(Error::LoadingRow);
        }

        let (target, is_new) = if row.is_new_placeholder() {
            if !row.ptr_eq(&self.rows.placeholder()) {
                return Err(Error::StalePlaceholder);
            }
            if !row.is_dirty() || self.is_row_empty(row) {
                log::debug!("discarding commit of an empty placeholder");
                return Ok(CommitOutcome::Discarded);
            }
            self.check_valid(row)?;
            (self.rows.promote_placeholder(), true)
        } else {
            self.check_valid(row)?;
            let is_new = identity_of(&row.to_record(), &self.schema).is_none();
            (row.clone(), is_new)
        };

        self.calculator.recompute(&target);
        self.process_events();

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        let store = self.store.clone();
        let schema = self.schema.clone();
        let table = self.table.clone();
        let record = target.to_record();
        self.dispatcher.dispatch("save", move || Completion::Save {
            ticket,
            result: store.upsert(&table, &record, &schema),
        });
        self.pending_saves.insert(
            ticket,
            PendingSave {
                row: target.clone(),
                is_new,
            },
        );
        Ok(CommitOutcome::Submitted(target))
    }

    fn check_valid(&self, row: &Row) -> Result<()> {
        let errors = self.validate(row);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(errors))
        }
    }

    /// Apply every completion queued so far.
    pub fn pump(&mut self) {
        let unhandled = self.rows.pump();
        self.finish(unhandled);
    }

    /// Wait up to `timeout` for one completion, then apply everything queued.
    pub fn pump_blocking(&mut self, timeout: Duration) {
        let unhandled = self.rows.pump_blocking(timeout);
        self.finish(unhandled);
    }

    /// Background jobs whose results have not been pumped yet.
    pub fn has_pending_work(&self) -> bool {
        self.dispatcher.outstanding() > 0
    }

    /// Everything that happened since the last call, in order.
    pub fn take_notifications(&mut self) -> Vec<Notification> {
        self.flush_changes();
        std::mem::take(&mut self.notifications)
    }

    fn finish(&mut self, completions: Vec<Completion>) {
        for completion in completions {
            match completion {
                Completion::Save { ticket, result } => self.complete_save(ticket, result),
                other => log::debug!("ignoring completion {:?}", other),
            }
        }
        self.process_events();
    }

    fn complete_save(&mut self, ticket: u64, result: Result<Option<i64>>) {
        let Some(PendingSave { row, is_new }) = self.pending_saves.remove(&ticket) else {
            log::warn!("save completion for unknown ticket {}", ticket);
            return;
        };

        match result {
            Ok(identity) => {
                if let Some(id) = identity {
                    row.set_with_origin(
                        &self.schema.identity_field,
                        Value::Integer(id),
                        ChangeOrigin::System,
                    );
                }
                row.mark_saved();
                if is_new {
                    // Replace at the tail the consumer still sees, before the reload.
                    if !self.rows.placeholder().is_dirty() {
                        self.rows.reset_placeholder();
                    }
                    self.rows.refresh_after_save();
                }
                self.notify(Notification::Saved { row, identity });
            }
            Err(e) => {
                log::warn!("save to {} failed: {}", self.table, e);
                row.mark_dirty();
                self.notify(Notification::SaveFailed {
                    row,
                    message: e.to_string(),
                });
            }
        }
    }

    fn notify(&mut self, notification: Notification) {
        self.flush_changes();
        self.notifications.push(notification);
    }

    fn flush_changes(&mut self) {
        self.notifications.extend(
            self.rows
                .take_changes()
                .into_iter()
                .map(Notification::Collection),
        );
    }
}

fn placeholder_factory(calculator: Rc<Calculator>, values: SessionValues) -> PlaceholderFactory {
    Rc::new(move || Row::new_placeholder(initial_record(&calculator, &values.borrow())))
}

/// Defaults for a fresh row: the column default, else the bound session
/// constant, else the type default. Derived columns are then computed.
fn initial_record(calculator: &Calculator, values: &HashMap<String, Value>) -> Record {
    let mut record = Record::new();
    for (_, column) in calculator.schema().data_columns() {
        if column.has_formula() {
            continue;
        }
        let value = column
            .default
            .as_ref()
            .map(|d| d.coerce(column.kind).unwrap_or_else(|_| d.clone()))
            .or_else(|| {
                column
                    .bind_constant
                    .as_ref()
                    .and_then(|key| values.get(key))
                    .cloned()
            })
            .unwrap_or_else(|| column.kind.default_value());
        record.insert(column.field.clone(), value);
    }
    for (field, value) in calculator.evaluate(&record) {
        record.insert(field, value);
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::changes::CollectionChange;
    use crate::dispatch::InlineSpawner;
    use crate::storage::MemoryStore;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const JOURNAL: &str = r#"
id = "journal"
title = "Purchases"

[[constants]]
key = "Buyer"
type = "Text"
default = "Ann"

[[columns]]
field = "Group"
type = "SectionHeader"

[[columns]]
field = "Item"
type = "Text"
required = true

[[columns]]
field = "Buyer"
type = "Text"
bind_constant = "Buyer"

[[columns]]
field = "Quantity"
type = "Number"
default = 1

[[columns]]
field = "Price"
type = "Currency"
on_change = [{ target = "Discount", expression = "IIF(Price > 100, 10, 0)" }]

[[columns]]
field = "Discount"
type = "Currency"

[[columns]]
field = "Total"
type = "Currency"
formula = "Quantity * Price - Discount"

[[columns]]
field = "Paid"
type = "Boolean"
"#;

    /// Memory store that counts upserts and can be told to fail them.
    struct TestStore {
        inner: MemoryStore,
        upserts: AtomicUsize,
        fail: Mutex<bool>,
    }

    impl TestStore {
        fn new() -> Arc<TestStore> {
            Arc::new(TestStore {
                inner: MemoryStore::new("journal"),
                upserts: AtomicUsize::new(0),
                fail: Mutex::new(false),
            })
        }
    }

    impl ItemsProvider for TestStore {
        fn fetch_count(&self) -> Result<usize> {
            self.inner.fetch_count()
        }

        fn fetch_range(&self, offset: usize, limit: usize) -> Result<Vec<Record>> {
            self.inner.fetch_range(offset, limit)
        }
    }

    impl RowStore for TestStore {
        fn upsert(&self, table: &str, record: &Record, schema: &Schema) -> Result<Option<i64>> {
            self.upserts.fetch_add(1, Ordering::SeqCst);
            if *self.fail.lock().unwrap() {
                return Err(Error::Provider("disk full".to_string()));
            }
            self.inner.upsert(table, record, schema)
        }
    }

    fn session_for(template: Template, settings: Settings) -> (Session, Arc<TestStore>) {
        let store = TestStore::new();
        let options = SessionOptions {
            table: None,
            settings,
            spawner: Box::new(InlineSpawner),
            clock: Rc::new(ManualClock::new()),
        };
        let session =
            Session::new(Arc::new(template), store.clone(), store.clone(), options).unwrap();
        (session, store)
    }

    fn journal() -> (Session, Arc<TestStore>) {
        session_for(
            Template::from_toml_str(JOURNAL).unwrap(),
            Settings::default(),
        )
    }

    fn chain_template(rules: &[(&str, &str, &str)]) -> Template {
        let mut columns = String::new();
        for field in ["A", "B", "C"] {
            columns.push_str(&format!("[[columns]]\nfield = \"{}\"\ntype = \"Number\"\n", field));
            for (source, target, expression) in rules {
                if *source == field {
                    columns.push_str(&format!(
                        "[[columns.on_change]]\ntarget = \"{}\"\nexpression = \"{}\"\n",
                        target, expression
                    ));
                }
            }
        }
        Template::from_toml_str(&format!("id = \"journal\"\n{}", columns)).unwrap()
    }

    #[test]
    fn test_placeholder_is_initialized_with_defaults() {
        let (session, _) = journal();
        let placeholder = session.placeholder();
        assert!(placeholder.is_new_placeholder());
        assert!(!placeholder.is_dirty());
        assert_eq!(placeholder.get("Quantity"), Value::Integer(1));
        assert_eq!(placeholder.get("Buyer"), Value::text("Ann"));
        assert_eq!(placeholder.get("Paid"), Value::Boolean(false));
        assert_eq!(placeholder.get("Total"), Value::Null);
        assert!(!placeholder.contains_key("Group"));
    }

    #[test]
    fn test_untouched_placeholder_commit_is_discarded() {
        let (mut session, store) = journal();
        session.item_count();
        session.pump();
        session.take_notifications();

        let placeholder = session.placeholder();
        let outcome = session.commit(&placeholder).unwrap();
        assert!(matches!(outcome, CommitOutcome::Discarded));
        session.pump();

        assert_eq!(store.upserts.load(Ordering::SeqCst), 0);
        assert_eq!(session.item_count(), 1);
        assert!(session.rows().staged().is_empty());
        assert!(session.placeholder().ptr_eq(&placeholder));
    }

    #[test]
    fn test_edit_runs_rules_then_recompute() {
        let (mut session, _) = journal();
        let row = session.placeholder();
        session.set_field(&row, "Price", Value::Decimal(150.0)).unwrap();

        assert_eq!(row.get("Discount"), Value::Decimal(10.0));
        assert_eq!(row.get("Total"), Value::Decimal(140.0));
        assert!(row.is_dirty());

        session.set_field_input(&row, "Quantity", "2").unwrap();
        assert_eq!(row.get("Total"), Value::Decimal(290.0));
    }

    #[test]
    fn test_read_only_and_unknown_fields_are_rejected() {
        let (mut session, _) = journal();
        let row = session.placeholder();
        assert!(matches!(
            session.set_field(&row, "Total", Value::Integer(1)),
            Err(Error::ReadOnlyField(_))
        ));
        assert!(matches!(
            session.set_field(&row, "Id", Value::Integer(1)),
            Err(Error::ReadOnlyField(_))
        ));
        assert!(matches!(
            session.set_field(&row, "Group", Value::text("x")),
            Err(Error::ReadOnlyField(_))
        ));
        assert!(matches!(
            session.set_field(&row, "Nope", Value::Integer(1)),
            Err(Error::UnknownField(_))
        ));
        assert!(matches!(
            session.set_field(&Row::loading(), "Item", Value::text("x")),
            Err(Error::LoadingRow)
        ));
    }

    #[test]
    fn test_validation_rejects_missing_required_field() {
        let (mut session, store) = journal();
        let row = session.placeholder();
        session.set_field(&row, "Price", Value::Decimal(3.0)).unwrap();

        let err = session.commit(&row).unwrap_err();
        let Error::Validation(errors) = err else {
            panic!("expected validation error, got {:?}", err);
        };
        assert_eq!(errors, vec![FieldError::new("Item", "Item is required")]);
        assert!(row.is_dirty());
        assert!(session.placeholder().ptr_eq(&row));
        assert_eq!(store.upserts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_commit_saves_and_resynchronizes() {
        let (mut session, store) = journal();
        session.item_count();
        session.pump();
        session.take_notifications();

        let placeholder = session.placeholder();
        session.set_field(&placeholder, "Item", Value::text("Pens")).unwrap();
        session.set_field(&placeholder, "Price", Value::Decimal(2.5)).unwrap();

        let CommitOutcome::Submitted(saved) = session.commit(&placeholder).unwrap() else {
            panic!("placeholder commit was discarded");
        };
        assert!(!saved.is_placeholder());
        assert!(!session.placeholder().ptr_eq(&placeholder));
        assert_eq!(session.rows().staged().len(), 1);
        assert!(session.has_pending_work());

        session.pump();
        assert_eq!(store.upserts.load(Ordering::SeqCst), 1);
        assert_eq!(saved.get("Id"), Value::Integer(1));
        assert!(!saved.is_dirty());
        assert!(session.rows().staged().is_empty());

        session.pump();
        assert!(!session.has_pending_work());
        assert_eq!(session.item_count(), 2);

        let notifications = session.take_notifications();
        assert!(notifications.iter().any(|n| matches!(
            n,
            Notification::Saved { identity: Some(1), row } if row.ptr_eq(&saved)
        )));
        let resets = notifications
            .iter()
            .filter(|n| matches!(n, Notification::Collection(CollectionChange::Reset)))
            .count();
        assert_eq!(resets, 1);

        let stored = store.inner.get(1).unwrap();
        assert_eq!(stored["Item"], Value::text("Pens"));
        assert_eq!(stored["Total"], Value::Decimal(2.5));
    }

    #[test]
    fn test_failed_save_keeps_row_dirty() {
        let (mut session, store) = journal();
        *store.fail.lock().unwrap() = true;

        let placeholder = session.placeholder();
        session.set_field(&placeholder, "Item", Value::text("Ink")).unwrap();
        let CommitOutcome::Submitted(row) = session.commit(&placeholder).unwrap() else {
            panic!("placeholder commit was discarded");
        };
        session.pump();

        assert!(row.is_dirty());
        assert_eq!(session.rows().staged().len(), 1);
        let notifications = session.take_notifications();
        assert!(notifications.iter().any(|n| matches!(
            n,
            Notification::SaveFailed { message, .. } if message.contains("disk full")
        )));
    }

    #[test]
    fn test_edit_of_persisted_row_updates_in_place() {
        let (mut session, store) = journal();
        let placeholder = session.placeholder();
        session.set_field(&placeholder, "Item", Value::text("Tape")).unwrap();
        session.commit(&placeholder).unwrap();
        session.pump();
        session.pump();

        assert_eq!(session.item_count(), 2);
        session.item(0);
        session.pump();
        let row = session.item(0).unwrap();
        assert_eq!(row.get("Item"), Value::text("Tape"));

        session.set_field(&row, "Quantity", Value::Integer(4)).unwrap();
        session.commit(&row).unwrap();
        session.pump();

        assert_eq!(store.inner.len(), 1);
        assert_eq!(store.inner.get(1).unwrap()["Quantity"], Value::Integer(4));
        assert!(!row.is_dirty());
    }

    #[test]
    fn test_rule_chain_cascades() {
        let template = chain_template(&[("A", "B", "A + 1"), ("B", "C", "B * 2")]);
        let (mut session, _) = session_for(template, Settings::default());
        let row = session.placeholder();
        session.set_field(&row, "A", Value::Integer(3)).unwrap();
        assert_eq!(row.get("B"), Value::Integer(4));
        assert_eq!(row.get("C"), Value::Integer(8));
    }

    #[test]
    fn test_rule_cycle_stops_at_cascade_depth() {
        let template = chain_template(&[("A", "B", "A + 1"), ("B", "A", "B + 1")]);
        let settings = Settings {
            max_cascade_depth: 5,
            ..Settings::default()
        };
        let (mut session, _) = session_for(template, settings);
        let row = session.placeholder();
        session.set_field(&row, "A", Value::Integer(1)).unwrap();

        assert_eq!(row.get("A"), Value::Integer(5));
        assert_eq!(row.get("B"), Value::Integer(6));
        assert!(session.events.is_empty());
    }

    #[test]
    fn test_session_values_feed_new_placeholder() {
        let (mut session, _) = journal();
        let before = session.placeholder();
        session.set_session_values(HashMap::from([(
            "Buyer".to_string(),
            Value::text("Bo"),
        )]));

        let after = session.placeholder();
        assert!(!after.ptr_eq(&before));
        assert_eq!(after.get("Buyer"), Value::text("Bo"));
        assert_eq!(session.create_row().get("Buyer"), Value::text("Bo"));
    }

    #[test]
    fn test_add_row_stages_created_row() {
        let (mut session, _) = journal();
        session.item_count();
        session.pump();
        let row = session.create_row();
        assert!(!row.is_dirty());
        assert_eq!(session.add_row(row.clone()).unwrap(), 0);
        assert!(session.item(0).unwrap().ptr_eq(&row));
        assert_eq!(session.item_count(), 2);
    }
}
