//! End-to-end session tests over real background threads and a CSV journal.

use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rowline_core::{
    CollectionChange, CommitOutcome, CsvStore, MemoryStore, Notification, Session,
    SessionOptions, Settings, SystemClock, Template, ThreadSpawner, Value,
};

const TEMPLATE: &str = r#"
id = "stock"
title = "Stock movements"

[[columns]]
field = "Article"
type = "Text"
required = true

[[columns]]
field = "Quantity"
type = "Number"
default = 1

[[columns]]
field = "UnitPrice"
header = "Unit price"
type = "Currency"

[[columns]]
field = "Amount"
type = "Currency"
formula = "ROUND(Quantity * UnitPrice, 2)"
"#;

fn options(page_size: usize) -> SessionOptions {
    SessionOptions {
        table: None,
        settings: Settings {
            page_size,
            ..Settings::default()
        },
        spawner: Box::new(ThreadSpawner),
        clock: Rc::new(SystemClock),
    }
}

/// Pump until no background work is left.
fn settle(session: &mut Session) {
    let deadline = Instant::now() + Duration::from_secs(5);
    session.pump();
    while session.has_pending_work() {
        assert!(Instant::now() < deadline, "background work did not finish");
        session.pump_blocking(Duration::from_millis(50));
    }
}

fn add(session: &mut Session, article: &str, quantity: &str, price: &str) {
    let row = session.placeholder();
    session.set_field_input(&row, "Article", article).unwrap();
    session.set_field_input(&row, "Quantity", quantity).unwrap();
    session.set_field_input(&row, "UnitPrice", price).unwrap();
    let outcome = session.commit(&row).unwrap();
    assert!(matches!(outcome, CommitOutcome::Submitted(_)));
    settle(session);
}

#[test]
fn test_commit_persists_to_csv_and_reloads_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stock.csv");
    let template = Arc::new(Template::from_toml_str(TEMPLATE).unwrap());
    let store = Arc::new(CsvStore::open(&path, "stock", Arc::new(template.schema())).unwrap());

    let mut session = Session::new(template.clone(), store.clone(), store.clone(), options(2)).unwrap();
    session.item_count();
    settle(&mut session);
    assert_eq!(session.item_count(), 1);

    add(&mut session, "bolts", "3", "0.25");
    add(&mut session, "nuts", "10", "0.1");
    add(&mut session, "washers", "4", "0.05");
    assert_eq!(session.item_count(), 4);

    // Reopen: a fresh session sees what the first one saved.
    let mut reopened = Session::new(template, store.clone(), store, options(2)).unwrap();
    reopened.item_count();
    settle(&mut reopened);
    assert_eq!(reopened.item_count(), 4);

    for index in 0..3 {
        assert!(reopened.item(index).unwrap().is_loading());
    }
    settle(&mut reopened);

    let newest = reopened.item(0).unwrap();
    assert_eq!(newest.get("Article"), Value::text("washers"));
    assert_eq!(newest.get("Amount"), Value::Decimal(0.2));
    let oldest = reopened.item(2).unwrap();
    assert_eq!(oldest.get("Article"), Value::text("bolts"));
    assert_eq!(oldest.get("Id"), Value::Integer(1));
    assert!(reopened.item(3).unwrap().is_new_placeholder());

    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents.lines().next(), Some("Id,Article,Quantity,UnitPrice,Amount"));
    assert_eq!(contents.lines().count(), 4);
}

#[test]
fn test_page_loads_replace_slots_in_order() {
    let template = Template::from_toml_str(TEMPLATE).unwrap();
    let schema = template.schema();
    let records = (1..=5)
        .map(|i| {
            rowline_core::Record::from([
                ("Article".to_string(), Value::text(format!("item {}", i))),
                ("Quantity".to_string(), Value::Integer(i)),
            ])
        })
        .collect();
    let store = Arc::new(MemoryStore::with_records("stock", records, &schema));

    let mut session =
        Session::new(Arc::new(template), store.clone(), store, options(3)).unwrap();
    session.item_count();
    settle(&mut session);
    session.take_notifications();

    let placeholders: Vec<_> = (0..3).map(|i| session.item(i).unwrap()).collect();
    settle(&mut session);

    let replaced: Vec<usize> = session
        .take_notifications()
        .into_iter()
        .filter_map(|n| match n {
            Notification::Collection(CollectionChange::Replace { old, index, .. }) => {
                assert!(old.ptr_eq(&placeholders[index]));
                Some(index)
            }
            _ => None,
        })
        .collect();
    assert_eq!(replaced, vec![0, 1, 2]);
    assert_eq!(session.item(0).unwrap().get("Article"), Value::text("item 5"));
}

#[test]
fn test_empty_placeholder_commit_saves_nothing() {
    let store = Arc::new(MemoryStore::new("stock"));
    let template = Arc::new(Template::from_toml_str(TEMPLATE).unwrap());
    let mut session = Session::new(template, store.clone(), store.clone(), options(10)).unwrap();

    let placeholder = session.placeholder();
    assert!(matches!(
        session.commit(&placeholder).unwrap(),
        CommitOutcome::Discarded
    ));
    settle(&mut session);
    assert!(store.is_empty());
}
