//! Rowline - headless driver for schema-driven journals

mod cli;
mod config;
mod table;

use anyhow::{Context, Result, bail};
use std::env;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rowline_core::{CommitOutcome, CsvStore, Notification, Row, Session, SessionOptions};
use rowline_engine::engine::{SchemaCache, Template};

const STORE_TIMEOUT: Duration = Duration::from_secs(30);

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let args = match cli::parse_args(&args) {
        Ok(Some(args)) => args,
        Ok(None) => {
            cli::print_usage();
            return;
        }
        Err(message) => {
            eprintln!("Error: {}", message);
            cli::print_usage();
            std::process::exit(1);
        }
    };

    if let Err(e) = run(args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: cli::Args) -> Result<()> {
    let settings = config::load_settings(args.settings.as_deref())?;

    let templates = SchemaCache::new();
    let source = std::fs::read_to_string(&args.schema)
        .with_context(|| format!("failed to read template {}", args.schema.display()))?;
    let template = templates
        .get_or_load(&args.schema.to_string_lossy(), || Template::from_toml_str(&source))
        .with_context(|| format!("invalid template {}", args.schema.display()))?;

    let schema = Arc::new(template.schema());
    let store = Arc::new(
        CsvStore::open(&args.data, &template.id, schema)
            .with_context(|| format!("failed to open {}", args.data.display()))?,
    );
    let options = SessionOptions {
        settings,
        ..SessionOptions::default()
    };
    let mut session = Session::new(template, store.clone(), store, options)?;
    session.item_count();
    settle(&mut session)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();

    if args.assignments.is_empty() && !args.commit {
        let rows = list_page(&mut session, args.page)?;
        table::write_rows(&mut out, session.schema(), &rows)?;
        return Ok(());
    }

    let row = session.placeholder();
    for (field, value) in &args.assignments {
        session
            .set_field_input(&row, field, value)
            .with_context(|| format!("cannot set {}", field))?;
    }

    if !args.commit {
        table::write_rows(&mut out, session.schema(), &[row])?;
        return Ok(());
    }

    match session.commit(&row)? {
        CommitOutcome::Discarded => eprintln!("Nothing to commit: the new row is empty"),
        CommitOutcome::Submitted(saved) => {
            settle(&mut session)?;
            for notification in session.take_notifications() {
                if let Notification::SaveFailed { message, .. } = notification {
                    bail!("save failed: {}", message);
                }
            }
            table::write_rows(&mut out, session.schema(), &[saved])?;
        }
    }
    Ok(())
}

/// Pump until every background job has reported back.
fn settle(session: &mut Session) -> Result<()> {
    let deadline = Instant::now() + STORE_TIMEOUT;
    session.pump();
    while session.has_pending_work() {
        if Instant::now() >= deadline {
            bail!("timed out waiting for the journal store");
        }
        session.pump_blocking(Duration::from_millis(50));
    }
    Ok(())
}

fn list_page(session: &mut Session, page: usize) -> Result<Vec<Row>> {
    let page_size = session.settings().page_size;
    let persisted = session.rows().cache().known_count().unwrap_or(0);
    let start = page.saturating_mul(page_size);
    let end = start.saturating_add(page_size).min(persisted);

    for index in start..end {
        session.item(index);
    }
    settle(session)?;
    Ok((start..end).filter_map(|index| session.item(index)).collect())
}
