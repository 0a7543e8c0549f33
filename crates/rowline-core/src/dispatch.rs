//! Background dispatch.
//!
//! Provider calls may block, so they run as jobs on a background context
//! provided by a [`Spawn`] implementation. A job never touches rows or the
//! cache: it produces a [`Completion`] that travels back over a channel and
//! is applied by whoever owns the data source, on its own thread, when it
//! pumps the [`Dispatcher`].

use std::cell::Cell;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::time::Duration;

use rowline_engine::engine::Record;

use crate::error::Result;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs jobs somewhere other than the caller's stack frame.
pub trait Spawn {
    fn spawn(&self, name: &str, job: Job);
}

impl<S: Spawn + ?Sized> Spawn for Box<S> {
    fn spawn(&self, name: &str, job: Job) {
        (**self).spawn(name, job)
    }
}

/// One named OS thread per job.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadSpawner;

impl Spawn for ThreadSpawner {
    fn spawn(&self, name: &str, job: Job) {
        let spawned = std::thread::Builder::new()
            .name(format!("rowline-{}", name))
            .spawn(job);
        if let Err(e) = spawned {
            log::error!("failed to spawn {} job: {}", name, e);
        }
    }
}

/// Runs the job immediately on the calling thread. Results are still only
/// delivered through the completion channel, so ordering matches the
/// threaded case with an instantly answering provider.
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineSpawner;

impl Spawn for InlineSpawner {
    fn spawn(&self, _name: &str, job: Job) {
        job();
    }
}

/// Result of a background job, applied on the owning thread.
#[derive(Debug)]
pub enum Completion {
    Count {
        epoch: u64,
        result: Result<usize>,
    },
    Page {
        epoch: u64,
        page: usize,
        result: Result<Vec<Record>>,
    },
    Save {
        ticket: u64,
        result: Result<Option<i64>>,
    },
}

pub struct Dispatcher {
    spawner: Box<dyn Spawn>,
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
    outstanding: Cell<usize>,
}

impl Dispatcher {
    pub fn new(spawner: impl Spawn + 'static) -> Dispatcher {
        let (tx, rx) = channel();
        Dispatcher {
            spawner: Box::new(spawner),
            tx,
            rx,
            outstanding: Cell::new(0),
        }
    }

    /// Run `job` in the background; its completion is queued for the next pump.
    pub fn dispatch<F>(&self, name: &str, job: F)
    where
        F: FnOnce() -> Completion + Send + 'static,
    {
        let tx = self.tx.clone();
        self.outstanding.set(self.outstanding.get() + 1);
        self.spawner.spawn(
            name,
            Box::new(move || {
                // The receiver is gone only when the data source was dropped.
                let _ = tx.send(job());
            }),
        );
    }

    /// Next queued completion, without waiting.
    pub fn try_recv(&self) -> Option<Completion> {
        let completion = self.rx.try_recv().ok()?;
        self.received();
        Some(completion)
    }

    /// Wait up to `timeout` for a completion.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Completion> {
        match self.rx.recv_timeout(timeout) {
            Ok(completion) => {
                self.received();
                Some(completion)
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Jobs dispatched whose completion has not been received yet.
    pub fn outstanding(&self) -> usize {
        self.outstanding.get()
    }

    fn received(&self) {
        self.outstanding.set(self.outstanding.get().saturating_sub(1));
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Dispatcher::new(ThreadSpawner)
    }
}
