//! Worker pool
//!
//! Workers share one cancellation token and the cabinet joins their handles
//! on close. Each worker loops: pop the oldest job, take the entry's slot in
//! the lock table, run the remote half of the operation. An empty queue
//! means sleep-and-retry; a cancelled token means return.
//!
//! A failed job is logged with its full context and dropped; crypto errors
//! in particular are never retried.

use crate::cabinet::{unix_now, Shared};
use crate::cache::{Action, Job};
use crate::entry::Entry;
use crate::error::{Error, Result};
use std::io::Read;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};

/// How long a worker sleeps when the queue is empty
const IDLE_POLL: Duration = Duration::from_secs(1);

/// Granularity of cancellation checks while idle
const IDLE_SLICE: Duration = Duration::from_millis(100);

pub(crate) fn spawn(shared: &Arc<Shared>, count: usize) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|index| {
            let shared = Arc::clone(shared);
            thread::spawn(move || {
                debug!("worker {} started", index);
                run(&shared);
                debug!("worker {} drained", index);
            })
        })
        .collect()
}

fn run(shared: &Shared) {
    while !shared.token.is_cancelled() {
        match shared.cache.dequeue() {
            Ok(job) => process(shared, &job),
            Err(Error::QueueEmpty) => idle(shared),
            Err(e) => {
                error!("dequeue failed: {}", e);
                idle(shared);
            }
        }
    }
}

fn idle(shared: &Shared) {
    let mut waited = Duration::ZERO;
    while waited < IDLE_POLL {
        if shared.token.is_cancelled() {
            return;
        }
        thread::sleep(IDLE_SLICE);
        waited += IDLE_SLICE;
    }
}

fn process(shared: &Shared, job: &Job) {
    let lock = shared.entry_lock(&job.entry_id);
    let result = {
        let _guard = lock.lock();
        dispatch(shared, job)
    };
    drop(lock);
    shared.release_entry_lock(&job.entry_id);

    match result {
        Ok(()) => debug!("job {} ({} {}) done", job.id, job.action, job.entry_id),
        Err(e) => error!("job {} ({} {}) failed: {}", job.id, job.action, job.entry_id, e),
    }
}

fn dispatch(shared: &Shared, job: &Job) -> Result<()> {
    match job.action {
        Action::Upload => upload(shared, &job.entry_id),
        Action::Download => download(shared, &job.entry_id),
        Action::Update => update(shared, &job.entry_id),
        Action::Delete => shared.adapter.delete(&job.entry_id),
        Action::List => reconcile(shared),
    }
}

/// Push the cached blob (if any) and freshly sealed metadata to the remote
fn upload(shared: &Shared, id: &str) -> Result<()> {
    let (entry, blob) = shared.cache.recall(id)?;
    let sealed = entry.seal_meta(&shared.passphrase)?;

    let mut blob = blob;
    let body = blob.as_mut().map(|file| file as &mut dyn Read);
    shared.adapter.upload(id, &sealed, body, &shared.token)
}

/// Pull the remote blob into the cache and stamp the row
fn download(shared: &Shared, id: &str) -> Result<()> {
    let (mut entry, _) = shared.cache.recall(id)?;

    let mut reader = shared.adapter.download(id, &shared.token)?;
    shared.cache.store_blob(id, &mut reader)?;

    entry.last_modified = unix_now();
    shared.cache.update_row(&entry)
}

/// Push freshly sealed metadata, leaving the remote body alone
fn update(shared: &Shared, id: &str) -> Result<()> {
    let (entry, _) = shared.cache.recall(id)?;
    let sealed = entry.seal_meta(&shared.passphrase)?;
    shared.adapter.update(id, &sealed)
}

/// Fold the remote listing into the catalog: remote entries missing locally
/// are inserted (metadata only); local extras are left alone.
pub(crate) fn reconcile(shared: &Shared) -> Result<()> {
    let mut inserted = 0usize;

    for object in shared.adapter.list()? {
        let object = object?;
        if shared.cache.contains(&object.id) {
            continue;
        }

        let sealed = match object.sealed_meta {
            Some(meta) => meta,
            None => shared.adapter.head(&object.id)?,
        };

        let mut entry = Entry {
            id: object.id.clone(),
            ..Entry::default()
        };
        entry.open_meta(&shared.passphrase, &sealed)?;
        shared.cache.remember(&entry, None)?;
        inserted += 1;
    }

    if inserted > 0 {
        info!("reconcile inserted {} remote entries", inserted);
    }
    Ok(())
}
