//! Cabinet orchestrator
//!
//! A cabinet binds one archive's local cache, a remote adapter, and a pool
//! of worker threads. User-facing operations mutate the cache synchronously
//! and queue the remote half as a job; workers drain the queue in order.
//!
//! Opening a cabinet reconciles the remote listing into the catalog before
//! any worker starts, so lookups immediately see everything the remote
//! knows about.

mod worker;

use crate::adapter::ObjectStore;
use crate::cancel::CancelToken;
use crate::cache::{Action, LocalCache};
use crate::crypto::wrap_key;
use crate::entry::{generate_id, Entry, ROOT_ID};
use crate::error::{Error, Result};
use crate::secret::{KeyContainer, PassphraseContainer};
use crate::stream::{encrypt_stream, too_large_to_chunk, Codec};
use crate::vault::Vault;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Tunables for opening a cabinet
#[derive(Debug, Clone)]
pub struct CabinetOptions {
    /// Directory holding per-archive cache directories
    pub cache_root: PathBuf,

    /// Worker threads draining the job queue
    pub workers: usize,

    /// Payload compression for this archive
    pub compression: Codec,
}

impl Default for CabinetOptions {
    fn default() -> Self {
        CabinetOptions {
            cache_root: dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("cryptcab"),
            workers: 3,
            compression: Codec::Gzip,
        }
    }
}

impl CabinetOptions {
    /// Options matching an archive registered in the vault
    pub fn for_archive(vault: &Vault, name: &str) -> Result<Self> {
        let archive = vault
            .archive(name)
            .ok_or_else(|| Error::ArchiveMissing(name.to_string()))?;
        Ok(CabinetOptions {
            compression: archive.compression,
            ..CabinetOptions::default()
        })
    }
}

/// State shared between the cabinet handle and its workers
pub(crate) struct Shared {
    pub(crate) cache: LocalCache,
    pub(crate) adapter: Arc<dyn ObjectStore>,
    pub(crate) passphrase: Arc<PassphraseContainer>,
    pub(crate) compression: Codec,
    pub(crate) token: CancelToken,
    entry_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Shared {
    /// Per-id mutex from the lock table; actions against one entry are
    /// serialized, actions against different entries run concurrently.
    pub(crate) fn entry_lock(&self, id: &str) -> Arc<Mutex<()>> {
        let mut table = self.entry_locks.lock();
        Arc::clone(table.entry(id.to_string()).or_default())
    }

    /// Drop a lock table slot nobody else holds
    pub(crate) fn release_entry_lock(&self, id: &str) {
        let mut table = self.entry_locks.lock();
        if let Some(slot) = table.get(id) {
            if Arc::strong_count(slot) == 1 {
                table.remove(id);
            }
        }
    }
}

/// An open archive: local cache + remote adapter + worker pool
pub struct Cabinet {
    name: String,
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl Cabinet {
    /// Open the archive's cache, reconcile the remote listing into it, and
    /// start the worker pool.
    pub fn open(
        name: &str,
        passphrase: Arc<PassphraseContainer>,
        adapter: Arc<dyn ObjectStore>,
        options: CabinetOptions,
    ) -> Result<Cabinet> {
        let cache = LocalCache::open(&options.cache_root, name)?;

        let shared = Arc::new(Shared {
            cache,
            adapter,
            passphrase,
            compression: options.compression,
            token: CancelToken::new(),
            entry_locks: Mutex::new(HashMap::new()),
        });

        worker::reconcile(&shared)?;
        let workers = worker::spawn(&shared, options.workers.max(1));

        info!("cabinet {} open with {} workers", name, workers.len());
        Ok(Cabinet {
            name: name.to_string(),
            shared,
            workers,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Signal workers to drain, wait for them, and close the cache
    pub fn close(mut self) -> Result<()> {
        self.shutdown();
        self.shared.cache.flush()?;
        info!("cabinet {} closed", self.name);
        Ok(())
    }

    fn shutdown(&mut self) {
        self.shared.token.cancel();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }

    /// Archive a local file or directory under `parent_id`.
    ///
    /// Files are piped `file → compress → encrypt(fresh DEK)` straight into
    /// the cache blob; the DEK is wrapped into the entry and destroyed. The
    /// upload happens asynchronously via the queue.
    pub fn ingest(&self, parent_id: &str, path: &Path) -> Result<Entry> {
        self.require_directory(parent_id)?;

        let meta = fs::metadata(path)?;
        let is_dir = meta.is_dir();
        let size = if is_dir { 0 } else { meta.len() };

        // Refuse nonce-exhausting inputs before producing any output
        if !is_dir && too_large_to_chunk(size) {
            return Err(Error::StreamTooLarge);
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let id = self.assign_id()?;

        let dek = KeyContainer::random()?;
        let entry = Entry {
            id: id.clone(),
            wrapped_key: wrap_key(&self.shared.passphrase, &dek)?,
            parent_id: parent_id.to_string(),
            name,
            is_dir,
            size,
            last_modified: modified_unix(&meta),
            mode: file_mode(&meta),
        };

        if is_dir {
            dek.destroy();
            self.shared.cache.remember(&entry, None)?;
        } else {
            let file = File::open(path)?;
            let mut writer = self.shared.cache.blob_writer(&id)?;

            let mut source = self.shared.compression.compress_reader(file);
            let sealed = encrypt_stream(&dek, &mut source, &mut writer, &self.shared.token);
            dek.destroy();
            sealed?;
            writer.commit()?;

            if let Err(e) = self.shared.cache.update_row(&entry) {
                // Keep row and blob consistent on the failure path
                let _ = self.shared.cache.remove_blob(&id);
                return Err(e);
            }
        }

        self.shared.cache.enqueue(&id, Action::Upload)?;
        debug!("ingested {} as {}", path.display(), id);
        Ok(entry)
    }

    /// Remove an entry locally and queue the remote removal.
    ///
    /// Deleting a directory requires it to be empty; use
    /// [`Cabinet::delete_recursive`] to cascade.
    pub fn delete(&self, id: &str) -> Result<()> {
        let (entry, _) = self.shared.cache.recall(id)?;

        if entry.is_dir && !self.shared.cache.children_of(id)?.is_empty() {
            return Err(Error::DirectoryNotEmpty(id.to_string()));
        }

        // Queue while the row still exists; the job carries only the id
        self.shared.cache.enqueue(id, Action::Delete)?;
        self.shared.cache.forget(id)?;
        debug!("deleted {}", id);
        Ok(())
    }

    /// Delete an entry and everything beneath it, children first
    pub fn delete_recursive(&self, id: &str) -> Result<()> {
        for child in self.shared.cache.children_of(id)? {
            self.delete_recursive(&child.id)?;
        }
        self.delete(id)
    }

    /// Rename an entry in place; metadata-only, queued as an update
    pub fn rename(&self, id: &str, new_name: &str) -> Result<Entry> {
        let (mut entry, _) = self.shared.cache.recall(id)?;
        entry.name = new_name.to_string();
        entry.last_modified = unix_now();
        self.shared.cache.update_row(&entry)?;
        self.shared.cache.enqueue(id, Action::Update)?;
        Ok(entry)
    }

    /// Move an entry under a different parent; metadata-only, queued as an
    /// update
    pub fn move_entry(&self, id: &str, new_parent: &str) -> Result<Entry> {
        self.require_directory(new_parent)?;

        let (mut entry, _) = self.shared.cache.recall(id)?;
        entry.parent_id = new_parent.to_string();
        entry.last_modified = unix_now();
        self.shared.cache.update_row(&entry)?;
        self.shared.cache.enqueue(id, Action::Update)?;
        Ok(entry)
    }

    /// Queue a download; once the job completes the blob is in the cache
    pub fn download(&self, id: &str) -> Result<()> {
        if !self.shared.cache.contains(id) {
            return Err(Error::NotFound(id.to_string()));
        }
        self.shared.cache.enqueue(id, Action::Download)?;
        Ok(())
    }

    /// Fetch an entry from the catalog, falling back to the remote on a
    /// local miss (the fetched metadata is cached).
    pub fn lookup(&self, id: &str) -> Result<Entry> {
        match self.shared.cache.recall(id) {
            Ok((entry, _)) => Ok(entry),
            Err(Error::NotFound(_)) => {
                let sealed = self.shared.adapter.head(id)?;
                let mut entry = Entry {
                    id: id.to_string(),
                    ..Entry::default()
                };
                entry.open_meta(&self.shared.passphrase, &sealed)?;
                self.shared.cache.remember(&entry, None)?;
                debug!("lookup fetched {} from remote", id);
                Ok(entry)
            }
            Err(e) => Err(e),
        }
    }

    /// Decrypt and decompress an entry's cached blob into `writer`.
    ///
    /// The blob must already be local; queue a [`Cabinet::download`] first
    /// if it is not.
    pub fn extract(&self, id: &str, writer: &mut dyn Write) -> Result<u64> {
        let (entry, blob) = self.shared.cache.recall(id)?;
        let mut blob =
            blob.ok_or_else(|| Error::NotFound(format!("{}: blob not cached", id)))?;

        let dek = crate::crypto::unwrap_key(&self.shared.passphrase, &entry.wrapped_key)?;
        let token = &self.shared.token;

        let written = self.shared.compression.decompress_into(writer, |mut out| {
            crate::stream::decrypt_stream(&dek, &mut blob, &mut out, token)
        });
        dek.destroy();
        written
    }

    /// Number of jobs waiting in the queue
    pub fn pending_jobs(&self) -> usize {
        self.shared.cache.queued_jobs()
    }

    /// Snapshot of the local cache's size and queue depth
    pub fn stats(&self) -> Result<crate::cache::CacheStats> {
        self.shared.cache.stats()
    }

    /// Entries directly beneath `parent_id`
    pub fn children_of(&self, parent_id: &str) -> Result<Vec<Entry>> {
        self.shared.cache.children_of(parent_id)
    }

    /// Generate an id no existing entry uses
    fn assign_id(&self) -> Result<String> {
        loop {
            let id = generate_id()?;
            if !self.key_exists(&id) {
                return Ok(id);
            }
            warn!("id collision on {}, retrying", id);
        }
    }

    fn key_exists(&self, id: &str) -> bool {
        id == ROOT_ID || self.shared.cache.contains(id)
    }

    /// Parent must be the root or an existing directory entry
    fn require_directory(&self, id: &str) -> Result<()> {
        if id == ROOT_ID {
            return Ok(());
        }
        match self.shared.cache.recall(id) {
            Ok((entry, _)) if entry.is_dir => Ok(()),
            Ok(_) => Err(Error::ParentMissing(format!("{} is not a directory", id))),
            Err(Error::NotFound(_)) => Err(Error::ParentMissing(id.to_string())),
            Err(e) => Err(e),
        }
    }
}

impl Drop for Cabinet {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn modified_unix(meta: &fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or_else(unix_now)
}

#[cfg(unix)]
fn file_mode(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn file_mode(_meta: &fs::Metadata) -> u32 {
    0o644
}
