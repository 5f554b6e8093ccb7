//! Local cache
//!
//! The durable local half of an archive: a catalog of entry rows plus one
//! ciphertext blob file per content entry, and the persistent job queue.
//!
//! Layout per archive:
//! ```text
//! <cache_root>/<archive_name>/
//!     catalog.db      transactional embedded store (entries + jobs)
//!     blobs/<id>      compressed-then-encrypted stream output
//! ```
//!
//! The catalog row mirrors the entry's plaintext fields for local query;
//! blob presence on disk is the only other state. After any operation
//! returns success the two sides are consistent with what was requested.

mod queue;

pub use queue::{Action, Job};

use crate::entry::Entry;
use crate::error::{Error, Result};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

const CATALOG_FILENAME: &str = "catalog.db";
const BLOBS_DIRNAME: &str = "blobs";

/// Durable cache for one archive: catalog rows, blob files, job queue
pub struct LocalCache {
    archive: String,
    dir: PathBuf,
    db: sled::Db,
    entries: sled::Tree,
    jobs: sled::Tree,
    next_job_id: AtomicU64,
}

impl LocalCache {
    /// Open (or create) the cache directory and catalog for an archive.
    ///
    /// Schema creation is idempotent: opening an existing cache changes
    /// nothing.
    pub fn open(root: &Path, archive: &str) -> Result<Self> {
        let dir = root.join(archive);
        fs::create_dir_all(dir.join(BLOBS_DIRNAME))?;

        let db = sled::open(dir.join(CATALOG_FILENAME))?;
        let entries = db.open_tree("entries")?;
        let jobs = db.open_tree("jobs")?;

        // Resume the job id sequence after the highest queued id
        let max_job_id = jobs
            .last()?
            .and_then(|(key, _)| key.as_ref().try_into().ok().map(u64::from_be_bytes))
            .unwrap_or(0);

        info!(
            "cache opened for archive {}: {} entries, {} queued jobs",
            archive,
            entries.len(),
            jobs.len()
        );

        Ok(LocalCache {
            archive: archive.to_string(),
            dir,
            db,
            entries,
            jobs,
            next_job_id: AtomicU64::new(max_job_id + 1),
        })
    }

    /// The archive this cache belongs to
    pub fn archive(&self) -> &str {
        &self.archive
    }

    /// Path of the blob file for an entry id
    pub fn blob_path(&self, id: &str) -> PathBuf {
        self.dir.join(BLOBS_DIRNAME).join(id)
    }

    /// Whether a ciphertext blob exists on disk for this id
    pub fn has_blob(&self, id: &str) -> bool {
        self.blob_path(id).exists()
    }

    /// Fetch the catalog row and, if a blob exists, an open read handle to
    /// it. A missing blob is not an error; a missing row is.
    pub fn recall(&self, id: &str) -> Result<(Entry, Option<File>)> {
        let raw = self
            .entries
            .get(id.as_bytes())?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let mut entry: Entry = bincode::deserialize(&raw)?;
        entry.id = id.to_string();

        let blob = match File::open(self.blob_path(id)) {
            Ok(file) => Some(file),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        Ok((entry, blob))
    }

    /// Upsert the catalog row and replace, keep, or remove the blob.
    ///
    /// With a reader the blob is written to a temp file and renamed into
    /// place, truncating any previous blob. With `None` any existing blob is
    /// removed (directories and metadata-only entries have no blob). If the
    /// blob write fails the row is rolled back to its previous state, so a
    /// retry of the same call is safe.
    pub fn remember(&self, entry: &Entry, blob: Option<&mut dyn Read>) -> Result<()> {
        let row = bincode::serialize(entry)?;
        let previous = self.entries.insert(entry.id.as_bytes(), row)?;

        let result = match blob {
            Some(reader) => self.store_blob(&entry.id, reader).map(|_| ()),
            None => self.remove_blob(&entry.id),
        };

        if let Err(e) = result {
            // Roll the row back so row and blob stay consistent
            match previous {
                Some(old) => {
                    let _ = self.entries.insert(entry.id.as_bytes(), old);
                }
                None => {
                    let _ = self.entries.remove(entry.id.as_bytes());
                }
            }
            return Err(e);
        }

        debug!("remembered entry {} ({})", entry.id, entry.name);
        Ok(())
    }

    /// Upsert the catalog row without touching the blob.
    ///
    /// Used when the blob is managed separately (ingest writes it through a
    /// [`BlobWriter`] first) or is deliberately untouched (rename, move,
    /// timestamp updates).
    pub fn update_row(&self, entry: &Entry) -> Result<()> {
        let row = bincode::serialize(entry)?;
        self.entries.insert(entry.id.as_bytes(), row)?;
        debug!("updated row {} ({})", entry.id, entry.name);
        Ok(())
    }

    /// Remove the catalog row and any blob. Idempotent: forgetting an id
    /// that was never inserted succeeds and changes nothing.
    pub fn forget(&self, id: &str) -> Result<()> {
        self.remove_blob(id)?;
        self.entries.remove(id.as_bytes())?;
        debug!("forgot entry {}", id);
        Ok(())
    }

    /// Whether a catalog row exists for this id
    pub fn contains(&self, id: &str) -> bool {
        match self.entries.contains_key(id.as_bytes()) {
            Ok(present) => present,
            Err(e) => {
                warn!("catalog lookup failed for {}: {}", id, e);
                false
            }
        }
    }

    /// Entries whose parent is `parent_id`.
    ///
    /// A derived view over the catalog; the rows themselves never carry
    /// child lists.
    pub fn children_of(&self, parent_id: &str) -> Result<Vec<Entry>> {
        let mut children = Vec::new();
        for item in self.entries.iter() {
            let (key, value) = item?;
            let mut entry: Entry = bincode::deserialize(&value)?;
            entry.id = String::from_utf8_lossy(&key).into_owned();
            if entry.parent_id == parent_id {
                children.push(entry);
            }
        }
        Ok(children)
    }

    /// Number of catalog rows
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Write a blob atomically: temp file in the blobs directory, fsync,
    /// rename over the final name.
    pub fn store_blob(&self, id: &str, reader: &mut dyn Read) -> Result<u64> {
        let final_path = self.blob_path(id);
        let tmp_path = self.dir.join(BLOBS_DIRNAME).join(format!(".tmp-{}", id));

        let written = (|| -> Result<u64> {
            let mut tmp = File::create(&tmp_path)?;
            let written = io::copy(reader, &mut tmp)?;
            tmp.sync_all()?;
            fs::rename(&tmp_path, &final_path)?;
            Ok(written)
        })();

        if written.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        written
    }

    /// Open a writer that lands atomically at `blobs/<id>` on commit.
    ///
    /// Dropping the writer without committing removes the partial file and
    /// leaves any previous blob untouched.
    pub fn blob_writer(&self, id: &str) -> Result<BlobWriter> {
        let tmp_path = self.dir.join(BLOBS_DIRNAME).join(format!(".tmp-{}", id));
        let file = File::create(&tmp_path)?;
        Ok(BlobWriter {
            file: Some(file),
            tmp_path,
            final_path: self.blob_path(id),
        })
    }

    /// Remove the blob file if present
    pub fn remove_blob(&self, id: &str) -> Result<()> {
        match fs::remove_file(self.blob_path(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Queue a job against an existing catalog entry
    pub fn enqueue(&self, entry_id: &str, action: Action) -> Result<u64> {
        if !self.contains(entry_id) {
            return Err(Error::NotFound(entry_id.to_string()));
        }

        let id = self.next_job_id.fetch_add(1, Ordering::SeqCst);
        queue::push(&self.jobs, id, entry_id, action)?;
        debug!("enqueued job {}: {} {}", id, action, entry_id);
        Ok(id)
    }

    /// Atomically remove and return the oldest job.
    ///
    /// Returns [`Error::QueueEmpty`] when nothing is queued.
    pub fn dequeue(&self) -> Result<Job> {
        queue::pop(&self.jobs)
    }

    /// Number of queued jobs
    pub fn queued_jobs(&self) -> usize {
        self.jobs.len()
    }

    /// Flush the catalog to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Snapshot of the cache's size and queue depth
    pub fn stats(&self) -> Result<CacheStats> {
        let mut blob_count = 0usize;
        let mut blob_bytes = 0u64;

        for item in fs::read_dir(self.dir.join(BLOBS_DIRNAME))? {
            let item = item?;
            let meta = item.metadata()?;
            if meta.is_file() {
                blob_count += 1;
                blob_bytes += meta.len();
            }
        }

        Ok(CacheStats {
            entry_count: self.entries.len(),
            blob_count,
            blob_bytes,
            queued_jobs: self.jobs.len(),
        })
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Catalog rows
    pub entry_count: usize,
    /// Blob files on disk
    pub blob_count: usize,
    /// Total ciphertext bytes on disk
    pub blob_bytes: u64,
    /// Jobs waiting in the queue
    pub queued_jobs: usize,
}

/// Blob file in flight: writes go to a temp file that is renamed into place
/// only on [`BlobWriter::commit`].
pub struct BlobWriter {
    file: Option<File>,
    tmp_path: PathBuf,
    final_path: PathBuf,
}

impl io::Write for BlobWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.file.as_mut() {
            Some(file) => file.write(buf),
            None => Err(io::Error::new(io::ErrorKind::Other, "blob writer closed")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl BlobWriter {
    /// Fsync and rename the temp file over the final blob path
    pub fn commit(mut self) -> Result<()> {
        if let Some(file) = self.file.take() {
            file.sync_all()?;
            fs::rename(&self.tmp_path, &self.final_path)?;
        }
        Ok(())
    }
}

impl Drop for BlobWriter {
    fn drop(&mut self) {
        if self.file.take().is_some() {
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}
