//! Object-store adapter port
//!
//! The capability the orchestrator consumes to reach a remote store. A
//! concrete adapter (S3 or equivalent) translates these calls into its wire
//! protocol; the orchestrator knows nothing beyond this surface. Sealed
//! metadata rides as an opaque header on the remote object; the blob body is
//! already ciphertext by the time it reaches an adapter.

mod fs;
mod memory;

pub use fs::FsStore;
pub use memory::MemoryStore;

use crate::cancel::CancelToken;
use crate::error::Result;
use std::io::Read;

/// One object in a remote listing.
///
/// Adapters whose listing protocol cannot return custom headers leave
/// `sealed_meta` empty; callers fetch it per id via [`ObjectStore::head`].
#[derive(Debug, Clone)]
pub struct RemoteObject {
    /// Remote object key, equal to the entry id
    pub id: String,
    /// Sealed metadata header, when the listing includes it
    pub sealed_meta: Option<String>,
    /// Stored (ciphertext) size in bytes
    pub size: u64,
    /// Remote modification time, unix seconds
    pub last_modified: i64,
}

/// Remote operations the orchestrator can invoke
pub trait ObjectStore: Send + Sync {
    /// Create the remote container backing this archive
    fn create_archive(&self) -> Result<()>;

    /// Remove the remote container
    fn remove_archive(&self) -> Result<()>;

    /// Stream the archive's objects
    fn list(&self) -> Result<Box<dyn Iterator<Item = Result<RemoteObject>> + Send + '_>>;

    /// Fetch the sealed metadata header for one object
    fn head(&self, id: &str) -> Result<String>;

    /// Store an object: sealed metadata header plus an optional ciphertext
    /// body (directories have none)
    fn upload(
        &self,
        id: &str,
        sealed_meta: &str,
        body: Option<&mut dyn Read>,
        token: &CancelToken,
    ) -> Result<()>;

    /// Open the object's ciphertext body for reading
    fn download(&self, id: &str, token: &CancelToken) -> Result<Box<dyn Read + Send>>;

    /// Replace the sealed metadata header, leaving the body untouched
    fn update(&self, id: &str, sealed_meta: &str) -> Result<()>;

    /// Remove the object
    fn delete(&self, id: &str) -> Result<()>;
}
