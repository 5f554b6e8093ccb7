//! cryptcab - Client-side encrypted archive engine
//!
//! This library turns local files into opaque, individually-encrypted
//! objects in a remote object store, with a local cache and a durable job
//! queue preserving fast random access. The remote store only ever sees
//! sealed blobs and sealed metadata headers.

pub mod adapter;
pub mod cabinet;
pub mod cache;
pub mod cancel;
pub mod crypto;
pub mod entry;
pub mod error;
pub mod secret;
pub mod stream;
pub mod vault;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::adapter::{FsStore, MemoryStore, ObjectStore};
    pub use crate::cabinet::{Cabinet, CabinetOptions};
    pub use crate::entry::{Entry, ROOT_ID};
    pub use crate::error::{Error, Result};
    pub use crate::vault::Vault;
}
