//! Error types for cryptcab

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for cryptcab
#[derive(Error, Debug)]
pub enum Error {
    // Crypto errors
    //
    // Encrypt/Decrypt intentionally carry no detail: a wrong passphrase,
    // a tampered blob, and a KDF failure must look identical to callers.
    #[error("encryption failed")]
    Encrypt,

    #[error("decryption failed")]
    Decrypt,

    #[error("stream is too large to encrypt under a single key")]
    StreamTooLarge,

    // Secret container errors
    #[error("secret container allocation failed: {0}")]
    SecretAlloc(String),

    #[error("invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    // Encoding errors
    #[error("malformed encoding: {0}")]
    BadFormat(String),

    // Cache errors
    #[error("entry not found: {0}")]
    NotFound(String),

    #[error("entry already exists: {0}")]
    Duplicate(String),

    #[error("parent entry does not exist: {0}")]
    ParentMissing(String),

    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    #[error("catalog error: {0}")]
    Db(#[from] sled::Error),

    // Queue errors
    #[error("job queue is empty")]
    QueueEmpty,

    #[error("invalid job action: {0}")]
    InvalidAction(u8),

    // Vault errors
    #[error("archive already exists: {0}")]
    ArchiveExists(String),

    #[error("archive does not exist: {0}")]
    ArchiveMissing(String),

    #[error("storage location already in use: {0}")]
    LocationInUse(String),

    #[error("activation failed")]
    Activation,

    // Adapter errors
    #[error("remote store error ({kind}): {message}")]
    Adapter {
        kind: AdapterErrorKind,
        message: String,
    },

    // Cancellation
    #[error("operation cancelled")]
    Cancelled,

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Classification of remote store failures, so callers can tell a missing
/// object from a transport fault without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterErrorKind {
    /// The remote object or archive does not exist
    Missing,
    /// The archive already exists remotely
    AlreadyExists,
    /// Authentication or authorization failure
    Denied,
    /// Transport-level failure (network, timeout)
    Transport,
    /// Anything the adapter cannot classify
    Other,
}

impl std::fmt::Display for AdapterErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AdapterErrorKind::Missing => "missing",
            AdapterErrorKind::AlreadyExists => "already-exists",
            AdapterErrorKind::Denied => "denied",
            AdapterErrorKind::Transport => "transport",
            AdapterErrorKind::Other => "other",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Build an adapter error with a kind tag
    pub fn adapter(kind: AdapterErrorKind, message: impl Into<String>) -> Self {
        Error::Adapter {
            kind,
            message: message.into(),
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::BadFormat(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::BadFormat(e.to_string())
    }
}
