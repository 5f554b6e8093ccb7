//! Secret memory management
//!
//! Containers for keys, passphrases, and transient plaintext. Payload bytes
//! live in memory locked against paging (where the OS supports it) and are
//! zeroed on every exit path, including panics.

mod container;
mod kdf;

pub use container::{KeyContainer, PassphraseContainer, PlaintextContainer};
pub use kdf::{derive_key, SCRYPT_LOG_N, SCRYPT_P, SCRYPT_R};
