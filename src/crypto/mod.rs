//! Cryptography module for cryptcab
//!
//! XSalsa20-Poly1305 (NaCl secretbox semantics) with scrypt key derivation.
//! All data is encrypted before leaving the local system; the remote store
//! only ever sees sealed bytes.

mod envelope;
mod primitives;

pub use envelope::{open_with_salt, seal_with_salt, unwrap_key, wrap_key};
pub use primitives::{
    decrypt_once, encrypt_once, increment_nonce, random_key_bytes, random_nonce, random_salt,
};

/// Size of a secretbox key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of a secretbox nonce in bytes
pub const NONCE_SIZE: usize = 24;

/// Size of the Poly1305 authenticator in bytes
pub const TAG_SIZE: usize = 16;

/// Size of a key-derivation salt in bytes
pub const SALT_SIZE: usize = 8;

/// A key-derivation salt
pub type Salt = [u8; SALT_SIZE];

/// A secretbox nonce
pub type NonceBytes = [u8; NONCE_SIZE];
