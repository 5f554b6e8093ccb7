//! Streaming codec
//!
//! Turns an arbitrary-length byte stream into a sequence of fixed-size
//! secretbox frames, and back. Compression is coupled in front of the
//! encryptor on ingest and behind the decryptor on egress.

mod chunk;
mod cipher;
mod compress;

pub use chunk::fill_chunk;
pub use cipher::{decrypt_stream, encrypt_stream, too_large_to_chunk};
pub use compress::{compress, decompress, Codec};

use crate::crypto::{NONCE_SIZE, TAG_SIZE};

/// Number of plaintext bytes sealed into each frame
pub const PLAIN_CHUNK_SIZE: usize = 3927;

/// On-the-wire size of a full frame: nonce ‖ sealed(plaintext + tag)
pub const CIPHER_CHUNK_SIZE: usize = PLAIN_CHUNK_SIZE + NONCE_SIZE + TAG_SIZE;

/// Upper bound on frames per stream; streams needing more are refused
/// before any output is produced.
pub const MAX_CHUNK_COUNT: u64 = 1 << 24;
