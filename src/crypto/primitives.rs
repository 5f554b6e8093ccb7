//! Primitive crypto operations
//!
//! Random material, the nonce counter, and one-shot secretbox seal/open.
//! Everything here is deliberately small; the stream codec and the envelope
//! layer compose these primitives rather than reaching for the cipher
//! directly.

use crate::crypto::{NonceBytes, Salt, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
use crate::error::{Error, Result};
use crate::secret::KeyContainer;
use crypto_secretbox::aead::{Aead, KeyInit};
use crypto_secretbox::{Nonce, XSalsa20Poly1305};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

/// Generate a random key-derivation salt
pub fn random_salt() -> Result<Salt> {
    let mut salt = [0u8; crate::crypto::SALT_SIZE];
    OsRng
        .try_fill_bytes(&mut salt)
        .map_err(|e| Error::SecretAlloc(format!("OS RNG failed: {}", e)))?;
    Ok(salt)
}

/// Generate a random nonce
pub fn random_nonce() -> Result<NonceBytes> {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng
        .try_fill_bytes(&mut nonce)
        .map_err(|e| Error::SecretAlloc(format!("OS RNG failed: {}", e)))?;
    Ok(nonce)
}

/// Generate random key material, wiped when the guard drops
pub fn random_key_bytes() -> Result<Zeroizing<[u8; KEY_SIZE]>> {
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    OsRng
        .try_fill_bytes(&mut key[..])
        .map_err(|e| Error::SecretAlloc(format!("OS RNG failed: {}", e)))?;
    Ok(key)
}

/// Increment a nonce, treating it as a big-endian counter.
///
/// The carry propagates leftward but never past the leftmost byte, so the
/// counter cycles within a space rooted at the initial random nonce. Wrap
/// detection is the stream codec's job.
pub fn increment_nonce(nonce: &mut NonceBytes) {
    for i in (1..NONCE_SIZE).rev() {
        nonce[i] = nonce[i].wrapping_add(1);
        if nonce[i] != 0 {
            break;
        }
    }
}

/// Seal `plaintext` under `key` with `nonce`.
///
/// Output layout: `nonce ‖ sealed`, so the result carries everything needed
/// to open it except the key. Length = |plaintext| + 24 + 16.
pub fn encrypt_once(key: &KeyContainer, nonce: &NonceBytes, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = XSalsa20Poly1305::new(key.key());
    let sealed = cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|_| Error::Encrypt)?;

    let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
    out.extend_from_slice(nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Open a message produced by [`encrypt_once`].
///
/// The nonce is read from the first 24 bytes; anything shorter than
/// nonce + authenticator is rejected before touching the cipher.
pub fn decrypt_once(key: &KeyContainer, message: &[u8]) -> Result<Vec<u8>> {
    if message.len() < NONCE_SIZE + TAG_SIZE {
        return Err(Error::Decrypt);
    }

    let (nonce, sealed) = message.split_at(NONCE_SIZE);
    let cipher = XSalsa20Poly1305::new(key.key());
    cipher
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| Error::Decrypt)
}
