//! Envelope encryption
//!
//! Wrapped key strings and salted sealing. Every envelope embeds the salt
//! used to derive its key-encrypting key, so a single passphrase unwraps any
//! envelope independently of the others.
//!
//! Wrapped key layout (before base64): `salt[8] ‖ nonce[24] ‖ sealed(dek)`,
//! 80 bytes total.

use crate::crypto::{
    decrypt_once, encrypt_once, random_nonce, random_salt, KEY_SIZE, NONCE_SIZE, SALT_SIZE,
    TAG_SIZE,
};
use crate::error::{Error, Result};
use crate::secret::{derive_key, KeyContainer, PassphraseContainer};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// Wrap an entry key under a passphrase-derived KEK and base64 the result
pub fn wrap_key(passphrase: &PassphraseContainer, dek: &KeyContainer) -> Result<String> {
    let salt = random_salt()?;
    let kek = derive_key(passphrase, &salt)?;
    let nonce = random_nonce()?;

    let sealed = dek.with_bytes(|key_bytes| encrypt_once(&kek, &nonce, key_bytes))?;

    let mut raw = Vec::with_capacity(SALT_SIZE + sealed.len());
    raw.extend_from_slice(&salt);
    raw.extend_from_slice(&sealed);
    Ok(BASE64.encode(raw))
}

/// Unwrap a base64 key string produced by [`wrap_key`]
pub fn unwrap_key(passphrase: &PassphraseContainer, wrapped: &str) -> Result<KeyContainer> {
    let raw = BASE64
        .decode(wrapped)
        .map_err(|e| Error::BadFormat(format!("wrapped key: {}", e)))?;

    if raw.len() != SALT_SIZE + NONCE_SIZE + KEY_SIZE + TAG_SIZE {
        return Err(Error::BadFormat(format!(
            "wrapped key: expected {} bytes, got {}",
            SALT_SIZE + NONCE_SIZE + KEY_SIZE + TAG_SIZE,
            raw.len()
        )));
    }

    let (salt, sealed) = raw.split_at(SALT_SIZE);
    let mut salt_arr = [0u8; SALT_SIZE];
    salt_arr.copy_from_slice(salt);

    let kek = derive_key(passphrase, &salt_arr)?;
    let dek_bytes = decrypt_once(&kek, sealed)?;
    KeyContainer::from_vec(dek_bytes)
}

/// Seal `plaintext` under a passphrase-derived key with a fresh salt.
///
/// Output layout: `salt[8] ‖ nonce[24] ‖ sealed`. This is the raw form used
/// by sealed metadata (after base64) and by the config vault (verbatim).
pub fn seal_with_salt(passphrase: &PassphraseContainer, plaintext: &[u8]) -> Result<Vec<u8>> {
    let salt = random_salt()?;
    let kek = derive_key(passphrase, &salt)?;
    let nonce = random_nonce()?;

    let sealed = encrypt_once(&kek, &nonce, plaintext)?;

    let mut out = Vec::with_capacity(SALT_SIZE + sealed.len());
    out.extend_from_slice(&salt);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Open a message produced by [`seal_with_salt`]
pub fn open_with_salt(passphrase: &PassphraseContainer, message: &[u8]) -> Result<Vec<u8>> {
    if message.len() < SALT_SIZE + NONCE_SIZE + TAG_SIZE {
        return Err(Error::Decrypt);
    }

    let (salt, sealed) = message.split_at(SALT_SIZE);
    let mut salt_arr = [0u8; SALT_SIZE];
    salt_arr.copy_from_slice(salt);

    let kek = derive_key(passphrase, &salt_arr)?;
    decrypt_once(&kek, sealed)
}
