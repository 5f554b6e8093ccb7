//! Passphrase key derivation
//!
//! scrypt with fixed parameters; the derived key protects wrapped entry
//! keys, sealed metadata, and the config vault. The salt is always stored
//! alongside the ciphertext, so every wrapped object is independently
//! unwrappable given only the passphrase.

use crate::crypto::{Salt, KEY_SIZE};
use crate::error::{Error, Result};
use crate::secret::{KeyContainer, PassphraseContainer};
use scrypt::Params;
use zeroize::Zeroizing;

/// scrypt CPU/memory cost, log2 (N = 2^15)
pub const SCRYPT_LOG_N: u8 = 15;

/// scrypt block size
pub const SCRYPT_R: u32 = 8;

/// scrypt parallelism
pub const SCRYPT_P: u32 = 1;

/// Derive a 256-bit key from the passphrase and a salt.
///
/// The passphrase is copied out of its locked container before being handed
/// to the KDF: some KDF implementations wipe or mutate their input, and the
/// container must survive for later derivations. The copy is wiped before
/// return on every path.
pub fn derive_key(passphrase: &PassphraseContainer, salt: &Salt) -> Result<KeyContainer> {
    let pass = Zeroizing::new(passphrase.with_bytes(|bytes| bytes.to_vec()));

    let params =
        Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, KEY_SIZE).map_err(|_| Error::Decrypt)?;

    let mut derived = vec![0u8; KEY_SIZE];
    scrypt::scrypt(&pass, salt, &params, &mut derived).map_err(|_| Error::Decrypt)?;

    KeyContainer::from_vec(derived)
}
