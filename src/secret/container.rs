//! Locked secret containers
//!
//! All three container types share the same in-memory discipline: the
//! payload is copied into a buffer that is `mlock`ed so it cannot be paged
//! to disk, the source bytes are wiped, and the buffer is zeroed and
//! unlocked when the container is dropped. They differ only in intent:
//! `KeyContainer` holds exactly one 256-bit key, `PassphraseContainer` holds
//! the activation passphrase for the life of the service, and
//! `PlaintextContainer` holds transient secret bytes that are consumed once.

use crate::crypto::KEY_SIZE;
use crate::error::{Error, Result};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

/// Fixed-capacity buffer in page-locked memory, zeroed on drop.
///
/// The buffer is never grown or cloned after construction; mutation after
/// sealing is not part of the API.
struct LockedBuf {
    bytes: Vec<u8>,
    locked: bool,
}

impl LockedBuf {
    /// Take ownership of `bytes` and lock the backing memory.
    ///
    /// On lock failure the bytes are wiped before the error is returned.
    fn from_vec(mut bytes: Vec<u8>) -> Result<Self> {
        if bytes.is_empty() {
            return Ok(LockedBuf {
                bytes,
                locked: false,
            });
        }

        let ret = unsafe { libc::mlock(bytes.as_ptr() as *const libc::c_void, bytes.len()) };
        if ret != 0 {
            bytes.zeroize();
            return Err(Error::SecretAlloc(format!(
                "mlock failed: {}",
                std::io::Error::last_os_error()
            )));
        }

        Ok(LockedBuf {
            bytes,
            locked: true,
        })
    }

    /// Copy `source` into a locked buffer, then wipe `source`.
    fn copy_from(source: &mut [u8]) -> Result<Self> {
        let copied = source.to_vec();
        source.zeroize();
        Self::from_vec(copied)
    }

    fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    fn len(&self) -> usize {
        self.bytes.len()
    }
}

impl Drop for LockedBuf {
    fn drop(&mut self) {
        // Zeroizing a Vec also truncates it, so capture the region first
        let ptr = self.bytes.as_ptr() as *const libc::c_void;
        let len = self.bytes.len();
        self.bytes.zeroize();
        if self.locked {
            unsafe {
                libc::munlock(ptr, len);
            }
        }
    }
}

/// Container for a single 256-bit encryption key
pub struct KeyContainer {
    buf: LockedBuf,
}

impl KeyContainer {
    /// Create a container holding a fresh random key
    pub fn random() -> Result<Self> {
        let key = crate::crypto::random_key_bytes()?;
        Self::from_vec(key.to_vec())
    }

    /// Take ownership of exactly [`KEY_SIZE`] bytes.
    ///
    /// The input is wiped whether or not construction succeeds.
    pub(crate) fn from_vec(mut bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() != KEY_SIZE {
            let got = bytes.len();
            bytes.zeroize();
            return Err(Error::InvalidKeyLength {
                expected: KEY_SIZE,
                got,
            });
        }
        Ok(KeyContainer {
            buf: LockedBuf::from_vec(bytes)?,
        })
    }

    /// Copy a key out of `source`, wiping `source`
    pub fn protect(source: &mut [u8]) -> Result<Self> {
        if source.len() != KEY_SIZE {
            let got = source.len();
            source.zeroize();
            return Err(Error::InvalidKeyLength {
                expected: KEY_SIZE,
                got,
            });
        }
        Ok(KeyContainer {
            buf: LockedBuf::copy_from(source)?,
        })
    }

    /// Lend a read-only view of the key for the duration of `f`
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(self.buf.as_slice())
    }

    /// Borrow the key in the form the cipher expects.
    ///
    /// The borrow is tied to the container's lifetime; it cannot escape.
    pub(crate) fn key(&self) -> &crypto_secretbox::Key {
        crypto_secretbox::Key::from_slice(self.buf.as_slice())
    }

    /// Constant-time equality
    pub fn ct_eq(&self, other: &KeyContainer) -> bool {
        self.buf.as_slice().ct_eq(other.buf.as_slice()).into()
    }

    /// Explicit zero and release. Dropping the container does the same.
    pub fn destroy(self) {}
}

impl std::fmt::Debug for KeyContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyContainer")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Container for the activation passphrase
///
/// Created once at service activation and shared read-only afterwards.
pub struct PassphraseContainer {
    buf: LockedBuf,
}

impl PassphraseContainer {
    /// Copy the passphrase out of `source`, wiping `source`
    pub fn protect(source: &mut [u8]) -> Result<Self> {
        Ok(PassphraseContainer {
            buf: LockedBuf::copy_from(source)?,
        })
    }

    /// Lend a read-only view of the passphrase for the duration of `f`
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(self.buf.as_slice())
    }

    /// Constant-time equality
    pub fn ct_eq(&self, other: &PassphraseContainer) -> bool {
        self.buf.as_slice().ct_eq(other.buf.as_slice()).into()
    }

    /// Explicit zero and release. Dropping the container does the same.
    pub fn destroy(self) {}
}

impl std::fmt::Debug for PassphraseContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassphraseContainer")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Container for transient secret plaintext, typically consumed once
pub struct PlaintextContainer {
    buf: LockedBuf,
}

impl PlaintextContainer {
    /// Copy secret bytes out of `source`, wiping `source`
    pub fn seal(source: &mut [u8]) -> Result<Self> {
        Ok(PlaintextContainer {
            buf: LockedBuf::copy_from(source)?,
        })
    }

    /// Take ownership of already-secret bytes without an intermediate copy
    pub fn seal_vec(bytes: Vec<u8>) -> Result<Self> {
        Ok(PlaintextContainer {
            buf: LockedBuf::from_vec(bytes)?,
        })
    }

    /// Lend a read-only view of the plaintext for the duration of `f`
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(self.buf.as_slice())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.len() == 0
    }

    /// Explicit zero and release. Dropping the container does the same.
    pub fn destroy(self) {}
}

impl std::fmt::Debug for PlaintextContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaintextContainer")
            .field("len", &self.buf.len())
            .finish()
    }
}
