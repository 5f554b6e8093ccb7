//! Entry model
//!
//! An entry is the addressable unit of archived data: one file or directory.
//! Remotely it is an opaque object named by its id, with every other field
//! sealed into an encrypted metadata string that rides alongside the object.
//! The id itself is never part of the sealed plaintext; it is the lookup key
//! and travels out-of-band.

use crate::crypto::{open_with_salt, seal_with_salt};
use crate::error::{Error, Result};
use crate::secret::PassphraseContainer;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Length of an entry id in hex characters
pub const ID_LEN: usize = 32;

/// Sentinel id of the archive root; never stored as a real entry
pub const ROOT_ID: &str = "00000000000000000000000000000000";

/// A single file or directory in an archive.
///
/// The serde names are the wire field names inside the sealed metadata
/// document; they are deliberately short since the sealed string rides in a
/// size-limited object-store header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Entry {
    /// Opaque identifier; remote object key and cache primary key
    #[serde(skip)]
    pub id: String,

    /// Entry key encrypted under the archive passphrase, base64
    #[serde(rename = "k")]
    pub wrapped_key: String,

    /// Id of the containing entry, or [`ROOT_ID`]
    #[serde(rename = "p")]
    pub parent_id: String,

    /// Display name
    #[serde(rename = "n")]
    pub name: String,

    /// Whether this entry contains others
    #[serde(rename = "d")]
    pub is_dir: bool,

    /// Plaintext size in bytes
    #[serde(rename = "s")]
    pub size: u64,

    /// Last plaintext modification, unix seconds
    #[serde(rename = "m")]
    pub last_modified: i64,

    /// File permission bits
    #[serde(rename = "f")]
    pub mode: u32,
}

impl Entry {
    /// Seal every field except `id` into an encrypted metadata string
    pub fn seal_meta(&self, passphrase: &PassphraseContainer) -> Result<String> {
        let plaintext = Zeroizing::new(serde_json::to_vec(self)?);
        let sealed = seal_with_salt(passphrase, &plaintext)?;
        Ok(BASE64.encode(sealed))
    }

    /// Populate every field except `id` from a sealed metadata string
    pub fn open_meta(&mut self, passphrase: &PassphraseContainer, meta: &str) -> Result<()> {
        let raw = BASE64
            .decode(meta)
            .map_err(|e| Error::BadFormat(format!("sealed metadata: {}", e)))?;

        let plaintext = Zeroizing::new(open_with_salt(passphrase, &raw)?);
        let opened: Entry = serde_json::from_slice(&plaintext)?;

        let id = std::mem::take(&mut self.id);
        *self = opened;
        self.id = id;
        Ok(())
    }
}

/// Generate a candidate entry id: 16 random bytes as 32 lowercase hex chars.
///
/// Uniqueness against the catalog is the orchestrator's job; this only
/// guarantees the format.
pub fn generate_id() -> Result<String> {
    let mut bytes = [0u8; ID_LEN / 2];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| Error::SecretAlloc(format!("OS RNG failed: {}", e)))?;
    Ok(hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_passphrase() -> PassphraseContainer {
        let mut pass = b"metadata passphrase".to_vec();
        PassphraseContainer::protect(&mut pass).unwrap()
    }

    fn sample_entry() -> Entry {
        Entry {
            id: "X".to_string(),
            wrapped_key: "d2hhdGV2ZXI=".to_string(),
            parent_id: "Y".to_string(),
            name: "Important.doc".to_string(),
            is_dir: false,
            size: 153_432,
            last_modified: 1_700_000_000,
            mode: 0o655,
        }
    }

    #[test]
    fn test_meta_round_trip() {
        let pc = test_passphrase();
        let source = sample_entry();

        let meta = source.seal_meta(&pc).unwrap();

        let mut target = Entry {
            id: "X".to_string(),
            ..Entry::default()
        };
        target.open_meta(&pc, &meta).unwrap();

        assert_eq!(target, source);
    }

    #[test]
    fn test_id_never_sealed() {
        let pc = test_passphrase();
        let meta = sample_entry().seal_meta(&pc).unwrap();

        let mut target = Entry {
            id: "different-id".to_string(),
            ..Entry::default()
        };
        target.open_meta(&pc, &meta).unwrap();

        // open_meta must not clobber the out-of-band id
        assert_eq!(target.id, "different-id");
    }

    #[test]
    fn test_open_meta_wrong_passphrase() {
        let pc = test_passphrase();
        let meta = sample_entry().seal_meta(&pc).unwrap();

        let mut wrong = b"not the passphrase".to_vec();
        let wrong_pc = PassphraseContainer::protect(&mut wrong).unwrap();

        let mut target = Entry::default();
        assert!(matches!(
            target.open_meta(&wrong_pc, &meta),
            Err(Error::Decrypt)
        ));
    }

    #[test]
    fn test_open_meta_bad_base64() {
        let pc = test_passphrase();
        let mut target = Entry::default();
        assert!(matches!(
            target.open_meta(&pc, "!!! not base64 !!!"),
            Err(Error::BadFormat(_))
        ));
    }

    #[test]
    fn test_open_meta_tampered() {
        let pc = test_passphrase();
        let meta = sample_entry().seal_meta(&pc).unwrap();

        let mut raw = BASE64.decode(&meta).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;
        let tampered = BASE64.encode(raw);

        let mut target = Entry::default();
        assert!(matches!(
            target.open_meta(&pc, &tampered),
            Err(Error::Decrypt)
        ));
    }

    #[test]
    fn test_generate_id_format() {
        let id = generate_id().unwrap();
        assert_eq!(id.len(), ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(id, ROOT_ID);
    }
}
