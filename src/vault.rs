//! Config vault
//!
//! A single encrypted file holds every configured archive: its wrapped key,
//! its compression tag, and its remote locations. On disk the file is
//! `salt[8] ‖ nonce[24] ‖ sealed(json)` and decrypts only under the
//! activation passphrase. A missing file means an empty configuration, not
//! an error; any other failure during activation is reported generically so
//! a wrong passphrase cannot be told apart from a damaged file.

use crate::crypto::{open_with_salt, seal_with_salt};
use crate::error::{Error, Result};
use crate::secret::{PassphraseContainer, PlaintextContainer};
use crate::stream::Codec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use zeroize::Zeroizing;

/// A remote object-store location belonging to an archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StoreLocation {
    /// Bucket (or equivalent container) name
    pub bucket: String,

    /// Provider region
    #[serde(default)]
    pub region: String,

    /// Access credentials; confidential only by virtue of the vault
    /// ciphertext around them
    #[serde(default)]
    pub access_key: String,

    #[serde(default)]
    pub secret_key: String,
}

/// A named collection of entries sharing one key and one set of locations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Archive {
    /// Archive key wrapped under the activation passphrase, base64
    #[serde(rename = "key")]
    pub wrapped_key: String,

    /// Payload compression for this archive's entries
    #[serde(default)]
    pub compression: Codec,

    /// Configured remote locations, keyed by bucket name
    #[serde(default)]
    pub locations: BTreeMap<String, StoreLocation>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct VaultData {
    #[serde(default)]
    archives: BTreeMap<String, Archive>,
}

/// The decrypted, in-memory configuration plus the passphrase that owns it
pub struct Vault {
    path: PathBuf,
    passphrase: Arc<PassphraseContainer>,
    data: VaultData,
}

impl Vault {
    /// Activate the service: protect the passphrase (wiping the caller's
    /// buffer) and load the vault file.
    ///
    /// A missing file initializes an empty configuration. Every other
    /// failure surfaces as [`Error::Activation`].
    pub fn activate(passphrase: &mut [u8], path: impl Into<PathBuf>) -> Result<Self> {
        let pc = Arc::new(PassphraseContainer::protect(passphrase)?);
        let path = path.into();

        let data = if path.exists() {
            let sealed = fs::read(&path).map_err(|_| Error::Activation)?;
            let plaintext =
                Zeroizing::new(open_with_salt(&pc, &sealed).map_err(|_| Error::Activation)?);
            serde_json::from_slice(&plaintext).map_err(|_| Error::Activation)?
        } else {
            debug!("vault file {} not found, starting empty", path.display());
            VaultData::default()
        };

        info!("vault activated: {} archive(s)", data.archives.len());
        Ok(Vault {
            path,
            passphrase: pc,
            data,
        })
    }

    /// Default vault location under the platform config directory
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cryptcab")
            .join("settings.vault")
    }

    /// The activation passphrase, shared with cabinets and workers
    pub fn passphrase(&self) -> Arc<PassphraseContainer> {
        Arc::clone(&self.passphrase)
    }

    /// Persist the configuration: marshal, seal under a fresh salt and
    /// nonce, and replace the file atomically.
    ///
    /// The marshaled plaintext holds every archive key and credential, so it
    /// goes through a one-shot secret container and is destroyed as soon as
    /// the ciphertext exists.
    pub fn save(&self) -> Result<()> {
        let plaintext = PlaintextContainer::seal_vec(serde_json::to_vec(&self.data)?)?;
        let sealed = plaintext.with_bytes(|bytes| seal_with_salt(&self.passphrase, bytes))?;
        plaintext.destroy();

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("vault.tmp");
        fs::write(&tmp, &sealed)?;
        fs::rename(&tmp, &self.path)?;

        debug!("vault saved to {}", self.path.display());
        Ok(())
    }

    /// Register a new archive with a freshly generated, wrapped key
    pub fn create_archive(&mut self, name: &str) -> Result<()> {
        if self.data.archives.contains_key(name) {
            return Err(Error::ArchiveExists(name.to_string()));
        }

        let key = crate::secret::KeyContainer::random()?;
        let wrapped_key = crate::crypto::wrap_key(&self.passphrase, &key)?;
        key.destroy();

        self.data.archives.insert(
            name.to_string(),
            Archive {
                wrapped_key,
                compression: Codec::Gzip,
                locations: BTreeMap::new(),
            },
        );
        self.save()?;

        info!("archive created: {}", name);
        Ok(())
    }

    /// Attach a remote location to an existing archive
    pub fn add_location(&mut self, archive: &str, location: StoreLocation) -> Result<()> {
        let entry = self
            .data
            .archives
            .get_mut(archive)
            .ok_or_else(|| Error::ArchiveMissing(archive.to_string()))?;

        if entry.locations.contains_key(&location.bucket) {
            return Err(Error::LocationInUse(location.bucket));
        }

        entry.locations.insert(location.bucket.clone(), location);
        self.save()
    }

    /// Remove an archive from the configuration
    pub fn remove_archive(&mut self, name: &str) -> Result<()> {
        if self.data.archives.remove(name).is_none() {
            return Err(Error::ArchiveMissing(name.to_string()));
        }
        self.save()
    }

    pub fn archive(&self, name: &str) -> Option<&Archive> {
        self.data.archives.get(name)
    }

    pub fn archive_names(&self) -> impl Iterator<Item = &str> {
        self.data.archives.keys().map(String::as_str)
    }

    /// Remove the vault file from disk, consuming the vault
    pub fn delete(self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    /// The path this vault persists to
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn vault_path(dir: &TempDir) -> PathBuf {
        dir.path().join("settings.vault")
    }

    #[test]
    fn test_activate_fresh_is_empty() {
        let dir = TempDir::new().unwrap();
        let mut pass = b"first run".to_vec();

        let vault = Vault::activate(&mut pass, vault_path(&dir)).unwrap();
        assert_eq!(vault.archive_names().count(), 0);
        assert!(pass.iter().all(|&b| b == 0), "passphrase buffer wiped");
    }

    #[test]
    fn test_create_save_reload() {
        let dir = TempDir::new().unwrap();
        let path = vault_path(&dir);

        let mut pass = b"correct pass".to_vec();
        let mut vault = Vault::activate(&mut pass, &path).unwrap();
        vault.create_archive("documents").unwrap();
        drop(vault);

        let mut pass = b"correct pass".to_vec();
        let vault = Vault::activate(&mut pass, &path).unwrap();
        let archive = vault.archive("documents").expect("archive survives reload");
        assert!(!archive.wrapped_key.is_empty());
        assert_eq!(archive.compression, Codec::Gzip);
    }

    #[test]
    fn test_wrong_passphrase_is_generic_failure() {
        let dir = TempDir::new().unwrap();
        let path = vault_path(&dir);

        let mut pass = b"correct pass".to_vec();
        let mut vault = Vault::activate(&mut pass, &path).unwrap();
        vault.create_archive("a").unwrap();
        drop(vault);

        let mut wrong = b"wrong pass".to_vec();
        assert!(matches!(
            Vault::activate(&mut wrong, &path),
            Err(Error::Activation)
        ));

        // The correct passphrase still works and still sees the archive
        let mut pass = b"correct pass".to_vec();
        let vault = Vault::activate(&mut pass, &path).unwrap();
        assert!(vault.archive("a").is_some());
    }

    #[test]
    fn test_corrupt_file_is_generic_failure() {
        let dir = TempDir::new().unwrap();
        let path = vault_path(&dir);
        fs::write(&path, b"garbage that is not a vault").unwrap();

        let mut pass = b"any pass".to_vec();
        assert!(matches!(
            Vault::activate(&mut pass, &path),
            Err(Error::Activation)
        ));
    }

    #[test]
    fn test_duplicate_archive_rejected() {
        let dir = TempDir::new().unwrap();
        let mut pass = b"pass".to_vec();
        let mut vault = Vault::activate(&mut pass, vault_path(&dir)).unwrap();

        vault.create_archive("a").unwrap();
        assert!(matches!(
            vault.create_archive("a"),
            Err(Error::ArchiveExists(_))
        ));
    }

    #[test]
    fn test_location_management() {
        let dir = TempDir::new().unwrap();
        let mut pass = b"pass".to_vec();
        let mut vault = Vault::activate(&mut pass, vault_path(&dir)).unwrap();
        vault.create_archive("a").unwrap();

        let loc = StoreLocation {
            bucket: "my-bucket".to_string(),
            region: "us-east-1".to_string(),
            access_key: "AK".to_string(),
            secret_key: "SK".to_string(),
        };
        vault.add_location("a", loc.clone()).unwrap();

        assert!(matches!(
            vault.add_location("a", loc.clone()),
            Err(Error::LocationInUse(_))
        ));
        assert!(matches!(
            vault.add_location("missing", loc),
            Err(Error::ArchiveMissing(_))
        ));
    }

    #[test]
    fn test_remove_archive_and_delete() {
        let dir = TempDir::new().unwrap();
        let path = vault_path(&dir);
        let mut pass = b"pass".to_vec();
        let mut vault = Vault::activate(&mut pass, &path).unwrap();

        vault.create_archive("a").unwrap();
        vault.remove_archive("a").unwrap();
        assert!(matches!(
            vault.remove_archive("a"),
            Err(Error::ArchiveMissing(_))
        ));

        vault.delete().unwrap();
        assert!(!path.exists());
    }
}
