//! Directory-backed adapter
//!
//! Treats a local directory as the remote store: object bodies under
//! `objects/`, sealed metadata under `meta/`, one file per id. Pointed at a
//! mounted network share this is a usable zero-dependency backend; it is
//! also the disk-backed counterpart to [`MemoryStore`](super::MemoryStore)
//! in tests.
//!
//! Everything stored here is already ciphertext or sealed metadata, so the
//! directory's host learns nothing beyond object sizes and ids.

use crate::adapter::{ObjectStore, RemoteObject};
use crate::cancel::CancelToken;
use crate::error::{AdapterErrorKind, Error, Result};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::debug;

const OBJECTS_DIRNAME: &str = "objects";
const META_DIRNAME: &str = "meta";

/// Object store rooted at a local directory
#[derive(Debug)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsStore { root: root.into() }
    }

    fn objects_dir(&self) -> PathBuf {
        self.root.join(OBJECTS_DIRNAME)
    }

    fn meta_dir(&self) -> PathBuf {
        self.root.join(META_DIRNAME)
    }

    fn object_path(&self, id: &str) -> PathBuf {
        self.objects_dir().join(id)
    }

    fn meta_path(&self, id: &str) -> PathBuf {
        self.meta_dir().join(id)
    }

    fn check_created(&self) -> Result<()> {
        if self.meta_dir().is_dir() {
            Ok(())
        } else {
            Err(Error::adapter(
                AdapterErrorKind::Missing,
                format!("archive directory {} does not exist", self.root.display()),
            ))
        }
    }

    /// Write `contents` to `path` via a sibling temp file and rename
    fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
        let tmp = path.with_extension("part");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl ObjectStore for FsStore {
    fn create_archive(&self) -> Result<()> {
        if self.meta_dir().is_dir() {
            return Err(Error::adapter(
                AdapterErrorKind::AlreadyExists,
                format!("archive directory {} already exists", self.root.display()),
            ));
        }
        fs::create_dir_all(self.objects_dir())?;
        fs::create_dir_all(self.meta_dir())?;
        debug!("created archive directory {}", self.root.display());
        Ok(())
    }

    fn remove_archive(&self) -> Result<()> {
        self.check_created()?;
        fs::remove_dir_all(&self.root)?;
        Ok(())
    }

    fn list(&self) -> Result<Box<dyn Iterator<Item = Result<RemoteObject>> + Send + '_>> {
        self.check_created()?;

        let mut objects = Vec::new();
        for item in fs::read_dir(self.meta_dir())? {
            let item = item?;
            let id = match item.file_name().into_string() {
                Ok(name) => name,
                Err(_) => continue,
            };

            // Size and mtime come from the body when one exists,
            // otherwise from the metadata file (directories)
            let stat = match fs::metadata(self.object_path(&id)) {
                Ok(stat) => Some(stat),
                Err(e) if e.kind() == io::ErrorKind::NotFound => item.metadata().ok(),
                Err(e) => return Err(e.into()),
            };
            let size = stat.as_ref().map(|s| s.len()).unwrap_or(0);
            let last_modified = stat
                .and_then(|s| s.modified().ok())
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);

            objects.push(RemoteObject {
                id,
                sealed_meta: None,
                size,
                last_modified,
            });
        }

        objects.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(Box::new(objects.into_iter().map(Ok)))
    }

    fn head(&self, id: &str) -> Result<String> {
        self.check_created()?;
        match fs::read_to_string(self.meta_path(id)) {
            Ok(sealed) => Ok(sealed),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(Error::adapter(AdapterErrorKind::Missing, id))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn upload(
        &self,
        id: &str,
        sealed_meta: &str,
        body: Option<&mut dyn Read>,
        token: &CancelToken,
    ) -> Result<()> {
        token.check()?;
        self.check_created()?;

        if let Some(reader) = body {
            let path = self.object_path(id);
            let tmp = path.with_extension("part");
            let result = (|| -> Result<()> {
                let mut file = File::create(&tmp)?;
                io::copy(reader, &mut file)?;
                token.check()?;
                file.sync_all()?;
                fs::rename(&tmp, &path)?;
                Ok(())
            })();
            if result.is_err() {
                let _ = fs::remove_file(&tmp);
                return result;
            }
        }

        Self::write_atomic(&self.meta_path(id), sealed_meta.as_bytes())
    }

    fn download(&self, id: &str, token: &CancelToken) -> Result<Box<dyn Read + Send>> {
        token.check()?;
        self.check_created()?;
        match File::open(self.object_path(id)) {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(Error::adapter(AdapterErrorKind::Missing, id))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn update(&self, id: &str, sealed_meta: &str) -> Result<()> {
        self.check_created()?;
        if !self.meta_path(id).exists() {
            return Err(Error::adapter(AdapterErrorKind::Missing, id));
        }
        Self::write_atomic(&self.meta_path(id), sealed_meta.as_bytes())
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.check_created()?;
        for path in [self.object_path(id), self.meta_path(id)] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
