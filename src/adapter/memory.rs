//! In-memory reference adapter
//!
//! Backs the integration tests and serves as the behavioral model a real
//! adapter should match: ids map to (sealed metadata, optional body), the
//! archive container must exist before objects can, and every failure is
//! kind-tagged.

use crate::adapter::{ObjectStore, RemoteObject};
use crate::cancel::CancelToken;
use crate::error::{AdapterErrorKind, Error, Result};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
struct StoredObject {
    sealed_meta: String,
    body: Option<Vec<u8>>,
    last_modified: i64,
}

#[derive(Debug, Default)]
struct Inner {
    created: bool,
    objects: BTreeMap<String, StoredObject>,
}

/// Object store held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose archive container already exists
    pub fn created() -> Self {
        let store = Self::new();
        store.inner.lock().created = true;
        store
    }

    /// Number of stored objects (test observability)
    pub fn object_count(&self) -> usize {
        self.inner.lock().objects.len()
    }

    /// Ciphertext body of an object, if present (test observability)
    pub fn body_of(&self, id: &str) -> Option<Vec<u8>> {
        self.inner.lock().objects.get(id).and_then(|o| o.body.clone())
    }

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }

    fn check_created(inner: &Inner) -> Result<()> {
        if inner.created {
            Ok(())
        } else {
            Err(Error::adapter(
                AdapterErrorKind::Missing,
                "archive container does not exist",
            ))
        }
    }
}

impl ObjectStore for MemoryStore {
    fn create_archive(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.created {
            return Err(Error::adapter(
                AdapterErrorKind::AlreadyExists,
                "archive container already exists",
            ));
        }
        inner.created = true;
        Ok(())
    }

    fn remove_archive(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        Self::check_created(&inner)?;
        inner.created = false;
        inner.objects.clear();
        Ok(())
    }

    fn list(&self) -> Result<Box<dyn Iterator<Item = Result<RemoteObject>> + Send + '_>> {
        let inner = self.inner.lock();
        Self::check_created(&inner)?;

        let objects: Vec<RemoteObject> = inner
            .objects
            .iter()
            .map(|(id, obj)| RemoteObject {
                id: id.clone(),
                sealed_meta: Some(obj.sealed_meta.clone()),
                size: obj.body.as_ref().map(|b| b.len() as u64).unwrap_or(0),
                last_modified: obj.last_modified,
            })
            .collect();

        Ok(Box::new(objects.into_iter().map(Ok)))
    }

    fn head(&self, id: &str) -> Result<String> {
        let inner = self.inner.lock();
        Self::check_created(&inner)?;
        inner
            .objects
            .get(id)
            .map(|o| o.sealed_meta.clone())
            .ok_or_else(|| Error::adapter(AdapterErrorKind::Missing, id))
    }

    fn upload(
        &self,
        id: &str,
        sealed_meta: &str,
        body: Option<&mut dyn Read>,
        token: &CancelToken,
    ) -> Result<()> {
        token.check()?;

        let body = match body {
            Some(reader) => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf)?;
                Some(buf)
            }
            None => None,
        };

        let mut inner = self.inner.lock();
        Self::check_created(&inner)?;
        inner.objects.insert(
            id.to_string(),
            StoredObject {
                sealed_meta: sealed_meta.to_string(),
                body,
                last_modified: Self::now(),
            },
        );
        Ok(())
    }

    fn download(&self, id: &str, token: &CancelToken) -> Result<Box<dyn Read + Send>> {
        token.check()?;

        let inner = self.inner.lock();
        Self::check_created(&inner)?;
        let object = inner
            .objects
            .get(id)
            .ok_or_else(|| Error::adapter(AdapterErrorKind::Missing, id))?;
        let body = object.body.clone().ok_or_else(|| {
            Error::adapter(AdapterErrorKind::Missing, format!("{} has no body", id))
        })?;

        Ok(Box::new(Cursor::new(body)))
    }

    fn update(&self, id: &str, sealed_meta: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        Self::check_created(&inner)?;
        let object = inner
            .objects
            .get_mut(id)
            .ok_or_else(|| Error::adapter(AdapterErrorKind::Missing, id))?;
        object.sealed_meta = sealed_meta.to_string();
        object.last_modified = Self::now();
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        Self::check_created(&inner)?;
        inner.objects.remove(id);
        Ok(())
    }
}
