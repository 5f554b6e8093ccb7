//! End-to-end cabinet tests over the in-memory adapter
//!
//! Workers run on their own threads and poll the queue, so remote effects
//! are awaited with a bounded spin.

use cryptcab::adapter::{MemoryStore, ObjectStore};
use cryptcab::cabinet::{Cabinet, CabinetOptions};
use cryptcab::entry::ROOT_ID;
use cryptcab::error::Error;
use cryptcab::secret::PassphraseContainer;
use cryptcab::vault::Vault;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn passphrase(text: &str) -> Arc<PassphraseContainer> {
    let mut bytes = text.as_bytes().to_vec();
    Arc::new(PassphraseContainer::protect(&mut bytes).unwrap())
}

fn options(dir: &TempDir) -> CabinetOptions {
    CabinetOptions {
        cache_root: dir.path().join("cache"),
        workers: 2,
        ..CabinetOptions::default()
    }
}

fn open_cabinet(
    dir: &TempDir,
    pass: &Arc<PassphraseContainer>,
    store: &Arc<MemoryStore>,
) -> Cabinet {
    Cabinet::open(
        "archive",
        Arc::clone(pass),
        Arc::clone(store) as Arc<dyn ObjectStore>,
        options(dir),
    )
    .unwrap()
}

fn write_sample(dir: &TempDir, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(15);
    while Instant::now() < deadline {
        if cond() {
            return;
        }
        thread::sleep(Duration::from_millis(50));
    }
    panic!("timed out waiting for {}", what);
}

#[test]
fn ingest_uploads_ciphertext() {
    let dir = TempDir::new().unwrap();
    let pass = passphrase("upload test");
    let store = Arc::new(MemoryStore::created());
    let cabinet = open_cabinet(&dir, &pass, &store);

    let contents = b"the archive payload, plain as day".repeat(200);
    let path = write_sample(&dir, "payload.txt", &contents);

    let entry = cabinet.ingest(ROOT_ID, &path).unwrap();
    assert_eq!(entry.size, contents.len() as u64);
    assert!(!entry.is_dir);

    wait_until("upload to finish", || store.body_of(&entry.id).is_some());

    // The remote body is ciphertext: no plaintext fragment survives
    let remote = store.body_of(&entry.id).unwrap();
    assert_ne!(remote, contents);
    let needle = &contents[..16];
    assert!(!remote.windows(16).any(|w| w == needle));

    // The sealed metadata header is opaque too
    let sealed = store.head(&entry.id).unwrap();
    assert!(!sealed.contains("payload.txt"));

    cabinet.close().unwrap();
}

#[test]
fn extract_round_trips_plaintext() {
    let dir = TempDir::new().unwrap();
    let pass = passphrase("extract test");
    let store = Arc::new(MemoryStore::created());
    let cabinet = open_cabinet(&dir, &pass, &store);

    // Spans multiple frames after compression
    let contents: Vec<u8> = (0..64_000u32).map(|i| (i % 251) as u8).collect();
    let path = write_sample(&dir, "big.bin", &contents);

    let entry = cabinet.ingest(ROOT_ID, &path).unwrap();

    let mut recovered = Vec::new();
    cabinet.extract(&entry.id, &mut recovered).unwrap();
    assert_eq!(recovered, contents);

    cabinet.close().unwrap();
}

#[test]
fn directory_ingest_has_no_blob() {
    let dir = TempDir::new().unwrap();
    let pass = passphrase("dir test");
    let store = Arc::new(MemoryStore::created());
    let cabinet = open_cabinet(&dir, &pass, &store);

    let subdir = dir.path().join("photos");
    fs::create_dir(&subdir).unwrap();

    let entry = cabinet.ingest(ROOT_ID, &subdir).unwrap();
    assert!(entry.is_dir);

    wait_until("directory upload", || store.object_count() == 1);
    assert!(store.body_of(&entry.id).is_none());

    // Extracting a directory fails: there is no blob
    let mut sink = Vec::new();
    assert!(cabinet.extract(&entry.id, &mut sink).is_err());

    cabinet.close().unwrap();
}

#[test]
fn ingest_validates_parent() {
    let dir = TempDir::new().unwrap();
    let pass = passphrase("parent test");
    let store = Arc::new(MemoryStore::created());
    let cabinet = open_cabinet(&dir, &pass, &store);

    let path = write_sample(&dir, "orphan.txt", b"data");

    assert!(matches!(
        cabinet.ingest("ffffffffffffffffffffffffffffffff", &path),
        Err(Error::ParentMissing(_))
    ));

    // A file cannot be a parent either
    let file_entry = cabinet.ingest(ROOT_ID, &path).unwrap();
    assert!(matches!(
        cabinet.ingest(&file_entry.id, &path),
        Err(Error::ParentMissing(_))
    ));

    cabinet.close().unwrap();
}

#[test]
fn delete_removes_local_and_remote() {
    let dir = TempDir::new().unwrap();
    let pass = passphrase("delete test");
    let store = Arc::new(MemoryStore::created());
    let cabinet = open_cabinet(&dir, &pass, &store);

    let path = write_sample(&dir, "doomed.txt", b"short-lived");
    let entry = cabinet.ingest(ROOT_ID, &path).unwrap();
    wait_until("upload", || store.object_count() == 1);

    cabinet.delete(&entry.id).unwrap();
    wait_until("remote delete", || store.object_count() == 0);

    assert!(matches!(
        cabinet.extract(&entry.id, &mut Vec::new()),
        Err(Error::NotFound(_))
    ));

    cabinet.close().unwrap();
}

#[test]
fn delete_refuses_non_empty_directory() {
    let dir = TempDir::new().unwrap();
    let pass = passphrase("rmdir test");
    let store = Arc::new(MemoryStore::created());
    let cabinet = open_cabinet(&dir, &pass, &store);

    let subdir = dir.path().join("nested");
    fs::create_dir(&subdir).unwrap();
    let parent = cabinet.ingest(ROOT_ID, &subdir).unwrap();

    let path = write_sample(&dir, "inside.txt", b"contents");
    let child = cabinet.ingest(&parent.id, &path).unwrap();
    wait_until("uploads", || store.object_count() == 2);

    assert!(matches!(
        cabinet.delete(&parent.id),
        Err(Error::DirectoryNotEmpty(_))
    ));

    cabinet.delete_recursive(&parent.id).unwrap();
    wait_until("cascade delete", || store.object_count() == 0);

    assert!(cabinet.children_of(ROOT_ID).unwrap().is_empty());
    assert!(matches!(
        cabinet.extract(&child.id, &mut Vec::new()),
        Err(Error::NotFound(_))
    ));

    cabinet.close().unwrap();
}

#[test]
fn reconcile_and_download_on_fresh_machine() {
    let pass = passphrase("sync test");
    let store = Arc::new(MemoryStore::created());

    // First machine archives a file
    let dir_a = TempDir::new().unwrap();
    let contents = b"roaming document".repeat(500);
    let entry_id;
    {
        let cabinet = open_cabinet(&dir_a, &pass, &store);
        let path = write_sample(&dir_a, "roam.txt", &contents);
        let entry = cabinet.ingest(ROOT_ID, &path).unwrap();
        entry_id = entry.id.clone();
        wait_until("upload", || store.body_of(&entry.id).is_some());
        cabinet.close().unwrap();
    }

    // Second machine opens with an empty cache; reconcile pulls the catalog
    let dir_b = TempDir::new().unwrap();
    let cabinet = open_cabinet(&dir_b, &pass, &store);

    let entry = cabinet.lookup(&entry_id).unwrap();
    assert_eq!(entry.name, "roam.txt");
    assert_eq!(entry.size, contents.len() as u64);

    // Blob is not local yet; download then extract
    assert!(cabinet.extract(&entry_id, &mut Vec::new()).is_err());
    cabinet.download(&entry_id).unwrap();
    wait_until("download", || {
        let mut out = Vec::new();
        cabinet.extract(&entry_id, &mut out).is_ok()
    });

    let mut recovered = Vec::new();
    cabinet.extract(&entry_id, &mut recovered).unwrap();
    assert_eq!(recovered, contents);

    cabinet.close().unwrap();
}

#[test]
fn rename_updates_remote_metadata() {
    let pass = passphrase("rename test");
    let store = Arc::new(MemoryStore::created());

    let dir = TempDir::new().unwrap();
    let entry_id;
    {
        let cabinet = open_cabinet(&dir, &pass, &store);
        let path = write_sample(&dir, "before.txt", b"same bytes");
        let entry = cabinet.ingest(ROOT_ID, &path).unwrap();
        entry_id = entry.id.clone();
        wait_until("upload", || store.object_count() == 1);

        let renamed = cabinet.rename(&entry.id, "after.txt").unwrap();
        assert_eq!(renamed.name, "after.txt");
        wait_until("metadata update", || cabinet.pending_jobs() == 0);
        cabinet.close().unwrap();
    }

    // A fresh machine sees the new name via the sealed header
    let dir_b = TempDir::new().unwrap();
    let cabinet = open_cabinet(&dir_b, &pass, &store);
    assert_eq!(cabinet.lookup(&entry_id).unwrap().name, "after.txt");
    cabinet.close().unwrap();
}

#[test]
fn move_entry_revalidates_parent() {
    let dir = TempDir::new().unwrap();
    let pass = passphrase("move test");
    let store = Arc::new(MemoryStore::created());
    let cabinet = open_cabinet(&dir, &pass, &store);

    let subdir = dir.path().join("dest");
    fs::create_dir(&subdir).unwrap();
    let dest = cabinet.ingest(ROOT_ID, &subdir).unwrap();

    let path = write_sample(&dir, "mover.txt", b"contents");
    let entry = cabinet.ingest(ROOT_ID, &path).unwrap();

    let moved = cabinet.move_entry(&entry.id, &dest.id).unwrap();
    assert_eq!(moved.parent_id, dest.id);

    assert!(matches!(
        cabinet.move_entry(&entry.id, "00000000000000000000000000000001"),
        Err(Error::ParentMissing(_))
    ));

    cabinet.close().unwrap();
}

#[test]
fn wrong_passphrase_cannot_open_remote_catalog() {
    let pass = passphrase("right one");
    let store = Arc::new(MemoryStore::created());

    let dir = TempDir::new().unwrap();
    {
        let cabinet = open_cabinet(&dir, &pass, &store);
        let path = write_sample(&dir, "secret.txt", b"confidential");
        cabinet.ingest(ROOT_ID, &path).unwrap();
        wait_until("upload", || store.object_count() == 1);
        cabinet.close().unwrap();
    }

    // Opening against the same remote with a different passphrase fails
    // during reconcile: the sealed metadata will not authenticate.
    let dir_b = TempDir::new().unwrap();
    let wrong = passphrase("wrong one");
    let result = Cabinet::open(
        "archive",
        wrong,
        Arc::clone(&store) as Arc<dyn ObjectStore>,
        options(&dir_b),
    );
    assert!(matches!(result, Err(Error::Decrypt)));
}

#[test]
fn cabinet_over_directory_store() {
    use cryptcab::adapter::FsStore;

    let dir = TempDir::new().unwrap();
    let pass = passphrase("fs adapter test");

    let store = Arc::new(FsStore::new(dir.path().join("remote")));
    store.create_archive().unwrap();

    let contents = b"bytes that land on a real filesystem".repeat(300);
    let entry_id;
    {
        let cabinet = Cabinet::open(
            "archive",
            Arc::clone(&pass),
            Arc::clone(&store) as Arc<dyn ObjectStore>,
            options(&dir),
        )
        .unwrap();

        let path = write_sample(&dir, "disk.txt", &contents);
        let entry = cabinet.ingest(ROOT_ID, &path).unwrap();
        entry_id = entry.id.clone();
        wait_until("upload", || store.head(&entry_id).is_ok());

        let stats = cabinet.stats().unwrap();
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.blob_count, 1);

        cabinet.close().unwrap();
    }

    // The directory listing carries no metadata header, so reconcile on a
    // fresh cache goes through head() per object
    let dir_b = TempDir::new().unwrap();
    let cabinet = Cabinet::open(
        "archive",
        Arc::clone(&pass),
        Arc::clone(&store) as Arc<dyn ObjectStore>,
        options(&dir_b),
    )
    .unwrap();

    let entry = cabinet.lookup(&entry_id).unwrap();
    assert_eq!(entry.name, "disk.txt");

    cabinet.download(&entry_id).unwrap();
    wait_until("download", || {
        cabinet.extract(&entry_id, &mut Vec::new()).is_ok()
    });

    let mut recovered = Vec::new();
    cabinet.extract(&entry_id, &mut recovered).unwrap();
    assert_eq!(recovered, contents);

    cabinet.close().unwrap();
}

#[test]
fn vault_activation_end_to_end() {
    let dir = TempDir::new().unwrap();
    let vault_path = dir.path().join("settings.vault");

    {
        let mut pass = b"activation pass".to_vec();
        let mut vault = Vault::activate(&mut pass, &vault_path).unwrap();
        vault.create_archive("archive").unwrap();
    }

    let mut wrong = b"not the pass".to_vec();
    assert!(matches!(
        Vault::activate(&mut wrong, &vault_path),
        Err(Error::Activation)
    ));

    let mut pass = b"activation pass".to_vec();
    let vault = Vault::activate(&mut pass, &vault_path).unwrap();

    // The vault's passphrase drives a cabinet directly
    let store = Arc::new(MemoryStore::created());
    let cabinet = Cabinet::open(
        "archive",
        vault.passphrase(),
        Arc::clone(&store) as Arc<dyn ObjectStore>,
        CabinetOptions {
            cache_root: dir.path().join("cache"),
            workers: 1,
            ..CabinetOptions::for_archive(&vault, "archive").unwrap()
        },
    )
    .unwrap();

    let path = dir.path().join("doc.txt");
    fs::write(&path, b"vault-driven upload").unwrap();
    let entry = cabinet.ingest(ROOT_ID, &path).unwrap();
    wait_until("upload", || store.body_of(&entry.id).is_some());

    cabinet.close().unwrap();
}
