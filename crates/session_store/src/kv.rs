use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::SessionStoreError;
use crate::paths::key_file_name;

/// Byte-oriented key-value storage with whole-record overwrite semantics.
pub trait KeyValueStore: Send + Sync {
    /// Returns the stored bytes, or `None` when the key is absent.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SessionStoreError>;

    fn put(&self, key: &str, value: &[u8]) -> Result<(), SessionStoreError>;

    /// Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), SessionStoreError>;
}

/// One file per key under a root directory.
///
/// Writes go to a sibling temporary file and are renamed into place, so a
/// reader never observes a half-written record.
#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    root: PathBuf,
}

impl FileKeyValueStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, SessionStoreError> {
        Ok(self.root.join(key_file_name(key)?))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SessionStoreError> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(SessionStoreError::io("reading record", path, source)),
        }
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), SessionStoreError> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.root).map_err(|source| {
            SessionStoreError::io("creating data directory", &self.root, source)
        })?;

        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        fs::write(&tmp_path, value)
            .map_err(|source| SessionStoreError::io("writing record", &tmp_path, source))?;
        fs::rename(&tmp_path, &path)
            .map_err(|source| SessionStoreError::io("replacing record", &path, source))
    }

    fn remove(&self, key: &str) -> Result<(), SessionStoreError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SessionStoreError::io("removing record", path, source)),
        }
    }
}

/// In-memory store. Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyValueStore {
    entries: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryKeyValueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently present, in sorted order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        lock_unpoisoned(&self.entries).keys().cloned().collect()
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        lock_unpoisoned(&self.entries)
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SessionStoreError> {
        Ok(self.entries().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), SessionStoreError> {
        self.entries().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SessionStoreError> {
        self.entries().remove(key);
        Ok(())
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
