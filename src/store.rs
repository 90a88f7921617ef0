//! Durable key-value substrates
//!
//! The cache only needs a synchronous string store with key enumeration.
//! `FileStore` persists one JSON file per key under an XDG-compliant data
//! directory; `MemoryStore` keeps everything in process.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use parking_lot::Mutex;

use crate::error::StoreError;

/// Synchronous string store shared by the config store and the TTL cache
pub trait KeyValueStore: Send + Sync {
    /// Returns the value for `key`, or `None` when absent
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removes `key`; removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Lists every key currently stored
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}

/// In-process substrate backed by a sorted map
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty in-process store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.entries.lock().keys().cloned().collect())
    }
}

/// Directory-backed substrate storing each key as `<key>.json`
///
/// Uses `~/.local/share/dashcache/` on Linux, or the equivalent XDG path on
/// other platforms. Keys are restricted to ASCII alphanumerics, `-`, `_`
/// and `.` so that file names map back to keys unchanged.
#[derive(Debug, Clone)]
pub struct FileStore {
    /// Directory where entries are stored
    dir: PathBuf,
}

impl FileStore {
    /// Creates a FileStore in the XDG data directory
    ///
    /// Returns `None` if the directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "dashcache")?;
        Some(Self {
            dir: project_dirs.data_dir().to_path_buf(),
        })
    }

    /// Creates a FileStore rooted at a custom directory
    pub fn with_dir(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)?) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir)?;
        fs::write(path, value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        for entry in read_dir {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}
