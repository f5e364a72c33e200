//! Durable key-value storage for the sidebar's collapse flag.
//!
//! The content script only ever stores one small string, so the contract
//! is the `localStorage` subset: get, set. Writes can fail; reads that fail
//! read as "absent".

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Error from a storage write.
#[derive(Debug)]
pub struct StorageError {
    pub message: String,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "storage: {}", self.message)
    }
}

impl std::error::Error for StorageError {}

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Process-local store, used by tests and as the default.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One file per key under a directory; survives process restarts.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(safe)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.path_for(key)).ok()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| StorageError {
            message: format!("cannot create {}: {}", self.dir.display(), e),
        })?;
        let path = self.path_for(key);
        std::fs::write(&path, value).map_err(|e| StorageError {
            message: format!("cannot write {}: {}", path.display(), e),
        })
    }
}

/// Parse a stored boolean flag; anything but `"true"` reads as false.
pub fn read_flag(store: &dyn KeyValueStore, key: &str) -> bool {
    store.get(key).map(|v| v.trim() == "true").unwrap_or(false)
}

pub fn write_flag(
    store: &mut dyn KeyValueStore,
    key: &str,
    value: bool,
) -> Result<(), StorageError> {
    store.set(key, if value { "true" } else { "false" })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_flag_round_trip() {
        let mut store = MemoryStore::new();
        assert!(!read_flag(&store, "k"));
        write_flag(&mut store, "k", true).unwrap();
        assert!(read_flag(&store, "k"));
        assert_eq!(store.get("k").as_deref(), Some("true"));
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = std::env::temp_dir().join(format!("thread-toc-store-{}", std::process::id()));
        let mut a = FileStore::new(&dir);
        write_flag(&mut a, "perplexity-toc-collapsed", true).unwrap();

        let b = FileStore::new(&dir);
        assert!(read_flag(&b, "perplexity-toc-collapsed"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn garbage_reads_as_false() {
        let mut store = MemoryStore::new();
        store.set("k", "yes").unwrap();
        assert!(!read_flag(&store, "k"));
    }
}
