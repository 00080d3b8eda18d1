//! Durable JSON stores backing the registry, ledger and vault.
//!
//! The engine treats persistence as synchronous write-through: every
//! mutation saves before it returns, and state is loaded once at startup.
//! Files are written via a temp file + rename so a crash mid-write never
//! leaves a truncated store behind.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read store {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write store {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Store {path} is corrupted: {source}")]
    Corrupted {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Failed to serialize store {path}: {source}")]
    Serialize {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Failed to create data directory {path}: {source}")]
    Directory {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// One JSON file holding a serializable snapshot.
#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    /// Open a store file inside `data_dir`, creating the directory if needed.
    pub fn open(data_dir: &Path, file_name: &str) -> Result<Self, StoreError> {
        fs::create_dir_all(data_dir).map_err(|e| StoreError::Directory {
            path: data_dir.to_path_buf(),
            source: e,
        })?;
        Ok(Self {
            path: data_dir.join(file_name),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot, or the type's default when the file does not exist
    /// yet. A present-but-unreadable file is an error: startup must not
    /// silently continue with an empty state over real data.
    pub fn load_or_default<T>(&self) -> Result<T, StoreError>
    where
        T: DeserializeOwned + Default,
    {
        if !self.path.exists() {
            return Ok(T::default());
        }
        let content = fs::read_to_string(&self.path).map_err(|e| StoreError::Read {
            path: self.path.clone(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(|e| StoreError::Corrupted {
            path: self.path.clone(),
            source: e,
        })
    }

    /// Persist the snapshot atomically.
    pub fn save<T: Serialize>(&self, value: &T) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(value).map_err(|e| StoreError::Serialize {
            path: self.path.clone(),
            source: e,
        })?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| StoreError::Write {
            path: tmp.clone(),
            source: e,
        })?;
        fs::rename(&tmp, &self.path).map_err(|e| StoreError::Write {
            path: self.path.clone(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_default() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::open(dir.path(), "users.json").unwrap();
        let loaded: HashMap<u64, String> = store.load_or_default().unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::open(dir.path(), "users.json").unwrap();

        let mut map = HashMap::new();
        map.insert(1u64, "alice".to_string());
        store.save(&map).unwrap();

        let loaded: HashMap<u64, String> = store.load_or_default().unwrap();
        assert_eq!(loaded.get(&1).map(String::as_str), Some("alice"));
    }

    #[test]
    fn test_corrupted_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::open(dir.path(), "users.json").unwrap();
        fs::write(store.path(), "{not json").unwrap();

        let result: Result<HashMap<u64, String>, _> = store.load_or_default();
        assert!(matches!(result, Err(StoreError::Corrupted { .. })));
    }

    #[test]
    fn test_no_tmp_file_left_behind() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::open(dir.path(), "positions.json").unwrap();
        store.save(&vec![1u32, 2, 3]).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(entries, vec!["positions.json".to_string()]);
    }
}
