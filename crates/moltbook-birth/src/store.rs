//! Durable record storage.
//!
//! The birth certificate needs exactly two capabilities from its store: an
//! atomic write-if-absent (the one-birth guarantee must hold even across
//! process restarts and concurrent creators) and a plain read.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::debug;
use uuid::Uuid;

use crate::error::BirthError;

/// Key-value storage for write-once records.
pub trait RecordStore: Send + Sync {
    /// Atomically write `bytes` under `key` if and only if no record exists.
    ///
    /// # Errors
    ///
    /// Returns `BirthError::AlreadyExists` when a record is already present;
    /// the existing record is left untouched. Returns `BirthError::Storage`
    /// on I/O failure.
    fn put_if_absent(&self, key: &str, bytes: &[u8]) -> Result<(), BirthError>;

    /// Read the record under `key`, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns `BirthError::Storage` on I/O failure.
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, BirthError>;
}

fn validate_key(key: &str) -> Result<(), BirthError> {
    if key.is_empty() {
        return Err(BirthError::InvalidKey("key cannot be empty".to_string()));
    }
    if key.len() > 128 {
        return Err(BirthError::InvalidKey(
            "key cannot exceed 128 characters".to_string(),
        ));
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(BirthError::InvalidKey(format!(
            "key '{key}' contains characters outside [A-Za-z0-9._-]"
        )));
    }
    Ok(())
}

/// One JSON document per key under a directory.
///
/// Writes go to a uniquely-named temp file first, are flushed to disk, and
/// are then hard-linked into place. The link is the commit point: it fails
/// atomically if the destination already exists, so a record is either fully
/// present or absent. Partial records cannot be observed, and two
/// concurrent creators cannot both win.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns `BirthError::Storage` if the directory cannot be created.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, BirthError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| {
            BirthError::Storage(format!(
                "cannot create store directory '{}': {e}",
                dir.display()
            ))
        })?;
        Ok(Self { dir })
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl RecordStore for FileStore {
    fn put_if_absent(&self, key: &str, bytes: &[u8]) -> Result<(), BirthError> {
        validate_key(key)?;
        let path = self.record_path(key);

        let tmp = self.dir.join(format!(".{key}.{}.tmp", Uuid::new_v4()));
        let result = (|| -> Result<(), BirthError> {
            let mut file = std::fs::File::create(&tmp)
                .map_err(|e| BirthError::Storage(format!("cannot create temp file: {e}")))?;
            file.write_all(bytes)
                .map_err(|e| BirthError::Storage(format!("cannot write record: {e}")))?;
            file.sync_all()
                .map_err(|e| BirthError::Storage(format!("cannot sync record: {e}")))?;

            std::fs::hard_link(&tmp, &path).map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    BirthError::AlreadyExists(key.to_string())
                } else {
                    BirthError::Storage(format!("cannot commit record: {e}"))
                }
            })?;

            debug!(key, path = %path.display(), "record committed");
            Ok(())
        })();

        // The temp file is garbage whether the commit happened or not.
        let _ = std::fs::remove_file(&tmp);
        result
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, BirthError> {
        validate_key(key)?;
        match std::fs::read(self.record_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BirthError::Storage(format!("cannot read record: {e}"))),
        }
    }
}

/// In-memory store for tests.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryStore {
    fn put_if_absent(&self, key: &str, bytes: &[u8]) -> Result<(), BirthError> {
        validate_key(key)?;
        let mut records = self
            .records
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if records.contains_key(key) {
            return Err(BirthError::AlreadyExists(key.to_string()));
        }
        records.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, BirthError> {
        validate_key(key)?;
        let records = self
            .records
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(records.get(key).cloned())
    }
}
