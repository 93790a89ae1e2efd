use std::{
    collections::HashMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Mutex,
};

use thiserror::Error;
use tracing::warn;

/// Result alias for local-store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Error raised by the device-local blob store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The blob could not be written; entered-in-memory data survives until
    /// the page is closed, so callers surface a one-time warning.
    #[error("could not persist `{key}`: {source}")]
    Write {
        /// Blob key that failed.
        key: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
}

/// Key-value blob storage standing in for the browser's local storage: flat
/// string keys, string values, synchronous access.
///
/// Reads are infallible by design — a missing or unreadable blob is simply
/// absent, because corrupted persisted state must never crash the app.
pub trait LocalStore: Send + Sync {
    /// Fetch a blob, `None` when absent or unreadable.
    fn get(&self, key: &str) -> Option<String>;
    /// Write a blob.
    fn set(&self, key: &str, value: &str) -> StoreResult<()>;
    /// Delete a blob; deleting an absent key is a no-op.
    fn remove(&self, key: &str);
    /// All keys currently present, in no particular order.
    fn keys(&self) -> Vec<String>;
}

/// In-memory store, used in tests and as a fallback when no directory is
/// writable at all.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Fresh empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.blobs
            .lock()
            .ok()
            .and_then(|blobs| blobs.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        if let Ok(mut blobs) = self.blobs.lock() {
            blobs.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }

    fn remove(&self, key: &str) {
        if let Ok(mut blobs) = self.blobs.lock() {
            blobs.remove(key);
        }
    }

    fn keys(&self) -> Vec<String> {
        self.blobs
            .lock()
            .map(|blobs| blobs.keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// File-backed store: one file per key under a data directory.
///
/// Keys may contain `:` (the session-key convention), which is mapped to a
/// filesystem-safe character and restored when listing.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory when missing.
    pub fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Write {
            key: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| match c {
                ':' => '~',
                '/' | '\\' => '_',
                other => other,
            })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }

    fn key_for(path: &Path) -> Option<String> {
        path.file_stem()
            .map(|s| s.to_string_lossy().replace('~', ":"))
    }
}

impl LocalStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Some(contents),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => {
                warn!(key, error = %err, "failed to read local blob; treating as absent");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        fs::write(self.path_for(key), value).map_err(|source| StoreError::Write {
            key: key.to_string(),
            source,
        })
    }

    fn remove(&self, key: &str) {
        if let Err(err) = fs::remove_file(self.path_for(key)) {
            if err.kind() != ErrorKind::NotFound {
                warn!(key, error = %err, "failed to remove local blob");
            }
        }
    }

    fn keys(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "json"))
            .filter_map(|entry| Self::key_for(&entry.path()))
            .collect()
    }
}
