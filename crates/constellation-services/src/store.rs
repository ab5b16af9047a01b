//! Key-value persistence behind the node's tables.
//!
//! Each logical table is one key holding a JSON document. `FileStore` keeps
//! one file per key under the node's data directory. Writes are atomic
//! (temp file, then rename), so a crash never leaves a half-written table.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Store keys used by the engine.
pub mod keys {
    pub const NEIGHBOURS: &str = "neighbours";
    pub const BLOCKLIST: &str = "blocklist";
    pub const CONSTELLATION: &str = "constellation";
    pub const ROUTING_TABLE: &str = "routing_table";
    pub const KNOWN_SATELLITES: &str = "known_satellites";
    pub const PENDING_DISCOVERY: &str = "pending_discovery";
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid store key {0:?}")]
    InvalidKey(String),
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Narrow get/put/list interface over durable bytes.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;
    fn list(&self) -> Result<Vec<String>, StoreError>;
}

pub type SharedStore = Arc<dyn KvStore>;

// ── MemoryStore ───────────────────────────────────────────────────────────────

/// Volatile store for tests and `storage.persist = false`.
#[derive(Default, Clone)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedStore {
        Arc::new(Self::new())
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        Ok(keys)
    }
}

// ── FileStore ─────────────────────────────────────────────────────────────────

/// One `<key>.json` file per key under `root`.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create the store, creating `root` if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StoreError::Io {
            path: root.clone(),
            source: e,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.key_path(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io { path, source: e }),
        }
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let path = self.key_path(key)?;
        let tmp_path = path.with_extension("json.tmp");
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |e| StoreError::Io { path, source: e }
        };

        // Atomic write: tmp file → rename
        {
            let mut file = fs::File::create(&tmp_path).map_err(io_err(&tmp_path))?;
            file.write_all(value).map_err(io_err(&tmp_path))?;
            file.sync_all().map_err(io_err(&tmp_path))?;
        }
        fs::rename(&tmp_path, &path).map_err(io_err(&path))?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>, StoreError> {
        let entries = fs::read_dir(&self.root).map_err(|e| StoreError::Io {
            path: self.root.clone(),
            source: e,
        })?;
        let mut keys: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                name.strip_suffix(".json").map(str::to_string)
            })
            .collect();
        keys.sort();
        Ok(keys)
    }
}

// ── Typed helpers ─────────────────────────────────────────────────────────────

/// Load and decode a JSON document. Missing, unreadable or corrupt
/// documents yield `None`; the latter two are logged.
pub fn load_json<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> Option<T> {
    let bytes = match store.get(key) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(error = %e, key, "failed to read persisted table");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(error = %e, key, "failed to parse persisted table");
            None
        }
    }
}

/// Encode and store a JSON document. Best-effort: failures are logged.
pub fn save_json<T: Serialize + ?Sized>(store: &dyn KvStore, key: &str, value: &T) {
    match serde_json::to_vec_pretty(value) {
        Ok(bytes) => {
            if let Err(e) = store.put(key, &bytes) {
                tracing::warn!(error = %e, key, "failed to persist table");
            }
        }
        Err(e) => tracing::warn!(error = %e, key, "failed to serialize table"),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// In-memory store that counts writes.
    #[derive(Default)]
    pub struct CountingStore {
        inner: MemoryStore,
        puts: AtomicUsize,
    }

    impl CountingStore {
        pub fn puts(&self) -> usize {
            self.puts.load(Ordering::SeqCst)
        }
    }

    impl KvStore for CountingStore {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
            self.inner.get(key)
        }

        fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            self.inner.put(key, value)
        }

        fn list(&self) -> Result<Vec<String>, StoreError> {
            self.inner.list()
        }
    }
}
