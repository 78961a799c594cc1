use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

/// Client-local string key-value storage
///
/// Values are opaque strings; callers serialize their own records.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the value stored under `key`
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Key-value storage backed by a single JSON object file
///
/// Every `set` rewrites the whole file through a temp file in the same
/// directory followed by a rename, so a crash never leaves a half-written file.
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn read_entries(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let contents = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read storage file: {:?}", self.path))?;

        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse storage file: {:?}", self.path))
    }

    fn write_entries(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        std::fs::create_dir_all(&parent)
            .with_context(|| format!("Failed to create storage directory: {:?}", parent))?;

        let contents =
            serde_json::to_string_pretty(entries).context("Failed to serialize storage")?;

        let mut temp = tempfile::NamedTempFile::new_in(&parent)
            .with_context(|| format!("Failed to create temp file in {:?}", parent))?;
        temp.write_all(contents.as_bytes())
            .context("Failed to write storage temp file")?;
        temp.persist(&self.path)
            .with_context(|| format!("Failed to replace storage file: {:?}", self.path))?;

        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.read_entries()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        // Unreadable contents are replaced
        let mut entries = self.read_entries().unwrap_or_else(|e| {
            tracing::warn!("Discarding unreadable storage file: {:#}", e);
            BTreeMap::new()
        });
        entries.insert(key.to_string(), value.to_string());
        self.write_entries(&entries)?;

        tracing::debug!("Stored {} in {:?}", key, self.path);
        Ok(())
    }
}

/// In-process storage, lost on exit
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
