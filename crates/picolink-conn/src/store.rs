//! Key/value state that survives restarts.
//!
//! The supervisor remembers the id of the last bridge process under
//! [`PROCESS_ID_KEY`] so an orphan left behind by a crash can be killed on the
//! next start.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;

/// Key holding the last spawned bridge process id, as decimal text.
pub const PROCESS_ID_KEY: &str = "processId";

/// Persistent string key/value store.
pub trait StateStore: Send {
    fn get(&self, key: &str) -> Option<String>;

    /// Sets `key` and persists the change.
    fn update(&mut self, key: &str, value: &str) -> Result<()>;
}

// ============================================================================
// In-memory store
// ============================================================================

/// Store that forgets everything on drop. Used for tests and `--ephemeral`.
#[derive(Debug, Default, Clone)]
pub struct MemoryStateStore {
    values: BTreeMap<String, String>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with one entry.
    pub fn with_entry(key: &str, value: &str) -> Self {
        let mut store = Self::new();
        store.values.insert(key.to_string(), value.to_string());
        store
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn update(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// ============================================================================
// JSON file store
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    values: BTreeMap<String, String>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

/// Store backed by a JSON file, rewritten on every update.
#[derive(Debug)]
pub struct JsonStateStore {
    path: PathBuf,
    state: StateFile,
}

impl JsonStateStore {
    /// Opens the store at `path`.
    ///
    /// A missing file starts empty. A corrupt file is logged and replaced on
    /// the next update rather than blocking startup.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = if path.exists() {
            let content = fs::read_to_string(&path)?;
            match serde_json::from_str(&content) {
                Ok(state) => state,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Discarding unreadable state file");
                    StateFile::default()
                }
            }
        } else {
            StateFile::default()
        };
        debug!(path = %path.display(), entries = state.values.len(), "Opened state store");
        Ok(Self { path, state })
    }

    /// `<state_dir>/picolink/state.json`, falling back to the data dir on
    /// platforms without a state dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .map(|dir| dir.join("picolink").join("state.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// When the file was last written, if ever.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.state.updated_at
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.state)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl StateStore for JsonStateStore {
    fn get(&self, key: &str) -> Option<String> {
        self.state.values.get(key).cloned()
    }

    fn update(&mut self, key: &str, value: &str) -> Result<()> {
        self.state.values.insert(key.to_string(), value.to_string());
        self.state.updated_at = Some(Utc::now());
        self.persist()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_get_update() {
        let mut store = MemoryStateStore::new();
        assert_eq!(store.get(PROCESS_ID_KEY), None);
        store.update(PROCESS_ID_KEY, "123").unwrap();
        assert_eq!(store.get(PROCESS_ID_KEY), Some("123".to_string()));

        let seeded = MemoryStateStore::with_entry(PROCESS_ID_KEY, "7");
        assert_eq!(seeded.get(PROCESS_ID_KEY), Some("7".to_string()));
    }

    #[test]
    fn test_json_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let mut store = JsonStateStore::open(&path).unwrap();
        assert!(store.updated_at().is_none());
        store.update(PROCESS_ID_KEY, "456").unwrap();
        assert!(store.updated_at().is_some());

        let reopened = JsonStateStore::open(&path).unwrap();
        assert_eq!(reopened.get(PROCESS_ID_KEY), Some("456".to_string()));
        assert_eq!(reopened.path(), path.as_path());
    }

    #[test]
    fn test_json_store_tolerates_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "not json").unwrap();

        let mut store = JsonStateStore::open(&path).unwrap();
        assert_eq!(store.get(PROCESS_ID_KEY), None);
        store.update(PROCESS_ID_KEY, "1").unwrap();

        let reopened = JsonStateStore::open(&path).unwrap();
        assert_eq!(reopened.get(PROCESS_ID_KEY), Some("1".to_string()));
    }
}
