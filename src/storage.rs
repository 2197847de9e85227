//! Durable key/value storage for session tokens

use crate::error::{ClientError, Result};
use directories::ProjectDirs;
use papaya::HashMap;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Synchronous string key/value persistence
pub trait DurableStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removing a missing key succeeds
    fn remove(&self, key: &str) -> Result<()>;

    /// Write several entries as one update where the backend supports it
    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }

    /// Remove several entries as one update where the backend supports it
    fn remove_many(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.remove(key)?;
        }
        Ok(())
    }
}

/// Process-local storage; nothing survives a restart
pub struct MemoryStorage {
    entries: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl DurableStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.pin().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.pin().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.pin().remove(key);
        Ok(())
    }
}

/// JSON-object file on disk
///
/// Every write rewrites the whole file through a sibling temp file and a
/// rename, so readers never observe a partially written file.
pub struct FileStorage {
    path: PathBuf,
    entries: HashMap<String, String>,
    write_lock: Mutex<()>,
}

impl FileStorage {
    /// Open `path`, starting empty when the file does not exist yet
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = HashMap::new();

        match fs::read(&path) {
            Ok(bytes) => {
                let stored: BTreeMap<String, String> = serde_json::from_slice(&bytes)?;
                let pinned = entries.pin();
                for (key, value) in stored {
                    pinned.insert(key, value);
                }
                debug!(path = %path.display(), "Loaded session storage");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No session storage file yet");
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Self {
            path,
            entries,
            write_lock: Mutex::new(()),
        })
    }

    /// Per-user data directory location, `<data_dir>/session.json`
    pub fn default_path() -> Result<PathBuf> {
        ProjectDirs::from("com", "TravelCompanion", "TravelCompanion")
            .map(|dirs| dirs.data_dir().join("session.json"))
            .ok_or_else(|| {
                ClientError::Configuration("could not determine a home directory".to_string())
            })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let snapshot: BTreeMap<String, String> = self
            .entries
            .pin()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let contents = serde_json::to_vec_pretty(&snapshot)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl DurableStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.pin().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.pin().insert(key.to_string(), value.to_string());
        self.persist()
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.remove_many(&[key])
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        let pinned = self.entries.pin();
        for (key, value) in entries {
            pinned.insert(key.to_string(), value.to_string());
        }
        self.persist()
    }

    fn remove_many(&self, keys: &[&str]) -> Result<()> {
        let pinned = self.entries.pin();
        let mut changed = false;
        for key in keys {
            changed |= pinned.remove(*key).is_some();
        }
        if changed {
            self.persist()?;
        }
        Ok(())
    }
}
