//! JSON file key-value store
//!
//! Host stand-in for the device's NVS namespace. Writes are buffered in
//! memory and reach the disk on `commit`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uplink_communication::KvStore;
use uplink_core::ConnectionError;

use crate::error::SettingsResult;

/// Key-value store persisted as a flat JSON object
#[derive(Debug)]
pub struct JsonFileKvStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
    dirty: bool,
}

impl JsonFileKvStore {
    /// Open `path`, starting empty if the file does not exist yet
    pub fn open(path: impl Into<PathBuf>) -> SettingsResult<Self> {
        let path = path.into();
        let entries: BTreeMap<String, String> = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            BTreeMap::new()
        };
        tracing::debug!("Opened key-value store {} ({} keys)", path.display(), entries.len());
        Ok(Self {
            path,
            entries,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when there are writes not yet committed
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn flush(&self) -> Result<(), ConnectionError> {
        let storage = |e: &dyn std::fmt::Display| ConnectionError::Storage {
            reason: format!("{}: {}", self.path.display(), e),
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| storage(&e))?;
        }
        let content = serde_json::to_string_pretty(&self.entries).map_err(|e| storage(&e))?;

        // Write beside the target, then swap it in
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content).map_err(|e| storage(&e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| storage(&e))?;
        Ok(())
    }
}

impl KvStore for JsonFileKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, ConnectionError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ConnectionError> {
        self.entries.insert(key.to_string(), value.to_string());
        self.dirty = true;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), ConnectionError> {
        if self.entries.remove(key).is_some() {
            self.dirty = true;
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<(), ConnectionError> {
        if !self.dirty {
            return Ok(());
        }
        self.flush()?;
        self.dirty = false;
        tracing::debug!("Committed {} keys to {}", self.entries.len(), self.path.display());
        Ok(())
    }
}
