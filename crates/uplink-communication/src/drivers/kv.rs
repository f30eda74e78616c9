//! Persistent key-value storage interface.

use std::collections::BTreeMap;
use uplink_core::ConnectionError;

/// Small persistent string store (an NVS namespace on the device)
pub trait KvStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>, ConnectionError>;

    fn set(&mut self, key: &str, value: &str) -> Result<(), ConnectionError>;

    /// Remove `key`; removing a missing key is not an error
    fn remove(&mut self, key: &str) -> Result<(), ConnectionError>;

    /// Make pending writes durable
    fn commit(&mut self) -> Result<(), ConnectionError> {
        Ok(())
    }
}

/// Volatile store for tests and host runs
#[derive(Debug, Clone, Default)]
pub struct MemoryKvStore {
    entries: BTreeMap<String, String>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, ConnectionError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ConnectionError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), ConnectionError> {
        self.entries.remove(key);
        Ok(())
    }
}
