//! Saved WiFi credentials.
//!
//! Stored in a [`KvStore`] as `count`, `ssid_{i}` and `pwd_{i}` keys, oldest
//! entry at index 0. Saving a known SSID updates it in place; saving a new one
//! into a full list evicts the oldest entry.

use serde::{Deserialize, Serialize};
use uplink_core::ConnectionError;

use crate::drivers::KvStore;

/// Default capacity of the credential list
pub const DEFAULT_MAX_CREDENTIALS: usize = 10;

const COUNT_KEY: &str = "count";

fn ssid_key(index: usize) -> String {
    format!("ssid_{}", index)
}

fn pwd_key(index: usize) -> String {
    format!("pwd_{}", index)
}

/// One SSID/password pair
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiCredential {
    pub ssid: String,
    pub password: String,
}

impl WifiCredential {
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for WifiCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WifiCredential")
            .field("ssid", &self.ssid)
            .field("password", &"***")
            .finish()
    }
}

/// Bounded, persisted list of credentials
pub struct CredentialList {
    store: Box<dyn KvStore>,
    max_entries: usize,
}

impl CredentialList {
    pub fn new(store: Box<dyn KvStore>, max_entries: usize) -> Self {
        Self {
            store,
            max_entries: max_entries.max(1),
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Number of stored entries
    pub fn count(&self) -> Result<usize, ConnectionError> {
        match self.store.get(COUNT_KEY)? {
            Some(raw) => raw.parse::<usize>().map_err(|e| ConnectionError::Storage {
                reason: format!("corrupt credential count {:?}: {}", raw, e),
            }),
            None => Ok(0),
        }
    }

    fn read(&self, index: usize) -> Result<Option<WifiCredential>, ConnectionError> {
        let Some(ssid) = self.store.get(&ssid_key(index))? else {
            return Ok(None);
        };
        let password = self.store.get(&pwd_key(index))?.unwrap_or_default();
        Ok(Some(WifiCredential { ssid, password }))
    }

    fn write(&mut self, index: usize, credential: &WifiCredential) -> Result<(), ConnectionError> {
        self.store.set(&ssid_key(index), &credential.ssid)?;
        if credential.password.is_empty() {
            self.store.remove(&pwd_key(index))
        } else {
            self.store.set(&pwd_key(index), &credential.password)
        }
    }

    /// Every readable entry, oldest first
    pub fn load_all(&self) -> Result<Vec<WifiCredential>, ConnectionError> {
        let count = self.count()?;
        let mut list = Vec::with_capacity(count);
        for index in 0..count.min(self.max_entries) {
            if let Some(credential) = self.read(index)? {
                list.push(credential);
            }
        }
        Ok(list)
    }

    /// Most recently added entry
    pub fn latest(&self) -> Result<Option<WifiCredential>, ConnectionError> {
        Ok(self.load_all()?.pop())
    }

    /// Find an entry by SSID
    pub fn find(&self, ssid: &str) -> Result<Option<WifiCredential>, ConnectionError> {
        Ok(self.load_all()?.into_iter().find(|c| c.ssid == ssid))
    }

    /// Save a credential, returning its index
    pub fn save(&mut self, ssid: &str, password: &str) -> Result<usize, ConnectionError> {
        if ssid.is_empty() {
            return Err(ConnectionError::invalid_arg("SSID must not be empty"));
        }

        let mut list = self.load_all()?;
        let credential = WifiCredential::new(ssid, password);

        let index = if let Some(existing) = list.iter().position(|c| c.ssid == ssid) {
            list[existing] = credential;
            existing
        } else {
            if list.len() >= self.max_entries {
                let evicted = list.remove(0);
                tracing::warn!("Credential list full, evicting {}", evicted.ssid);
            }
            list.push(credential);
            list.len() - 1
        };

        self.rewrite(&list)?;
        tracing::info!("WiFi credentials saved [{}/{}]: {}", index + 1, list.len(), ssid);
        Ok(index)
    }

    /// Delete the entry at `index`, shifting later entries down
    pub fn delete(&mut self, index: usize) -> Result<(), ConnectionError> {
        let mut list = self.load_all()?;
        if index >= list.len() {
            return Err(ConnectionError::invalid_arg(format!(
                "credential index {} out of range ({})",
                index,
                list.len()
            )));
        }
        list.remove(index);
        self.rewrite(&list)
    }

    /// Remove every entry
    pub fn clear(&mut self) -> Result<(), ConnectionError> {
        self.rewrite(&[])
    }

    fn rewrite(&mut self, list: &[WifiCredential]) -> Result<(), ConnectionError> {
        let old_count = self.count()?;
        for (index, credential) in list.iter().enumerate() {
            self.write(index, credential)?;
        }
        for index in list.len()..old_count.max(list.len()) {
            self.store.remove(&ssid_key(index))?;
            self.store.remove(&pwd_key(index))?;
        }
        self.store.set(COUNT_KEY, &list.len().to_string())?;
        self.store.commit()
    }
}

impl std::fmt::Debug for CredentialList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialList")
            .field("max_entries", &self.max_entries)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::MemoryKvStore;
    use proptest::prelude::*;

    fn list(max: usize) -> CredentialList {
        CredentialList::new(Box::new(MemoryKvStore::new()), max)
    }

    #[test]
    fn test_save_and_load() {
        let mut creds = list(10);
        assert_eq!(creds.count().unwrap(), 0);
        assert_eq!(creds.latest().unwrap(), None);

        assert_eq!(creds.save("home", "secret").unwrap(), 0);
        assert_eq!(creds.save("office", "").unwrap(), 1);

        let all = creds.load_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1], WifiCredential::new("office", ""));
        assert_eq!(creds.latest().unwrap().unwrap().ssid, "office");
    }

    #[test]
    fn test_update_in_place() {
        let mut creds = list(10);
        creds.save("a", "1").unwrap();
        creds.save("b", "2").unwrap();
        assert_eq!(creds.save("a", "new").unwrap(), 0);
        assert_eq!(creds.count().unwrap(), 2);
        assert_eq!(creds.find("a").unwrap().unwrap().password, "new");
    }

    #[test]
    fn test_empty_ssid_rejected() {
        let mut creds = list(10);
        assert!(matches!(creds.save("", "x"), Err(ConnectionError::InvalidArg { .. })));
    }

    #[test]
    fn test_delete_and_clear() {
        let mut creds = list(10);
        creds.save("a", "1").unwrap();
        creds.save("b", "2").unwrap();
        creds.save("c", "3").unwrap();

        creds.delete(1).unwrap();
        let ssids: Vec<_> = creds.load_all().unwrap().into_iter().map(|c| c.ssid).collect();
        assert_eq!(ssids, vec!["a", "c"]);
        assert!(creds.delete(5).is_err());

        creds.clear().unwrap();
        assert_eq!(creds.count().unwrap(), 0);
    }

    #[test]
    fn test_debug_hides_password() {
        let text = format!("{:?}", WifiCredential::new("net", "hunter2"));
        assert!(!text.contains("hunter2"));
    }

    proptest! {
        #[test]
        fn prop_fifo_eviction(ssids in proptest::collection::vec("[a-e]{1,2}", 1..40), max in 1usize..6) {
            let mut creds = list(max);
            let mut model: Vec<String> = Vec::new();

            for ssid in &ssids {
                creds.save(ssid, "pw").unwrap();
                if !model.contains(ssid) {
                    if model.len() >= max {
                        model.remove(0);
                    }
                    model.push(ssid.clone());
                }
            }

            let stored: Vec<String> = creds.load_all().unwrap().into_iter().map(|c| c.ssid).collect();
            prop_assert!(stored.len() <= max);
            prop_assert_eq!(stored, model);
        }
    }
}
