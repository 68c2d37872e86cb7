//! Named settings profiles persisted to a JSON store
//!
//! Profiles let a user keep several narrator/setting bundles and recall the
//! most recently used books.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use bookvoice_core::Result;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::Settings;

const MAX_RECENT: usize = 10;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
    #[serde(default)]
    profiles: BTreeMap<String, Settings>,
    #[serde(default)]
    recent_books: Vec<String>,
    #[serde(default)]
    last_profile: Option<String>,
}

/// JSON-backed profile store
pub struct ProfileStore {
    path: PathBuf,
    data: Mutex<StoreData>,
}

impl ProfileStore {
    /// Open a store at `path`, creating parent directories as needed
    ///
    /// An unreadable or corrupt store file falls back to an empty store
    /// instead of failing the application.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let data = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!("Corrupt profile store {}: {e}; starting fresh", path.display());
                    StoreData::default()
                }
            },
            Err(_) => StoreData::default(),
        };

        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    /// Save or replace a named profile and mark it as last used
    pub fn save_profile(&self, name: &str, settings: &Settings) -> Result<()> {
        {
            let mut data = self.data.lock();
            data.profiles.insert(name.to_string(), settings.clone());
            data.last_profile = Some(name.to_string());
        }
        self.persist()
    }

    /// Fetch a profile by name
    pub fn profile(&self, name: &str) -> Option<Settings> {
        self.data.lock().profiles.get(name).cloned()
    }

    /// Remove a profile; returns true when it existed
    pub fn delete_profile(&self, name: &str) -> Result<bool> {
        let existed = {
            let mut data = self.data.lock();
            if data.last_profile.as_deref() == Some(name) {
                data.last_profile = None;
            }
            data.profiles.remove(name).is_some()
        };
        if existed {
            self.persist()?;
        }
        Ok(existed)
    }

    /// All profile names, sorted
    pub fn profile_names(&self) -> Vec<String> {
        self.data.lock().profiles.keys().cloned().collect()
    }

    /// The profile saved or loaded most recently
    pub fn last_profile(&self) -> Option<Settings> {
        let data = self.data.lock();
        data.last_profile
            .as_ref()
            .and_then(|name| data.profiles.get(name))
            .cloned()
    }

    /// Record a book path at the front of the recent list, deduplicated
    pub fn add_recent_book(&self, path: &str) -> Result<()> {
        {
            let mut data = self.data.lock();
            data.recent_books.retain(|p| p != path);
            data.recent_books.insert(0, path.to_string());
            data.recent_books.truncate(MAX_RECENT);
        }
        self.persist()
    }

    /// Recently used book paths, most recent first
    pub fn recent_books(&self) -> Vec<String> {
        self.data.lock().recent_books.clone()
    }

    fn persist(&self) -> Result<()> {
        let raw = serde_json::to_string_pretty(&*self.data.lock())?;
        fs::write(&self.path, raw)?;
        tracing::debug!("Profile store saved to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, ProfileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::open(dir.path().join("profiles.json")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_profile_round_trip() {
        let (dir, store) = temp_store();

        let mut settings = Settings::default();
        settings.chunking.max_words = 42;
        store.save_profile("short-chunks", &settings).unwrap();

        // Reopen from disk
        let reopened = ProfileStore::open(dir.path().join("profiles.json")).unwrap();
        let loaded = reopened.profile("short-chunks").unwrap();
        assert_eq!(loaded.chunking.max_words, 42);
        assert_eq!(reopened.profile_names(), vec!["short-chunks".to_string()]);
    }

    #[test]
    fn test_last_profile_tracking() {
        let (_dir, store) = temp_store();
        store.save_profile("a", &Settings::default()).unwrap();
        store.save_profile("b", &Settings::default()).unwrap();
        assert!(store.last_profile().is_some());

        store.delete_profile("b").unwrap();
        assert!(store.last_profile().is_none());
    }

    #[test]
    fn test_recent_books_dedupe_and_cap() {
        let (_dir, store) = temp_store();
        for i in 0..12 {
            store.add_recent_book(&format!("book-{i}.epub")).unwrap();
        }
        store.add_recent_book("book-5.epub").unwrap();

        let recent = store.recent_books();
        assert_eq!(recent.len(), MAX_RECENT);
        assert_eq!(recent[0], "book-5.epub");
        assert_eq!(recent.iter().filter(|p| *p == "book-5.epub").count(), 1);
    }

    #[test]
    fn test_corrupt_store_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.json");
        fs::write(&path, "{ not json").unwrap();

        let store = ProfileStore::open(&path).unwrap();
        assert!(store.profile_names().is_empty());
    }
}
