//! Cache-entry storage and its on-disk forms
//!
//! The store is a deterministic map (sorted by key) so that both the private
//! JSON cache file and the `CMakeCache.txt` listing come out byte-identical for
//! identical contents.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::entry::{CacheEntry, EntryType};
use super::ConfigError;

/// File name of the private persisted cache inside a build directory
pub const PERSISTED_CACHE_FILE: &str = "mcw-cache.json";

/// File name of the text cache listing consumed by IDEs
pub const TEXT_CACHE_FILE: &str = "CMakeCache.txt";

/// Bumped whenever the persisted layout changes incompatibly
const PERSISTED_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct PersistedCache {
    format_version: u32,
    entries: Vec<CacheEntry>,
}

/// Key/value/type store of cache entries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStore {
    entries: BTreeMap<String, CacheEntry>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|entry| entry.value.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Set an entry, always overwriting value and type
    pub fn set(&mut self, key: &str, value: impl Into<String>, entry_type: EntryType) {
        self.insert(CacheEntry::new(key, value, entry_type));
    }

    pub fn insert(&mut self, entry: CacheEntry) {
        self.entries.insert(entry.key.clone(), entry);
    }

    /// Entries in stable key order
    pub fn iter(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Path of the persisted cache for a build directory
    pub fn persisted_path(build_dir: &Path) -> PathBuf {
        build_dir.join(PERSISTED_CACHE_FILE)
    }

    /// Load a persisted store; `Ok(None)` when the build directory has none yet
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let persisted: PersistedCache =
            serde_json::from_str(&content).map_err(|e| ConfigError::CorruptedCache {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if persisted.format_version != PERSISTED_FORMAT_VERSION {
            return Err(ConfigError::CorruptedCache {
                path: path.to_path_buf(),
                reason: format!("unsupported format version {}", persisted.format_version),
            });
        }

        let mut store = Self::new();
        for entry in persisted.entries {
            store.insert(entry);
        }
        debug!("Loaded {} cache entries from {}", store.len(), path.display());
        Ok(Some(store))
    }

    /// Serialize the full entry map to `path`
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let persisted = PersistedCache {
            format_version: PERSISTED_FORMAT_VERSION,
            entries: self.entries.values().cloned().collect(),
        };
        let content =
            serde_json::to_string_pretty(&persisted).map_err(|e| ConfigError::CorruptedCache {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Saved {} cache entries to {}", self.len(), path.display());
        Ok(())
    }

    /// Render the legacy `KEY:TYPE=VALUE` listing
    pub fn render_text_cache(&self) -> String {
        let mut out = String::new();
        out.push_str("# Generated by meson-cmake-wrapper\n\n");
        out.push_str("########################\n");
        out.push_str("# Cache entries\n");
        out.push_str("########################\n\n");
        for entry in self.iter() {
            out.push_str(&format!(
                "{}:{}={}\n",
                entry.key, entry.entry_type, entry.value
            ));
        }
        out
    }

    /// Write the legacy listing into `build_dir`
    pub fn write_text_cache(&self, build_dir: &Path) -> Result<PathBuf, ConfigError> {
        let path = build_dir.join(TEXT_CACHE_FILE);
        let io_error = |source| ConfigError::Io {
            path: path.clone(),
            source,
        };
        let mut file = fs::File::create(&path).map_err(io_error)?;
        file.write_all(self.render_text_cache().as_bytes())
            .map_err(io_error)?;
        Ok(path)
    }
}
