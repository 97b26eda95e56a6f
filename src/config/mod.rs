//! Configuration / cache-entry store
//!
//! Mediates between the IDE's key/value cache variables and Meson options.
//! `Configuration` owns the entry map together with the settings the entries
//! drive, so that storing an entry and running its side effect stay in step.

pub mod defaults;
pub mod entry;
pub mod settings;
pub mod store;

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub use defaults::{
    DefaultInputs, EMULATED_CMAKE_VERSION, ExecutableLocator, PathLocator, default_entries,
    emulated_version_string,
};
pub use entry::{CacheEntry, EntryType};
pub use settings::{BuildSettings, DEFAULT_GENERATOR, ToolEnvironment};

use entry::Assignment;
use settings::{DirectoryRole, Generator};
use store::CacheStore;

use defaults::KEY_PROJECT_NAME;
use settings::{KEY_BUILD_TYPE, KEY_CACHEFILE_DIR, KEY_GENERATOR, KEY_HOME_DIRECTORY};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No such {role} directory: {}", .path.display())]
    NoSuchDirectory { role: DirectoryRole, path: PathBuf },

    #[error("{role} directory path is not a directory: {}", .path.display())]
    NotADirectory { role: DirectoryRole, path: PathBuf },

    #[error("Source directory not provided")]
    SourceDirectoryNotSet,

    #[error("Build directory not provided")]
    BuildDirectoryNotSet,

    #[error("Generator not supported: {0}")]
    UnsupportedGenerator(String),

    #[error("No meson.build in source directory: {}", .0.display())]
    MissingBuildDescription(PathBuf),

    #[error("{key} must be set for the \"{generator}\" generator")]
    MissingRequiredEntry { key: String, generator: Generator },

    #[error("Invalid cache entry assignment: {0}")]
    InvalidAssignment(String),

    #[error("Invalid cache entry type: {0}")]
    InvalidEntryType(String),

    #[error("Cache file {} is unreadable: {reason}", .path.display())]
    CorruptedCache { path: PathBuf, reason: String },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// What a reload did to the in-memory store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// The build directory has no persisted cache yet
    NotFound,
    /// Keys that were absent in memory and got replayed
    Replayed(Vec<String>),
}

/// Cache entries plus the settings their side effects drive
#[derive(Debug, Clone)]
pub struct Configuration {
    settings: BuildSettings,
    store: CacheStore,
}

impl Configuration {
    pub fn new(meson_program: impl Into<String>) -> Self {
        Self {
            settings: BuildSettings::new(meson_program),
            store: CacheStore::new(),
        }
    }

    pub fn settings(&self) -> &BuildSettings {
        &self.settings
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.store.value(key)
    }

    /// Store an entry without running its side effect
    pub fn set(&mut self, key: &str, value: impl Into<String>, entry_type: EntryType) {
        self.store.set(key, value, entry_type);
    }

    /// Apply a `-DKEY[:TYPE]=VALUE` assignment: side effect first, then storage
    ///
    /// A rejected side effect leaves the store untouched.
    pub fn set_from_assignment(&mut self, raw: &str) -> Result<(), ConfigError> {
        let assignment = Assignment::parse(raw)?;
        self.settings.apply(&assignment.key, &assignment.value)?;
        debug!(
            "(cache entry) {}:{}={}",
            assignment.key, assignment.entry_type, assignment.value
        );
        self.store.insert(assignment.into_entry());
        Ok(())
    }

    pub fn bind_build_dir(&mut self, path: &Path) -> Result<(), ConfigError> {
        self.settings.set_build_dir(path)?;
        let dir = self.settings.require_build_dir()?.to_string_lossy().into_owned();
        self.store.set(KEY_CACHEFILE_DIR, dir, EntryType::Internal);
        Ok(())
    }

    pub fn bind_source_dir(&mut self, path: &Path) -> Result<(), ConfigError> {
        self.settings.set_source_dir(path)?;
        let dir = self.settings.require_source_dir()?.to_string_lossy().into_owned();
        self.store.set(KEY_HOME_DIRECTORY, dir, EntryType::Internal);
        Ok(())
    }

    pub fn bind_generator(&mut self, name: &str) -> Result<(), ConfigError> {
        let generator: Generator = name.parse()?;
        self.settings.set_generator(generator);
        self.store.set(KEY_GENERATOR, generator.name(), EntryType::Internal);
        Ok(())
    }

    pub fn bind_build_type(&mut self, build_type: &str) {
        self.settings.set_build_type(build_type);
        self.store.set(KEY_BUILD_TYPE, build_type, EntryType::String);
    }

    /// Path of the persisted cache for the bound build directory
    pub fn persisted_path(&self) -> Result<PathBuf, ConfigError> {
        Ok(CacheStore::persisted_path(self.settings.require_build_dir()?))
    }

    /// Merge the persisted cache into memory
    ///
    /// Only keys absent in memory are taken, each replaying its side effect, so
    /// state bound during this session always wins over stale persisted state.
    pub fn reload(&mut self) -> Result<ReloadOutcome, ConfigError> {
        let path = self.persisted_path()?;
        let Some(loaded) = CacheStore::load(&path)? else {
            return Ok(ReloadOutcome::NotFound);
        };

        let mut replayed = Vec::new();
        for entry in loaded.iter() {
            if self.store.contains(&entry.key) {
                continue;
            }
            if let Err(e) = self.settings.apply(&entry.key, &entry.value) {
                warn!("Persisted entry {} could not be applied: {}", entry.key, e);
            }
            self.store.insert(entry.clone());
            replayed.push(entry.key.clone());
        }

        info!(
            "Reloaded {} cache entries from {}",
            replayed.len(),
            path.display()
        );
        Ok(ReloadOutcome::Replayed(replayed))
    }

    /// Write every entry to the build directory's persisted cache
    pub fn persist(&self) -> Result<PathBuf, ConfigError> {
        let path = self.persisted_path()?;
        self.store.save(&path)?;
        Ok(path)
    }

    /// Write `CMakeCache.txt` into the build directory
    pub fn write_text_cache(&self) -> Result<PathBuf, ConfigError> {
        self.store.write_text_cache(self.settings.require_build_dir()?)
    }

    /// Merge computed defaults; entries already set take precedence
    pub fn init_defaults(&mut self, defaults: Vec<CacheEntry>) {
        for entry in defaults {
            if !self.store.contains(&entry.key) {
                self.store.insert(entry);
            }
        }
    }

    /// Whether the project defaults are present, persisted or computed
    pub fn has_project_defaults(&self) -> bool {
        self.store.contains(KEY_PROJECT_NAME)
    }

    /// Fail with the first entry the selected generator requires but lacks
    pub fn check_generator_requirements(&self) -> Result<(), ConfigError> {
        let Some(generator) = self.settings.generator else {
            return Ok(());
        };
        for key in generator.required_entries() {
            if self.get(key).is_none_or(str::is_empty) {
                return Err(ConfigError::MissingRequiredEntry {
                    key: key.to_string(),
                    generator,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use settings::MesonBuildType;
    use tempfile::TempDir;

    fn bound_configuration(build: &TempDir) -> Configuration {
        let mut config = Configuration::new("meson");
        config.bind_build_dir(build.path()).unwrap();
        config
    }

    #[test]
    fn test_same_assignment_twice_is_last_write_wins() {
        let mut config = Configuration::new("meson");
        config.set_from_assignment("-DCMAKE_GENERATOR=Ninja").unwrap();
        config
            .set_from_assignment("-DCMAKE_GENERATOR:INTERNAL=CodeBlocks - Ninja")
            .unwrap();

        let matching: Vec<_> = config
            .store()
            .iter()
            .filter(|entry| entry.key == "CMAKE_GENERATOR")
            .collect();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].value, "CodeBlocks - Ninja");
        assert_eq!(matching[0].entry_type, EntryType::Internal);
        assert_eq!(config.settings().generator, Some(Generator::CodeBlocksNinja));
    }

    #[test]
    fn test_build_type_assignment_persists_original_value() {
        let mut config = Configuration::new("meson");
        config.set_from_assignment("-DCMAKE_BUILD_TYPE=RelWithDebInfo").unwrap();

        assert_eq!(config.get("CMAKE_BUILD_TYPE"), Some("RelWithDebInfo"));
        assert_eq!(
            config.settings().meson_build_type,
            Some(MesonBuildType::DebugOptimized)
        );
    }

    #[test]
    fn test_rejected_side_effect_does_not_store() {
        let mut config = Configuration::new("meson");
        let err = config
            .set_from_assignment("-DCMAKE_HOME_DIRECTORY=/definitely/not/here")
            .unwrap_err();

        assert!(matches!(err, ConfigError::NoSuchDirectory { .. }));
        assert!(config.get("CMAKE_HOME_DIRECTORY").is_none());
    }

    #[test]
    fn test_reload_keeps_in_memory_values() {
        let build = TempDir::new().unwrap();

        let mut previous = bound_configuration(&build);
        previous.bind_generator("Unix Makefiles").unwrap();
        previous.set_from_assignment("-DCMAKE_C_COMPILER:FILEPATH=/usr/bin/clang").unwrap();
        previous.persist().unwrap();

        let mut config = bound_configuration(&build);
        config.bind_generator("Ninja").unwrap();
        let outcome = config.reload().unwrap();

        assert_eq!(config.get("CMAKE_GENERATOR"), Some("Ninja"));
        assert_eq!(config.settings().generator, Some(Generator::Ninja));
        assert_eq!(
            outcome,
            ReloadOutcome::Replayed(vec!["CMAKE_C_COMPILER".to_string()])
        );
        assert_eq!(
            config.settings().tool_env.get("CC").map(String::as_str),
            Some("/usr/bin/clang")
        );
    }

    #[test]
    fn test_reload_replays_each_key_once() {
        let build = TempDir::new().unwrap();

        let mut previous = bound_configuration(&build);
        previous.set_from_assignment("-DMESON=/opt/meson").unwrap();
        previous.persist().unwrap();

        let mut config = bound_configuration(&build);
        config.reload().unwrap();
        assert_eq!(config.settings().meson_program, "/opt/meson");

        // Second reload finds the key present and replays nothing
        assert_eq!(config.reload().unwrap(), ReloadOutcome::Replayed(vec![]));
    }

    #[test]
    fn test_reload_without_persisted_cache() {
        let build = TempDir::new().unwrap();
        let mut config = bound_configuration(&build);
        assert_eq!(config.reload().unwrap(), ReloadOutcome::NotFound);
    }

    #[test]
    fn test_reload_requires_build_dir() {
        let mut config = Configuration::new("meson");
        assert!(matches!(
            config.reload(),
            Err(ConfigError::BuildDirectoryNotSet)
        ));
    }

    #[test]
    fn test_init_defaults_does_not_override() {
        let mut config = Configuration::new("meson");
        config.set_from_assignment("-DCMAKE_C_COMPILER:FILEPATH=/opt/cc").unwrap();
        config.init_defaults(vec![
            CacheEntry::new("CMAKE_C_COMPILER", "/usr/bin/cc", EntryType::Filepath),
            CacheEntry::new("CMAKE_AR", "/usr/bin/ar", EntryType::Filepath),
        ]);

        assert_eq!(config.get("CMAKE_C_COMPILER"), Some("/opt/cc"));
        assert_eq!(config.get("CMAKE_AR"), Some("/usr/bin/ar"));
    }

    #[test]
    fn test_android_generator_requires_abi() {
        let mut config = Configuration::new("meson");
        config.bind_generator("Android Gradle - Ninja").unwrap();
        assert!(matches!(
            config.check_generator_requirements(),
            Err(ConfigError::MissingRequiredEntry { .. })
        ));

        config.set_from_assignment("-DANDROID_ABI=arm64-v8a").unwrap();
        config.check_generator_requirements().unwrap();
    }
}
