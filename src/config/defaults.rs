//! Default cache entries computed when a build directory is first bound

use std::path::{Path, PathBuf};
use tracing::warn;

use super::entry::{CacheEntry, EntryType};
use super::settings::{Generator, KEY_CACHEFILE_DIR, KEY_GENERATOR, KEY_HOME_DIRECTORY};

/// Entry marking that project defaults were computed for a build directory
pub const KEY_PROJECT_NAME: &str = "CMAKE_PROJECT_NAME";

/// CMake version the wrapper reports to IDEs
pub const EMULATED_CMAKE_VERSION: (u32, u32, u32) = (3, 10, 0);

pub fn emulated_version_string() -> String {
    let (major, minor, patch) = EMULATED_CMAKE_VERSION;
    format!("{major}.{minor}.{patch}")
}

/// Finds executables on the search path
#[cfg_attr(test, mockall::automock)]
pub trait ExecutableLocator: Send + Sync {
    fn find(&self, name: &str) -> Option<PathBuf>;
}

/// Locator backed by the `which` crate
#[derive(Debug, Clone, Default)]
pub struct PathLocator;

impl ExecutableLocator for PathLocator {
    fn find(&self, name: &str) -> Option<PathBuf> {
        which::which(name).ok()
    }
}

/// First candidate found on the search path
pub fn find_first(locator: &dyn ExecutableLocator, candidates: &[&str]) -> Option<PathBuf> {
    candidates.iter().find_map(|name| locator.find(name))
}

/// Everything the default entries are derived from
#[derive(Debug, Clone)]
pub struct DefaultInputs<'a> {
    pub project_name: &'a str,
    pub source_dir: &'a Path,
    pub build_dir: &'a Path,
    pub generator: Option<Generator>,
    /// Path of the running wrapper executable
    pub command_path: &'a Path,
}

/// Compute the fixed set of default entries
///
/// Toolchain programs missing from the search path are skipped.
pub fn default_entries(inputs: &DefaultInputs<'_>, locator: &dyn ExecutableLocator) -> Vec<CacheEntry> {
    let (major, minor, patch) = EMULATED_CMAKE_VERSION;
    let path_str = |path: &Path| path.to_string_lossy().into_owned();

    let install_prefix = if cfg!(windows) {
        "c:/Program Files"
    } else {
        "/usr/local"
    };

    let mut entries = vec![
        CacheEntry::new("CMAKE_EXPORT_COMPILE_COMMANDS", "YES", EntryType::Bool),
        CacheEntry::new("CMAKE_INSTALL_PREFIX", install_prefix, EntryType::Path),
    ];

    let toolchain: [(&str, &[&str]); 5] = [
        ("CMAKE_C_COMPILER", &["cc", "gcc", "clang"]),
        ("CMAKE_CXX_COMPILER", &["c++", "g++", "clang++"]),
        ("CMAKE_MAKE_PROGRAM", &["make"]),
        ("CMAKE_RANLIB", &["ranlib"]),
        ("CMAKE_AR", &["ar"]),
    ];
    for (key, candidates) in toolchain {
        match find_first(locator, candidates) {
            Some(path) => entries.push(CacheEntry::new(key, path_str(&path), EntryType::Filepath)),
            None => warn!("No executable found for {} (tried {:?})", key, candidates),
        }
    }

    let name = inputs.project_name;
    entries.extend([
        CacheEntry::new(KEY_PROJECT_NAME, name, EntryType::Static),
        CacheEntry::new(format!("{name}_BINARY_DIR"), path_str(inputs.build_dir), EntryType::Static),
        CacheEntry::new(format!("{name}_SOURCE_DIR"), path_str(inputs.source_dir), EntryType::Static),
        CacheEntry::new(KEY_CACHEFILE_DIR, path_str(inputs.build_dir), EntryType::Internal),
        CacheEntry::new("CMAKE_CACHE_MAJOR_VERSION", major.to_string(), EntryType::Internal),
        CacheEntry::new("CMAKE_CACHE_MINOR_VERSION", minor.to_string(), EntryType::Internal),
        CacheEntry::new("CMAKE_CACHE_PATCH_VERSION", patch.to_string(), EntryType::Internal),
        CacheEntry::new("CMAKE_COMMAND", path_str(inputs.command_path), EntryType::Internal),
        CacheEntry::new(
            KEY_GENERATOR,
            inputs.generator.map(|g| g.name()).unwrap_or_default(),
            EntryType::Internal,
        ),
        CacheEntry::new(KEY_HOME_DIRECTORY, path_str(inputs.source_dir), EntryType::Internal),
        CacheEntry::new(
            "CMAKE_ROOT",
            inputs
                .command_path
                .parent()
                .map(path_str)
                .unwrap_or_default(),
            EntryType::Internal,
        ),
    ]);

    entries
}
