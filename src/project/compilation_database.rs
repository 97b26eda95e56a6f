use json_compilation_db::Entry;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use super::paths;

/// File name meson writes into every configured build directory
pub const COMPILATION_DATABASE_FILE: &str = "compile_commands.json";

#[derive(Error, Debug)]
pub enum CompilationDatabaseError {
    #[error("Compilation database file not found: {path}")]
    FileNotFound { path: String },
    #[error("Failed to read compilation database file: {error}")]
    ReadError { error: String },
    #[error("Failed to parse compilation database JSON: {error}")]
    ParseError { error: String },
}

/// Parsed `compile_commands.json` of a build directory
///
/// Entries may name their file relative to their `directory` or absolutely;
/// lookups resolve both sides before comparing.
#[derive(Debug)]
pub struct CompilationDatabase {
    entries: Vec<Entry>,
}

impl CompilationDatabase {
    /// Load the database that lives in `build_dir`
    pub fn load(build_dir: &Path) -> Result<Self, CompilationDatabaseError> {
        Self::new(build_dir.join(COMPILATION_DATABASE_FILE))
    }

    /// Load and parse the compilation database at `path`
    pub fn new(path: PathBuf) -> Result<Self, CompilationDatabaseError> {
        if !path.exists() {
            return Err(CompilationDatabaseError::FileNotFound {
                path: path.to_string_lossy().to_string(),
            });
        }

        let file = std::fs::File::open(&path).map_err(|e| CompilationDatabaseError::ReadError {
            error: e.to_string(),
        })?;

        let reader = std::io::BufReader::new(file);
        let entries: Vec<Entry> =
            serde_json::from_reader(reader).map_err(|e| CompilationDatabaseError::ParseError {
                error: e.to_string(),
            })?;

        debug!("Loaded {} compile commands from {}", entries.len(), path.display());
        Ok(Self { entries })
    }

    /// Entry compiling `source` (an absolute path)
    pub fn find_by_source(&self, source: &Path) -> Option<&Entry> {
        let wanted = paths::normalize(source);
        self.entries
            .iter()
            .find(|entry| paths::absolutize(&entry.file, &entry.directory) == wanted)
    }
}
