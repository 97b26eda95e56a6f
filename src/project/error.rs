use thiserror::Error;

use super::compilation_database::CompilationDatabaseError;
use crate::config::ConfigError;
use crate::io::BuildToolError;

/// Expected failures while operating on a project
///
/// Request handlers report these in-band; the CLI prints them and exits 1.
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    BuildTool(#[from] BuildToolError),

    #[error(transparent)]
    CompilationDatabase(#[from] CompilationDatabaseError),

    #[error("Failed to parse {what}: {reason}")]
    Parse { what: &'static str, reason: String },
}

impl ProjectError {
    pub(crate) fn parse(what: &'static str, error: serde_json::Error) -> Self {
        ProjectError::Parse {
            what,
            reason: error.to_string(),
        }
    }
}
