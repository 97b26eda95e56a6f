//! Memo tables for introspection results
//!
//! Scoped to one process run: a build directory's structure is assumed stable
//! between configure/generate cycles, so nothing here expires.

use std::collections::HashMap;
use std::path::PathBuf;

use super::compilation_database::CompilationDatabase;
use super::compile_info::CompileInfo;
use super::target::{Language, ProjectInfo, Target};

#[derive(Debug, Default)]
pub struct IntrospectionCache {
    pub targets: Option<Vec<Target>>,
    /// Source files per target id
    pub target_files: HashMap<String, Vec<PathBuf>>,
    pub buildsystem_files: Option<Vec<PathBuf>>,
    pub project_info: Option<ProjectInfo>,
    pub compilation_database: Option<CompilationDatabase>,
    /// Compile info per target id
    pub compile_info: HashMap<String, CompileInfo>,
    /// Implicit include directories per language
    pub implicit_includes: HashMap<Language, Vec<PathBuf>>,
}

impl IntrospectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything derived from the build directory's previous layout
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
