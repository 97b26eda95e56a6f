//! Build target model as reported by `meson introspect`

use serde::{Deserialize, Deserializer};
use std::fmt;
use std::path::{Path, PathBuf};

use super::paths;

/// Kind of a build target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum TargetKind {
    Executable,
    StaticLibrary,
    SharedLibrary,
    Custom,
    Run,
}

impl From<String> for TargetKind {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "executable" => TargetKind::Executable,
            "static library" => TargetKind::StaticLibrary,
            "shared library" | "shared module" => TargetKind::SharedLibrary,
            "run" => TargetKind::Run,
            // custom, alias, jar and anything newer
            _ => TargetKind::Custom,
        }
    }
}

impl TargetKind {
    /// Kinds that never have compiled sources
    pub fn has_sources(&self) -> bool {
        !matches!(self, TargetKind::Custom | TargetKind::Run)
    }

    /// Name used in the codemodel reply
    pub fn protocol_name(&self) -> &'static str {
        match self {
            TargetKind::Executable => "EXECUTABLE",
            TargetKind::StaticLibrary => "STATIC_LIBRARY",
            TargetKind::SharedLibrary => "SHARED_LIBRARY",
            TargetKind::Custom | TargetKind::Run => "UTILITY",
        }
    }
}

/// Sources meson embeds in the target list (newer releases only)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TargetSource {
    #[serde(default)]
    pub sources: Vec<PathBuf>,
}

/// One build target; immutable for the lifetime of a run
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Target {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: TargetKind,
    /// Primary output, relative to the build directory
    #[serde(rename = "filename", deserialize_with = "first_filename")]
    pub output: PathBuf,
    #[serde(default)]
    pub target_sources: Option<Vec<TargetSource>>,
}

/// `filename` is a string in old releases and a list in newer ones
fn first_filename<'de, D>(deserializer: D) -> Result<PathBuf, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Filename {
        One(PathBuf),
        Many(Vec<PathBuf>),
    }

    match Filename::deserialize(deserializer)? {
        Filename::One(path) => Ok(path),
        Filename::Many(paths) => paths
            .into_iter()
            .next()
            .ok_or_else(|| serde::de::Error::custom("target has an empty filename list")),
    }
}

impl Target {
    /// Directory of the output, relative to the build directory
    pub fn subdir(&self) -> &Path {
        self.output.parent().unwrap_or(Path::new(""))
    }

    /// Make an absolute output path relative when it lies under `build_dir`
    pub fn relativize_output(&mut self, build_dir: &Path) {
        if self.output.is_absolute() {
            let output = paths::normalize(&self.output);
            if let Ok(relative) = output.strip_prefix(paths::normalize(build_dir)) {
                self.output = relative.to_path_buf();
            }
        }
    }

    /// Sources embedded in the target list, relative to `source_dir`
    pub fn embedded_sources(&self, source_dir: &Path) -> Option<Vec<PathBuf>> {
        let groups = self.target_sources.as_ref()?;
        Some(
            groups
                .iter()
                .flat_map(|group| &group.sources)
                .map(|source| {
                    if source.is_absolute() {
                        paths::relative_to(source, source_dir)
                    } else {
                        source.clone()
                    }
                })
                .collect(),
        )
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Project metadata from `meson introspect --projectinfo`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProjectInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// Language of a compiled file group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    C,
    Cxx,
}

impl Language {
    /// C++ compilers are recognised by their `++` suffix (`g++`, `clang++`)
    pub fn from_compiler(compiler: &str) -> Self {
        if compiler.ends_with("++") {
            Language::Cxx
        } else {
            Language::C
        }
    }

    pub fn protocol_name(&self) -> &'static str {
        match self {
            Language::C => "C",
            Language::Cxx => "CXX",
        }
    }

    /// Argument for the compiler's `-x` option
    pub fn probe_name(&self) -> &'static str {
        match self {
            Language::C => "c",
            Language::Cxx => "c++",
        }
    }
}
