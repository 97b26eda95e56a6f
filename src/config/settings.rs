//! Build settings derived from cache entries
//!
//! Holds the state that side-effecting cache keys drive: directory bindings,
//! generator/backend selection, the backend-native build type, and the
//! environment handed to every build-tool invocation.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

use super::ConfigError;

pub const KEY_GENERATOR: &str = "CMAKE_GENERATOR";
pub const KEY_BUILD_TYPE: &str = "CMAKE_BUILD_TYPE";
pub const KEY_HOME_DIRECTORY: &str = "CMAKE_HOME_DIRECTORY";
pub const KEY_CACHEFILE_DIR: &str = "CMAKE_CACHEFILE_DIR";
pub const KEY_C_COMPILER: &str = "CMAKE_C_COMPILER";
pub const KEY_CXX_COMPILER: &str = "CMAKE_CXX_COMPILER";
pub const KEY_C_FLAGS: &str = "CMAKE_C_FLAGS";
pub const KEY_CXX_FLAGS: &str = "CMAKE_CXX_FLAGS";
pub const KEY_MESON: &str = "MESON";
pub const KEY_CROSS_FILE: &str = "CROSS_FILE";
pub const KEY_ANDROID_ABI: &str = "ANDROID_ABI";

/// Generator used when none was chosen explicitly
pub const DEFAULT_GENERATOR: Generator = Generator::UnixMakefiles;

/// IDE-facing generator names the wrapper accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generator {
    Ninja,
    UnixMakefiles,
    CodeBlocksNinja,
    CodeBlocksUnixMakefiles,
    AndroidGradleNinja,
}

impl Generator {
    pub const ALL: [Generator; 5] = [
        Generator::Ninja,
        Generator::UnixMakefiles,
        Generator::CodeBlocksNinja,
        Generator::CodeBlocksUnixMakefiles,
        Generator::AndroidGradleNinja,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Generator::Ninja => "Ninja",
            Generator::UnixMakefiles => "Unix Makefiles",
            Generator::CodeBlocksNinja => "CodeBlocks - Ninja",
            Generator::CodeBlocksUnixMakefiles => "CodeBlocks - Unix Makefiles",
            Generator::AndroidGradleNinja => "Android Gradle - Ninja",
        }
    }

    /// Every generator is emulated on top of Ninja
    pub fn backend(&self) -> Backend {
        Backend::Ninja
    }

    /// Cache entries that must be set before this generator can generate
    pub fn required_entries(&self) -> &'static [&'static str] {
        match self {
            Generator::AndroidGradleNinja => &[KEY_ANDROID_ABI],
            _ => &[],
        }
    }
}

impl fmt::Display for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Generator {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Generator::ALL
            .into_iter()
            .find(|generator| generator.name() == s)
            .ok_or_else(|| ConfigError::UnsupportedGenerator(s.to_string()))
    }
}

/// Low-level build driver behind the underlying build system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Ninja,
}

impl Backend {
    pub fn meson_name(&self) -> &'static str {
        match self {
            Backend::Ninja => "ninja",
        }
    }
}

/// Meson's build type vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MesonBuildType {
    Plain,
    Debug,
    DebugOptimized,
    Release,
    MinSize,
}

impl MesonBuildType {
    /// Map a CMake build type, falling back to `plain` for unknown names
    pub fn from_cmake(build_type: &str) -> Self {
        match build_type.to_ascii_uppercase().as_str() {
            "" | "DEBUG" => MesonBuildType::Debug,
            "RELEASE" => MesonBuildType::Release,
            "RELWITHDEBINFO" => MesonBuildType::DebugOptimized,
            "MINSIZEREL" => MesonBuildType::MinSize,
            _ => MesonBuildType::Plain,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MesonBuildType::Plain => "plain",
            MesonBuildType::Debug => "debug",
            MesonBuildType::DebugOptimized => "debugoptimized",
            MesonBuildType::Release => "release",
            MesonBuildType::MinSize => "minsize",
        }
    }
}

/// Environment variables passed to build-tool invocations
pub type ToolEnvironment = BTreeMap<String, String>;

/// Mutable build state driven by cache entries
#[derive(Debug, Clone)]
pub struct BuildSettings {
    pub source_dir: Option<PathBuf>,
    pub build_dir: Option<PathBuf>,
    pub generator: Option<Generator>,
    pub backend: Option<Backend>,
    /// Build type exactly as the IDE spelled it
    pub build_type: Option<String>,
    pub meson_build_type: Option<MesonBuildType>,
    pub meson_program: String,
    pub cross_file: Option<PathBuf>,
    pub tool_env: ToolEnvironment,
}

impl BuildSettings {
    pub fn new(meson_program: impl Into<String>) -> Self {
        Self {
            source_dir: None,
            build_dir: None,
            generator: None,
            backend: None,
            build_type: None,
            meson_build_type: None,
            meson_program: meson_program.into(),
            cross_file: None,
            tool_env: ToolEnvironment::new(),
        }
    }

    /// Run the side effect associated with `key`, if any
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            KEY_GENERATOR => self.set_generator(value.parse()?),
            KEY_BUILD_TYPE => self.set_build_type(value),
            KEY_HOME_DIRECTORY => self.set_source_dir(Path::new(value))?,
            KEY_C_COMPILER => self.set_env("CC", value),
            KEY_CXX_COMPILER => self.set_env("CXX", value),
            KEY_C_FLAGS => self.set_env("CFLAGS", value),
            KEY_CXX_FLAGS => self.set_env("CXXFLAGS", value),
            KEY_MESON => self.meson_program = value.to_string(),
            KEY_CROSS_FILE => self.cross_file = Some(PathBuf::from(value)),
            _ => {}
        }
        Ok(())
    }

    pub fn set_generator(&mut self, generator: Generator) {
        self.backend = Some(generator.backend());
        self.generator = Some(generator);
        info!("(generator) \"{}\"", generator);
    }

    pub fn set_build_type(&mut self, build_type: &str) {
        let mapped = MesonBuildType::from_cmake(build_type);
        self.build_type = Some(build_type.to_string());
        self.meson_build_type = Some(mapped);
        info!("(build_type) \"{}\" -> {}", build_type, mapped.as_str());
    }

    pub fn set_source_dir(&mut self, path: &Path) -> Result<(), ConfigError> {
        let dir = validate_directory(path, DirectoryRole::Source)?;
        info!("(source_dir) \"{}\"", dir.display());
        self.source_dir = Some(dir);
        Ok(())
    }

    pub fn set_build_dir(&mut self, path: &Path) -> Result<(), ConfigError> {
        let dir = validate_directory(path, DirectoryRole::Build)?;
        info!("(build_dir) \"{}\"", dir.display());
        self.build_dir = Some(dir);
        Ok(())
    }

    fn set_env(&mut self, name: &str, value: &str) {
        self.tool_env.insert(name.to_string(), value.to_string());
    }

    pub fn require_source_dir(&self) -> Result<&Path, ConfigError> {
        self.source_dir
            .as_deref()
            .ok_or(ConfigError::SourceDirectoryNotSet)
    }

    pub fn require_build_dir(&self) -> Result<&Path, ConfigError> {
        self.build_dir
            .as_deref()
            .ok_or(ConfigError::BuildDirectoryNotSet)
    }

    /// Options passed to `meson setup`
    pub fn setup_options(&self) -> Vec<String> {
        let mut options = Vec::new();
        if let Some(backend) = self.backend {
            options.push(format!("--backend={}", backend.meson_name()));
        }
        if let Some(build_type) = self.meson_build_type {
            options.push(format!("--buildtype={}", build_type.as_str()));
        }
        if let Some(cross_file) = &self.cross_file {
            options.push("--cross-file".to_string());
            options.push(cross_file.to_string_lossy().into_owned());
        }
        options
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryRole {
    Source,
    Build,
}

impl fmt::Display for DirectoryRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirectoryRole::Source => f.write_str("source"),
            DirectoryRole::Build => f.write_str("build"),
        }
    }
}

fn validate_directory(path: &Path, role: DirectoryRole) -> Result<PathBuf, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NoSuchDirectory {
            role,
            path: path.to_path_buf(),
        });
    }
    if !path.is_dir() {
        return Err(ConfigError::NotADirectory {
            role,
            path: path.to_path_buf(),
        });
    }
    std::path::absolute(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_generator_names_roundtrip() {
        for generator in Generator::ALL {
            assert_eq!(generator.name().parse::<Generator>().unwrap(), generator);
        }
        assert!(matches!(
            "Visual Studio 15 2017".parse::<Generator>(),
            Err(ConfigError::UnsupportedGenerator(_))
        ));
    }

    #[test]
    fn test_build_type_mapping() {
        assert_eq!(MesonBuildType::from_cmake("Debug"), MesonBuildType::Debug);
        assert_eq!(MesonBuildType::from_cmake(""), MesonBuildType::Debug);
        assert_eq!(MesonBuildType::from_cmake("release"), MesonBuildType::Release);
        assert_eq!(
            MesonBuildType::from_cmake("RelWithDebInfo"),
            MesonBuildType::DebugOptimized
        );
        assert_eq!(MesonBuildType::from_cmake("MinSizeRel"), MesonBuildType::MinSize);
        assert_eq!(MesonBuildType::from_cmake("Coverage"), MesonBuildType::Plain);
    }

    #[test]
    fn test_apply_build_type_keeps_original_spelling() {
        let mut settings = BuildSettings::new("meson");
        settings.apply(KEY_BUILD_TYPE, "RelWithDebInfo").unwrap();
        assert_eq!(settings.build_type.as_deref(), Some("RelWithDebInfo"));
        assert_eq!(settings.meson_build_type, Some(MesonBuildType::DebugOptimized));
    }

    #[test]
    fn test_apply_generator_selects_backend() {
        let mut settings = BuildSettings::new("meson");
        settings.apply(KEY_GENERATOR, "CodeBlocks - Ninja").unwrap();
        assert_eq!(settings.generator, Some(Generator::CodeBlocksNinja));
        assert_eq!(settings.backend, Some(Backend::Ninja));

        assert!(settings.apply(KEY_GENERATOR, "Xcode").is_err());
        assert_eq!(settings.generator, Some(Generator::CodeBlocksNinja));
    }

    #[test]
    fn test_apply_compiler_keys_fill_tool_environment() {
        let mut settings = BuildSettings::new("meson");
        settings.apply(KEY_C_COMPILER, "/usr/bin/clang").unwrap();
        settings.apply(KEY_CXX_FLAGS, "-Wall").unwrap();
        settings.apply("UNRELATED", "x").unwrap();

        assert_eq!(settings.tool_env.get("CC").map(String::as_str), Some("/usr/bin/clang"));
        assert_eq!(settings.tool_env.get("CXXFLAGS").map(String::as_str), Some("-Wall"));
        assert_eq!(settings.tool_env.len(), 2);
    }

    #[test]
    fn test_apply_meson_and_cross_file() {
        let mut settings = BuildSettings::new("meson");
        settings.apply(KEY_MESON, "/opt/meson/meson.py").unwrap();
        settings.apply(KEY_CROSS_FILE, "/tmp/arm.txt").unwrap();
        settings.set_generator(Generator::Ninja);
        settings.set_build_type("Release");

        assert_eq!(settings.meson_program, "/opt/meson/meson.py");
        assert_eq!(
            settings.setup_options(),
            vec![
                "--backend=ninja",
                "--buildtype=release",
                "--cross-file",
                "/tmp/arm.txt"
            ]
        );
    }

    #[test]
    fn test_source_dir_validation() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("meson.build");
        std::fs::write(&file, "project('x')").unwrap();

        let mut settings = BuildSettings::new("meson");
        assert!(matches!(
            settings.set_source_dir(&dir.path().join("missing")),
            Err(ConfigError::NoSuchDirectory { role: DirectoryRole::Source, .. })
        ));
        assert!(matches!(
            settings.set_source_dir(&file),
            Err(ConfigError::NotADirectory { .. })
        ));
        assert!(settings.source_dir.is_none());

        settings.set_source_dir(dir.path()).unwrap();
        assert_eq!(settings.source_dir.as_deref(), Some(dir.path()));
    }
}
