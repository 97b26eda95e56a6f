//! Per-session project context
//!
//! `ProjectContext` threads the configuration, the introspection memo tables
//! and the external tools through every operation that needs them. One
//! context serves one build directory; `&mut self` on every operation keeps
//! build-tool invocations strictly sequential.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::compilation_database::CompilationDatabase;
use super::compile_info::{CompileInfo, parse_implicit_includes};
use super::error::ProjectError;
use super::introspection::IntrospectionCache;
use super::meson::{BUILD_DESCRIPTION_FILE, Meson};
use super::ninja::NinjaBackend;
use super::paths;
use super::target::{ProjectInfo, Target};
use crate::config::{
    CacheEntry, ConfigError, Configuration, DEFAULT_GENERATOR, DefaultInputs, ExecutableLocator,
    PathLocator, ReloadOutcome, default_entries,
};
use crate::io::{BuildToolClient, Invocation, LineSink, ProcessRunner, SubprocessRunner};

/// External programs and lookups a context relies on
#[derive(Clone)]
pub struct ProjectTools {
    pub runner: Arc<dyn ProcessRunner>,
    pub locator: Arc<dyn ExecutableLocator>,
    pub ninja_program: String,
    /// Path of the running wrapper, reported as `CMAKE_COMMAND`
    pub command_path: PathBuf,
}

impl ProjectTools {
    /// Real subprocesses and `PATH` lookups
    pub fn system(ninja_program: impl Into<String>, command_path: PathBuf) -> Self {
        Self {
            runner: Arc::new(SubprocessRunner),
            locator: Arc::new(PathLocator),
            ninja_program: ninja_program.into(),
            command_path,
        }
    }
}

/// Configuration, introspection cache and tools of one build directory
pub struct ProjectContext {
    config: Configuration,
    tools: ProjectTools,
    client: BuildToolClient,
    cache: IntrospectionCache,
}

impl ProjectContext {
    pub fn new(config: Configuration, tools: ProjectTools) -> Self {
        let client = BuildToolClient::new(Arc::clone(&tools.runner));
        Self {
            config,
            tools,
            client,
            cache: IntrospectionCache::new(),
        }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn cache_entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.config.store().iter()
    }

    fn meson(&self) -> Meson {
        Meson::new(self.client.clone(), self.config.settings())
    }

    fn ninja(&self) -> NinjaBackend {
        NinjaBackend::new(
            self.client.clone(),
            &self.tools.ninja_program,
            self.config.settings().tool_env.clone(),
        )
    }

    pub fn build_dir(&self) -> Result<PathBuf, ProjectError> {
        Ok(self.config.settings().require_build_dir()?.to_path_buf())
    }

    pub fn source_dir(&self) -> Result<PathBuf, ProjectError> {
        Ok(self.config.settings().require_source_dir()?.to_path_buf())
    }

    // ------------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------------

    pub fn bind_build_dir(&mut self, path: &Path) -> Result<(), ProjectError> {
        self.config.bind_build_dir(path)?;
        self.cache.clear();
        Ok(())
    }

    pub fn bind_source_dir(&mut self, path: &Path) -> Result<(), ProjectError> {
        self.config.bind_source_dir(path)?;
        Ok(())
    }

    pub fn bind_generator(&mut self, name: &str) -> Result<(), ProjectError> {
        self.config.bind_generator(name)?;
        Ok(())
    }

    pub fn bind_build_type(&mut self, build_type: &str) {
        self.config.bind_build_type(build_type);
    }

    pub fn set_from_assignment(&mut self, raw: &str) -> Result<(), ProjectError> {
        self.config.set_from_assignment(raw)?;
        Ok(())
    }

    /// Merge the persisted entries, or compute defaults for a fresh build directory
    ///
    /// A persisted cache without the project defaults is completed as if the
    /// build directory were fresh; persisted entries still win.
    pub async fn load_cache_entries(&mut self, sink: Option<&LineSink>) -> Result<(), ProjectError> {
        match self.config.reload()? {
            ReloadOutcome::Replayed(keys) => {
                debug!("Replayed persisted entries: {:?}", keys);
                if self.config.has_project_defaults() {
                    return Ok(());
                }
                warn!("Persisted cache lacks project defaults, computing them");
                self.init_cache_entries(sink).await
            }
            ReloadOutcome::NotFound => self.init_cache_entries(sink).await,
        }
    }

    /// Compute default entries; needs a bound source directory
    pub async fn init_cache_entries(&mut self, sink: Option<&LineSink>) -> Result<(), ProjectError> {
        let source_dir = self.source_dir()?;
        self.ensure_setup(sink).await?;

        let info = self.project_info().await?;
        let build_dir = self.build_dir()?;
        let inputs = DefaultInputs {
            project_name: &info.name,
            source_dir: &source_dir,
            build_dir: &build_dir,
            generator: self.config.settings().generator,
            command_path: &self.tools.command_path,
        };
        let defaults = default_entries(&inputs, self.tools.locator.as_ref());
        self.config.init_defaults(defaults);
        Ok(())
    }

    /// Run `meson setup` unless the build directory is already configured
    ///
    /// Without an explicit generator the default one is selected first.
    pub async fn ensure_setup(&mut self, sink: Option<&LineSink>) -> Result<(), ProjectError> {
        if self.config.settings().generator.is_none() {
            self.config.bind_generator(DEFAULT_GENERATOR.name())?;
        }

        let build_dir = self.build_dir()?;
        if NinjaBackend::is_configured(&build_dir) {
            return Ok(());
        }

        let source_dir = self.source_dir()?;
        if !source_dir.join(BUILD_DESCRIPTION_FILE).exists() {
            return Err(ConfigError::MissingBuildDescription(source_dir).into());
        }

        let options = self.config.settings().setup_options();
        self.meson()
            .setup(&options, &source_dir, &build_dir, sink)
            .await?;
        self.cache.clear();
        Ok(())
    }

    /// Write the text cache and run the setup the selected generator needs
    ///
    /// Primes the target list so introspection failures surface here rather
    /// than in a later query.
    pub async fn generate(&mut self, sink: Option<&LineSink>) -> Result<(), ProjectError> {
        if self.config.settings().generator.is_none() {
            self.config.bind_generator(DEFAULT_GENERATOR.name())?;
        }

        self.load_cache_entries(sink).await?;
        self.ensure_setup(sink).await?;
        let cache_file = self.config.write_text_cache()?;
        debug!("Wrote {}", cache_file.display());
        self.config.check_generator_requirements()?;

        let targets = self.targets().await?;
        info!("Generated build with {} targets", targets.len());
        Ok(())
    }

    /// Build one target (or `all`) through the backend
    pub async fn build(&mut self, target_name: &str, sink: Option<&LineSink>) -> Result<(), ProjectError> {
        self.load_cache_entries(sink).await?;
        self.ensure_setup(sink).await?;

        let targets = self.targets().await?;
        let ninja_target = NinjaBackend::resolve_target(&targets, target_name);
        let build_dir = self.build_dir()?;
        self.ninja().build(&build_dir, &ninja_target, sink).await
    }

    /// Regenerate `CMakeCache.txt` from the current entries
    pub fn write_text_cache(&mut self) -> Result<PathBuf, ProjectError> {
        Ok(self.config.write_text_cache()?)
    }

    /// Persist the entries; `None` when no build directory was ever bound
    pub fn persist(&self) -> Result<Option<PathBuf>, ProjectError> {
        if self.config.settings().build_dir.is_none() {
            return Ok(None);
        }
        Ok(Some(self.config.persist()?))
    }

    // ------------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------------

    pub async fn targets(&mut self) -> Result<Vec<Target>, ProjectError> {
        if let Some(targets) = &self.cache.targets {
            return Ok(targets.clone());
        }

        let build_dir = self.build_dir()?;
        let targets = self.meson().targets(&build_dir).await?;
        self.cache.targets = Some(targets.clone());
        Ok(targets)
    }

    /// Source files of `target`, relative to the source directory
    pub async fn target_files(&mut self, target: &Target) -> Result<Vec<PathBuf>, ProjectError> {
        if target.id == "all" || !target.kind.has_sources() {
            return Ok(Vec::new());
        }
        if let Some(files) = self.cache.target_files.get(&target.id) {
            return Ok(files.clone());
        }

        let files = if target.target_sources.is_some() {
            let source_dir = self.source_dir()?;
            target.embedded_sources(&source_dir).unwrap_or_default()
        } else {
            let build_dir = self.build_dir()?;
            self.meson().target_files(&target.id, &build_dir).await?
        };
        debug!("(target files) {}: {:?}", target, files);

        self.cache
            .target_files
            .insert(target.id.clone(), files.clone());
        Ok(files)
    }

    pub async fn buildsystem_files(&mut self) -> Result<Vec<PathBuf>, ProjectError> {
        if let Some(files) = &self.cache.buildsystem_files {
            return Ok(files.clone());
        }

        let build_dir = self.build_dir()?;
        let files = self.meson().buildsystem_files(&build_dir).await?;
        self.cache.buildsystem_files = Some(files.clone());
        Ok(files)
    }

    pub async fn project_info(&mut self) -> Result<ProjectInfo, ProjectError> {
        if let Some(info) = &self.cache.project_info {
            return Ok(info.clone());
        }

        let build_dir = self.build_dir()?;
        let info = self.meson().project_info(&build_dir).await?;
        self.cache.project_info = Some(info.clone());
        Ok(info)
    }

    fn compilation_database(&mut self) -> Result<&CompilationDatabase, ProjectError> {
        let db = match self.cache.compilation_database.take() {
            Some(db) => db,
            None => CompilationDatabase::load(&self.build_dir()?)?,
        };
        Ok(self.cache.compilation_database.insert(db))
    }

    /// Compile info from the compile command of the target's first source
    ///
    /// Targets without sources resolve to an empty compile info.
    pub async fn compile_info(&mut self, target: &Target) -> Result<CompileInfo, ProjectError> {
        if let Some(info) = self.cache.compile_info.get(&target.id) {
            return Ok(info.clone());
        }

        let files = self.target_files(target).await?;
        let info = match files.first() {
            None => CompileInfo::default(),
            Some(first) => {
                let source = paths::absolutize(first, &self.source_dir()?);
                match self.compilation_database()?.find_by_source(&source) {
                    Some(entry) => CompileInfo::from_arguments(&entry.arguments, &entry.directory),
                    None => {
                        warn!("No compile command for {} ({})", source.display(), target);
                        CompileInfo::default()
                    }
                }
            }
        };

        self.cache
            .compile_info
            .insert(target.id.clone(), info.clone());
        Ok(info)
    }

    /// Explicit include directories, followed by the implicit ones when asked for
    pub async fn include_directories(
        &mut self,
        target: &Target,
        include_implicit: bool,
    ) -> Result<Vec<PathBuf>, ProjectError> {
        let mut dirs = self.compile_info(target).await?.include_dirs;
        if include_implicit {
            dirs.extend(self.implicit_include_directories(target).await?);
        }
        Ok(dirs)
    }

    /// System include directories of the target's compiler, probed once per language
    pub async fn implicit_include_directories(
        &mut self,
        target: &Target,
    ) -> Result<Vec<PathBuf>, ProjectError> {
        let info = self.compile_info(target).await?;
        if info.is_empty() {
            return Ok(Vec::new());
        }

        let language = info.language();
        if let Some(dirs) = self.cache.implicit_includes.get(&language) {
            return Ok(dirs.clone());
        }

        let probe = Invocation::new(&info.compiler)
            .envs(&self.config.settings().tool_env)
            .args([
                format!("-x{}", language.probe_name()),
                "-E".to_string(),
                "-v".to_string(),
                "-".to_string(),
            ]);
        let output = self.client.capture(&probe).await?;
        if !output.success {
            warn!("Include probe `{}` exited with {:?}", probe, output.exit_code);
        }

        let dirs = parse_implicit_includes(&output.stderr);
        debug!("(implicit includes) {:?}: {:?}", language, dirs);
        self.cache.implicit_includes.insert(language, dirs.clone());
        Ok(dirs)
    }
}
