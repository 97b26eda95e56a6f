//! Meson command-line interface
//!
//! Builds `meson setup` / `meson introspect` invocations and decodes their
//! JSON output. Caching happens one level up in the project context.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::error::ProjectError;
use super::target::{ProjectInfo, Target};
use crate::config::{BuildSettings, ToolEnvironment};
use crate::io::{BuildToolClient, Invocation, LineSink};

/// File that marks a meson source directory
pub const BUILD_DESCRIPTION_FILE: &str = "meson.build";

/// One `meson introspect` query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntrospectQuery<'a> {
    Targets,
    TargetFiles(&'a str),
    BuildsystemFiles,
    ProjectInfo,
}

impl IntrospectQuery<'_> {
    fn args(&self) -> Vec<&str> {
        match self {
            IntrospectQuery::Targets => vec!["--targets"],
            IntrospectQuery::TargetFiles(id) => vec!["--target-files", id],
            IntrospectQuery::BuildsystemFiles => vec!["--buildsystem-files"],
            IntrospectQuery::ProjectInfo => vec!["--projectinfo"],
        }
    }
}

/// Meson executable plus the environment its invocations run with
#[derive(Debug, Clone)]
pub struct Meson {
    client: BuildToolClient,
    program: String,
    env: ToolEnvironment,
}

impl Meson {
    pub fn new(client: BuildToolClient, settings: &BuildSettings) -> Self {
        Self {
            client,
            program: settings.meson_program.clone(),
            env: settings.tool_env.clone(),
        }
    }

    fn invocation(&self) -> Invocation {
        Invocation::new(&self.program).envs(&self.env)
    }

    /// `meson setup <options> <source> <build>`, streaming output to `sink`
    pub async fn setup(
        &self,
        options: &[String],
        source_dir: &Path,
        build_dir: &Path,
        sink: Option<&LineSink>,
    ) -> Result<(), ProjectError> {
        let invocation = self
            .invocation()
            .arg("setup")
            .args(options.iter().cloned())
            .arg(source_dir.to_string_lossy())
            .arg(build_dir.to_string_lossy());
        info!("Configuring: {}", invocation);
        self.client.invoke(&invocation, sink).await?;
        Ok(())
    }

    /// Raw stdout of an introspection query
    pub async fn introspect(
        &self,
        query: IntrospectQuery<'_>,
        build_dir: &Path,
    ) -> Result<String, ProjectError> {
        let invocation = self
            .invocation()
            .arg("introspect")
            .args(query.args())
            .arg(build_dir.to_string_lossy());
        let output = self.client.invoke(&invocation, None).await?;
        debug!("({:?}) \"{}\"", query, output.trim_end());
        Ok(output)
    }

    pub async fn targets(&self, build_dir: &Path) -> Result<Vec<Target>, ProjectError> {
        let output = self.introspect(IntrospectQuery::Targets, build_dir).await?;
        let mut targets: Vec<Target> =
            serde_json::from_str(&output).map_err(|e| ProjectError::parse("target list", e))?;
        for target in &mut targets {
            target.relativize_output(build_dir);
        }
        Ok(targets)
    }

    /// Source files of one target, relative to the source directory
    pub async fn target_files(
        &self,
        target_id: &str,
        build_dir: &Path,
    ) -> Result<Vec<PathBuf>, ProjectError> {
        let output = self
            .introspect(IntrospectQuery::TargetFiles(target_id), build_dir)
            .await?;
        // Some releases print nothing at all for targets without sources
        if output.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&output).map_err(|e| ProjectError::parse("target files", e))
    }

    pub async fn buildsystem_files(&self, build_dir: &Path) -> Result<Vec<PathBuf>, ProjectError> {
        let output = self
            .introspect(IntrospectQuery::BuildsystemFiles, build_dir)
            .await?;
        serde_json::from_str(&output).map_err(|e| ProjectError::parse("buildsystem files", e))
    }

    pub async fn project_info(&self, build_dir: &Path) -> Result<ProjectInfo, ProjectError> {
        let output = self.introspect(IntrospectQuery::ProjectInfo, build_dir).await?;
        serde_json::from_str(&output).map_err(|e| ProjectError::parse("project info", e))
    }
}
