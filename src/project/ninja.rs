//! Ninja backend: the build driver meson generates for

use std::path::Path;
use tracing::info;

use super::error::ProjectError;
use super::target::Target;
use crate::config::ToolEnvironment;
use crate::io::{BuildToolClient, Invocation, LineSink};

/// File whose presence means meson already configured the build directory
pub const NINJA_BUILD_FILE: &str = "build.ninja";

#[derive(Debug, Clone)]
pub struct NinjaBackend {
    client: BuildToolClient,
    program: String,
    env: ToolEnvironment,
}

impl NinjaBackend {
    pub fn new(client: BuildToolClient, program: impl Into<String>, env: ToolEnvironment) -> Self {
        Self {
            client,
            program: program.into(),
            env,
        }
    }

    pub fn is_configured(build_dir: &Path) -> bool {
        build_dir.join(NINJA_BUILD_FILE).exists()
    }

    /// Ninja build target for an IDE target name
    ///
    /// Known target names map to their output file; anything else (`all`,
    /// `clean`, a raw output path) is passed through unchanged.
    pub fn resolve_target(targets: &[Target], name: &str) -> String {
        targets
            .iter()
            .find(|target| target.name == name)
            .map(|target| target.output.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.to_string())
    }

    /// `ninja -C <build> <target>`, streaming output to `sink`
    pub async fn build(
        &self,
        build_dir: &Path,
        ninja_target: &str,
        sink: Option<&LineSink>,
    ) -> Result<(), ProjectError> {
        let invocation = Invocation::new(&self.program)
            .envs(&self.env)
            .arg("-C")
            .arg(build_dir.to_string_lossy())
            .arg(ninja_target);
        info!("Building: {}", invocation);
        self.client.invoke(&invocation, sink).await?;
        Ok(())
    }
}
