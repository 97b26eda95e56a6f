//! Test utilities and global setup
//!
//! Provides centralized test logging configuration and a scripted process
//! runner that stands in for meson, ninja and compilers.

/// Test logging utilities
#[cfg(all(test, feature = "test-logging"))]
pub mod logging {
    use std::sync::Once;
    use tracing_subscriber::{EnvFilter, fmt};

    static INIT: Once = Once::new();

    /// Initialize test logging globally - safe to call multiple times
    ///
    /// Respects `RUST_LOG`, defaulting to debug for this crate and info for
    /// tokio. Uses the test writer so output is captured per test.
    ///
    /// ```bash
    /// RUST_LOG=trace cargo test --features test-logging
    /// ```
    pub fn init() {
        INIT.call_once(|| {
            let env_filter = EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("debug,tokio=info"));

            fmt()
                .with_env_filter(env_filter)
                .with_test_writer()
                .with_target(true)
                .compact()
                .try_init()
                .ok();
        });
    }
}

/// Global test logging setup
///
/// Add this to any test module where you want automatic logging initialization.
#[cfg(all(test, feature = "test-logging"))]
#[macro_export]
macro_rules! setup_test_logging {
    () => {
        #[ctor::ctor]
        fn init_test_logging() {
            $crate::test_utils::logging::init();
        }
    };
}

/// Meson executable for integration tests (`MESON_PATH`, falling back to `meson`)
#[cfg(all(test, feature = "meson-integration-tests"))]
pub fn get_test_meson_path() -> String {
    std::env::var("MESON_PATH").unwrap_or_else(|_| "meson".to_string())
}

#[cfg(test)]
pub use fixture::ProjectFixture;
#[cfg(test)]
pub use scripted::ScriptedRunner;

#[cfg(test)]
mod fixture {
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use tempfile::TempDir;

    use super::ScriptedRunner;
    use crate::config::Configuration;
    use crate::config::defaults::MockExecutableLocator;
    use crate::project::{ProjectContext, ProjectTools};

    /// Source (`s/`) and build (`b/`) directories side by side in a temp root
    pub struct ProjectFixture {
        _root: TempDir,
        pub source: PathBuf,
        pub build: PathBuf,
    }

    impl ProjectFixture {
        /// Source directory with a `meson.build`, empty build directory
        pub fn new() -> Self {
            let root = TempDir::new().unwrap();
            let source = root.path().join("s");
            let build = root.path().join("b");
            fs::create_dir_all(&source).unwrap();
            fs::create_dir_all(&build).unwrap();
            fs::write(source.join("meson.build"), "project('demo', 'c')\n").unwrap();
            Self {
                _root: root,
                source,
                build,
            }
        }

        /// Like `new`, with a build directory meson already set up
        pub fn configured() -> Self {
            let fixture = Self::new();
            fs::write(fixture.build.join("build.ninja"), "").unwrap();
            fixture
        }

        pub fn source_str(&self) -> &str {
            self.source.to_str().unwrap()
        }

        pub fn build_str(&self) -> &str {
            self.build.to_str().unwrap()
        }

        pub fn write_compile_commands(&self, content: &str) {
            fs::write(self.build.join("compile_commands.json"), content).unwrap();
        }

        /// Context with no directories bound, finding every tool in `/usr/bin`
        pub fn unbound_context(&self, runner: ScriptedRunner) -> ProjectContext {
            let mut locator = MockExecutableLocator::new();
            locator
                .expect_find()
                .returning(|name| Some(PathBuf::from(format!("/usr/bin/{name}"))));

            let tools = ProjectTools {
                runner: Arc::new(runner),
                locator: Arc::new(locator),
                ninja_program: "ninja".to_string(),
                command_path: PathBuf::from("/usr/local/bin/meson-cmake-wrapper"),
            };
            ProjectContext::new(Configuration::new("meson"), tools)
        }

        /// Context with the fixture's source and build directories bound
        pub fn context(&self, runner: ScriptedRunner) -> ProjectContext {
            let mut context = self.unbound_context(runner);
            context.bind_build_dir(Path::new(&self.build)).unwrap();
            context.bind_source_dir(Path::new(&self.source)).unwrap();
            context
        }
    }
}

#[cfg(test)]
mod scripted {
    use async_trait::async_trait;
    use std::io;
    use std::sync::{Arc, Mutex};

    use crate::io::{Invocation, LineSink, ProcessError, ProcessOutput, ProcessRunner};

    #[derive(Debug, Clone)]
    struct Script {
        program: String,
        args: Vec<String>,
        output: ProcessOutput,
    }

    /// Process runner answering invocations from a fixed script
    ///
    /// Every invocation is recorded, matched or not, so tests can assert how
    /// often a tool was (or was not) called. Unscripted invocations fail as if
    /// the program did not exist.
    #[derive(Debug, Clone, Default)]
    pub struct ScriptedRunner {
        scripts: Vec<Script>,
        calls: Arc<Mutex<Vec<Invocation>>>,
    }

    impl ScriptedRunner {
        pub fn new() -> Self {
            Self::default()
        }

        /// Answer `program args...` with `output`
        pub fn on(mut self, program: &str, args: &[&str], output: ProcessOutput) -> Self {
            self.scripts.push(Script {
                program: program.to_string(),
                args: args.iter().map(|arg| arg.to_string()).collect(),
                output,
            });
            self
        }

        /// Every invocation seen so far, in order
        pub fn calls(&self) -> Vec<Invocation> {
            self.calls.lock().unwrap().clone()
        }

        /// Number of invocations whose arguments contain `needle`
        pub fn count_with_arg(&self, needle: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|call| call.args.iter().any(|arg| arg == needle))
                .count()
        }
    }

    #[async_trait]
    impl ProcessRunner for ScriptedRunner {
        async fn run(
            &self,
            invocation: &Invocation,
            sink: Option<&LineSink>,
        ) -> Result<ProcessOutput, ProcessError> {
            self.calls.lock().unwrap().push(invocation.clone());

            let script = self
                .scripts
                .iter()
                .find(|s| s.program == invocation.program && s.args == invocation.args)
                .ok_or_else(|| ProcessError::Spawn {
                    program: invocation.to_string(),
                    source: io::Error::new(io::ErrorKind::NotFound, "no scripted output"),
                })?;

            if let Some(sink) = sink {
                for line in script.output.stdout.lines() {
                    sink(line);
                }
            }
            Ok(script.output.clone())
        }
    }
}
