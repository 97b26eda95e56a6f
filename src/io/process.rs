//! Process invocation layer
//!
//! Runs the underlying build tool (and the compiler probe) as opaque child
//! processes. Stdout is streamed line by line to an optional live sink while
//! being accumulated; stderr is drained concurrently so the child never blocks
//! on a full pipe.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, trace};

/// Receives each stdout line of a running invocation as it arrives.
pub type LineSink = dyn Fn(&str) + Send + Sync;

// ============================================================================
// Invocation
// ============================================================================

/// A fully described child-process invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Extra environment variables layered over the inherited environment
    pub env: BTreeMap<String, String>,
    pub working_directory: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_directory: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn envs(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Everything a finished child process produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    /// Successful exit with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed exit with the given stderr
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code: Some(exit_code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Stdout followed by stderr, the text reported when an invocation fails
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (true, _) => self.stderr.clone(),
            (false, true) => self.stdout.clone(),
            (false, false) => format!("{}{}", self.stdout, self.stderr),
        }
    }
}

// ============================================================================
// Process Runner
// ============================================================================

/// Error types for running a child process
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error while running `{program}`: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Stdout not available")]
    StdoutNotAvailable,

    #[error("Stderr not available")]
    StderrNotAvailable,
}

/// Runs child processes to completion
///
/// The seam between the adapter and the operating system; tests substitute a
/// scripted implementation.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run the invocation until it exits, forwarding stdout lines to `sink`.
    ///
    /// A non-zero exit is not an error at this layer.
    async fn run(
        &self,
        invocation: &Invocation,
        sink: Option<&LineSink>,
    ) -> Result<ProcessOutput, ProcessError>;
}

/// Runs invocations as real child processes via tokio
#[derive(Debug, Clone, Default)]
pub struct SubprocessRunner;

#[async_trait]
impl ProcessRunner for SubprocessRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        sink: Option<&LineSink>,
    ) -> Result<ProcessOutput, ProcessError> {
        let program = invocation.program.clone();
        debug!("Running: {}", invocation);

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .envs(&invocation.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(working_dir) = &invocation.working_directory {
            command.current_dir(working_dir);
        }

        let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or(ProcessError::StdoutNotAvailable)?;
        let stderr = child
            .stderr
            .take()
            .ok_or(ProcessError::StderrNotAvailable)?;

        // Always drain stderr so the child cannot block on it
        let stderr_task = tokio::spawn(async move {
            let mut bytes = Vec::new();
            let mut reader = BufReader::new(stderr);
            reader.read_to_end(&mut bytes).await.map(|_| bytes)
        });

        let io_error = |source| ProcessError::Io {
            program: program.clone(),
            source,
        };

        // Reap the child even when reading its output failed
        let stdout_result = read_lines_lossy(stdout, &invocation.program, sink).await;
        let status = child.wait().await.map_err(io_error)?;
        let collected = stdout_result.map_err(io_error)?;
        let stderr_bytes = stderr_task
            .await
            .map_err(|e| io_error(io::Error::other(e)))?
            .map_err(io_error)?;

        debug!("`{}` exited with {}", invocation.program, status);

        Ok(ProcessOutput {
            success: status.success(),
            exit_code: status.code(),
            stdout: collected,
            stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
        })
    }
}

/// Read `reader` line by line, decoding each line lossily
///
/// Tools may print bytes that are not UTF-8 (for example Latin-1 compiler
/// diagnostics); those become replacement characters instead of errors.
async fn read_lines_lossy<R: AsyncRead + Unpin>(
    reader: R,
    program: &str,
    sink: Option<&LineSink>,
) -> io::Result<String> {
    let mut reader = BufReader::new(reader);
    let mut buffer = Vec::new();
    let mut collected = String::new();
    loop {
        buffer.clear();
        if reader.read_until(b'\n', &mut buffer).await? == 0 {
            return Ok(collected);
        }
        if buffer.last() == Some(&b'\n') {
            buffer.pop();
            if buffer.last() == Some(&b'\r') {
                buffer.pop();
            }
        }

        let line = String::from_utf8_lossy(&buffer);
        trace!("{}: {}", program, line);
        if let Some(sink) = sink {
            sink(&line);
        }
        collected.push_str(&line);
        collected.push('\n');
    }
}

// ============================================================================
// Build-Tool Client
// ============================================================================

/// Failure of an underlying build-tool invocation
#[derive(Debug, thiserror::Error)]
pub enum BuildToolError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("`{command}` failed ({}):\n{output}", exit_description(.exit_code))]
    Failed {
        command: String,
        exit_code: Option<i32>,
        output: String,
    },
}

fn exit_description(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("exit status {code}"),
        None => "terminated by signal".to_string(),
    }
}

impl BuildToolError {
    /// Captured output of a failed invocation
    pub fn output(&self) -> Option<&str> {
        match self {
            BuildToolError::Failed { output, .. } => Some(output.as_str()),
            BuildToolError::Process(_) => None,
        }
    }
}

/// Invokes the underlying build tool and turns non-zero exits into errors
///
/// No retries: a failed invocation is reported upward immediately.
#[derive(Clone)]
pub struct BuildToolClient {
    runner: std::sync::Arc<dyn ProcessRunner>,
}

impl BuildToolClient {
    pub fn new(runner: std::sync::Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    /// Run an invocation and return its stdout, failing on non-zero exit
    pub async fn invoke(
        &self,
        invocation: &Invocation,
        sink: Option<&LineSink>,
    ) -> Result<String, BuildToolError> {
        let output = self.runner.run(invocation, sink).await?;
        if !output.success {
            return Err(BuildToolError::Failed {
                command: invocation.to_string(),
                exit_code: output.exit_code,
                output: output.combined(),
            });
        }
        Ok(output.stdout)
    }

    /// Run an invocation and return everything it produced, whatever the exit status
    pub async fn capture(&self, invocation: &Invocation) -> Result<ProcessOutput, BuildToolError> {
        Ok(self.runner.run(invocation, None).await?)
    }
}

impl fmt::Debug for BuildToolClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildToolClient").finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
