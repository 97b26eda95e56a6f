mod client_layer;

pub use client_layer::{CLIENT_LOG, ClientLog, ClientLogLayer};

use std::env;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Configuration for the logging system
///
/// Logs go to stderr or a file, never to stdout: IDEs parse the wrapper's
/// stdout the same way they parse CMake's.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level filter (e.g., "debug", "info", "warn", "error")
    pub level: String,
    /// Optional log file path. If None, logs only to stderr
    pub file_path: Option<PathBuf>,
    /// Whether to use structured JSON format for logs
    pub json_format: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_path: None,
            json_format: false,
        }
    }
}

impl LogConfig {
    /// Create LogConfig from environment variables
    ///
    /// `RUST_LOG` sets the filter, `MCW_LOG_FILE` the log file (suffixed with
    /// the PID when `MCW_LOG_UNIQUE=true`), `MCW_LOG_JSON=true` JSON output.
    pub fn from_env() -> Self {
        let level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let file_path = env::var("MCW_LOG_FILE").ok().map(|path| {
            let path = PathBuf::from(path);
            if env::var("MCW_LOG_UNIQUE").unwrap_or_default() == "true" {
                unique_path(&path, std::process::id())
            } else {
                path
            }
        });

        let json_format = env::var("MCW_LOG_JSON").unwrap_or_default() == "true";

        Self {
            level,
            file_path,
            json_format,
        }
    }

    /// Override values from CLI arguments
    pub fn with_overrides(mut self, level: Option<String>, file_path: Option<PathBuf>) -> Self {
        if let Some(level) = level {
            self.level = level;
        }
        if let Some(file_path) = file_path {
            self.file_path = Some(file_path);
        }
        self
    }

    /// `--debug-output` raises the level to debug unless trace is already on
    pub fn with_debug_output(mut self, debug_output: bool) -> Self {
        if debug_output && !self.level.contains("trace") {
            self.level = "debug".to_string();
        }
        self
    }
}

/// Insert `pid` before the extension: `wrapper.log` -> `wrapper.<pid>.log`
fn unique_path(path: &Path, pid: u32) -> PathBuf {
    let Some(stem) = path.file_stem() else {
        return path.to_path_buf();
    };
    let unique_name = match path.extension().and_then(|ext| ext.to_str()) {
        Some(extension) if !extension.is_empty() => {
            format!("{}.{}.{}", stem.to_string_lossy(), pid, extension)
        }
        _ => format!("{}.{}", stem.to_string_lossy(), pid),
    };
    path.with_file_name(unique_name)
}

/// Initialize the logging system based on configuration
pub fn init_logging(config: LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_new(&config.level).or_else(|_| EnvFilter::try_new("info"))?;

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(ClientLogLayer::new(CLIENT_LOG.clone()));

    match (&config.file_path, config.json_format) {
        (Some(file_path), true) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(file_path)?;

            let file_layer = fmt::layer().json().with_writer(file).with_ansi(false);

            subscriber.with(file_layer).init();
        }
        (Some(file_path), false) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(file_path)?;

            let file_layer = fmt::layer()
                .with_writer(file)
                .with_ansi(false)
                .with_target(true)
                .with_line_number(true);

            subscriber.with(file_layer).init();
        }
        (None, true) => {
            let stderr_layer = fmt::layer().json().with_writer(io::stderr).with_ansi(false);

            subscriber.with(stderr_layer).init();
        }
        // Default: human readable on stderr
        (None, false) => {
            let stderr_layer = fmt::layer()
                .with_writer(io::stderr)
                .with_ansi(true)
                .with_target(true);

            subscriber.with(stderr_layer).init();
        }
    }

    Ok(())
}

/// Log one protocol message (either direction) as a single structured event
#[macro_export]
macro_rules! log_protocol_message {
    ($level:expr, $direction:expr, $kind:expr, $data:expr) => {
        tracing::event!(
            $level,
            direction = $direction,
            kind = $kind,
            data = ?$data,
            pid = std::process::id(),
            "Protocol message"
        );
    };
}

/// Helper function to log performance timing
#[macro_export]
macro_rules! log_timing {
    ($level:expr, $operation:expr, $duration:expr) => {
        tracing::event!(
            $level,
            operation = $operation,
            duration_ms = $duration.as_millis(),
            pid = std::process::id(),
            "Performance timing"
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_path_keeps_extension() {
        assert_eq!(
            unique_path(Path::new("/tmp/wrapper.log"), 42),
            PathBuf::from("/tmp/wrapper.42.log")
        );
        assert_eq!(
            unique_path(Path::new("/tmp/wrapper"), 42),
            PathBuf::from("/tmp/wrapper.42")
        );
    }

    #[test]
    fn test_overrides_and_debug_output() {
        let config = LogConfig::default()
            .with_overrides(Some("warn".to_string()), Some(PathBuf::from("/tmp/w.log")))
            .with_debug_output(true);
        assert_eq!(config.level, "debug");
        assert_eq!(config.file_path, Some(PathBuf::from("/tmp/w.log")));

        let trace = LogConfig::default()
            .with_overrides(Some("trace".to_string()), None)
            .with_debug_output(true);
        assert_eq!(trace.level, "trace");

        let quiet = LogConfig::default().with_debug_output(false);
        assert_eq!(quiet.level, "info");
    }
}
