mod config;
mod io;
mod logging;
mod project;
mod server;

#[cfg(test)]
mod test_utils;

use clap::Parser;
use config::{Configuration, emulated_version_string};
use logging::{LogConfig, init_logging};
use project::{ProjectContext, ProjectError, ProjectTools};
use server::{Capabilities, ListenerError};

use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// CMake-compatible command line that drives Meson projects
#[derive(Parser, Debug)]
#[command(author, about, long_about = None, disable_version_flag = true)]
struct Args {
    /// Source directory to generate a build system for
    #[arg(value_name = "PATH")]
    path: Option<PathBuf>,

    /// Source directory
    #[arg(short = 'H', value_name = "DIR")]
    home: Option<PathBuf>,

    /// Source directory
    #[arg(short = 'S', value_name = "DIR")]
    source: Option<PathBuf>,

    /// Build directory (defaults to the current directory)
    #[arg(short = 'B', value_name = "DIR")]
    build_dir: Option<PathBuf>,

    /// Generator name, e.g. "Ninja" or "CodeBlocks - Unix Makefiles"
    #[arg(short = 'G', value_name = "GENERATOR")]
    generator: Option<String>,

    /// Cache entry assignment
    #[arg(short = 'D', value_name = "KEY[:TYPE]=VALUE", action = clap::ArgAction::Append)]
    defines: Vec<String>,

    /// Build a configured build directory
    #[arg(long = "build", value_name = "DIR")]
    build: Option<PathBuf>,

    /// Target to build
    #[arg(long, value_name = "NAME", default_value = "all")]
    target: String,

    /// Build type for --build
    #[arg(long = "config", value_name = "BUILD_TYPE")]
    build_type: Option<String>,

    /// Print the emulated CMake version
    #[arg(long)]
    version: bool,

    /// Log at debug level and report debug output to clients
    #[arg(long)]
    debug_output: bool,

    /// Command mode: `server --pipe=<path>` or `capabilities`
    #[arg(short = 'E', value_name = "COMMAND", num_args = 1.., allow_hyphen_values = true)]
    command: Option<Vec<String>>,

    /// Path to the meson executable (overrides MESON env var)
    #[arg(long, value_name = "PATH")]
    meson: Option<String>,

    /// Path to the ninja executable (overrides NINJA env var)
    #[arg(long, value_name = "PATH")]
    ninja: Option<String>,

    /// Log level (overrides RUST_LOG env var)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Log file path (overrides MCW_LOG_FILE env var)
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

#[derive(Debug, PartialEq, Eq)]
enum Mode {
    Version,
    Command(Vec<String>),
    Build(PathBuf),
    Generate,
}

impl Args {
    fn mode(&self) -> Mode {
        if self.version {
            Mode::Version
        } else if let Some(command) = &self.command {
            Mode::Command(command.clone())
        } else if let Some(dir) = &self.build {
            Mode::Build(dir.clone())
        } else {
            Mode::Generate
        }
    }

    fn source_dir(&self) -> Option<&Path> {
        self.source
            .as_deref()
            .or(self.home.as_deref())
            .or(self.path.as_deref())
    }
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Project(#[from] ProjectError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("Unsupported command: {0}")]
    UnsupportedCommand(String),

    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("Failed to get current directory: {0}")]
    CurrentDir(#[source] std::io::Error),

    #[error("Failed to encode capabilities: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Accept the single-dash spellings CMake also accepts
fn normalize_args(args: impl IntoIterator<Item = String>) -> Vec<String> {
    args.into_iter()
        .map(|arg| match arg.as_str() {
            "-version" => "--version".to_string(),
            "-help" => "--help".to_string(),
            _ => arg,
        })
        .collect()
}

/// Priority: CLI arg > environment variable > default name
fn resolve_program(arg: Option<String>, env_var: &str, default: &str) -> String {
    arg.or_else(|| std::env::var(env_var).ok())
        .unwrap_or_else(|| default.to_string())
}

fn print_usage() {
    println!("Usage\n");
    println!("  meson-cmake-wrapper [options] <path-to-source>");
    println!("  meson-cmake-wrapper [options] --build <dir> [--target <name>]\n");
    println!("Specify a source directory to (re-)generate a build system for it in the");
    println!("current working directory.\n");
    println!("Run 'meson-cmake-wrapper --help' for more information.");
}

fn print_line(line: &str) {
    println!("{line}");
}

fn create_context(args: &Args) -> ProjectContext {
    let meson = resolve_program(args.meson.clone(), "MESON", "meson");
    let ninja = resolve_program(args.ninja.clone(), "NINJA", "ninja");
    info!("Using meson: {}, ninja: {}", meson, ninja);

    let command_path = std::env::current_exe()
        .unwrap_or_else(|_| PathBuf::from("meson-cmake-wrapper"));
    ProjectContext::new(Configuration::new(meson), ProjectTools::system(ninja, command_path))
}

/// Persist the entries of a successful command; a failed one leaves the
/// persisted cache untouched
fn finish(context: &ProjectContext, result: Result<(), CliError>) -> Result<(), CliError> {
    if result.is_ok() {
        match context.persist() {
            Ok(Some(path)) => info!("Saved cache entries to {}", path.display()),
            Ok(None) => {}
            Err(e) => warn!("Failed to save cache entries: {}", e),
        }
    }
    result
}

async fn run_command(args: &Args, command: &[String]) -> Result<(), CliError> {
    match command.first().map(String::as_str) {
        Some("capabilities") => {
            println!("{}", serde_json::to_string(&Capabilities::current())?);
            Ok(())
        }
        Some("server") => {
            let pipe = command[1..]
                .iter()
                .find_map(|arg| arg.strip_prefix("--pipe="))
                .ok_or(CliError::MissingArgument("--pipe=<path>"))?;
            let end = server::serve(Path::new(pipe), create_context(args), args.debug_output).await?;
            info!("Server session ended: {:?}", end);
            Ok(())
        }
        _ => Err(CliError::UnsupportedCommand(command.join(" "))),
    }
}

async fn build(context: &mut ProjectContext, args: &Args, dir: &Path) -> Result<(), CliError> {
    context.bind_build_dir(dir)?;
    if let Some(build_type) = &args.build_type {
        context.bind_build_type(build_type);
    }

    println!("Building target: {}", args.target);
    context.build(&args.target, Some(&print_line)).await?;
    Ok(())
}

async fn generate(context: &mut ProjectContext, args: &Args) -> Result<(), CliError> {
    let build_dir = match &args.build_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().map_err(CliError::CurrentDir)?,
    };
    context.bind_build_dir(&build_dir)?;
    if let Some(generator) = &args.generator {
        context.bind_generator(generator)?;
    }
    if let Some(source_dir) = args.source_dir() {
        context.bind_source_dir(source_dir)?;
    }
    for define in &args.defines {
        context.set_from_assignment(define)?;
    }

    println!("Generate to build directory: {}", build_dir.display());
    context.generate(Some(&print_line)).await?;
    Ok(())
}

async fn run(args: &Args) -> Result<(), CliError> {
    match args.mode() {
        Mode::Version => {
            println!("cmake version {}", emulated_version_string());
            Ok(())
        }
        Mode::Command(command) => run_command(args, &command).await,
        Mode::Build(dir) => {
            let mut context = create_context(args);
            let result = build(&mut context, args, &dir).await;
            finish(&context, result)
        }
        Mode::Generate => {
            let mut context = create_context(args);
            let result = generate(&mut context, args).await;
            finish(&context, result)
        }
    }
}

#[tokio::main]
async fn main() {
    let raw_args: Vec<String> = std::env::args().collect();
    if raw_args.len() <= 1 {
        print_usage();
        return;
    }
    let args = Args::parse_from(normalize_args(raw_args));

    let log_config = LogConfig::from_env()
        .with_overrides(args.log_level.clone(), args.log_file.clone())
        .with_debug_output(args.debug_output);

    if let Err(e) = init_logging(log_config) {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }
    info!("(args) {:?}", args);

    if let Err(e) = run(&args).await {
        error!("{}", e);
        println!("{e}");
        std::process::exit(1);
    }
}
