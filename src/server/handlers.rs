//! Request handlers
//!
//! Each handler returns the ordered responses for one request. The session
//! attaches correlation fields and sends them; a handler never touches the
//! transport.

use std::path::Path;
use tracing::debug;

use super::messages::{
    BuildFiles, CacheReply, Capabilities, CmakeInputsReply, CodeModelConfiguration,
    CodeModelProject, CodeModelReply, CodeModelTarget, ConfigureRequest, FileGroup,
    GlobalSettingsReply, HandshakeRequest, IncludePath, ReplyBody,
};
use crate::config::CacheEntry;
use crate::io::LineSink;
use crate::project::meson::BUILD_DESCRIPTION_FILE;
use crate::project::ninja::NinjaBackend;
use crate::project::paths::relative_to;
use crate::project::{ProjectContext, ProjectError, Target};

/// Root directory reported to clients as the CMake installation
pub const CMAKE_ROOT_DIRECTORY: &str = "/usr/share/cmake";

pub const PROGRESS_MAXIMUM: u32 = 1000;

/// One response before correlation
#[derive(Debug, Clone)]
pub enum Response {
    Progress(String),
    Message(String),
    Reply(ReplyBody),
}

pub type HandlerResult = Result<Vec<Response>, ProjectError>;

fn log_tool_output(line: &str) {
    debug!(target: "tool_output", "{}", line);
}

fn tool_output_sink() -> &'static LineSink {
    &log_tool_output
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Responses reporting a failed request in-band
pub fn failure(error: &ProjectError) -> Vec<Response> {
    vec![
        Response::Message(error.to_string()),
        Response::Reply(ReplyBody::empty()),
    ]
}

pub async fn handshake(context: &mut ProjectContext, request: &HandshakeRequest) -> HandlerResult {
    context.bind_build_dir(&request.build_directory)?;
    if let Some(generator) = request.generator_name() {
        context.bind_generator(&generator)?;
    }
    if let Some(source_dir) = &request.source_directory {
        context.bind_source_dir(source_dir)?;
    }

    context.load_cache_entries(Some(tool_output_sink())).await?;
    context.persist()?;
    Ok(vec![Response::Reply(ReplyBody::empty())])
}

pub fn global_settings(context: &ProjectContext, debug_output: bool) -> Vec<Response> {
    let settings = context.config().settings();
    let reply = GlobalSettingsReply {
        capabilities: Capabilities::current(),
        build_directory: settings.build_dir.as_deref().map(display),
        source_directory: settings.source_dir.as_deref().map(display),
        generator: settings.generator.map(|g| g.name().to_string()),
        extra_generator: String::new(),
        check_system_vars: false,
        debug_output,
        trace: false,
        trace_expand: false,
        warn_uninitialized: false,
        warn_unused: false,
        warn_unused_cli: true,
    };
    vec![Response::Reply(ReplyBody::GlobalSettings(Box::new(reply)))]
}

pub async fn configure(context: &mut ProjectContext, request: &ConfigureRequest) -> HandlerResult {
    for argument in &request.cache_arguments {
        if argument.starts_with("-D") {
            context.set_from_assignment(argument)?;
        } else {
            debug!("Ignoring cache argument {}", argument);
        }
    }
    context.write_text_cache()?;

    Ok(vec![
        Response::Progress("Configuring".to_string()),
        Response::Message("Configuring done".to_string()),
        Response::Reply(ReplyBody::empty()),
    ])
}

pub async fn compute(context: &mut ProjectContext) -> HandlerResult {
    context.generate(Some(tool_output_sink())).await?;

    Ok(vec![
        Response::Progress("Generating".to_string()),
        Response::Message("Generating done".to_string()),
        Response::Reply(ReplyBody::empty()),
    ])
}

pub async fn cmake_inputs(context: &mut ProjectContext) -> HandlerResult {
    let source_dir = context.source_dir().ok();
    let mut build_files = vec![BuildFiles {
        sources: vec!["CMakeLists.txt".to_string()],
        is_cmake: false,
        is_temporary: false,
    }];

    if let Ok(build_dir) = context.build_dir()
        && NinjaBackend::is_configured(&build_dir)
    {
        let files = context.buildsystem_files().await?;
        let sources = files
            .iter()
            .map(|file| match &source_dir {
                Some(source_dir) => display(&relative_to(file, source_dir)),
                None => display(file),
            })
            .collect();
        build_files.push(BuildFiles {
            sources,
            is_cmake: false,
            is_temporary: false,
        });
    }

    Ok(vec![Response::Reply(ReplyBody::CmakeInputs(CmakeInputsReply {
        build_files,
        cmake_root_directory: CMAKE_ROOT_DIRECTORY.to_string(),
        source_directory: source_dir.as_deref().map(display),
    }))])
}

pub fn cache(context: &ProjectContext) -> Vec<Response> {
    let cache = context
        .cache_entries()
        .map(|entry| CacheEntry {
            key: entry.key.to_uppercase(),
            ..entry.clone()
        })
        .collect();
    vec![Response::Reply(ReplyBody::Cache(CacheReply { cache }))]
}

pub async fn code_model(context: &mut ProjectContext) -> HandlerResult {
    let build_dir = context.build_dir()?;
    let source_dir = context.source_dir()?;
    let info = context.project_info().await?;

    let mut targets = Vec::new();
    for target in context.targets().await? {
        targets.push(target_model(context, &target, &build_dir, &source_dir).await?);
    }

    let configuration = CodeModelConfiguration {
        name: context
            .config()
            .settings()
            .build_type
            .clone()
            .unwrap_or_default(),
        projects: vec![CodeModelProject {
            name: info.name,
            build_directory: display(&build_dir),
            source_directory: display(&source_dir),
            targets,
        }],
    };
    Ok(vec![Response::Reply(ReplyBody::CodeModel(CodeModelReply {
        configurations: vec![configuration],
    }))])
}

async fn target_model(
    context: &mut ProjectContext,
    target: &Target,
    build_dir: &Path,
    source_dir: &Path,
) -> Result<CodeModelTarget, ProjectError> {
    let subdir = target.subdir().to_path_buf();
    let mut file_groups = Vec::new();

    let files = context.target_files(target).await?;
    if !files.is_empty() {
        let info = context.compile_info(target).await?;
        let implicit = context.implicit_include_directories(target).await?;

        let include_path = info
            .include_dirs
            .iter()
            .map(|path| (path, false))
            .chain(implicit.iter().map(|path| (path, true)))
            .map(|(path, is_system)| IncludePath {
                path: display(path),
                is_system,
            })
            .collect();

        file_groups.push(FileGroup {
            is_generated: false,
            sources: files
                .iter()
                .map(|file| display(&relative_to(file, &subdir)))
                .collect(),
            compile_flags: Some(info.compile_flags()),
            defines: Some(info.defines.clone()),
            include_path: Some(include_path),
            language: Some(info.language().protocol_name()),
        });
    }

    file_groups.push(FileGroup {
        is_generated: false,
        sources: vec![BUILD_DESCRIPTION_FILE.to_string()],
        compile_flags: None,
        defines: None,
        include_path: None,
        language: None,
    });

    Ok(CodeModelTarget {
        name: target.name.clone(),
        full_name: target.name.clone(),
        kind: target.kind.protocol_name(),
        artifacts: vec![display(&build_dir.join(&target.output))],
        build_directory: display(&build_dir.join(&subdir)),
        source_directory: display(&source_dir.join(&subdir)),
        file_groups,
    })
}
