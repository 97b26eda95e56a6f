//! Protocol message types
//!
//! Inbound requests are parsed into a closed `RequestKind` tag plus a typed
//! payload; outbound messages are the four roles the server sends.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::str::FromStr;

use crate::config::{CacheEntry, EMULATED_CMAKE_VERSION, emulated_version_string};

/// Protocol errors close the connection
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Message is not an object with a string \"type\" field")]
    MissingType,

    #[error("Unsupported request type: {0}")]
    UnsupportedRequest(String),

    #[error("Invalid {kind} request: {reason}")]
    InvalidPayload { kind: String, reason: String },

    #[error("Expected handshake, got {0}")]
    HandshakeExpected(String),

    #[error("Duplicate handshake")]
    DuplicateHandshake,
}

/// Request types the server handles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Handshake,
    GlobalSettings,
    Configure,
    Compute,
    CmakeInputs,
    Cache,
    CodeModel,
}

impl FromStr for RequestKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "handshake" => Ok(RequestKind::Handshake),
            "globalsettings" => Ok(RequestKind::GlobalSettings),
            "configure" => Ok(RequestKind::Configure),
            "compute" => Ok(RequestKind::Compute),
            "cmakeinputs" => Ok(RequestKind::CmakeInputs),
            "cache" => Ok(RequestKind::Cache),
            "codemodel" => Ok(RequestKind::CodeModel),
            _ => Err(ProtocolError::UnsupportedRequest(s.to_string())),
        }
    }
}

/// One inbound request
#[derive(Debug, Clone)]
pub struct Request {
    pub kind: RequestKind,
    /// The `type` field as the client spelled it, echoed in `inReplyTo`
    pub type_name: String,
    pub cookie: Option<String>,
    pub body: Value,
}

impl Request {
    pub fn from_value(body: Value) -> Result<Self, ProtocolError> {
        let type_name = body
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?
            .to_string();
        let kind = type_name.parse()?;
        let cookie = body.get("cookie").and_then(Value::as_str).map(str::to_string);
        Ok(Self {
            kind,
            type_name,
            cookie,
            body,
        })
    }

    /// Decode the typed payload; missing required fields are protocol errors
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        T::deserialize(&self.body).map_err(|e| ProtocolError::InvalidPayload {
            kind: self.type_name.clone(),
            reason: e.to_string(),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeRequest {
    pub build_directory: PathBuf,
    #[serde(default)]
    pub source_directory: Option<PathBuf>,
    #[serde(default)]
    pub generator: Option<String>,
    #[serde(default)]
    pub extra_generator: Option<String>,
}

impl HandshakeRequest {
    /// Generator name with the extra generator folded in (`CodeBlocks - Ninja`)
    pub fn generator_name(&self) -> Option<String> {
        let generator = self.generator.as_deref().filter(|g| !g.is_empty())?;
        match self.extra_generator.as_deref().filter(|e| !e.is_empty()) {
            Some(extra) => Some(format!("{extra} - {generator}")),
            None => Some(generator.to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigureRequest {
    pub cache_arguments: Vec<String>,
}

// ============================================================================
// Outbound
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolVersion {
    pub is_experimental: bool,
    pub major: u32,
    pub minor: u32,
}

/// Messages the server sends
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Hello {
        supported_protocol_versions: Vec<ProtocolVersion>,
    },
    Reply {
        in_reply_to: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        cookie: Option<String>,
        #[serde(flatten)]
        body: ReplyBody,
    },
    Message {
        #[serde(skip_serializing_if = "Option::is_none")]
        in_reply_to: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        cookie: Option<String>,
        message: String,
    },
    Progress {
        in_reply_to: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        cookie: Option<String>,
        progress_current: u32,
        progress_minimum: u32,
        progress_maximum: u32,
        progress_message: String,
    },
}

impl ServerMessage {
    pub fn hello() -> Self {
        ServerMessage::Hello {
            supported_protocol_versions: vec![ProtocolVersion {
                is_experimental: true,
                major: 1,
                minor: 1,
            }],
        }
    }

    /// Role name for logging
    pub fn role(&self) -> &'static str {
        match self {
            ServerMessage::Hello { .. } => "hello",
            ServerMessage::Reply { .. } => "reply",
            ServerMessage::Message { .. } => "message",
            ServerMessage::Progress { .. } => "progress",
        }
    }
}

/// Request-specific fields merged into a reply
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ReplyBody {
    Empty(EmptyReply),
    GlobalSettings(Box<GlobalSettingsReply>),
    CmakeInputs(CmakeInputsReply),
    Cache(CacheReply),
    CodeModel(CodeModelReply),
}

impl ReplyBody {
    pub fn empty() -> Self {
        ReplyBody::Empty(EmptyReply {})
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EmptyReply {}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorCapability {
    pub name: &'static str,
    pub platform_support: bool,
    pub toolset_support: bool,
    pub extra_generators: Vec<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub is_dirty: bool,
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub string: String,
    pub suffix: String,
}

/// Static capability metadata, also printed by `-E capabilities`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub generators: Vec<GeneratorCapability>,
    pub server_mode: bool,
    pub version: VersionInfo,
}

impl Capabilities {
    pub fn current() -> Self {
        let (major, minor, patch) = EMULATED_CMAKE_VERSION;
        let generator = |name| GeneratorCapability {
            name,
            platform_support: false,
            toolset_support: false,
            extra_generators: vec!["CodeBlocks"],
        };
        Self {
            generators: vec![generator("Ninja"), generator("Unix Makefiles")],
            server_mode: true,
            version: VersionInfo {
                is_dirty: false,
                major,
                minor,
                patch,
                string: emulated_version_string(),
                suffix: String::new(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettingsReply {
    pub capabilities: Capabilities,
    pub build_directory: Option<String>,
    pub source_directory: Option<String>,
    pub generator: Option<String>,
    pub extra_generator: String,
    pub check_system_vars: bool,
    pub debug_output: bool,
    pub trace: bool,
    pub trace_expand: bool,
    pub warn_uninitialized: bool,
    pub warn_unused: bool,
    pub warn_unused_cli: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildFiles {
    pub sources: Vec<String>,
    #[serde(rename = "isCMake")]
    pub is_cmake: bool,
    pub is_temporary: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CmakeInputsReply {
    pub build_files: Vec<BuildFiles>,
    pub cmake_root_directory: String,
    pub source_directory: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheReply {
    pub cache: Vec<CacheEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CodeModelReply {
    pub configurations: Vec<CodeModelConfiguration>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CodeModelConfiguration {
    pub name: String,
    pub projects: Vec<CodeModelProject>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeModelProject {
    pub name: String,
    pub build_directory: String,
    pub source_directory: String,
    pub targets: Vec<CodeModelTarget>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeModelTarget {
    pub name: String,
    pub full_name: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub artifacts: Vec<String>,
    pub build_directory: String,
    pub source_directory: String,
    pub file_groups: Vec<FileGroup>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileGroup {
    pub is_generated: bool,
    pub sources: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compile_flags: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defines: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_path: Option<Vec<IncludePath>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncludePath {
    pub path: String,
    pub is_system: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EntryType;
    use serde_json::json;

    #[test]
    fn test_request_kind_is_case_insensitive() {
        assert_eq!("globalSettings".parse::<RequestKind>().unwrap(), RequestKind::GlobalSettings);
        assert_eq!("cmakeInputs".parse::<RequestKind>().unwrap(), RequestKind::CmakeInputs);
        assert_eq!("codemodel".parse::<RequestKind>().unwrap(), RequestKind::CodeModel);
        assert!(matches!(
            "fileSystemWatchers".parse::<RequestKind>(),
            Err(ProtocolError::UnsupportedRequest(_))
        ));
    }

    #[test]
    fn test_request_keeps_type_spelling_and_cookie() {
        let request =
            Request::from_value(json!({"type": "globalSettings", "cookie": "c1"})).unwrap();
        assert_eq!(request.kind, RequestKind::GlobalSettings);
        assert_eq!(request.type_name, "globalSettings");
        assert_eq!(request.cookie.as_deref(), Some("c1"));

        assert!(matches!(
            Request::from_value(json!({"cookie": "c1"})),
            Err(ProtocolError::MissingType)
        ));
        assert!(matches!(
            Request::from_value(json!(["handshake"])),
            Err(ProtocolError::MissingType)
        ));
    }

    #[test]
    fn test_handshake_requires_build_directory() {
        let request = Request::from_value(json!({"type": "handshake", "sourceDirectory": "/s"})).unwrap();
        let err = request.payload::<HandshakeRequest>().unwrap_err();
        assert!(err.to_string().contains("buildDirectory"));
    }

    #[test]
    fn test_handshake_generator_name() {
        let request = Request::from_value(json!({
            "type": "handshake",
            "buildDirectory": "/b",
            "generator": "Ninja",
            "extraGenerator": "CodeBlocks"
        }))
        .unwrap();
        let handshake: HandshakeRequest = request.payload().unwrap();
        assert_eq!(handshake.generator_name().as_deref(), Some("CodeBlocks - Ninja"));
        assert!(handshake.source_directory.is_none());
    }

    #[test]
    fn test_hello_shape() {
        assert_eq!(
            serde_json::to_value(ServerMessage::hello()).unwrap(),
            json!({
                "type": "hello",
                "supportedProtocolVersions": [{"isExperimental": true, "major": 1, "minor": 1}]
            })
        );
    }

    #[test]
    fn test_reply_flattens_body_and_omits_missing_cookie() {
        let reply = ServerMessage::Reply {
            in_reply_to: "cache".to_string(),
            cookie: None,
            body: ReplyBody::Cache(CacheReply {
                cache: vec![CacheEntry::new("CMAKE_BUILD_TYPE", "Debug", EntryType::String)],
            }),
        };
        assert_eq!(
            serde_json::to_value(reply).unwrap(),
            json!({
                "type": "reply",
                "inReplyTo": "cache",
                "cache": [{"key": "CMAKE_BUILD_TYPE", "value": "Debug", "type": "STRING", "properties": {}}]
            })
        );

        let empty = ServerMessage::Reply {
            in_reply_to: "handshake".to_string(),
            cookie: Some("zimtstern".to_string()),
            body: ReplyBody::empty(),
        };
        assert_eq!(
            serde_json::to_value(empty).unwrap(),
            json!({"type": "reply", "inReplyTo": "handshake", "cookie": "zimtstern"})
        );
    }

    #[test]
    fn test_progress_field_names() {
        let progress = ServerMessage::Progress {
            in_reply_to: "configure".to_string(),
            cookie: None,
            progress_current: 1000,
            progress_minimum: 0,
            progress_maximum: 1000,
            progress_message: "Configuring".to_string(),
        };
        assert_eq!(
            serde_json::to_value(progress).unwrap(),
            json!({
                "type": "progress",
                "inReplyTo": "configure",
                "progressCurrent": 1000,
                "progressMinimum": 0,
                "progressMaximum": 1000,
                "progressMessage": "Configuring"
            })
        );
    }

    #[test]
    fn test_capabilities_shape() {
        let value = serde_json::to_value(Capabilities::current()).unwrap();
        assert_eq!(value["serverMode"], json!(true));
        assert_eq!(value["version"]["string"], json!("3.10.0"));
        assert_eq!(value["generators"][0]["name"], json!("Ninja"));
        assert_eq!(value["generators"][1]["extraGenerators"], json!(["CodeBlocks"]));
    }
}
