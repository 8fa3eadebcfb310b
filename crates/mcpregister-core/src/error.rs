use crate::models::{ToolScope, Transport};
use std::path::PathBuf;
use thiserror::Error;

/// One schema violation inside a manifest, reported alongside its siblings
/// so a broken manifest can be fixed in a single edit cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestViolation {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ManifestViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Error)]
pub enum RegisterEngineError {
    #[error("Manifest not found at {0}")]
    ManifestNotFound(PathBuf),

    #[error("Manifest is invalid: {}", format_violations(.0))]
    ManifestInvalid(Vec<ManifestViolation>),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse {path}: {detail}")]
    ConfigParse { path: PathBuf, detail: String },

    #[error("Cannot edit config for tool '{tool_id}': {detail}")]
    MergeConflict { tool_id: String, detail: String },

    #[error("Written config failed validation at {path}; original content was restored from backup: {detail}")]
    ConfigWriteCorrupt { path: PathBuf, detail: String },

    #[error("Tool '{tool_id}' does not support {} scope", scope.as_str())]
    ScopeUnsupported { tool_id: String, scope: ToolScope },

    #[error("Cannot use {} transport for tool '{tool_id}': {reason}", transport.as_str())]
    TransportUnavailable {
        tool_id: String,
        transport: Transport,
        reason: String,
    },

    #[error("Tool '{0}' was detected at low confidence")]
    LowConfidence(String),

    #[error("No entry named '{entry}' in config for tool '{tool_id}'")]
    EntryNotFound { tool_id: String, entry: String },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

impl RegisterEngineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable machine-readable code for the wrapping CLI or automation.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ManifestNotFound(_) => "MANIFEST_NOT_FOUND",
            Self::ManifestInvalid(_) => "MANIFEST_INVALID",
            Self::Io { .. } => "CONFIG_IO_ERROR",
            Self::Json(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigParse { .. } => "CONFIG_PARSE_ERROR",
            Self::MergeConflict { .. } => "CONFIG_PARSE_ERROR",
            Self::ConfigWriteCorrupt { .. } => "CONFIG_WRITE_CORRUPT",
            Self::ScopeUnsupported { .. } => "SCOPE_UNSUPPORTED",
            Self::TransportUnavailable { .. } => "TRANSPORT_UNAVAILABLE",
            Self::LowConfidence(_) => "LOW_CONFIDENCE",
            Self::EntryNotFound { .. } => "ENTRY_NOT_FOUND",
            Self::UnknownTool(_) => "TOOL_UNKNOWN",
        }
    }

    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::ManifestNotFound(path) => Some(format!(
                "Run 'mcpregister init' to generate {}",
                path.display()
            )),
            Self::ManifestInvalid(_) => {
                Some(String::from("Fix the listed fields and re-run"))
            }
            Self::ConfigParse { path, .. } => Some(format!(
                "Repair {} by hand; it was left untouched",
                path.display()
            )),
            Self::MergeConflict { .. } => Some(String::from(
                "The existing config holds an incompatible value at the target key",
            )),
            Self::ConfigWriteCorrupt { .. } => Some(String::from(
                "The original file is intact; please report this adapter bug",
            )),
            Self::ScopeUnsupported { tool_id, scope } => Some(format!(
                "Drop --scope {} or exclude '{tool_id}' with --tool",
                scope.as_str()
            )),
            Self::TransportUnavailable { transport, .. } => Some(format!(
                "Add a {} block to the manifest or pick another transport",
                match transport {
                    Transport::Stdio => "stdio",
                    Transport::Http => "http",
                }
            )),
            Self::LowConfidence(tool_id) => Some(format!(
                "Re-run with --force to write '{tool_id}' anyway"
            )),
            Self::EntryNotFound { .. } => None,
            Self::UnknownTool(_) => {
                Some(String::from("Run 'mcpregister detect' to list known tools"))
            }
            Self::Io { .. } | Self::Json(_) => None,
        }
    }
}

fn format_violations(violations: &[ManifestViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
