use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    Stdio,
    Http,
}

impl Transport {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::Http => "http",
        }
    }
}

impl std::str::FromStr for Transport {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stdio" => Ok(Self::Stdio),
            "http" => Ok(Self::Http),
            other => Err(format!("unsupported transport: {other} (stdio|http)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolScope {
    Workspace,
    Global,
}

impl ToolScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Workspace => "workspace",
            Self::Global => "global",
        }
    }
}

impl std::str::FromStr for ToolScope {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "workspace" => Ok(Self::Workspace),
            "global" => Ok(Self::Global),
            other => Err(format!("unsupported scope: {other} (workspace|global)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionConfidence {
    High,
    Medium,
    Low,
}

impl DetectionConfidence {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// One candidate tool produced by detection. Built fresh each run and never
/// persisted; `entry_exists` refers to the entry named by the current run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedTool {
    pub id: String,
    #[serde(rename = "config_path")]
    pub config_path: PathBuf,
    #[serde(rename = "config_exists")]
    pub config_exists: bool,
    #[serde(rename = "entry_exists")]
    pub entry_exists: bool,
    pub scope: ToolScope,
    #[serde(rename = "default_transport")]
    pub default_transport: Transport,
    #[serde(rename = "detection_confidence")]
    pub detection_confidence: DetectionConfidence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteAction {
    Created,
    Updated,
    Removed,
    Skipped,
}

impl WriteAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Removed => "removed",
            Self::Skipped => "skipped",
        }
    }
}

/// Outcome of one apply/remove against one tool's document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResult {
    pub action: WriteAction,
    #[serde(rename = "tool_id")]
    pub tool_id: String,
    #[serde(rename = "config_path")]
    pub config_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    /// Unified diff of the pending change; only populated on dry runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedTarget {
    #[serde(rename = "tool_id")]
    pub tool_id: String,
    pub code: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterResult {
    #[serde(rename = "generated_at")]
    pub generated_at: String,
    pub configured: Vec<WriteResult>,
    pub skipped: Vec<SkippedTarget>,
    pub warnings: Vec<String>,
}

impl RegisterResult {
    pub fn empty() -> Self {
        Self {
            generated_at: String::new(),
            configured: Vec::new(),
            skipped: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

/// Read-only view of one tool's current entry, for the status operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolStatus {
    #[serde(rename = "tool_id")]
    pub tool_id: String,
    #[serde(rename = "config_path")]
    pub config_path: PathBuf,
    #[serde(rename = "config_exists")]
    pub config_exists: bool,
    #[serde(rename = "entry_exists")]
    pub entry_exists: bool,
    #[serde(rename = "detection_confidence")]
    pub detection_confidence: DetectionConfidence,
    /// Command line or URL of the current entry, when one is present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    #[serde(rename = "generated_at")]
    pub generated_at: String,
    #[serde(rename = "entry_name")]
    pub entry_name: String,
    pub tools: Vec<ToolStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventStatus {
    Success,
    Partial,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    #[serde(rename = "occurred_at")]
    pub occurred_at: String,
    pub action: String,
    pub status: AuditEventStatus,
    pub summary: String,
    pub paths: Vec<String>,
}
