use crate::adapters;
use crate::document::ConfigDocument;
use crate::models::{DetectedTool, DetectionConfidence, ToolScope, Transport};
use crate::paths::{config_dir, home_dir};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The slice of the machine the engine is allowed to look at. Detection is a
/// pure function of this struct plus the filesystem, so tests pin the world
/// by pointing every field into a temp directory.
#[derive(Debug, Clone)]
pub struct RegisterEngineEnvironment {
    pub home_directory: PathBuf,
    pub config_directory: PathBuf,
    pub workspace_directory: PathBuf,
    /// Search path consulted for tool binaries; `None` means no lookup.
    pub search_path: Option<OsString>,
}

impl RegisterEngineEnvironment {
    pub fn current() -> Self {
        let home = home_dir().unwrap_or_else(|| PathBuf::from("/"));
        let config_directory = config_dir().unwrap_or_else(|| home.join(".config"));
        let workspace_directory =
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            home_directory: home,
            config_directory,
            workspace_directory,
            search_path: std::env::var_os("PATH"),
        }
    }

    fn binary_on_path(&self, name: &str) -> bool {
        let Some(search_path) = self.search_path.clone() else {
            return false;
        };
        which::which_in(name, Some(search_path), &self.workspace_directory).is_ok()
    }
}

pub const KNOWN_TOOL_IDS: [&str; 5] = [
    "claude-code",
    "claude-desktop",
    "cursor",
    "vscode",
    "windsurf",
];

/// Resolves where `tool_id` keeps its config for `scope`; `None` when the
/// tool has no config at that scope.
pub fn config_path_for(
    environment: &RegisterEngineEnvironment,
    tool_id: &str,
    scope: ToolScope,
) -> Option<PathBuf> {
    match (tool_id, scope) {
        ("claude-code", ToolScope::Workspace) => {
            Some(environment.workspace_directory.join(".mcp.json"))
        }
        ("claude-desktop", ToolScope::Global) => Some(
            environment
                .config_directory
                .join("Claude")
                .join("claude_desktop_config.json"),
        ),
        ("cursor", ToolScope::Workspace) => Some(
            environment
                .workspace_directory
                .join(".cursor")
                .join("mcp.json"),
        ),
        ("cursor", ToolScope::Global) => {
            Some(environment.home_directory.join(".cursor").join("mcp.json"))
        }
        ("vscode", ToolScope::Workspace) => Some(
            environment
                .workspace_directory
                .join(".vscode")
                .join("mcp.json"),
        ),
        ("windsurf", ToolScope::Global) => Some(windsurf_config_path(environment)),
        _ => None,
    }
}

pub fn default_scope(tool_id: &str) -> Option<ToolScope> {
    match tool_id {
        "claude-code" | "cursor" | "vscode" => Some(ToolScope::Workspace),
        "claude-desktop" | "windsurf" => Some(ToolScope::Global),
        _ => None,
    }
}

pub struct ToolDetector<'a> {
    environment: &'a RegisterEngineEnvironment,
}

impl<'a> ToolDetector<'a> {
    pub fn new(environment: &'a RegisterEngineEnvironment) -> Self {
        Self { environment }
    }

    /// Enumerates every tool with at least one successful detection
    /// strategy, in a fixed order so repeated runs are deterministic.
    /// `entry_name` is the engine-owned key to probe for in each config.
    pub fn detect(&self, entry_name: Option<&str>) -> Vec<DetectedTool> {
        let mut tools = Vec::new();
        for tool_id in KNOWN_TOOL_IDS {
            let Some(confidence) = self.confidence_for(tool_id) else {
                debug!(tool_id, "no detection strategy succeeded");
                continue;
            };
            let Some(scope) = default_scope(tool_id) else {
                continue;
            };
            let Some(config_path) = config_path_for(self.environment, tool_id, scope) else {
                continue;
            };
            let config_exists = config_path.is_file();
            let entry_exists = entry_name
                .map(|entry| entry_present(&config_path, adapters::root_key(tool_id), entry))
                .unwrap_or(false);
            debug!(
                tool_id,
                confidence = confidence.as_str(),
                config_path = %config_path.display(),
                config_exists,
                "detected tool"
            );
            tools.push(DetectedTool {
                id: tool_id.to_string(),
                config_path,
                config_exists,
                entry_exists,
                scope,
                // Every known tool launches servers over stdio by default;
                // http is chosen by override or a stdio-less manifest.
                default_transport: Transport::Stdio,
                detection_confidence: confidence,
            });
        }
        tools
    }

    /// Strategies in descending confidence order; the first success wins.
    fn confidence_for(&self, tool_id: &str) -> Option<DetectionConfidence> {
        let env = self.environment;
        match tool_id {
            "claude-code" => {
                if env.binary_on_path("claude") {
                    Some(DetectionConfidence::High)
                } else if env.home_directory.join(".claude").is_dir() {
                    Some(DetectionConfidence::Medium)
                } else if env.workspace_directory.join(".mcp.json").is_file() {
                    Some(DetectionConfidence::Low)
                } else {
                    None
                }
            }
            "claude-desktop" => {
                // The desktop app ships no CLI binary; its install footprint
                // is the strongest signal available.
                if env.config_directory.join("Claude").is_dir() {
                    Some(DetectionConfidence::Medium)
                } else {
                    None
                }
            }
            "cursor" => {
                if env.binary_on_path("cursor") {
                    Some(DetectionConfidence::High)
                } else if env.home_directory.join(".cursor").is_dir() {
                    Some(DetectionConfidence::Medium)
                } else if env.workspace_directory.join(".cursor").is_dir() {
                    Some(DetectionConfidence::Low)
                } else {
                    None
                }
            }
            "vscode" => {
                if env.binary_on_path("code") {
                    Some(DetectionConfidence::High)
                } else if env.home_directory.join(".vscode").is_dir() {
                    Some(DetectionConfidence::Medium)
                } else if env.workspace_directory.join(".vscode").is_dir() {
                    Some(DetectionConfidence::Low)
                } else {
                    None
                }
            }
            "windsurf" => {
                if env.binary_on_path("windsurf") {
                    Some(DetectionConfidence::High)
                } else if env
                    .home_directory
                    .join(".codeium")
                    .join("windsurf")
                    .is_dir()
                {
                    Some(DetectionConfidence::Medium)
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

/// Windsurf moved its config from `~/.codeium/mcp_config.json` to
/// `~/.codeium/windsurf/mcp_config.json`. The newer path wins unless the
/// legacy file already holds entries and the newer file does not exist.
fn windsurf_config_path(environment: &RegisterEngineEnvironment) -> PathBuf {
    let codeium = environment.home_directory.join(".codeium");
    let preferred = codeium.join("windsurf").join("mcp_config.json");
    let legacy = codeium.join("mcp_config.json");

    if preferred.is_file() {
        return preferred;
    }
    if legacy.is_file() && file_has_entries(&legacy, "mcpServers") {
        return legacy;
    }
    preferred
}

fn file_has_entries(path: &Path, root_key: &str) -> bool {
    let Ok(text) = std::fs::read_to_string(path) else {
        return false;
    };
    let Ok(document) = ConfigDocument::parse(&text) else {
        return false;
    };
    document
        .get_path(&[root_key])
        .map(|node| match &node.value {
            crate::document::NodeValue::Object(members) => !members.is_empty(),
            _ => false,
        })
        .unwrap_or(false)
}

fn entry_present(path: &Path, root_key: &str, entry: &str) -> bool {
    let Ok(text) = std::fs::read_to_string(path) else {
        return false;
    };
    let Ok(document) = ConfigDocument::parse(&text) else {
        return false;
    };
    document.get_path(&[root_key, entry]).is_some()
}
