use crate::document::{node_to_value, ConfigDocument};
use crate::error::{ManifestViolation, RegisterEngineError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const MANIFEST_FILE_NAME: &str = "mcpregister.json";
pub const SUPPORTED_MANIFEST_VERSION: u32 = 1;

/// Declarative description of the command server to register. Loaded once
/// per run and immutable afterwards; the file may carry comments and
/// trailing commas since it is read through the document codec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterManifest {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdio: Option<ManifestStdio>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<ManifestHttp>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, ManifestEnvVar>,
    #[serde(
        default,
        rename = "target_tools",
        skip_serializing_if = "Option::is_none"
    )]
    pub target_tools: Option<TargetToolsFilter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestStdio {
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestHttp {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEnvVar {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub secret: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetToolsFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Vec<String>>,
}

impl RegisterManifest {
    pub fn load(path: &Path) -> Result<Self, RegisterEngineError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(RegisterEngineError::ManifestNotFound(path.to_path_buf()));
            }
            Err(error) => return Err(RegisterEngineError::io(path, error)),
        };
        Self::load_from_str(&text)
    }

    pub fn load_from_str(text: &str) -> Result<Self, RegisterEngineError> {
        let document = ConfigDocument::parse(text).map_err(|error| {
            RegisterEngineError::ManifestInvalid(vec![ManifestViolation {
                field: String::from("(document)"),
                message: error.to_string(),
            }])
        })?;
        let manifest: Self =
            serde_json::from_value(node_to_value(document.root())).map_err(|error| {
                RegisterEngineError::ManifestInvalid(vec![ManifestViolation {
                    field: String::from("(document)"),
                    message: error.to_string(),
                }])
            })?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Collects every schema violation in one pass so a broken manifest can
    /// be repaired in a single edit cycle.
    pub fn validate(&self) -> Result<(), RegisterEngineError> {
        let mut violations = Vec::new();

        if self.version != SUPPORTED_MANIFEST_VERSION {
            violations.push(ManifestViolation {
                field: String::from("version"),
                message: format!(
                    "unsupported version {} (expected {SUPPORTED_MANIFEST_VERSION})",
                    self.version
                ),
            });
        }

        if self.name.trim().is_empty() {
            violations.push(ManifestViolation {
                field: String::from("name"),
                message: String::from("must not be empty"),
            });
        }

        if self.stdio.is_none() && self.http.is_none() {
            violations.push(ManifestViolation {
                field: String::from("stdio"),
                message: String::from("at least one of stdio/http is required"),
            });
        }

        if let Some(stdio) = &self.stdio {
            if stdio.command.trim().is_empty() {
                violations.push(ManifestViolation {
                    field: String::from("stdio.command"),
                    message: String::from("must not be empty"),
                });
            }
        }

        if let Some(http) = &self.http {
            if !http.url.starts_with("http://") && !http.url.starts_with("https://") {
                violations.push(ManifestViolation {
                    field: String::from("http.url"),
                    message: String::from("must be an http(s) URL"),
                });
            }
        }

        for name in self.env.keys() {
            if !is_env_var_name(name) {
                violations.push(ManifestViolation {
                    field: format!("env.{name}"),
                    message: String::from(
                        "variable names must match [A-Z_][A-Z0-9_]*",
                    ),
                });
            }
        }

        if let Some(filter) = &self.target_tools {
            if filter.include.is_some() && filter.exclude.is_some() {
                violations.push(ManifestViolation {
                    field: String::from("target_tools.include"),
                    message: String::from("mutually exclusive with target_tools.exclude"),
                });
                violations.push(ManifestViolation {
                    field: String::from("target_tools.exclude"),
                    message: String::from("mutually exclusive with target_tools.include"),
                });
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(RegisterEngineError::ManifestInvalid(violations))
        }
    }

    /// Applies the manifest's own target-tool filter.
    pub fn targets_tool(&self, tool_id: &str) -> bool {
        let Some(filter) = &self.target_tools else {
            return true;
        };
        if let Some(include) = &filter.include {
            return include.iter().any(|id| id == tool_id);
        }
        if let Some(exclude) = &filter.exclude {
            return !exclude.iter().any(|id| id == tool_id);
        }
        true
    }
}

fn is_env_var_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_uppercase() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}
