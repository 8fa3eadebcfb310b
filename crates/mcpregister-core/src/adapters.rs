use crate::document::{node_to_value, ConfigDocument, DocumentError};
use crate::error::RegisterEngineError;
use crate::guard::WriteGuard;
use crate::manifest::RegisterManifest;
use crate::models::{ToolScope, Transport};
use serde_json::{json, Map as JsonMap, Value as JsonValue};
use std::collections::BTreeMap;
use std::path::Path;

/// How one environment variable reaches a tool's document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvValue {
    /// Concrete value resolved from an override or a manifest default.
    Literal(String),
    /// No value available; rendered as a reference the tool expands itself.
    Reference,
    /// Secret variable; the representation is tool-specific.
    Secret { description: String },
}

#[derive(Debug, Clone)]
pub struct MergeOptions {
    pub transport: Transport,
    pub env: BTreeMap<String, EnvValue>,
}

/// Result of a pure merge: the full post-merge text plus what changed.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub new_text: String,
    /// False when the document already held an equal entry; the text is
    /// byte-identical to the original in that case.
    pub changed: bool,
    pub created_entry: bool,
}

#[derive(Debug, Clone)]
pub struct RemoveOutcome {
    pub new_text: String,
    /// The document holds no entries anymore; the caller may delete it.
    pub document_empty: bool,
}

/// Everything tool-specific lives behind this trait; the orchestrator never
/// branches on tool identity.
pub trait ToolAdapter {
    fn tool_id(&self) -> &'static str;
    fn root_key(&self) -> &'static str;
    fn supported_scopes(&self) -> &'static [ToolScope];
    fn supported_transports(&self) -> &'static [Transport];

    fn read(&self, path: &Path) -> Result<Option<ConfigDocument>, RegisterEngineError> {
        read_document(path)
    }

    /// Pure and total over any valid document: returns a document whose only
    /// changed key path is this manifest's entry (for VS Code that includes
    /// the entry's secret-input side pairs).
    fn merge(
        &self,
        document: Option<&ConfigDocument>,
        manifest: &RegisterManifest,
        options: &MergeOptions,
    ) -> Result<MergeOutcome, RegisterEngineError>;

    /// `None` when the document has no entry of that name.
    fn remove(
        &self,
        document: &ConfigDocument,
        entry_name: &str,
    ) -> Result<Option<RemoveOutcome>, RegisterEngineError>;

    /// Every write goes through the backup-and-validate guard.
    fn write(&self, path: &Path, text: &str) -> Result<(), RegisterEngineError> {
        WriteGuard::write(path, text)
    }
}

/// String-keyed so new tools can be registered without touching the
/// orchestrator.
pub struct AdapterRegistry {
    adapters: BTreeMap<String, Box<dyn ToolAdapter + Send + Sync>>,
}

impl AdapterRegistry {
    pub fn with_known_tools() -> Self {
        let mut registry = Self {
            adapters: BTreeMap::new(),
        };
        registry.register(Box::new(ClaudeCodeAdapter));
        registry.register(Box::new(ClaudeDesktopAdapter));
        registry.register(Box::new(CursorAdapter));
        registry.register(Box::new(VsCodeAdapter));
        registry.register(Box::new(WindsurfAdapter));
        registry
    }

    pub fn register(&mut self, adapter: Box<dyn ToolAdapter + Send + Sync>) {
        self.adapters.insert(adapter.tool_id().to_string(), adapter);
    }

    pub fn get(&self, tool_id: &str) -> Option<&(dyn ToolAdapter + Send + Sync)> {
        self.adapters.get(tool_id).map(|adapter| &**adapter)
    }

    pub fn tool_ids(&self) -> Vec<&str> {
        self.adapters.keys().map(String::as_str).collect()
    }
}

/// Root key for a known tool; used by detection before an adapter is in
/// hand.
pub fn root_key(tool_id: &str) -> &'static str {
    match tool_id {
        "vscode" => "servers",
        _ => "mcpServers",
    }
}

pub fn read_document(path: &Path) -> Result<Option<ConfigDocument>, RegisterEngineError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(RegisterEngineError::io(path, error)),
    };
    if text.trim().is_empty() {
        return Ok(None);
    }
    ConfigDocument::parse(&text)
        .map(Some)
        .map_err(|error| RegisterEngineError::ConfigParse {
            path: path.to_path_buf(),
            detail: error.to_string(),
        })
}

/// Short human summary of an entry value, for the status operation.
pub fn entry_summary(value: &JsonValue) -> Option<String> {
    if let Some(command) = value.get("command").and_then(JsonValue::as_str) {
        let args: Vec<&str> = value
            .get("args")
            .and_then(JsonValue::as_array)
            .map(|args| args.iter().filter_map(JsonValue::as_str).collect())
            .unwrap_or_default();
        if args.is_empty() {
            return Some(command.to_string());
        }
        return Some(format!("{command} {}", args.join(" ")));
    }
    value
        .get("url")
        .or_else(|| value.get("serverUrl"))
        .and_then(JsonValue::as_str)
        .map(ToString::to_string)
}

// How an adapter writes the entry object itself.
struct EntryShape {
    type_field: bool,
    http_url_key: &'static str,
    include_cwd: bool,
}

fn merge_conflict(tool_id: &str, error: DocumentError) -> RegisterEngineError {
    RegisterEngineError::MergeConflict {
        tool_id: tool_id.to_string(),
        detail: error.to_string(),
    }
}

fn env_object<F>(env: &BTreeMap<String, EnvValue>, mut secret_value: F) -> Option<JsonValue>
where
    F: FnMut(&str) -> String,
{
    if env.is_empty() {
        return None;
    }
    let mut object = JsonMap::new();
    for (name, value) in env {
        let rendered = match value {
            EnvValue::Literal(literal) => literal.clone(),
            EnvValue::Reference => format!("${{{name}}}"),
            EnvValue::Secret { .. } => secret_value(name),
        };
        object.insert(name.clone(), JsonValue::String(rendered));
    }
    Some(JsonValue::Object(object))
}

fn build_entry<F>(
    tool_id: &str,
    shape: &EntryShape,
    manifest: &RegisterManifest,
    options: &MergeOptions,
    secret_value: F,
) -> Result<JsonValue, RegisterEngineError>
where
    F: FnMut(&str) -> String,
{
    match options.transport {
        Transport::Stdio => {
            let Some(stdio) = &manifest.stdio else {
                return Err(RegisterEngineError::TransportUnavailable {
                    tool_id: tool_id.to_string(),
                    transport: Transport::Stdio,
                    reason: String::from("manifest has no stdio block"),
                });
            };
            let mut entry = JsonMap::new();
            if shape.type_field {
                entry.insert(String::from("type"), json!("stdio"));
            }
            entry.insert(String::from("command"), json!(stdio.command));
            entry.insert(String::from("args"), json!(stdio.args));
            if shape.include_cwd {
                if let Some(cwd) = &stdio.cwd {
                    entry.insert(String::from("cwd"), json!(cwd));
                }
            }
            if let Some(env) = env_object(&options.env, secret_value) {
                entry.insert(String::from("env"), env);
            }
            Ok(JsonValue::Object(entry))
        }
        Transport::Http => {
            let Some(http) = &manifest.http else {
                return Err(RegisterEngineError::TransportUnavailable {
                    tool_id: tool_id.to_string(),
                    transport: Transport::Http,
                    reason: String::from("manifest has no http block"),
                });
            };
            let mut entry = JsonMap::new();
            if shape.type_field {
                entry.insert(String::from("type"), json!("http"));
            }
            entry.insert(shape.http_url_key.to_string(), json!(http.url));
            Ok(JsonValue::Object(entry))
        }
    }
}

/// Shared merge path for tools whose entry is the only thing written.
fn merge_single_entry(
    tool_id: &str,
    root_key: &str,
    document: Option<&ConfigDocument>,
    entry_name: &str,
    entry: &JsonValue,
) -> Result<MergeOutcome, RegisterEngineError> {
    let Some(document) = document else {
        let mut servers = JsonMap::new();
        servers.insert(entry_name.to_string(), entry.clone());
        let mut fresh = JsonMap::new();
        fresh.insert(root_key.to_string(), JsonValue::Object(servers));
        return Ok(MergeOutcome {
            new_text: ConfigDocument::render_new(&JsonValue::Object(fresh)),
            changed: true,
            created_entry: true,
        });
    };

    let created_entry = document.get_path(&[root_key, entry_name]).is_none();
    let edits = document
        .set_path(&[root_key, entry_name], entry)
        .map_err(|error| merge_conflict(tool_id, error))?;
    let changed = !edits.is_empty();
    let new_text = if changed {
        ConfigDocument::apply_edits(document.text(), &edits)
    } else {
        document.text().to_string()
    };
    Ok(MergeOutcome {
        new_text,
        changed,
        created_entry,
    })
}

fn remove_single_entry(
    tool_id: &str,
    root_key: &str,
    document: &ConfigDocument,
    entry_name: &str,
) -> Result<Option<RemoveOutcome>, RegisterEngineError> {
    if document.get_path(&[root_key, entry_name]).is_none() {
        return Ok(None);
    }
    let edits = document
        .remove_path(&[root_key, entry_name])
        .map_err(|error| merge_conflict(tool_id, error))?;
    let new_text = ConfigDocument::apply_edits(document.text(), &edits);
    let document_empty = ConfigDocument::parse(&new_text)
        .map(|reparsed| reparsed.is_semantically_empty())
        .unwrap_or(false);
    Ok(Some(RemoveOutcome {
        new_text,
        document_empty,
    }))
}

const STDIO_HTTP: &[Transport] = &[Transport::Stdio, Transport::Http];
const STDIO_ONLY: &[Transport] = &[Transport::Stdio];
const WORKSPACE_ONLY: &[ToolScope] = &[ToolScope::Workspace];
const GLOBAL_ONLY: &[ToolScope] = &[ToolScope::Global];
const WORKSPACE_OR_GLOBAL: &[ToolScope] = &[ToolScope::Workspace, ToolScope::Global];

/// Claude Code: workspace `.mcp.json`, `mcpServers` root, `type` field,
/// plain env references for secrets.
pub struct ClaudeCodeAdapter;

impl ToolAdapter for ClaudeCodeAdapter {
    fn tool_id(&self) -> &'static str {
        "claude-code"
    }

    fn root_key(&self) -> &'static str {
        "mcpServers"
    }

    fn supported_scopes(&self) -> &'static [ToolScope] {
        WORKSPACE_ONLY
    }

    fn supported_transports(&self) -> &'static [Transport] {
        STDIO_HTTP
    }

    fn merge(
        &self,
        document: Option<&ConfigDocument>,
        manifest: &RegisterManifest,
        options: &MergeOptions,
    ) -> Result<MergeOutcome, RegisterEngineError> {
        let shape = EntryShape {
            type_field: true,
            http_url_key: "url",
            include_cwd: true,
        };
        let entry = build_entry(self.tool_id(), &shape, manifest, options, |name| {
            format!("${{{name}}}")
        })?;
        merge_single_entry(
            self.tool_id(),
            self.root_key(),
            document,
            &manifest.name,
            &entry,
        )
    }

    fn remove(
        &self,
        document: &ConfigDocument,
        entry_name: &str,
    ) -> Result<Option<RemoveOutcome>, RegisterEngineError> {
        remove_single_entry(self.tool_id(), self.root_key(), document, entry_name)
    }
}

/// Claude Desktop: global config, `mcpServers` root, no `type` field,
/// stdio transport only.
pub struct ClaudeDesktopAdapter;

impl ToolAdapter for ClaudeDesktopAdapter {
    fn tool_id(&self) -> &'static str {
        "claude-desktop"
    }

    fn root_key(&self) -> &'static str {
        "mcpServers"
    }

    fn supported_scopes(&self) -> &'static [ToolScope] {
        GLOBAL_ONLY
    }

    fn supported_transports(&self) -> &'static [Transport] {
        STDIO_ONLY
    }

    fn merge(
        &self,
        document: Option<&ConfigDocument>,
        manifest: &RegisterManifest,
        options: &MergeOptions,
    ) -> Result<MergeOutcome, RegisterEngineError> {
        let shape = EntryShape {
            type_field: false,
            http_url_key: "url",
            include_cwd: false,
        };
        let entry = build_entry(self.tool_id(), &shape, manifest, options, |name| {
            format!("${{{name}}}")
        })?;
        merge_single_entry(
            self.tool_id(),
            self.root_key(),
            document,
            &manifest.name,
            &entry,
        )
    }

    fn remove(
        &self,
        document: &ConfigDocument,
        entry_name: &str,
    ) -> Result<Option<RemoveOutcome>, RegisterEngineError> {
        remove_single_entry(self.tool_id(), self.root_key(), document, entry_name)
    }
}

/// Cursor: `mcp.json` at either scope, `mcpServers` root, no `type` field.
pub struct CursorAdapter;

impl ToolAdapter for CursorAdapter {
    fn tool_id(&self) -> &'static str {
        "cursor"
    }

    fn root_key(&self) -> &'static str {
        "mcpServers"
    }

    fn supported_scopes(&self) -> &'static [ToolScope] {
        WORKSPACE_OR_GLOBAL
    }

    fn supported_transports(&self) -> &'static [Transport] {
        STDIO_HTTP
    }

    fn merge(
        &self,
        document: Option<&ConfigDocument>,
        manifest: &RegisterManifest,
        options: &MergeOptions,
    ) -> Result<MergeOutcome, RegisterEngineError> {
        let shape = EntryShape {
            type_field: false,
            http_url_key: "url",
            include_cwd: false,
        };
        let entry = build_entry(self.tool_id(), &shape, manifest, options, |name| {
            format!("${{{name}}}")
        })?;
        merge_single_entry(
            self.tool_id(),
            self.root_key(),
            document,
            &manifest.name,
            &entry,
        )
    }

    fn remove(
        &self,
        document: &ConfigDocument,
        entry_name: &str,
    ) -> Result<Option<RemoveOutcome>, RegisterEngineError> {
        remove_single_entry(self.tool_id(), self.root_key(), document, entry_name)
    }
}

/// VS Code: workspace `.vscode/mcp.json`, `servers` root, `type` required,
/// secrets become `${input:<id>}` plus a `promptString` element in the
/// top-level `inputs` array.
pub struct VsCodeAdapter;

impl VsCodeAdapter {
    fn input_id(entry_name: &str, var_name: &str) -> String {
        format!(
            "{entry_name}-{}",
            var_name.to_ascii_lowercase().replace('_', "-")
        )
    }

    fn secret_inputs(manifest: &RegisterManifest, options: &MergeOptions) -> Vec<JsonValue> {
        options
            .env
            .iter()
            .filter_map(|(name, value)| match value {
                EnvValue::Secret { description } => Some(json!({
                    "type": "promptString",
                    "id": Self::input_id(&manifest.name, name),
                    "description": description,
                    "password": true
                })),
                _ => None,
            })
            .collect()
    }
}

impl ToolAdapter for VsCodeAdapter {
    fn tool_id(&self) -> &'static str {
        "vscode"
    }

    fn root_key(&self) -> &'static str {
        "servers"
    }

    fn supported_scopes(&self) -> &'static [ToolScope] {
        WORKSPACE_ONLY
    }

    fn supported_transports(&self) -> &'static [Transport] {
        STDIO_HTTP
    }

    fn merge(
        &self,
        document: Option<&ConfigDocument>,
        manifest: &RegisterManifest,
        options: &MergeOptions,
    ) -> Result<MergeOutcome, RegisterEngineError> {
        let shape = EntryShape {
            type_field: true,
            http_url_key: "url",
            include_cwd: false,
        };
        let entry = build_entry(self.tool_id(), &shape, manifest, options, |name| {
            format!("${{input:{}}}", Self::input_id(&manifest.name, name))
        })?;
        let inputs = Self::secret_inputs(manifest, options);

        let Some(document) = document else {
            let mut fresh = JsonMap::new();
            if !inputs.is_empty() {
                fresh.insert(String::from("inputs"), JsonValue::Array(inputs));
            }
            let mut servers = JsonMap::new();
            servers.insert(manifest.name.clone(), entry);
            fresh.insert(self.root_key().to_string(), JsonValue::Object(servers));
            return Ok(MergeOutcome {
                new_text: ConfigDocument::render_new(&JsonValue::Object(fresh)),
                changed: true,
                created_entry: true,
            });
        };

        let outcome = merge_single_entry(
            self.tool_id(),
            self.root_key(),
            Some(document),
            &manifest.name,
            &entry,
        )?;
        if inputs.is_empty() {
            return Ok(outcome);
        }

        // The prompt-input pairs belong to the entry; merge them into the
        // shared `inputs` array without disturbing foreign elements.
        let merged = ConfigDocument::parse(&outcome.new_text)
            .map_err(|error| merge_conflict(self.tool_id(), error))?;
        let existing_ids: Vec<String> = merged
            .get_path(&["inputs"])
            .map(|node| {
                let value = node_to_value(node);
                value
                    .as_array()
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(|item| item.get("id").and_then(JsonValue::as_str))
                            .map(ToString::to_string)
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .unwrap_or_default();
        let missing: Vec<JsonValue> = inputs
            .into_iter()
            .filter(|input| {
                input
                    .get("id")
                    .and_then(JsonValue::as_str)
                    .map(|id| !existing_ids.iter().any(|existing| existing == id))
                    .unwrap_or(true)
            })
            .collect();
        if missing.is_empty() {
            return Ok(outcome);
        }

        let edits = if merged.get_path(&["inputs"]).is_some() {
            merged
                .append_array_items(&["inputs"], &missing)
                .map_err(|error| merge_conflict(self.tool_id(), error))?
        } else {
            merged
                .set_path(&["inputs"], &JsonValue::Array(missing))
                .map_err(|error| merge_conflict(self.tool_id(), error))?
        };
        Ok(MergeOutcome {
            new_text: ConfigDocument::apply_edits(merged.text(), &edits),
            changed: true,
            created_entry: outcome.created_entry,
        })
    }

    fn remove(
        &self,
        document: &ConfigDocument,
        entry_name: &str,
    ) -> Result<Option<RemoveOutcome>, RegisterEngineError> {
        let Some(outcome) =
            remove_single_entry(self.tool_id(), self.root_key(), document, entry_name)?
        else {
            return Ok(None);
        };

        // Prune the prompt-input pairs this entry contributed.
        let prefix = format!("{entry_name}-");
        let pruned = ConfigDocument::parse(&outcome.new_text)
            .map_err(|error| merge_conflict(self.tool_id(), error))?;
        let edits = pruned
            .remove_array_items(&["inputs"], |item| {
                item.get("id")
                    .and_then(JsonValue::as_str)
                    .map(|id| id.starts_with(&prefix))
                    .unwrap_or(false)
            })
            .map_err(|error| merge_conflict(self.tool_id(), error))?;
        if edits.is_empty() {
            return Ok(Some(outcome));
        }

        let new_text = ConfigDocument::apply_edits(pruned.text(), &edits);
        let document_empty = ConfigDocument::parse(&new_text)
            .map(|reparsed| reparsed.is_semantically_empty())
            .unwrap_or(false);
        Ok(Some(RemoveOutcome {
            new_text,
            document_empty,
        }))
    }
}

/// Windsurf: global `mcp_config.json`, `mcpServers` root, http entries use
/// `serverUrl` instead of `url`.
pub struct WindsurfAdapter;

impl ToolAdapter for WindsurfAdapter {
    fn tool_id(&self) -> &'static str {
        "windsurf"
    }

    fn root_key(&self) -> &'static str {
        "mcpServers"
    }

    fn supported_scopes(&self) -> &'static [ToolScope] {
        GLOBAL_ONLY
    }

    fn supported_transports(&self) -> &'static [Transport] {
        STDIO_HTTP
    }

    fn merge(
        &self,
        document: Option<&ConfigDocument>,
        manifest: &RegisterManifest,
        options: &MergeOptions,
    ) -> Result<MergeOutcome, RegisterEngineError> {
        let shape = EntryShape {
            type_field: false,
            http_url_key: "serverUrl",
            include_cwd: false,
        };
        let entry = build_entry(self.tool_id(), &shape, manifest, options, |name| {
            format!("${{{name}}}")
        })?;
        merge_single_entry(
            self.tool_id(),
            self.root_key(),
            document,
            &manifest.name,
            &entry,
        )
    }

    fn remove(
        &self,
        document: &ConfigDocument,
        entry_name: &str,
    ) -> Result<Option<RemoveOutcome>, RegisterEngineError> {
        remove_single_entry(self.tool_id(), self.root_key(), document, entry_name)
    }
}
