use crate::adapters::{entry_summary, AdapterRegistry, EnvValue, MergeOptions, ToolAdapter};
use crate::audit_store::{RegisterAuditStore, DEFAULT_AUDIT_LOG_LIMIT};
use crate::detect::{config_path_for, RegisterEngineEnvironment, ToolDetector};
use crate::diff::render_unified;
use crate::document::node_to_value;
use crate::error::RegisterEngineError;
use crate::guard::WriteGuard;
use crate::manifest::RegisterManifest;
use crate::models::{
    AuditEvent, AuditEventStatus, DetectedTool, DetectionConfidence, RegisterResult,
    SkippedTarget, StatusReport, ToolScope, ToolStatus, Transport, WriteAction, WriteResult,
};
use chrono::{SecondsFormat, Utc};
use std::collections::BTreeMap;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Restrict the run to these tool ids; unknown or undetected ids become
    /// skipped entries rather than errors.
    pub tools: Option<Vec<String>>,
    pub transport: Option<Transport>,
    pub scope: Option<ToolScope>,
    pub dry_run: bool,
    /// Allows writing to low-confidence tools.
    pub force: bool,
    pub env_overrides: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct RemoveOptions {
    pub tools: Option<Vec<String>>,
    pub dry_run: bool,
    pub force: bool,
}

/// Ties detection, the manifest, the per-tool adapters and the write guard
/// together. Each run is a sequential pass over the detected tools; one
/// tool's failure never aborts its siblings.
pub struct RegisterEngine {
    environment: RegisterEngineEnvironment,
    registry: AdapterRegistry,
    audit: RegisterAuditStore,
}

impl Default for RegisterEngine {
    fn default() -> Self {
        Self::current()
    }
}

impl RegisterEngine {
    pub fn current() -> Self {
        Self::new(
            RegisterEngineEnvironment::current(),
            RegisterAuditStore::default(),
        )
    }

    pub fn new(environment: RegisterEngineEnvironment, audit: RegisterAuditStore) -> Self {
        Self {
            environment,
            registry: AdapterRegistry::with_known_tools(),
            audit,
        }
    }

    pub fn environment(&self) -> &RegisterEngineEnvironment {
        &self.environment
    }

    pub fn detect(&self, entry_name: Option<&str>) -> Vec<DetectedTool> {
        ToolDetector::new(&self.environment).detect(entry_name)
    }

    pub fn status(&self, entry_name: &str) -> StatusReport {
        let mut tools = Vec::new();
        for tool in self.detect(Some(entry_name)) {
            let status = match self.read_entry(&tool, entry_name) {
                Ok(summary) => ToolStatus {
                    tool_id: tool.id.clone(),
                    config_path: tool.config_path.clone(),
                    config_exists: tool.config_exists,
                    entry_exists: tool.entry_exists,
                    detection_confidence: tool.detection_confidence,
                    entry_summary: summary,
                    error: None,
                },
                Err(error) => ToolStatus {
                    tool_id: tool.id.clone(),
                    config_path: tool.config_path.clone(),
                    config_exists: tool.config_exists,
                    entry_exists: false,
                    detection_confidence: tool.detection_confidence,
                    entry_summary: None,
                    error: Some(format!("{}: {error}", error.code())),
                },
            };
            tools.push(status);
        }
        StatusReport {
            generated_at: iso8601_now(),
            entry_name: entry_name.to_string(),
            tools,
        }
    }

    pub fn apply(
        &self,
        manifest: &RegisterManifest,
        options: &ApplyOptions,
    ) -> Result<RegisterResult, RegisterEngineError> {
        // Manifest and policy problems abort before any file is touched.
        manifest.validate()?;

        let mut result = RegisterResult::empty();
        result.generated_at = iso8601_now();

        let detected = self.detect(Some(&manifest.name));
        let targets = self.select_targets(
            detected,
            options.tools.as_deref(),
            Some(manifest),
            &mut result,
        );

        for tool in &targets {
            match self.apply_one(tool, manifest, options, &mut result.warnings) {
                Ok(write_result) => result.configured.push(write_result),
                Err(error) => {
                    warn!(tool_id = tool.id.as_str(), error = %error, "apply skipped tool");
                    result.skipped.push(skipped_from(&tool.id, &error));
                }
            }
        }

        if !options.dry_run {
            self.record_audit("apply", &result);
        }
        Ok(result)
    }

    pub fn remove(
        &self,
        entry_name: &str,
        options: &RemoveOptions,
    ) -> Result<RegisterResult, RegisterEngineError> {
        let mut result = RegisterResult::empty();
        result.generated_at = iso8601_now();

        let detected = self.detect(Some(entry_name));
        let targets =
            self.select_targets(detected, options.tools.as_deref(), None, &mut result);

        for tool in &targets {
            match self.remove_one(tool, entry_name, options) {
                Ok(write_result) => result.configured.push(write_result),
                Err(error) => {
                    warn!(tool_id = tool.id.as_str(), error = %error, "remove skipped tool");
                    result.skipped.push(skipped_from(&tool.id, &error));
                }
            }
        }

        if !options.dry_run {
            self.record_audit("remove", &result);
        }
        Ok(result)
    }

    pub fn audit_events(&self, limit: Option<usize>) -> Vec<AuditEvent> {
        self.audit.list_events(limit, None)
    }

    fn apply_one(
        &self,
        tool: &DetectedTool,
        manifest: &RegisterManifest,
        options: &ApplyOptions,
        warnings: &mut Vec<String>,
    ) -> Result<WriteResult, RegisterEngineError> {
        let adapter = self
            .registry
            .get(&tool.id)
            .ok_or_else(|| RegisterEngineError::UnknownTool(tool.id.clone()))?;

        // Confidence gates mutation, not just reporting.
        if tool.detection_confidence == DetectionConfidence::Low && !options.force {
            return Err(RegisterEngineError::LowConfidence(tool.id.clone()));
        }

        let scope = options.scope.unwrap_or(tool.scope);
        if !adapter.supported_scopes().contains(&scope) {
            return Err(RegisterEngineError::ScopeUnsupported {
                tool_id: tool.id.clone(),
                scope,
            });
        }
        let config_path = config_path_for(&self.environment, &tool.id, scope).ok_or_else(|| {
            RegisterEngineError::ScopeUnsupported {
                tool_id: tool.id.clone(),
                scope,
            }
        })?;

        let transport = resolve_transport(adapter, manifest, options.transport)?;
        let env = resolve_env(manifest, &options.env_overrides, warnings);

        debug!(tool_id = tool.id.as_str(), state = "READ", "apply step");
        let document = adapter.read(&config_path)?;
        debug!(tool_id = tool.id.as_str(), state = "MERGED", "apply step");
        let outcome = adapter.merge(document.as_ref(), manifest, &MergeOptions { transport, env })?;
        let original_text = document
            .as_ref()
            .map(|doc| doc.text().to_string())
            .unwrap_or_default();

        if !outcome.changed {
            return Ok(WriteResult {
                action: WriteAction::Skipped,
                tool_id: tool.id.clone(),
                config_path,
                warning: Some(String::from("entry already up to date")),
                diff: None,
            });
        }

        let action = if outcome.created_entry {
            WriteAction::Created
        } else {
            WriteAction::Updated
        };

        if options.dry_run {
            return Ok(WriteResult {
                action,
                tool_id: tool.id.clone(),
                config_path: config_path.clone(),
                warning: None,
                diff: Some(render_unified(
                    &original_text,
                    &outcome.new_text,
                    &config_path,
                )),
            });
        }

        debug!(tool_id = tool.id.as_str(), state = "WRITTEN", "apply step");
        adapter.write(&config_path, &outcome.new_text)?;
        debug!(tool_id = tool.id.as_str(), state = "DONE", "apply step");
        Ok(WriteResult {
            action,
            tool_id: tool.id.clone(),
            config_path,
            warning: None,
            diff: None,
        })
    }

    fn remove_one(
        &self,
        tool: &DetectedTool,
        entry_name: &str,
        options: &RemoveOptions,
    ) -> Result<WriteResult, RegisterEngineError> {
        let adapter = self
            .registry
            .get(&tool.id)
            .ok_or_else(|| RegisterEngineError::UnknownTool(tool.id.clone()))?;

        if tool.detection_confidence == DetectionConfidence::Low && !options.force {
            return Err(RegisterEngineError::LowConfidence(tool.id.clone()));
        }

        let config_path = tool.config_path.clone();
        let Some(document) = adapter.read(&config_path)? else {
            return Err(RegisterEngineError::EntryNotFound {
                tool_id: tool.id.clone(),
                entry: entry_name.to_string(),
            });
        };
        let Some(outcome) = adapter.remove(&document, entry_name)? else {
            return Err(RegisterEngineError::EntryNotFound {
                tool_id: tool.id.clone(),
                entry: entry_name.to_string(),
            });
        };

        if options.dry_run {
            return Ok(WriteResult {
                action: WriteAction::Removed,
                tool_id: tool.id.clone(),
                config_path: config_path.clone(),
                warning: None,
                diff: Some(render_unified(
                    document.text(),
                    &outcome.new_text,
                    &config_path,
                )),
            });
        }

        if outcome.document_empty {
            // Nothing left but the engine's own scaffolding; drop the file.
            debug!(tool_id = tool.id.as_str(), path = %config_path.display(), "removing empty config");
            WriteGuard::delete(&config_path)?;
        } else {
            adapter.write(&config_path, &outcome.new_text)?;
        }
        Ok(WriteResult {
            action: WriteAction::Removed,
            tool_id: tool.id.clone(),
            config_path,
            warning: None,
            diff: None,
        })
    }

    fn read_entry(
        &self,
        tool: &DetectedTool,
        entry_name: &str,
    ) -> Result<Option<String>, RegisterEngineError> {
        let Some(adapter) = self.registry.get(&tool.id) else {
            return Ok(None);
        };
        let Some(document) = adapter.read(&tool.config_path)? else {
            return Ok(None);
        };
        Ok(document
            .get_path(&[adapter.root_key(), entry_name])
            .map(node_to_value)
            .as_ref()
            .and_then(entry_summary))
    }

    /// Restricts the detected set to the requested tools (or the manifest's
    /// own filter), recording every unknown or undetected request.
    fn select_targets(
        &self,
        detected: Vec<DetectedTool>,
        requested: Option<&[String]>,
        manifest: Option<&RegisterManifest>,
        result: &mut RegisterResult,
    ) -> Vec<DetectedTool> {
        let Some(requested) = requested else {
            return detected
                .into_iter()
                .filter(|tool| {
                    manifest
                        .map(|manifest| manifest.targets_tool(&tool.id))
                        .unwrap_or(true)
                })
                .collect();
        };

        let mut targets = Vec::new();
        for tool_id in requested {
            if let Some(tool) = detected.iter().find(|tool| &tool.id == tool_id) {
                targets.push(tool.clone());
            } else if self.registry.get(tool_id).is_some() {
                result.skipped.push(SkippedTarget {
                    tool_id: tool_id.clone(),
                    code: String::from("TOOL_UNKNOWN"),
                    reason: String::from("tool is known but was not detected on this machine"),
                    suggestion: Some(String::from(
                        "Install the tool or run 'mcpregister detect' to check",
                    )),
                });
            } else {
                let error = RegisterEngineError::UnknownTool(tool_id.clone());
                result.skipped.push(skipped_from(tool_id, &error));
            }
        }
        targets
    }

    fn record_audit(&self, action: &str, result: &RegisterResult) {
        let status = if result.skipped.is_empty() {
            AuditEventStatus::Success
        } else if result.configured.is_empty() {
            AuditEventStatus::Failed
        } else {
            AuditEventStatus::Partial
        };
        let event = AuditEvent {
            id: Uuid::new_v4().to_string(),
            occurred_at: iso8601_now(),
            action: action.to_string(),
            status,
            summary: format!(
                "{} configured, {} skipped",
                result.configured.len(),
                result.skipped.len()
            ),
            paths: result
                .configured
                .iter()
                .map(|item| item.config_path.display().to_string())
                .collect(),
        };
        if let Err(error) = self.audit.append_event(event, DEFAULT_AUDIT_LOG_LIMIT) {
            warn!(error = %error, "failed to append audit event");
        }
    }
}

fn resolve_transport(
    adapter: &(dyn ToolAdapter + Send + Sync),
    manifest: &RegisterManifest,
    requested: Option<Transport>,
) -> Result<Transport, RegisterEngineError> {
    let transport = match requested {
        Some(transport) => transport,
        // Prefer stdio whenever the manifest carries it.
        None if manifest.stdio.is_some() => Transport::Stdio,
        None => Transport::Http,
    };

    if !adapter.supported_transports().contains(&transport) {
        return Err(RegisterEngineError::TransportUnavailable {
            tool_id: adapter.tool_id().to_string(),
            transport,
            reason: String::from("tool does not support this transport"),
        });
    }
    let block_present = match transport {
        Transport::Stdio => manifest.stdio.is_some(),
        Transport::Http => manifest.http.is_some(),
    };
    if !block_present {
        return Err(RegisterEngineError::TransportUnavailable {
            tool_id: adapter.tool_id().to_string(),
            transport,
            reason: format!("manifest has no {} block", transport.as_str()),
        });
    }
    Ok(transport)
}

fn resolve_env(
    manifest: &RegisterManifest,
    overrides: &BTreeMap<String, String>,
    warnings: &mut Vec<String>,
) -> BTreeMap<String, EnvValue> {
    let mut env = BTreeMap::new();
    for (name, definition) in &manifest.env {
        let value = if definition.secret {
            if overrides.contains_key(name) {
                warnings.push(format!(
                    "ignoring --env override for secret variable {name}; secrets are never written in plain text"
                ));
            }
            EnvValue::Secret {
                description: definition.description.clone(),
            }
        } else if let Some(value) = overrides.get(name) {
            EnvValue::Literal(value.clone())
        } else if let Some(default) = &definition.default {
            EnvValue::Literal(default.clone())
        } else {
            if definition.required {
                warnings.push(format!(
                    "required environment variable {name} has no value; wrote a ${{{name}}} reference"
                ));
            }
            EnvValue::Reference
        };
        env.insert(name.clone(), value);
    }
    env
}

fn skipped_from(tool_id: &str, error: &RegisterEngineError) -> SkippedTarget {
    SkippedTarget {
        tool_id: tool_id.to_string(),
        code: error.code().to_string(),
        reason: error.to_string(),
        suggestion: error.suggestion(),
    }
}

fn iso8601_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
