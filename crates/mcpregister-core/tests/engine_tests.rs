use mcpregister_core::{
    ApplyOptions, RegisterAuditStore, RegisterEngine, RegisterEngineEnvironment, RegisterManifest,
    RegisterPaths, RemoveOptions, ToolScope, WriteAction,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn engine_in_temp(temp: &TempDir) -> RegisterEngine {
    let home = temp.path().join("home");
    let config = temp.path().join("config");
    let workspace = temp.path().join("workspace");
    let runtime = temp.path().join("runtime");
    fs::create_dir_all(&home).expect("home");
    fs::create_dir_all(&config).expect("config");
    fs::create_dir_all(&workspace).expect("workspace");
    fs::create_dir_all(&runtime).expect("runtime");

    let environment = RegisterEngineEnvironment {
        home_directory: home,
        config_directory: config,
        workspace_directory: workspace,
        search_path: None,
    };
    let audit = RegisterAuditStore::new(RegisterPaths::from_runtime(runtime));
    RegisterEngine::new(environment, audit)
}

fn install_cursor(engine: &RegisterEngine) {
    fs::create_dir_all(engine.environment().home_directory.join(".cursor")).expect("cursor");
}

fn install_claude_code(engine: &RegisterEngine) {
    fs::create_dir_all(engine.environment().home_directory.join(".claude")).expect("claude");
}

fn install_claude_desktop(engine: &RegisterEngine) {
    fs::create_dir_all(engine.environment().config_directory.join("Claude")).expect("desktop");
}

fn install_vscode(engine: &RegisterEngine) {
    fs::create_dir_all(engine.environment().home_directory.join(".vscode")).expect("vscode");
}

fn cursor_config_path(engine: &RegisterEngine) -> std::path::PathBuf {
    engine
        .environment()
        .workspace_directory
        .join(".cursor")
        .join("mcp.json")
}

fn demo_manifest() -> RegisterManifest {
    RegisterManifest::load_from_str(
        r#"{
  "version": 1,
  "name": "demo",
  "stdio": { "command": "node", "args": ["x.js"] }
}
"#,
    )
    .expect("manifest")
}

fn file_count(dir: &Path) -> usize {
    if !dir.exists() {
        return 0;
    }
    walk(dir)
}

fn walk(dir: &Path) -> usize {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|entry| {
                    if entry.path().is_dir() {
                        walk(&entry.path())
                    } else {
                        1
                    }
                })
                .sum()
        })
        .unwrap_or(0)
}

#[test]
fn apply_to_empty_config_creates_exactly_one_entry() {
    let temp = TempDir::new().expect("tempdir");
    let engine = engine_in_temp(&temp);
    install_cursor(&engine);

    let result = engine
        .apply(&demo_manifest(), &ApplyOptions::default())
        .expect("apply");
    assert_eq!(result.configured.len(), 1);
    assert_eq!(result.configured[0].action, WriteAction::Created);
    assert!(result.skipped.is_empty());

    let written: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(cursor_config_path(&engine)).expect("config"),
    )
    .expect("json");
    let root = written.as_object().expect("root object");
    assert_eq!(root.len(), 1);
    let servers = root["mcpServers"].as_object().expect("servers");
    assert_eq!(servers.len(), 1);
    assert_eq!(servers["demo"]["command"], "node");
    assert_eq!(servers["demo"]["args"], serde_json::json!(["x.js"]));
}

#[test]
fn second_apply_is_byte_identical_and_reports_skipped() {
    let temp = TempDir::new().expect("tempdir");
    let engine = engine_in_temp(&temp);
    install_cursor(&engine);

    engine
        .apply(&demo_manifest(), &ApplyOptions::default())
        .expect("first apply");
    let first = fs::read_to_string(cursor_config_path(&engine)).expect("read");

    let result = engine
        .apply(&demo_manifest(), &ApplyOptions::default())
        .expect("second apply");
    let second = fs::read_to_string(cursor_config_path(&engine)).expect("read");

    assert_eq!(first, second);
    assert_eq!(result.configured.len(), 1);
    assert_eq!(result.configured[0].action, WriteAction::Skipped);
}

#[test]
fn apply_preserves_unrelated_entries_and_comments() {
    let temp = TempDir::new().expect("tempdir");
    let engine = engine_in_temp(&temp);
    install_cursor(&engine);

    let config_path = cursor_config_path(&engine);
    fs::create_dir_all(config_path.parent().expect("parent")).expect("dir");
    fs::write(
        &config_path,
        r#"{
  // added by hand, 2024-11-02
  "mcpServers": {
    "search": {
      "command": "deno",
      "args": ["run", "-A", "search.ts"] /* local build */
    }
  }
}
"#,
    )
    .expect("seed config");

    engine
        .apply(&demo_manifest(), &ApplyOptions::default())
        .expect("apply");

    let written = fs::read_to_string(&config_path).expect("read");
    assert!(written.contains("// added by hand, 2024-11-02"));
    assert!(written.contains("/* local build */"));

    let document =
        mcpregister_core::ConfigDocument::parse(&written).expect("still parseable");
    let root = mcpregister_core::document::node_to_value(document.root());
    assert_eq!(
        root["mcpServers"]["search"],
        serde_json::json!({ "command": "deno", "args": ["run", "-A", "search.ts"] })
    );
    assert_eq!(root["mcpServers"]["demo"]["command"], "node");
}

#[test]
fn apply_then_remove_restores_original_bytes() {
    let temp = TempDir::new().expect("tempdir");
    let engine = engine_in_temp(&temp);
    install_cursor(&engine);

    let config_path = cursor_config_path(&engine);
    fs::create_dir_all(config_path.parent().expect("parent")).expect("dir");
    let original = r#"{
  // keep this file tidy
  "mcpServers": {
    "other": {
      "command": "deno"
    }
  }
}
"#;
    fs::write(&config_path, original).expect("seed config");

    engine
        .apply(&demo_manifest(), &ApplyOptions::default())
        .expect("apply");
    let result = engine
        .remove("demo", &RemoveOptions::default())
        .expect("remove");
    assert_eq!(result.configured.len(), 1);
    assert_eq!(result.configured[0].action, WriteAction::Removed);

    assert_eq!(fs::read_to_string(&config_path).expect("read"), original);
}

#[test]
fn remove_last_entry_deletes_the_document() {
    let temp = TempDir::new().expect("tempdir");
    let engine = engine_in_temp(&temp);
    install_cursor(&engine);

    engine
        .apply(&demo_manifest(), &ApplyOptions::default())
        .expect("apply");
    assert!(cursor_config_path(&engine).is_file());

    engine
        .remove("demo", &RemoveOptions::default())
        .expect("remove");
    assert!(!cursor_config_path(&engine).exists());
}

#[test]
fn low_confidence_tool_requires_force() {
    let temp = TempDir::new().expect("tempdir");
    let engine = engine_in_temp(&temp);
    // Only a workspace marker: cursor is detected at low confidence.
    fs::create_dir_all(engine.environment().workspace_directory.join(".cursor"))
        .expect("marker");

    let result = engine
        .apply(&demo_manifest(), &ApplyOptions::default())
        .expect("apply");
    assert!(result.configured.is_empty());
    assert_eq!(result.skipped.len(), 1);
    assert_eq!(result.skipped[0].code, "LOW_CONFIDENCE");
    assert!(!cursor_config_path(&engine).exists());

    let forced = engine
        .apply(
            &demo_manifest(),
            &ApplyOptions {
                force: true,
                ..ApplyOptions::default()
            },
        )
        .expect("forced apply");
    assert_eq!(forced.configured.len(), 1);
    assert!(cursor_config_path(&engine).is_file());
}

#[test]
fn invalid_manifest_aborts_before_touching_files() {
    let temp = TempDir::new().expect("tempdir");
    let engine = engine_in_temp(&temp);
    install_cursor(&engine);

    let manifest = RegisterManifest {
        target_tools: Some(mcpregister_core::TargetToolsFilter {
            include: Some(vec![String::from("cursor")]),
            exclude: Some(vec![String::from("vscode")]),
        }),
        ..demo_manifest()
    };

    let error = engine
        .apply(&manifest, &ApplyOptions::default())
        .expect_err("must fail");
    assert_eq!(error.code(), "MANIFEST_INVALID");
    let message = error.to_string();
    assert!(message.contains("target_tools.include"));
    assert!(message.contains("target_tools.exclude"));

    assert_eq!(file_count(&engine.environment().workspace_directory), 0);
}

#[test]
fn remove_without_entry_reports_skipped_not_error() {
    let temp = TempDir::new().expect("tempdir");
    let engine = engine_in_temp(&temp);
    install_cursor(&engine);

    let result = engine
        .remove("demo", &RemoveOptions::default())
        .expect("remove");
    assert!(result.configured.is_empty());
    assert_eq!(result.skipped.len(), 1);
    assert_eq!(result.skipped[0].code, "ENTRY_NOT_FOUND");
    assert!(result.skipped[0].reason.contains("demo"));
}

#[test]
fn parse_error_in_one_tool_does_not_abort_the_others() {
    let temp = TempDir::new().expect("tempdir");
    let engine = engine_in_temp(&temp);
    install_cursor(&engine);
    install_claude_code(&engine);

    let config_path = cursor_config_path(&engine);
    fs::create_dir_all(config_path.parent().expect("parent")).expect("dir");
    let broken = "{ \"mcpServers\": { broken }";
    fs::write(&config_path, broken).expect("seed broken config");

    let result = engine
        .apply(&demo_manifest(), &ApplyOptions::default())
        .expect("apply");

    let skipped_cursor = result
        .skipped
        .iter()
        .find(|entry| entry.tool_id == "cursor")
        .expect("cursor skipped");
    assert_eq!(skipped_cursor.code, "CONFIG_PARSE_ERROR");
    // The broken file is never overwritten.
    assert_eq!(fs::read_to_string(&config_path).expect("read"), broken);

    let configured: Vec<&str> = result
        .configured
        .iter()
        .map(|entry| entry.tool_id.as_str())
        .collect();
    assert_eq!(configured, vec!["claude-code"]);
}

#[test]
fn scope_override_skips_tools_without_that_scope() {
    let temp = TempDir::new().expect("tempdir");
    let engine = engine_in_temp(&temp);
    install_cursor(&engine);
    install_vscode(&engine);

    let result = engine
        .apply(
            &demo_manifest(),
            &ApplyOptions {
                scope: Some(ToolScope::Global),
                ..ApplyOptions::default()
            },
        )
        .expect("apply");

    let skipped_vscode = result
        .skipped
        .iter()
        .find(|entry| entry.tool_id == "vscode")
        .expect("vscode skipped");
    assert_eq!(skipped_vscode.code, "SCOPE_UNSUPPORTED");

    let cursor = result
        .configured
        .iter()
        .find(|entry| entry.tool_id == "cursor")
        .expect("cursor configured");
    assert!(cursor
        .config_path
        .starts_with(engine.environment().home_directory.join(".cursor")));
}

#[test]
fn http_only_manifest_skips_stdio_only_tools() {
    let temp = TempDir::new().expect("tempdir");
    let engine = engine_in_temp(&temp);
    install_claude_desktop(&engine);
    install_cursor(&engine);

    let manifest = RegisterManifest::load_from_str(
        r#"{
  "version": 1,
  "name": "demo",
  "http": { "url": "https://example.com/mcp" }
}
"#,
    )
    .expect("manifest");

    let result = engine
        .apply(&manifest, &ApplyOptions::default())
        .expect("apply");

    let desktop = result
        .skipped
        .iter()
        .find(|entry| entry.tool_id == "claude-desktop")
        .expect("desktop skipped");
    assert_eq!(desktop.code, "TRANSPORT_UNAVAILABLE");

    let written: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(cursor_config_path(&engine)).expect("config"),
    )
    .expect("json");
    assert_eq!(written["mcpServers"]["demo"]["url"], "https://example.com/mcp");
}

#[test]
fn dry_run_renders_diffs_and_touches_nothing() {
    let temp = TempDir::new().expect("tempdir");
    let engine = engine_in_temp(&temp);
    install_cursor(&engine);

    let result = engine
        .apply(
            &demo_manifest(),
            &ApplyOptions {
                dry_run: true,
                ..ApplyOptions::default()
            },
        )
        .expect("dry run");

    assert_eq!(result.configured.len(), 1);
    let diff = result.configured[0].diff.as_deref().expect("diff");
    assert!(diff.contains("+"));
    assert!(diff.contains("demo"));
    assert_eq!(file_count(&engine.environment().workspace_directory), 0);
    // Dry runs are not audited.
    assert!(engine.audit_events(None).is_empty());
}

#[test]
fn manifest_target_filter_limits_tools() {
    let temp = TempDir::new().expect("tempdir");
    let engine = engine_in_temp(&temp);
    install_cursor(&engine);
    install_claude_code(&engine);

    let manifest = RegisterManifest {
        target_tools: Some(mcpregister_core::TargetToolsFilter {
            include: Some(vec![String::from("cursor")]),
            exclude: None,
        }),
        ..demo_manifest()
    };

    let result = engine
        .apply(&manifest, &ApplyOptions::default())
        .expect("apply");
    let configured: Vec<&str> = result
        .configured
        .iter()
        .map(|entry| entry.tool_id.as_str())
        .collect();
    assert_eq!(configured, vec!["cursor"]);
}

#[test]
fn explicit_unknown_tool_request_is_reported() {
    let temp = TempDir::new().expect("tempdir");
    let engine = engine_in_temp(&temp);
    install_cursor(&engine);

    let result = engine
        .apply(
            &demo_manifest(),
            &ApplyOptions {
                tools: Some(vec![String::from("cursor"), String::from("emacs")]),
                ..ApplyOptions::default()
            },
        )
        .expect("apply");

    assert_eq!(result.configured.len(), 1);
    let unknown = result
        .skipped
        .iter()
        .find(|entry| entry.tool_id == "emacs")
        .expect("unknown tool skipped");
    assert_eq!(unknown.code, "TOOL_UNKNOWN");
}

#[test]
fn env_values_resolve_from_overrides_then_defaults() {
    let temp = TempDir::new().expect("tempdir");
    let engine = engine_in_temp(&temp);
    install_cursor(&engine);

    let manifest = RegisterManifest::load_from_str(
        r#"{
  "version": 1,
  "name": "demo",
  "stdio": { "command": "node", "args": ["x.js"] },
  "env": {
    "REGION": { "description": "deploy region", "default": "eu" },
    "ENDPOINT": { "description": "service endpoint", "required": true }
  }
}
"#,
    )
    .expect("manifest");

    let mut env_overrides = BTreeMap::new();
    env_overrides.insert(String::from("REGION"), String::from("us"));

    let result = engine
        .apply(
            &manifest,
            &ApplyOptions {
                env_overrides,
                ..ApplyOptions::default()
            },
        )
        .expect("apply");

    assert!(result
        .warnings
        .iter()
        .any(|warning| warning.contains("ENDPOINT")));

    let written: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(cursor_config_path(&engine)).expect("config"),
    )
    .expect("json");
    let env = &written["mcpServers"]["demo"]["env"];
    assert_eq!(env["REGION"], "us");
    assert_eq!(env["ENDPOINT"], "${ENDPOINT}");
}

#[test]
fn vscode_secrets_become_prompt_inputs() {
    let temp = TempDir::new().expect("tempdir");
    let engine = engine_in_temp(&temp);
    install_vscode(&engine);

    let manifest = RegisterManifest::load_from_str(
        r#"{
  "version": 1,
  "name": "demo",
  "stdio": { "command": "node", "args": ["x.js"] },
  "env": {
    "API_TOKEN": { "description": "service token", "secret": true }
  }
}
"#,
    )
    .expect("manifest");

    engine
        .apply(&manifest, &ApplyOptions::default())
        .expect("apply");

    let config_path = engine
        .environment()
        .workspace_directory
        .join(".vscode")
        .join("mcp.json");
    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(config_path).expect("config")).expect("json");
    assert_eq!(
        written["servers"]["demo"]["env"]["API_TOKEN"],
        "${input:demo-api-token}"
    );
    assert_eq!(written["inputs"][0]["id"], "demo-api-token");
    assert_eq!(written["inputs"][0]["password"], true);
}

#[test]
fn status_reports_entries_across_tools() {
    let temp = TempDir::new().expect("tempdir");
    let engine = engine_in_temp(&temp);
    install_cursor(&engine);
    install_claude_code(&engine);

    engine
        .apply(
            &demo_manifest(),
            &ApplyOptions {
                tools: Some(vec![String::from("cursor")]),
                ..ApplyOptions::default()
            },
        )
        .expect("apply");

    let report = engine.status("demo");
    assert_eq!(report.entry_name, "demo");

    let cursor = report
        .tools
        .iter()
        .find(|tool| tool.tool_id == "cursor")
        .expect("cursor status");
    assert!(cursor.entry_exists);
    assert_eq!(cursor.entry_summary.as_deref(), Some("node x.js"));

    let claude = report
        .tools
        .iter()
        .find(|tool| tool.tool_id == "claude-code")
        .expect("claude status");
    assert!(!claude.entry_exists);
}

#[test]
fn mutating_runs_append_audit_events() {
    let temp = TempDir::new().expect("tempdir");
    let engine = engine_in_temp(&temp);
    install_cursor(&engine);

    engine
        .apply(&demo_manifest(), &ApplyOptions::default())
        .expect("apply");
    engine
        .remove("demo", &RemoveOptions::default())
        .expect("remove");

    let events = engine.audit_events(None);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].action, "remove");
    assert_eq!(events[1].action, "apply");
}
