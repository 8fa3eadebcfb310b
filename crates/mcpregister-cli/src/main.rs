use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use mcpregister_core::{
    ApplyOptions, RegisterEngine, RegisterManifest, RegisterResult, RemoveOptions, ToolScope,
    Transport, MANIFEST_FILE_NAME,
};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "mcpregister")]
#[command(about = "Register an MCP server with the developer tools on this machine")]
struct Cli {
    /// Path to the server manifest.
    #[arg(long, global = true, default_value = MANIFEST_FILE_NAME)]
    manifest: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the tools detected on this machine.
    Detect {
        #[arg(long)]
        json: bool,
    },
    /// Generate a manifest from the project's package metadata.
    Init {
        #[arg(long)]
        force: bool,
    },
    /// Write the manifest's entry into every detected tool config.
    Apply {
        #[arg(long = "tool")]
        tools: Vec<String>,
        #[arg(long)]
        transport: Option<String>,
        #[arg(long)]
        scope: Option<String>,
        #[arg(long = "dry-run")]
        dry_run: bool,
        #[arg(long)]
        force: bool,
        /// Skip the interactive diff confirmation.
        #[arg(long, short = 'y')]
        yes: bool,
        /// KEY=VALUE override for a manifest environment variable; repeatable.
        #[arg(long = "env")]
        env: Vec<String>,
        #[arg(long)]
        json: bool,
    },
    /// Remove the entry from every detected tool config.
    Remove {
        /// Entry name; defaults to the manifest's name.
        #[arg(long)]
        name: Option<String>,
        #[arg(long = "tool")]
        tools: Vec<String>,
        #[arg(long = "dry-run")]
        dry_run: bool,
        #[arg(long)]
        force: bool,
        #[arg(long)]
        json: bool,
    },
    /// Show the entry's presence across all detected tools without writing.
    Status {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Show recent apply/remove runs.
    Audit {
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let engine = RegisterEngine::current();

    match cli.command {
        Commands::Detect { json } => {
            let entry_name = RegisterManifest::load(&cli.manifest)
                .ok()
                .map(|manifest| manifest.name);
            let tools = engine.detect(entry_name.as_deref());
            if json {
                println!("{}", serde_json::to_string_pretty(&tools)?);
            } else if tools.is_empty() {
                println!("no tools detected");
            } else {
                for tool in tools {
                    println!(
                        "{}\t{}\t{}\t{}",
                        tool.id,
                        tool.detection_confidence.as_str(),
                        if tool.entry_exists {
                            "registered"
                        } else if tool.config_exists {
                            "config present"
                        } else {
                            "no config"
                        },
                        tool.config_path.display()
                    );
                }
            }
        }
        Commands::Init { force } => {
            init_manifest(&cli.manifest, force)?;
        }
        Commands::Apply {
            tools,
            transport,
            scope,
            dry_run,
            force,
            yes,
            env,
            json,
        } => {
            let manifest = RegisterManifest::load(&cli.manifest)?;
            let options = ApplyOptions {
                tools: if tools.is_empty() { None } else { Some(tools) },
                transport: transport
                    .as_deref()
                    .map(str::parse::<Transport>)
                    .transpose()
                    .map_err(anyhow::Error::msg)?,
                scope: scope
                    .as_deref()
                    .map(str::parse::<ToolScope>)
                    .transpose()
                    .map_err(anyhow::Error::msg)?,
                dry_run,
                force,
                env_overrides: parse_env_overrides(&env)?,
            };

            if !dry_run && !yes && !confirm_apply(&engine, &manifest, &options)? {
                println!("aborted");
                return Ok(());
            }

            let result = engine.apply(&manifest, &options)?;
            print_result(&result, json)?;
            exit_for(&result);
        }
        Commands::Remove {
            name,
            tools,
            dry_run,
            force,
            json,
        } => {
            let entry_name = resolve_entry_name(name, &cli.manifest)?;
            let options = RemoveOptions {
                tools: if tools.is_empty() { None } else { Some(tools) },
                dry_run,
                force,
            };
            let result = engine.remove(&entry_name, &options)?;
            print_result(&result, json)?;
            exit_for(&result);
        }
        Commands::Status { name, json } => {
            let entry_name = resolve_entry_name(name, &cli.manifest)?;
            let report = engine.status(&entry_name);
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if report.tools.is_empty() {
                println!("no tools detected");
            } else {
                for tool in &report.tools {
                    let state = match (&tool.error, tool.entry_exists) {
                        (Some(error), _) => error.clone(),
                        (None, true) => tool
                            .entry_summary
                            .clone()
                            .unwrap_or_else(|| String::from("registered")),
                        (None, false) => String::from("-"),
                    };
                    println!(
                        "{}\t{}\t{}",
                        tool.tool_id,
                        state,
                        tool.config_path.display()
                    );
                }
            }
        }
        Commands::Audit { limit, json } => {
            let events = engine.audit_events(limit);
            if json {
                println!("{}", serde_json::to_string_pretty(&events)?);
            } else {
                for event in events {
                    println!(
                        "{}\t{}\t{:?}\t{}",
                        event.occurred_at, event.action, event.status, event.summary
                    );
                }
            }
        }
    }

    Ok(())
}

/// Dry-runs the apply, shows the pending diffs and asks for a go-ahead.
fn confirm_apply(
    engine: &RegisterEngine,
    manifest: &RegisterManifest,
    options: &ApplyOptions,
) -> Result<bool> {
    let preview_options = ApplyOptions {
        dry_run: true,
        ..options.clone()
    };
    let preview = engine.apply(manifest, &preview_options)?;

    let mut pending = 0;
    for entry in &preview.configured {
        if let Some(diff) = &entry.diff {
            println!("{diff}");
            pending += 1;
        }
    }
    for entry in &preview.skipped {
        println!("skip {}: {}", entry.tool_id, entry.reason);
    }
    if pending == 0 {
        // Nothing would change; no confirmation needed.
        return Ok(true);
    }

    print!("Apply these changes? [y/N] ");
    std::io::stdout().flush().context("flush stdout")?;
    let mut answer = String::new();
    std::io::stdin()
        .read_line(&mut answer)
        .context("read confirmation")?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

fn resolve_entry_name(name: Option<String>, manifest_path: &Path) -> Result<String> {
    if let Some(name) = name {
        return Ok(name);
    }
    let manifest = RegisterManifest::load(manifest_path)
        .map_err(|error| anyhow!("{error}; pass --name to target an entry directly"))?;
    Ok(manifest.name)
}

fn parse_env_overrides(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    let mut overrides = BTreeMap::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("invalid --env value '{pair}' (expected KEY=VALUE)");
        };
        overrides.insert(key.to_string(), value.to_string());
    }
    Ok(overrides)
}

fn print_result(result: &RegisterResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    for entry in &result.configured {
        if let Some(diff) = &entry.diff {
            println!("{diff}");
        }
        match &entry.warning {
            Some(warning) => println!(
                "{}\t{}\t{} ({warning})",
                entry.action.as_str(),
                entry.tool_id,
                entry.config_path.display()
            ),
            None => println!(
                "{}\t{}\t{}",
                entry.action.as_str(),
                entry.tool_id,
                entry.config_path.display()
            ),
        }
    }
    for entry in &result.skipped {
        match &entry.suggestion {
            Some(suggestion) => {
                println!("skipped\t{}\t{} ({suggestion})", entry.tool_id, entry.reason);
            }
            None => println!("skipped\t{}\t{}", entry.tool_id, entry.reason),
        }
    }
    for warning in &result.warnings {
        println!("warning\t{warning}");
    }
    Ok(())
}

fn exit_for(result: &RegisterResult) {
    if result.configured.is_empty() && !result.skipped.is_empty() {
        std::process::exit(1);
    }
}

/// Pre-fills a manifest from whatever package metadata the workspace
/// carries. The generated file is a starting point, not a final answer.
fn init_manifest(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists; re-run with --force to overwrite",
            path.display()
        );
    }

    let cwd = std::env::current_dir().context("current directory")?;
    let (name, description, command, args) = inspect_project(&cwd);

    let name_json = serde_json::Value::String(name).to_string();
    let description_json = serde_json::Value::String(description).to_string();
    let command_json = serde_json::Value::String(command).to_string();
    let args_json = serde_json::to_string(&args)?;
    let content = format!(
        r#"{{
  // Generated by mcpregister init; review before applying.
  "version": 1,
  "name": {name_json},
  "description": {description_json},
  "stdio": {{
    "command": {command_json},
    "args": {args_json}
  }},
  // Declare required environment variables here, e.g.
  // "env": {{ "API_TOKEN": {{ "description": "…", "secret": true }} }}
}}
"#
    );

    // The generated file must satisfy the same schema it will be loaded with.
    RegisterManifest::load_from_str(&content)
        .map_err(|error| anyhow!("generated manifest is invalid: {error}"))?;

    std::fs::write(path, content)
        .with_context(|| format!("write {}", path.display()))?;
    println!("wrote {}", path.display());
    Ok(())
}

/// Best-effort inspection of package metadata: package.json, then
/// Cargo.toml, then pyproject.toml, falling back to the directory name.
fn inspect_project(cwd: &Path) -> (String, String, String, Vec<String>) {
    let dir_name = cwd
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| String::from("server"));

    if let Ok(text) = std::fs::read_to_string(cwd.join("package.json")) {
        if let Ok(package) = serde_json::from_str::<serde_json::Value>(&text) {
            let name = package
                .get("name")
                .and_then(serde_json::Value::as_str)
                .map(sanitize_name)
                .unwrap_or_else(|| dir_name.clone());
            let description = package
                .get("description")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string();
            let entry = package
                .get("main")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("index.js")
                .to_string();
            return (name, description, String::from("node"), vec![entry]);
        }
    }

    if let Ok(text) = std::fs::read_to_string(cwd.join("Cargo.toml")) {
        if let Ok(cargo) = text.parse::<toml::Table>() {
            if let Some(package) = cargo.get("package").and_then(toml::Value::as_table) {
                let name = package
                    .get("name")
                    .and_then(toml::Value::as_str)
                    .map(sanitize_name)
                    .unwrap_or_else(|| dir_name.clone());
                let description = package
                    .get("description")
                    .and_then(toml::Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                return (
                    name,
                    description,
                    String::from("cargo"),
                    vec![String::from("run"), String::from("--quiet")],
                );
            }
        }
    }

    if let Ok(text) = std::fs::read_to_string(cwd.join("pyproject.toml")) {
        if let Ok(pyproject) = text.parse::<toml::Table>() {
            if let Some(project) = pyproject.get("project").and_then(toml::Value::as_table) {
                let name = project
                    .get("name")
                    .and_then(toml::Value::as_str)
                    .map(sanitize_name)
                    .unwrap_or_else(|| dir_name.clone());
                let description = project
                    .get("description")
                    .and_then(toml::Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let module = name.replace('-', "_");
                return (
                    name,
                    description,
                    String::from("python"),
                    vec![String::from("-m"), module],
                );
            }
        }
    }

    (
        sanitize_name(&dir_name),
        String::new(),
        String::from("./server"),
        Vec::new(),
    )
}

/// Scoped npm names like `@org/server` become plain entry keys.
fn sanitize_name(name: &str) -> String {
    let trimmed = name.rsplit('/').next().unwrap_or(name);
    trimmed
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect()
}
