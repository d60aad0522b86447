use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Deserialize;

use strata_core::diagnostics::{Diagnostic, Diagnostics, Severity};
use strata_core::schema::{AttributeType, BlockSchema};
use strata_state::{
    BackendConfig, DEFAULT_WORKSPACE, ProcessEnvironment, StateBackend, backend_schema,
    create_backend, validate_backend,
};

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Inspect and manage remote infrastructure state", long_about = None)]
struct Cli {
    /// Path to the backend configuration (JSON)
    #[arg(long, short, global = true, default_value = "backend.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the backend configuration
    Validate {
        /// Configuration file to check instead of `--config`
        file: Option<PathBuf>,
    },
    /// Show the attributes a backend accepts
    Schema {
        /// Backend type
        #[arg(default_value = "s3")]
        backend: String,
    },
    /// Workspace management commands
    Workspace {
        #[command(subcommand)]
        command: WorkspaceCommands,
    },
    /// State commands
    State {
        #[command(subcommand)]
        command: StateCommands,
    },
    /// Release a stuck state lock
    ForceUnlock {
        /// ID of the lock to release
        lock_id: String,

        #[arg(long, short, default_value = DEFAULT_WORKSPACE)]
        workspace: String,
    },
}

#[derive(Subcommand)]
enum WorkspaceCommands {
    /// List workspaces with stored state
    List,
    /// Delete a workspace's state
    Delete {
        /// Workspace name
        name: String,
    },
}

#[derive(Subcommand)]
enum StateCommands {
    /// Print the stored state of a workspace
    Pull {
        #[arg(long, short, default_value = DEFAULT_WORKSPACE)]
        workspace: String,
    },
}

/// Backend configuration file: `{ "backend": "s3", "config": { ... } }`
#[derive(Debug, Deserialize)]
struct BackendFile {
    backend: String,
    #[serde(default)]
    config: serde_json::Map<String, serde_json::Value>,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { file } => {
            run_validate(file.as_deref().unwrap_or(&cli.config))
        }
        Commands::Schema { backend } => run_schema(&backend),
        Commands::Workspace { command } => run_workspace_command(&cli.config, command).await,
        Commands::State {
            command: StateCommands::Pull { workspace },
        } => run_state_pull(&cli.config, &workspace).await,
        Commands::ForceUnlock { lock_id, workspace } => {
            run_force_unlock(&cli.config, &lock_id, &workspace).await
        }
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn parse_backend_config(content: &str) -> Result<BackendConfig, String> {
    let file: BackendFile =
        serde_json::from_str(content).map_err(|e| format!("Parse error: {}", e))?;
    BackendConfig::from_json(file.backend, file.config).map_err(|e| e.to_string())
}

fn load_backend_config(path: &Path) -> Result<BackendConfig, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    let config = parse_backend_config(&content)?;
    log::debug!(
        "loaded {} backend configuration from {}",
        config.backend_type,
        path.display()
    );
    Ok(config)
}

fn format_diagnostic(diagnostic: &Diagnostic) -> String {
    let label = match diagnostic.severity {
        Severity::Error => "Error:".red().bold(),
        Severity::Warning => "Warning:".yellow().bold(),
    };
    let mut out = format!("{} {}", label, diagnostic.summary.bold());
    match &diagnostic.path {
        Some(path) if !path.is_root() => out.push_str(&format!("\n  on {}:", path)),
        _ => {}
    }
    for line in diagnostic.detail.lines() {
        out.push_str("\n  ");
        out.push_str(line);
    }
    out
}

fn print_diagnostics(diags: &Diagnostics) {
    for diagnostic in diags {
        eprintln!("{}\n", format_diagnostic(diagnostic));
    }
}

fn run_validate(path: &Path) -> Result<(), String> {
    let config = load_backend_config(path)?;

    println!("{}", "Validating...".cyan());

    let diags = validate_backend(&config, &ProcessEnvironment).map_err(|e| e.to_string())?;
    print_diagnostics(&diags);

    if diags.has_errors() {
        return Err(format!(
            "{} error(s) in {}",
            diags.errors().count(),
            path.display()
        ));
    }

    println!(
        "{}",
        format!("✓ {} backend configuration is valid.", config.backend_type)
            .green()
            .bold()
    );
    Ok(())
}

fn run_schema(backend: &str) -> Result<(), String> {
    let schema = backend_schema(backend).map_err(|e| e.to_string())?;
    if let Some(description) = &schema.description {
        println!("{}\n", description);
    }
    for line in render_schema(&schema, 0) {
        println!("{}", line);
    }
    Ok(())
}

fn render_schema(schema: &BlockSchema, depth: usize) -> Vec<String> {
    let indent = "  ".repeat(depth);
    let mut lines = Vec::new();

    for attr in schema.attributes.values() {
        let mut flags = Vec::new();
        if attr.required {
            flags.push("required".red().to_string());
        }
        if attr.deprecated {
            flags.push("deprecated".yellow().to_string());
        }
        if attr.sensitive {
            flags.push("sensitive".magenta().to_string());
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" ({})", flags.join(", "))
        };

        lines.push(format!(
            "{}{}: {}{}",
            indent,
            attr.name.bold(),
            attr.attr_type.to_string().cyan(),
            flags
        ));
        if let Some(description) = &attr.description {
            lines.push(format!("{}    {}", indent, description.dimmed()));
        }
        if let AttributeType::Object(nested) = &attr.attr_type {
            lines.extend(render_schema(nested, depth + 1));
        }
    }

    lines
}

async fn open_backend(path: &Path) -> Result<Box<dyn StateBackend>, String> {
    let config = load_backend_config(path)?;
    let (backend, warnings) = create_backend(&config, &ProcessEnvironment)
        .await
        .map_err(|e| e.to_string())?;
    print_diagnostics(&warnings);
    Ok(backend)
}

async fn run_workspace_command(path: &Path, command: WorkspaceCommands) -> Result<(), String> {
    let backend = open_backend(path).await?;

    match command {
        WorkspaceCommands::List => {
            let workspaces = backend.workspaces().await.map_err(|e| e.to_string())?;
            for workspace in workspaces {
                println!("  • {}", workspace);
            }
        }
        WorkspaceCommands::Delete { name } => {
            backend
                .delete_workspace(&name)
                .await
                .map_err(|e| e.to_string())?;
            println!("{}", format!("Deleted workspace \"{}\".", name).green());
        }
    }
    Ok(())
}

async fn run_state_pull(path: &Path, workspace: &str) -> Result<(), String> {
    let backend = open_backend(path).await?;

    match backend
        .read_state(workspace)
        .await
        .map_err(|e| e.to_string())?
    {
        Some(state) => {
            let bytes = state.to_bytes().map_err(|e| e.to_string())?;
            println!("{}", String::from_utf8_lossy(&bytes));
        }
        None => {
            println!(
                "{}",
                format!("No state stored for workspace \"{}\".", workspace).yellow()
            );
        }
    }
    Ok(())
}

async fn run_force_unlock(path: &Path, lock_id: &str, workspace: &str) -> Result<(), String> {
    let backend = open_backend(path).await?;
    backend
        .force_unlock(workspace, lock_id)
        .await
        .map_err(|e| e.to_string())?;
    println!("{}", format!("Lock {} released.", lock_id).green().bold());
    Ok(())
}
