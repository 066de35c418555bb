//! tailor - natural-language edits for React projects
//!
//! Classifies a change request, picks the files and nodes it touches, and
//! writes validated patches. Results are printed as JSON on stdout; logs go
//! to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tailor_adapters::{Config, JsonlConversationStore};
use tailor_core::{parse_for_path, ModificationRequest};
use tailor_engine::Orchestrator;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "tailor",
    about = "Apply natural-language change requests to a React project",
    version
)]
struct Args {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a change request against a project
    Modify {
        /// Project root
        project: PathBuf,
        /// What to change, in plain language
        request: String,
        /// Session to continue (a new one is started when omitted)
        #[arg(long)]
        session: Option<String>,
    },
    /// Show the offline keyword classification for a request
    Classify { request: String },
    /// Print the structural nodes of a source file
    Nodes { file: PathBuf },
    /// Print the latest conversation records stored for a project
    History {
        project: PathBuf,
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
    /// Show where the configuration lives and its effective values
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    match args.command {
        Command::Modify {
            project,
            request,
            session,
        } => modify(&project, request, session).await,
        Command::Classify { request } => print_json(&tailor_core::heuristics::suggest_strategy(&request)),
        Command::Nodes { file } => nodes(&file),
        Command::History { project, limit } => history(&project, limit).await,
        Command::Config => {
            eprintln!("  Config file: {}", Config::config_location());
            print_json(&Config::load())
        }
    }
}

fn init_logging(fallback: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn modify(project: &Path, request: String, session: Option<String>) -> Result<()> {
    let root = project
        .canonicalize()
        .with_context(|| format!("project not found: {}", project.display()))?;
    let config = Config::load();
    let orchestrator = Orchestrator::from_config(&config);

    let session_id = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    tracing::info!(session = %session_id, "starting session");
    let result = orchestrator
        .handle(ModificationRequest::new(root, session_id, request))
        .await;

    print_json(&result)?;
    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

fn nodes(file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let nodes = parse_for_path(file, &content);
    if nodes.is_empty() {
        tracing::warn!(file = %file.display(), "no structural nodes (unsupported or unparseable file)");
    }
    print_json(&nodes)
}

async fn history(project: &Path, limit: usize) -> Result<()> {
    let records = JsonlConversationStore.load_recent(project, limit).await?;
    print_json(&records)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
