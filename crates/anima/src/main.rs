//! Anima daemon - interactive chat and autonomous reflection

use std::io::{BufRead, Write as IoWrite};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use anima::capability::{CapabilityRegistry, register_builtins};
use anima::config::Config;
use anima::conversation::SqliteConversationLog;
use anima::embedding::create_provider;
use anima::error::Result;
use anima::llm::HttpLanguageModel;
use anima::memory::MemoryEngine;
use anima::orchestrator::{Orchestrator, TurnRequest};
use anima::storage::LanceMemoryStore;

/// Anima - A conversational agent engine with long-term memory
#[derive(Parser)]
#[command(name = "anima")]
#[command(about = "A conversational agent engine with long-term memory")]
#[command(version)]
pub struct Cli {
    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start an interactive chat session (default command)
    #[command(name = "chat")]
    Chat {
        /// Session identifier to converse under
        #[arg(long, short, default_value = "cli")]
        session: String,

        /// Name the agent should address you by
        #[arg(long, short, default_value = "User")]
        user: String,
    },

    /// Run one autonomous reflection pass and exit
    #[command(name = "reflect")]
    Reflect {
        /// Session whose recent history feeds the reflection
        #[arg(long, short, default_value = "cli")]
        session: String,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        None => chat(cli.config, "cli".to_string(), "User".to_string()).await,
        Some(Command::Chat { session, user }) => chat(cli.config, session, user).await,
        Some(Command::Reflect { session }) => reflect(cli.config, session).await,
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,anima=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn parse_config_file(path: &PathBuf) -> Result<Config> {
    tracing::info!("Loading config from: {}", path.display());
    let content = std::fs::read_to_string(path).map_err(|e| {
        anima::AnimaError::Config(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;
    toml::from_str(&content)
        .map_err(|e| anima::AnimaError::Config(format!("Failed to parse config: {e}")))
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    if let Some(path) = config_path {
        return parse_config_file(&path);
    }

    let default_paths = [
        dirs::home_dir().map(|h| h.join(".anima").join("config.toml")),
        dirs::config_dir().map(|c| c.join("anima").join("config.toml")),
        Some(PathBuf::from("config.toml")),
    ];

    for path in default_paths.iter().flatten() {
        if path.exists() {
            return parse_config_file(path);
        }
    }

    tracing::info!("No config file found, using defaults");
    Ok(Config::default())
}

/// Build the full engine stack from config: embedder, memory store,
/// conversation log, capability registry, language model.
async fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    let data_dir = &config.storage.data_dir;
    tracing::info!("Initializing storage at: {}", data_dir.display());

    std::fs::create_dir_all(data_dir).map_err(|e| {
        anima::AnimaError::Storage(format!(
            "Failed to create data directory {}: {}",
            data_dir.display(),
            e
        ))
    })?;

    tracing::info!(
        "Initializing embedding provider '{}' (this may take a moment on first run)...",
        config.embedding.provider
    );
    let embedder = create_provider(&config.embedding)?;

    let mut store = LanceMemoryStore::connect(data_dir, embedder.dimensions()).await?;
    store.ensure_table().await?;
    let memory = Arc::new(MemoryEngine::new(
        store,
        embedder,
        config.memory.clone(),
    ));

    let log = Arc::new(SqliteConversationLog::open(
        &data_dir.join("conversations.db"),
    )?);

    let registry = Arc::new(CapabilityRegistry::new());
    register_builtins(&registry, data_dir)?;

    let llm = Arc::new(HttpLanguageModel::new(&config.llm)?);

    Ok(Orchestrator::new(config, llm, memory, log, registry))
}

async fn chat(config_path: Option<PathBuf>, session: String, user: String) -> Result<()> {
    let config = load_config(config_path)?;
    let orchestrator = build_orchestrator(&config).await?;

    println!("Chatting as {user} (session: {session}). Type 'exit' to quit.");

    let stdin = std::io::stdin();
    loop {
        print!("{user}> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if message == "exit" || message == "quit" {
            break;
        }

        let request = TurnRequest::new(message, &session).with_user_name(&user);
        match orchestrator.process_message(request).await {
            Ok(outcome) => {
                if !outcome.tool_calls.is_empty() {
                    let names: Vec<&str> =
                        outcome.tool_calls.iter().map(|c| c.name.as_str()).collect();
                    println!("[tools: {}]", names.join(", "));
                }
                println!("{}", outcome.response);
            }
            Err(e) => eprintln!("Error: {e}"),
        }
    }

    println!("Goodbye.");
    Ok(())
}

async fn reflect(config_path: Option<PathBuf>, session: String) -> Result<()> {
    let config = load_config(config_path)?;
    let orchestrator = build_orchestrator(&config).await?;

    let outcome = orchestrator.reflect(&session).await;

    if outcome.thought.is_empty() {
        println!("No reflection produced.");
        return Ok(());
    }

    println!("{}", outcome.thought);
    for (call, result) in outcome.tool_calls.iter().zip(outcome.tool_results.iter()) {
        let status = if result.is_success() { "ok" } else { "error" };
        println!("[{}: {status}]", call.name);
    }

    Ok(())
}
