use std::path::PathBuf;

use clap::{Parser, Subcommand};

use anima::config::Config;
use anima::conversation::SqliteConversationLog;
use anima::embedding::LOCAL_EMBEDDING_DIMENSION;
use anima::storage::LanceMemoryStore;
use anima_cli::commands::{ConfigCommand, MemoryCommand, SessionsCommand, StatsCommand};
use anima_cli::error::{CliError, CliResult};
use anima_cli::output::OutputFormat;

#[derive(Parser)]
#[command(name = "anima-cli")]
#[command(about = "Anima CLI - Management tool for the anima agent engine")]
#[command(version)]
pub struct Cli {
    #[clap(long, short, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[clap(long, short = 'd', global = true, help = "Path to data directory")]
    pub data_dir: Option<PathBuf>,

    #[clap(long, short = 'c', global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[clap(about = "Memory management commands")]
    Memory(MemoryCommand),

    #[clap(about = "Conversation session commands")]
    Sessions(SessionsCommand),

    #[clap(about = "Show memory statistics")]
    Stats(StatsCommand),

    #[clap(about = "Configuration commands")]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Table
    };

    let config = match &cli.config {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .map_err(|e| CliError::context("Failed to read config file", e))?;
            toml::from_str::<Config>(&content)?
        }
        None => Config::default(),
    };

    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| config.storage.data_dir.clone());

    match &cli.command {
        Command::Config(cmd) => cmd.execute(cli.config.as_deref(), format).await,
        Command::Sessions(cmd) => {
            let log = SqliteConversationLog::open(&data_dir.join("conversations.db"))?;
            cmd.execute(&log, format).await
        }
        Command::Memory(_) | Command::Stats(_) => {
            let dimensions = if config.embedding.provider == "local" {
                LOCAL_EMBEDDING_DIMENSION
            } else {
                config.embedding.dimension
            };

            let mut store = LanceMemoryStore::connect(&data_dir, dimensions).await?;
            store.ensure_table().await?;

            match &cli.command {
                Command::Memory(cmd) => cmd.execute(store, &config, format).await,
                Command::Stats(cmd) => cmd.execute(&store, format).await,
                Command::Sessions(_) | Command::Config(_) => unreachable!(),
            }
        }
    }
}
