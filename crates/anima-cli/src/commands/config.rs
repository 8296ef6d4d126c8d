use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};

use anima::config::Config;

use crate::error::{CliError, CliResult};
use crate::output::{OutputFormat, truncate_string};

const CONFIG_TEMPLATE: &str = r#"# Anima configuration.
# Any omitted setting falls back to its built-in default.

[storage]
# Base directory for all persistent data (vectors, conversations, journals)
# data_dir = "~/.anima"

[llm]
# Full chat endpoint URL, e.g. "http://localhost:11434/api/chat"
api_url = ""
# Environment variable holding the API key; unset variable = no auth header
api_key_env = "ANIMA_API_KEY"
timeout_secs = 120
max_tokens = 4096
temperature = 0.7

[embedding]
# "local" runs fastembed in-process; "remote" calls an Ollama-style endpoint
provider = "local"
model = "nomic-embed-text"
api_url = "http://localhost:11434"
dimension = 768
timeout_secs = 30

[memory]
max_distance = 0.7
candidate_multiplier = 2

[conversation]
keep_latest = 50

[engine]
recall_results = 5
recall_min_importance = 5
history_limit = 10
# system_prompt = "You are a thoughtful conversational companion..."
"#;

#[derive(Parser)]
pub struct ConfigCommand {
    #[clap(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    #[clap(about = "Show current configuration")]
    Show,

    #[clap(about = "Write a commented default config file")]
    Init(InitArgs),
}

#[derive(Parser)]
pub struct InitArgs {
    #[clap(long, help = "Overwrite an existing config file")]
    pub force: bool,
}

impl ConfigCommand {
    pub async fn execute(&self, config_path: Option<&Path>, format: OutputFormat) -> CliResult<()> {
        match &self.command {
            ConfigSubcommand::Show => Self::show(config_path, format),
            ConfigSubcommand::Init(args) => Self::init(config_path, args, format),
        }
    }

    fn show(config_path: Option<&Path>, format: OutputFormat) -> CliResult<()> {
        let config = if let Some(path) = config_path {
            let content = std::fs::read_to_string(path)
                .map_err(|e| CliError::context("Failed to read config file", e))?;
            toml::from_str::<Config>(&content)?
        } else {
            Config::default()
        };

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "storage": {
                        "data_dir": config.storage.data_dir.display().to_string(),
                    },
                    "llm": {
                        "api_url": config.llm.api_url,
                        "api_key_env": config.llm.api_key_env,
                        "timeout_secs": config.llm.timeout_secs,
                        "max_tokens": config.llm.max_tokens,
                        "temperature": config.llm.temperature,
                    },
                    "embedding": {
                        "provider": config.embedding.provider,
                        "model": config.embedding.model,
                        "api_url": config.embedding.api_url,
                        "dimension": config.embedding.dimension,
                        "timeout_secs": config.embedding.timeout_secs,
                    },
                    "memory": {
                        "max_distance": config.memory.max_distance,
                        "candidate_multiplier": config.memory.candidate_multiplier,
                    },
                    "conversation": {
                        "keep_latest": config.conversation.keep_latest,
                    },
                    "engine": {
                        "system_prompt": config.engine.system_prompt,
                        "recall_results": config.engine.recall_results,
                        "recall_min_importance": config.engine.recall_min_importance,
                        "history_limit": config.engine.history_limit,
                    },
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                match config_path {
                    Some(path) => println!("Configuration from: {}", path.display()),
                    None => println!("Configuration: (using defaults)"),
                }
                println!();

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Section", "Setting", "Value"]);

                table.add_row([
                    "storage",
                    "data_dir",
                    &config.storage.data_dir.display().to_string(),
                ]);
                table.add_row([
                    "llm",
                    "api_url",
                    if config.llm.api_url.is_empty() {
                        "(not set)"
                    } else {
                        &config.llm.api_url
                    },
                ]);
                table.add_row(["llm", "api_key_env", &config.llm.api_key_env]);
                table.add_row(["llm", "timeout_secs", &config.llm.timeout_secs.to_string()]);
                table.add_row(["llm", "max_tokens", &config.llm.max_tokens.to_string()]);
                table.add_row(["llm", "temperature", &config.llm.temperature.to_string()]);
                table.add_row(["embedding", "provider", &config.embedding.provider]);
                table.add_row(["embedding", "model", &config.embedding.model]);
                table.add_row(["embedding", "api_url", &config.embedding.api_url]);
                table.add_row([
                    "embedding",
                    "dimension",
                    &config.embedding.dimension.to_string(),
                ]);
                table.add_row([
                    "embedding",
                    "timeout_secs",
                    &config.embedding.timeout_secs.to_string(),
                ]);
                table.add_row([
                    "memory",
                    "max_distance",
                    &config.memory.max_distance.to_string(),
                ]);
                table.add_row([
                    "memory",
                    "candidate_multiplier",
                    &config.memory.candidate_multiplier.to_string(),
                ]);
                table.add_row([
                    "conversation",
                    "keep_latest",
                    &config.conversation.keep_latest.to_string(),
                ]);
                table.add_row([
                    "engine",
                    "system_prompt",
                    &truncate_string(&config.engine.system_prompt, 60),
                ]);
                table.add_row([
                    "engine",
                    "recall_results",
                    &config.engine.recall_results.to_string(),
                ]);
                table.add_row([
                    "engine",
                    "recall_min_importance",
                    &config.engine.recall_min_importance.to_string(),
                ]);
                table.add_row([
                    "engine",
                    "history_limit",
                    &config.engine.history_limit.to_string(),
                ]);

                println!("{table}");
            }
        }

        Ok(())
    }

    fn init(config_path: Option<&Path>, args: &InitArgs, format: OutputFormat) -> CliResult<()> {
        let target: PathBuf = match config_path {
            Some(path) => path.to_path_buf(),
            None => dirs::home_dir()
                .map(|h| h.join(".anima").join("config.toml"))
                .ok_or("Could not determine home directory; pass --config")?,
        };

        if target.exists() && !args.force {
            return Err(format!(
                "Config file already exists: {} (use --force to overwrite)",
                target.display()
            )
            .into());
        }

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, CONFIG_TEMPLATE)?;

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "path": target.display().to_string(),
                    "created": true,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                println!("Wrote default config to {}", target.display());
            }
        }

        Ok(())
    }
}
