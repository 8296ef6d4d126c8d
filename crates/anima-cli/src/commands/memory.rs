use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use serde_json::Map;

use anima::config::Config;
use anima::embedding::create_provider;
use anima::memory::{MemoryCategory, MemoryEngine};
use anima::storage::{LanceMemoryStore, RecordFilter};

use crate::error::CliResult;
use crate::output::{OutputFormat, format_timestamp, truncate_string};

#[derive(Parser)]
pub struct MemoryCommand {
    #[clap(subcommand)]
    pub command: MemorySubcommand,
}

#[derive(Subcommand)]
pub enum MemorySubcommand {
    #[clap(about = "List memories")]
    List(ListArgs),

    #[clap(about = "Show memory details")]
    Show(ShowArgs),

    #[clap(about = "Manually add a memory")]
    Add(AddArgs),

    #[clap(about = "Delete a memory")]
    Delete(DeleteArgs),
}

#[derive(Parser)]
pub struct ListArgs {
    #[clap(
        long,
        short,
        default_value = "20",
        help = "Maximum number of memories to display"
    )]
    pub limit: usize,

    #[clap(
        long,
        short,
        help = "Filter by category (fact, emotion, insight, plan, preference)"
    )]
    pub category: Option<String>,

    #[clap(long, help = "Filter to memories carrying this tag")]
    pub tag: Option<String>,

    #[clap(long, help = "Filter to memories at or above this importance")]
    pub min_importance: Option<i32>,
}

#[derive(Parser)]
pub struct ShowArgs {
    #[clap(help = "Memory ID (mem_<millis> format)")]
    pub id: String,
}

#[derive(Parser)]
pub struct AddArgs {
    #[clap(help = "Memory content text")]
    pub text: String,

    #[clap(
        long,
        default_value = "fact",
        help = "Category (fact, emotion, insight, plan, preference)"
    )]
    pub category: String,

    #[clap(long, default_value = "5", help = "Importance on a 1-10 scale")]
    pub importance: i32,

    #[clap(long, help = "Comma-separated tags")]
    pub tags: Option<String>,
}

#[derive(Parser)]
pub struct DeleteArgs {
    #[clap(help = "Memory ID to delete")]
    pub id: String,
}

/// Strict category parse for CLI arguments; unlike model output, a typo
/// here should be rejected rather than silently read as "fact".
fn parse_category(s: &str) -> CliResult<MemoryCategory> {
    MemoryCategory::ALL
        .into_iter()
        .find(|c| c.as_str() == s.trim().to_lowercase())
        .ok_or_else(|| {
            format!("Unknown category: {s}. Use fact, emotion, insight, plan, or preference.")
                .into()
        })
}

impl MemoryCommand {
    pub async fn execute(
        &self,
        store: LanceMemoryStore,
        config: &Config,
        format: OutputFormat,
    ) -> CliResult<()> {
        match &self.command {
            MemorySubcommand::List(args) => Self::list(&store, args, format).await,
            MemorySubcommand::Show(args) => Self::show(&store, args, format).await,
            MemorySubcommand::Add(args) => Self::add(store, config, args, format).await,
            MemorySubcommand::Delete(args) => Self::delete(&store, args, format).await,
        }
    }

    async fn list(store: &LanceMemoryStore, args: &ListArgs, format: OutputFormat) -> CliResult<()> {
        let mut filter = RecordFilter::new();
        if let Some(category) = args.category.as_deref() {
            filter = filter.with_category(parse_category(category)?);
        }
        if let Some(min_importance) = args.min_importance {
            filter = filter.with_min_importance(min_importance);
        }
        if let Some(tag) = &args.tag {
            filter = filter.with_tag(tag.clone());
        }

        let mut memories = store.scan(filter.to_sql_clause(), None).await?;
        if let Some(tag) = &args.tag {
            // The stored-tag clause is a substring match; keep exact hits
            memories.retain(|m| m.tags.iter().any(|t| t == tag));
        }
        memories.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        memories.truncate(args.limit);

        match format {
            OutputFormat::Json => {
                let output: Vec<_> = memories
                    .iter()
                    .map(|m| {
                        serde_json::json!({
                            "id": m.id,
                            "content": m.content,
                            "category": m.category.as_str(),
                            "importance": m.importance,
                            "tags": m.tags,
                            "created_at": m.created_at.to_rfc3339(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                if memories.is_empty() {
                    println!("No memories found.");
                    return Ok(());
                }

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["ID", "Content", "Category", "Importance", "Tags", "Created"]);

                for memory in &memories {
                    table.add_row([
                        memory.id.clone(),
                        truncate_string(&memory.content, 50),
                        memory.category.as_str().to_string(),
                        memory.importance.to_string(),
                        truncate_string(&memory.tags.join(", "), 30),
                        format_timestamp(&memory.created_at),
                    ]);
                }

                println!("{table}");
                println!("\nTotal: {} memories", memories.len());
            }
        }

        Ok(())
    }

    async fn show(store: &LanceMemoryStore, args: &ShowArgs, format: OutputFormat) -> CliResult<()> {
        let memory = store
            .get(&args.id)
            .await?
            .ok_or_else(|| format!("Memory not found: {}", args.id))?;

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "id": memory.id,
                    "content": memory.content,
                    "category": memory.category.as_str(),
                    "importance": memory.importance,
                    "tags": memory.tags,
                    "metadata": memory.metadata,
                    "embedding_size": memory.embedding.len(),
                    "created_at": memory.created_at.to_rfc3339(),
                    "updated_at": memory.updated_at.to_rfc3339(),
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Property", "Value"]);

                table.add_row(["ID", &memory.id]);
                table.add_row(["Content", &memory.content]);
                table.add_row(["Category", memory.category.as_str()]);
                table.add_row(["Importance", &memory.importance.to_string()]);
                table.add_row(["Tags", &memory.tags.join(", ")]);
                table.add_row([
                    "Metadata",
                    &serde_json::to_string(&memory.metadata).unwrap_or_default(),
                ]);
                table.add_row(["Embedding Size", &memory.embedding.len().to_string()]);
                table.add_row(["Created", &memory.created_at.to_rfc3339()]);
                table.add_row(["Updated", &memory.updated_at.to_rfc3339()]);

                println!("{table}");
            }
        }

        Ok(())
    }

    async fn add(
        store: LanceMemoryStore,
        config: &Config,
        args: &AddArgs,
        format: OutputFormat,
    ) -> CliResult<()> {
        let category = parse_category(&args.category)?;
        let tags: Vec<String> = args
            .tags
            .as_deref()
            .map(|t| {
                t.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let embedder = create_provider(&config.embedding)?;
        let engine = MemoryEngine::new(store, embedder, config.memory.clone());

        let mut metadata = Map::new();
        metadata.insert("source".to_string(), serde_json::Value::from("manual"));

        let record = engine
            .save(&args.text, category, args.importance, tags, metadata)
            .await?;

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "id": record.id,
                    "created": true,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                println!("Memory created successfully.");
                println!("ID: {}", record.id);
            }
        }

        Ok(())
    }

    async fn delete(
        store: &LanceMemoryStore,
        args: &DeleteArgs,
        format: OutputFormat,
    ) -> CliResult<()> {
        let deleted = store.delete(&args.id).await?;

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "id": args.id,
                    "deleted": deleted,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                if deleted {
                    println!("Memory {} deleted successfully.", args.id);
                } else {
                    println!("Memory {} not found.", args.id);
                }
            }
        }

        Ok(())
    }
}
