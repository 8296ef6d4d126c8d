use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};

use anima::memory::MemoryStats;
use anima::storage::LanceMemoryStore;

use crate::error::CliResult;
use crate::output::OutputFormat;

#[derive(Parser)]
pub struct StatsCommand {}

impl StatsCommand {
    pub async fn execute(&self, store: &LanceMemoryStore, format: OutputFormat) -> CliResult<()> {
        let records = store.scan(None, None).await?;

        let mut stats = MemoryStats::empty();
        stats.total = records.len();
        for record in &records {
            *stats
                .by_category
                .entry(record.category.as_str().to_string())
                .or_insert(0) += 1;
            *stats.by_importance.entry(record.importance).or_insert(0) += 1;
        }

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            }
            OutputFormat::Table => {
                println!("Anima Memory Statistics");
                println!("=======================\n");

                let mut category_table = Table::new();
                category_table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Category", "Count"]);
                for (category, count) in &stats.by_category {
                    category_table.add_row([category.clone(), count.to_string()]);
                }
                println!("{category_table}\n");

                let mut importance_table = Table::new();
                importance_table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Importance", "Count"]);
                for (level, count) in &stats.by_importance {
                    importance_table.add_row([level.to_string(), count.to_string()]);
                }
                println!("{importance_table}\n");

                println!("Total: {} memories", stats.total);
            }
        }

        Ok(())
    }
}
