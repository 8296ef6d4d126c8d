use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};

use anima::conversation::{ConversationLog, SqliteConversationLog};

use crate::error::CliResult;
use crate::output::{OutputFormat, format_timestamp, truncate_string};

#[derive(Parser)]
pub struct SessionsCommand {
    #[clap(subcommand)]
    pub command: SessionsSubcommand,
}

#[derive(Subcommand)]
pub enum SessionsSubcommand {
    #[clap(about = "List conversation sessions")]
    List,

    #[clap(about = "Show the turns of a session")]
    Show(ShowArgs),

    #[clap(about = "Delete a session and all its turns")]
    Delete(DeleteArgs),
}

#[derive(Parser)]
pub struct ShowArgs {
    #[clap(help = "Session identifier")]
    pub session: String,

    #[clap(
        long,
        short,
        default_value = "50",
        help = "Maximum number of turns to display (most recent)"
    )]
    pub limit: usize,
}

#[derive(Parser)]
pub struct DeleteArgs {
    #[clap(help = "Session identifier to delete")]
    pub session: String,
}

impl SessionsCommand {
    pub async fn execute(&self, log: &SqliteConversationLog, format: OutputFormat) -> CliResult<()> {
        match &self.command {
            SessionsSubcommand::List => Self::list(log, format).await,
            SessionsSubcommand::Show(args) => Self::show(log, args, format).await,
            SessionsSubcommand::Delete(args) => Self::delete(log, args, format).await,
        }
    }

    async fn list(log: &SqliteConversationLog, format: OutputFormat) -> CliResult<()> {
        let sessions = log.list_sessions().await?;

        match format {
            OutputFormat::Json => {
                let output: Vec<_> = sessions
                    .iter()
                    .map(|s| {
                        serde_json::json!({
                            "session_id": s.session_id,
                            "turn_count": s.turn_count,
                            "started_at": s.started_at.to_rfc3339(),
                            "last_activity": s.last_activity.to_rfc3339(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                if sessions.is_empty() {
                    println!("No sessions found.");
                    return Ok(());
                }

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Session", "Turns", "Started", "Last Activity"]);

                for session in &sessions {
                    table.add_row([
                        session.session_id.clone(),
                        session.turn_count.to_string(),
                        format_timestamp(&session.started_at),
                        format_timestamp(&session.last_activity),
                    ]);
                }

                println!("{table}");
                println!("\nTotal: {} sessions", sessions.len());
            }
        }

        Ok(())
    }

    async fn show(
        log: &SqliteConversationLog,
        args: &ShowArgs,
        format: OutputFormat,
    ) -> CliResult<()> {
        let turns = log.recent(&args.session, args.limit).await?;

        match format {
            OutputFormat::Json => {
                let output: Vec<_> = turns
                    .iter()
                    .map(|t| {
                        serde_json::json!({
                            "message_index": t.message_index,
                            "role": t.role.as_str(),
                            "content": t.content,
                            "metadata": t.metadata,
                            "timestamp": t.timestamp.to_rfc3339(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                if turns.is_empty() {
                    println!("No turns found for session {}.", args.session);
                    return Ok(());
                }

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["#", "Role", "Content", "Time"]);

                for turn in &turns {
                    table.add_row([
                        turn.message_index.to_string(),
                        turn.role.as_str().to_string(),
                        truncate_string(&turn.content, 60),
                        format_timestamp(&turn.timestamp),
                    ]);
                }

                println!("{table}");
                println!("\n{} turns in session {}", turns.len(), args.session);
            }
        }

        Ok(())
    }

    async fn delete(
        log: &SqliteConversationLog,
        args: &DeleteArgs,
        format: OutputFormat,
    ) -> CliResult<()> {
        let deleted = log.delete_session(&args.session).await?;

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "session_id": args.session,
                    "deleted_turns": deleted,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                if deleted > 0 {
                    println!("Deleted session {} ({deleted} turns).", args.session);
                } else {
                    println!("Session {} not found.", args.session);
                }
            }
        }

        Ok(())
    }
}
