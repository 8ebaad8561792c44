// `cadence history` — recent commit attempts, newest first.

use clap::Args;

use cadence_common::protocol::api::HistoryResponse;
use cadence_common::types::CommitAttempt;

use crate::client::DaemonClient;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// Maximum number of attempts to show.
    #[arg(long, default_value_t = 20)]
    limit: usize,

    /// Only attempts whose message contains this term.
    #[arg(long)]
    search: Option<String>,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

pub async fn run(args: HistoryArgs, client: &DaemonClient) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let history = client.history(Some(args.limit), args.search.as_deref()).await?;
    output::print_output(format, &history, format_human)?;
    Ok(())
}

fn format_human(history: &HistoryResponse) -> String {
    if history.commits.is_empty() {
        return format!("No commit attempts recorded ({} total).", history.total);
    }

    let mut lines = Vec::new();
    for attempt in &history.commits {
        lines.push(format_attempt(attempt));
    }
    lines.push(format!("{} shown, {} total", history.commits.len(), history.total));
    lines.join("\n")
}

fn format_attempt(attempt: &CommitAttempt) -> String {
    let when = attempt.timestamp.format("%Y-%m-%d %H:%M:%S");
    let marker = if attempt.success { "ok " } else { "ERR" };
    let push = match attempt.push_success {
        Some(true) => " [pushed]",
        Some(false) => " [push failed]",
        None => "",
    };
    let source = if attempt.used_ai_message { "ai" } else { "tpl" };

    match &attempt.error_message {
        Some(error) => {
            format!("{when}  {marker} {:>7}  {} — {error}", attempt.short_hash(), attempt.message)
        }
        None => format!(
            "{when}  {marker} {:>7}  {} ({} files, {source}){push}",
            attempt.short_hash(),
            attempt.message,
            attempt.files_changed
        ),
    }
}
