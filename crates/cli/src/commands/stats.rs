// `cadence stats` — aggregate counters and commit type histogram.

use clap::Args;

use cadence_common::protocol::api::StatsResponse;

use crate::client::DaemonClient;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct StatsArgs {
    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

pub async fn run(args: StatsArgs, client: &DaemonClient) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let stats = client.stats().await?;
    output::print_output(format, &stats, format_human)?;
    Ok(())
}

fn format_human(response: &StatsResponse) -> String {
    let stats = &response.stats;
    let mut lines = vec![
        format!("Total attempts:   {}", stats.total_commits),
        format!("  successful:     {}", stats.successful_commits),
        format!("  failed:         {}", stats.failed_commits),
        format!("Files changed:    {}", stats.total_files_changed),
        format!("AI messages:      {}", stats.ai_usage_count),
    ];

    if let Some(last) = stats.last_commit_time {
        lines.push(format!("Last attempt:     {}", last.format("%Y-%m-%d %H:%M:%S")));
    }
    if let Some(next) = response.next_run_at {
        lines.push(format!("Next run:         {}", next.format("%Y-%m-%d %H:%M:%S")));
    }
    if !response.commit_types.is_empty() {
        let types: Vec<String> =
            response.commit_types.iter().map(|(t, n)| format!("{t} {n}")).collect();
        lines.push(format!("Commit types:     {}", types.join(", ")));
    }

    lines.join("\n")
}
