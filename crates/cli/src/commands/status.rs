// `cadence status` — scheduler timing state and repository facts.

use chrono::Utc;
use clap::Args;

use cadence_common::protocol::api::StatusResponse;

use crate::client::DaemonClient;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

pub async fn run(args: StatusArgs, client: &DaemonClient) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let status = client.status().await?;
    output::print_output(format, &status, format_human)?;
    Ok(())
}

fn format_human(status: &StatusResponse) -> String {
    let mut lines = Vec::new();
    lines.push(format!("Repository: {} (branch {})", status.repository, status.branch));

    let state = if !status.running {
        "stopped".to_string()
    } else if status.paused {
        "running (paused)".to_string()
    } else {
        "running".to_string()
    };
    lines.push(format!("Scheduler:  {state}"));

    match status.next_run_at {
        Some(at) => {
            let in_secs = (at - Utc::now()).num_seconds().max(0);
            lines.push(format!("Next run:   {} (in {}s)", at.format("%Y-%m-%d %H:%M:%S"), in_secs));
        }
        None => lines.push("Next run:   —".to_string()),
    }
    match status.last_run_at {
        Some(at) => lines.push(format!("Last run:   {}", at.format("%Y-%m-%d %H:%M:%S"))),
        None => lines.push("Last run:   never".to_string()),
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_format_shows_paused_state() {
        let status = StatusResponse {
            running: true,
            paused: true,
            next_run_at: Some(Utc::now() + chrono::Duration::seconds(540)),
            last_run_at: None,
            repository: "/srv/site".into(),
            branch: "main".into(),
        };
        let text = format_human(&status);
        assert!(text.contains("running (paused)"));
        assert!(text.contains("/srv/site"));
        assert!(text.contains("Last run:   never"));
    }

    #[test]
    fn human_format_shows_stopped_without_next_run() {
        let status = StatusResponse {
            running: false,
            paused: false,
            next_run_at: None,
            last_run_at: None,
            repository: "/srv/site".into(),
            branch: "main".into(),
        };
        let text = format_human(&status);
        assert!(text.contains("stopped"));
        assert!(text.contains("Next run:   —"));
    }
}
