// Control actions: pause, resume, trigger, start, stop.

use clap::Args;

use cadence_common::protocol::api::{ControlResponse, TriggerOutcome};
use cadence_common::types::ControlAction;

use crate::client::DaemonClient;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct ControlArgs {
    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

pub async fn run(
    args: ControlArgs,
    action: ControlAction,
    client: &DaemonClient,
) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let response = client.control(action).await?;
    output::print_output(format, &response, format_human)?;
    Ok(())
}

fn format_human(response: &ControlResponse) -> String {
    match &response.attempt {
        None => format!("Scheduler {}.", response.status),
        Some(TriggerOutcome::NoChanges) => "Nothing to commit: working tree is clean.".to_string(),
        Some(TriggerOutcome::Recorded { attempt }) if attempt.success => {
            let push = match attempt.push_success {
                Some(true) => ", pushed",
                Some(false) => ", push failed",
                None => "",
            };
            format!(
                "Committed {} ({} files{push}): {}",
                attempt.short_hash(),
                attempt.files_changed,
                attempt.message
            )
        }
        Some(TriggerOutcome::Recorded { attempt }) => format!(
            "Commit attempt failed: {}",
            attempt.error_message.as_deref().unwrap_or("unknown error")
        ),
    }
}
