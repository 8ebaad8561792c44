// CLI subcommand dispatch.

use clap::Subcommand;

use crate::client::DaemonClient;

pub mod control;
pub mod history;
pub mod stats;
pub mod status;

#[derive(Subcommand)]
pub enum Command {
    /// Show scheduler status
    Status(status::StatusArgs),
    /// Show recent commit attempts
    History(history::HistoryArgs),
    /// Show aggregate statistics
    Stats(stats::StatsArgs),
    /// Suppress scheduled commits (timer keeps ticking)
    Pause(control::ControlArgs),
    /// Resume scheduled commits
    Resume(control::ControlArgs),
    /// Run a commit attempt now and wait for it
    Trigger(control::ControlArgs),
    /// Start the scheduler timer
    Start(control::ControlArgs),
    /// Stop the scheduler timer
    Stop(control::ControlArgs),
}

pub async fn run(command: Command, client: &DaemonClient) -> anyhow::Result<()> {
    use cadence_common::types::ControlAction;

    match command {
        Command::Status(args) => status::run(args, client).await,
        Command::History(args) => history::run(args, client).await,
        Command::Stats(args) => stats::run(args, client).await,
        Command::Pause(args) => control::run(args, ControlAction::Pause, client).await,
        Command::Resume(args) => control::run(args, ControlAction::Resume, client).await,
        Command::Trigger(args) => control::run(args, ControlAction::Trigger, client).await,
        Command::Start(args) => control::run(args, ControlAction::Start, client).await,
        Command::Stop(args) => control::run(args, ControlAction::Stop, client).await,
    }
}
