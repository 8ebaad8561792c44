// cadence CLI entry point.

use clap::Parser;

mod client;
mod commands;
mod exit_code;
mod output;

#[derive(Parser)]
#[command(name = "cadence", about = "Automated git commits on a human-looking schedule")]
struct Cli {
    /// Daemon API base URL (also `CADENCE_URL`).
    #[arg(long)]
    url: Option<String>,

    #[command(subcommand)]
    command: commands::Command,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let client = client::DaemonClient::new(client::resolve_base_url(cli.url));

    if let Err(error) = commands::run(cli.command, &client).await {
        output::print_anyhow_error(&error);
        exit_code::ExitCode::from_error(&error).exit();
    }
}
