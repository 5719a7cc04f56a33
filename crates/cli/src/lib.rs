pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "slashbot",
    about = "Slashbot operator CLI",
    long_about = "Inspect slashbot configuration, check readiness, and sign test webhooks.",
    after_help = "Examples:\n  slashbot doctor --json\n  slashbot config\n  slashbot sign --body 'command=%2Fmatrix&text='"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config and signing secret, then call auth.test against the Slack API")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Compute the request signature headers for a webhook body")]
    Sign {
        #[arg(long, help = "Raw form-encoded request body")]
        body: String,
        #[arg(long, help = "Unix timestamp to sign with (defaults to now)")]
        timestamp: Option<i64>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Sign { body, timestamp } => commands::sign::run(&body, timestamp),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
