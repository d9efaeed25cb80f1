pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "counsel",
    about = "Counsel operator CLI",
    long_about = "Inspect configuration, check collaborator reachability, and dry-run event normalization.",
    after_help = "Examples:\n  counsel doctor --json\n  counsel config\n  counsel normalize --event event.json"
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
    #[command(about = "Validate config and probe the advice and permission services")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Show how an inbound event would be routed, as JSON")]
    Normalize {
        #[arg(long, value_name = "FILE", help = "Path to a JSON event")]
        event: PathBuf,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => commands::config::run(),
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Normalize { event } => commands::normalize::run(&event),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
