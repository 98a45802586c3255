pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use commands::compose::ComposeArgs;

#[derive(Debug, Parser)]
#[command(
    name = "miled",
    about = "MilEd agent engine operator CLI",
    long_about = "Inspect configuration, check config document health, and preview composed agent prompts.",
    after_help = "Examples:\n  miled doctor --json\n  miled config\n  miled compose --document config.json --bot-type tutor --export"
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
    #[command(about = "Validate config, config document reachability, and document lint")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Resolve an agent from a local document and print its composed prompt")]
    Compose {
        #[arg(long, help = "Path to the config document JSON")]
        document: PathBuf,
        #[arg(long, help = "Agent bot type to resolve")]
        bot_type: String,
        #[arg(long, help = "Caller faculty id used for access checks")]
        faculty_id: Option<String>,
        #[arg(long, help = "Render only the publicly visible prompt")]
        export: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Compose { document, bot_type, faculty_id, export } => {
            commands::compose::run(ComposeArgs { document, bot_type, faculty_id, export })
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
