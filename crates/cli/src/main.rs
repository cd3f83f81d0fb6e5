//! twin CLI, the main entry point.
//!
//! With no subcommand twin opens an interactive session (or answers one
//! `-p` prompt and exits). Subcommands:
//! - `doctor`: check Ollama, models, directories and helpers
//! - `history`: show or clear this directory's session history
//! - `improvements`: list recent self-improvements

use clap::{Parser, Subcommand};
use twin_core::Mode;

mod commands;

#[derive(Parser)]
#[command(
    name = "twin",
    about = "twin: a local-LLM assistant that can read, edit and run things for you",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Force work or personal mode (skips detection)
    #[arg(long, value_parser = parse_mode, global = true)]
    mode: Option<Mode>,

    /// Agent to start with
    #[arg(long)]
    agent: Option<String>,

    /// Model name or alias (e.g. fast, smart)
    #[arg(long)]
    model: Option<String>,

    /// Answer one prompt and exit
    #[arg(short, long)]
    prompt: Option<String>,

    /// Enable verbose logging (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Diagnose the local setup
    Doctor,

    /// Show the session history for the current directory
    History {
        /// Delete the history file instead
        #[arg(long)]
        clear: bool,
    },

    /// List recent self-improvements
    Improvements {
        /// How many to show
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,
    },
}

fn parse_mode(s: &str) -> Result<Mode, String> {
    s.parse()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so REPL output stays clean.
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Some(Commands::Doctor) => commands::doctor::run().await?,
        Some(Commands::History { clear }) => commands::history::run(clear)?,
        Some(Commands::Improvements { count }) => commands::improvements::run(count)?,
        None => {
            let args = commands::chat::ChatArgs {
                mode: cli.mode,
                agent: cli.agent,
                model: cli.model,
                prompt: cli.prompt,
            };
            if let Some(code) = commands::chat::run(args).await? {
                std::process::exit(code);
            }
        }
    }

    Ok(())
}
