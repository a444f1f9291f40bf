//! DawnAgent CLI: the main entry point.
//!
//! Commands:
//! - `chat`      Interactive morning conversation
//! - `context`   Print the assembled session prompt
//! - `personas`  List available personas
//! - `memory`    Inspect the memory document

use clap::{Parser, Subcommand};

mod commands;
mod input;

use commands::chat::ChatArgs;

#[derive(Parser)]
#[command(
    name = "dawnagent",
    about = "DawnAgent: a voice-first morning companion",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a conversation
    Chat(ChatArgs),

    /// Print the assembled session context and exit
    Context {
        /// Persona name or path
        #[arg(short, long)]
        persona: Option<String>,

        /// Weather line for the session context
        #[arg(short, long)]
        weather: Option<String>,
    },

    /// List available personas
    Personas,

    /// Inspect the memory document
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },
}

#[derive(Subcommand)]
enum MemoryAction {
    /// Print the memory document
    Show,
    /// Check the memory document against its size budget
    Budget,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so streamed replies on stdout stay clean
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Chat(args) => commands::chat::run(args).await?,
        Commands::Context { persona, weather } => commands::context::run(persona, weather).await?,
        Commands::Personas => commands::personas::run().await?,
        Commands::Memory { action } => match action {
            MemoryAction::Show => commands::memory::show().await?,
            MemoryAction::Budget => commands::memory::budget().await?,
        },
    }

    Ok(())
}
