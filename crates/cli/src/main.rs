//! threadline CLI — the main entry point.
//!
//! Commands:
//! - `serve`   — Start the HTTP relay server
//! - `chat`    — Run one turn against a thread from the terminal
//! - `threads` — Inspect and clear stored threads

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "threadline",
    about = "threadline — thread-based streaming relay for chat completions",
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
    /// Start the HTTP relay server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Send a message to a thread and stream the reply
    Chat {
        /// The thread to post to (created on demand)
        #[arg(short, long, default_value = "default")]
        thread: String,

        /// The message to send
        message: String,
    },

    /// Inspect and clear stored threads
    Threads {
        #[command(subcommand)]
        action: commands::threads::ThreadsAction,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Chat { thread, message } => commands::chat::run(&thread, &message).await?,
        Commands::Threads { action } => commands::threads::run(action).await?,
    }

    Ok(())
}
