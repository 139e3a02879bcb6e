//! docchat CLI: the main entry point.
//!
//! Commands:
//! - `init`: Write a default config file
//! - `chat`: Ask questions about documents, once or interactively
//! - `chunk`: Show how a document would be chunked
//! - `history`: List or clear saved exchanges

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "docchat",
    about = "docchat: ask questions about your documents",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "DOCCHAT_LOG_JSON")]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,

    /// Chat about one or more documents
    Chat {
        /// Text documents to load (repeatable)
        #[arg(short, long = "doc", value_name = "PATH")]
        docs: Vec<PathBuf>,

        /// Ask a single question instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Print the answer as it is generated
        #[arg(short, long)]
        stream: bool,

        /// Number of chunks to retrieve per question
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Split a document into chunks and print them
    Chunk {
        path: PathBuf,

        #[arg(long)]
        max_chunk_size: Option<usize>,

        #[arg(long)]
        overlap: Option<usize>,

        /// Print chunks as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show saved chat history
    History {
        /// Delete every saved exchange
        #[arg(long)]
        clear: bool,

        /// Print one exchange in full
        #[arg(long, value_name = "ID", conflicts_with = "clear")]
        show: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Init => commands::init::run().await?,
        Commands::Chat {
            docs,
            message,
            stream,
            top_k,
        } => {
            commands::chat::run(commands::chat::ChatArgs {
                docs,
                message,
                stream,
                top_k,
            })
            .await?
        }
        Commands::Chunk {
            path,
            max_chunk_size,
            overlap,
            json,
        } => commands::chunk::run(&path, max_chunk_size, overlap, json).await?,
        Commands::History { clear, show } => commands::history::run(clear, show).await?,
    }

    Ok(())
}
