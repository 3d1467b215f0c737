//! # parley-cli
//!
//! Command-line interface for Parley.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use parley_core::error::format_error_with_suggestion;
use parley_core::Config;
use parley_providers::ProviderRegistry;
use parley_session::{CompactionEngine, SqliteConversationStore};

mod commands;

/// Application context containing shared state.
pub struct AppContext {
    pub config: Config,
    pub registry: ProviderRegistry,
}

impl AppContext {
    /// Open the conversation store in the configured data directory.
    pub fn open_store(&self) -> anyhow::Result<SqliteConversationStore> {
        Ok(SqliteConversationStore::open(&self.config)?)
    }

    /// Build a compaction engine over the registered backends.
    pub fn engine(&self) -> CompactionEngine {
        CompactionEngine::from_config(&self.config, &self.registry)
    }
}

/// Parley - conversation store with context compaction
#[derive(Parser)]
#[command(name = "parley")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory holding the conversation database
    #[arg(long, global = true, env = "PARLEY_DATA_DIR", value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Conversation management
    Conversation {
        #[command(subcommand)]
        action: ConversationAction,
    },
    /// Summarize older messages to free context space
    Compress {
        /// Conversation ID
        id: String,
        /// Owner of the conversation
        #[arg(short, long)]
        user: String,
        /// Non-system messages to keep verbatim
        #[arg(short, long)]
        keep_recent: Option<usize>,
    },
    /// Bring back every archived message
    Restore {
        /// Conversation ID
        id: String,
        /// Owner of the conversation
        #[arg(short, long)]
        user: String,
    },
    /// Recompute and store the conversation's token count
    Recount {
        /// Conversation ID
        id: String,
        /// Owner of the conversation
        #[arg(short, long)]
        user: String,
    },
    /// Show version information
    Version,
    /// Diagnose installation issues
    Doctor,
}

#[derive(Subcommand)]
pub enum ConversationAction {
    /// Start a new conversation
    New {
        /// Owner of the conversation
        #[arg(short, long)]
        user: String,
        /// Model name
        #[arg(short, long)]
        model: String,
        /// Backend serving the model (local, hosted)
        #[arg(short, long)]
        provider: Option<String>,
        /// Context window of the model, in tokens
        #[arg(short, long, default_value = "8192")]
        window: u32,
        /// Conversation title
        #[arg(short, long)]
        title: Option<String>,
    },
    /// Append a message
    Add {
        /// Conversation ID
        id: String,
        /// Owner of the conversation
        #[arg(short, long)]
        user: String,
        /// Message role (system, user, assistant)
        #[arg(short, long)]
        role: String,
        /// Message text
        #[arg(short, long)]
        content: String,
    },
    /// Show a conversation and its active messages
    Show {
        /// Conversation ID
        id: String,
        /// Owner of the conversation
        #[arg(short, long)]
        user: String,
        /// Also list archived messages
        #[arg(short, long)]
        archived: bool,
    },
    /// List a user's conversations
    List {
        /// Owner of the conversations
        #[arg(short, long)]
        user: String,
        /// Maximum conversations to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Delete a conversation
    Delete {
        /// Conversation ID
        id: String,
        /// Owner of the conversation
        #[arg(short, long)]
        user: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging. Reports go to stdout, so logs go to stderr.
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Load configuration
    let mut config = Config::load_validated().unwrap_or_else(|e| {
        tracing::warn!(
            "Failed to load config, using defaults: {}",
            format_error_with_suggestion(&e)
        );
        Config::default()
    });
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = Some(dir);
    }

    // Initialize provider registry
    let registry = ProviderRegistry::from_config(&config);

    // Create application context
    let ctx = Arc::new(AppContext { config, registry });

    match cli.command {
        Commands::Conversation { action } => {
            commands::conversation::handle(action, &ctx).await?;
        }
        Commands::Compress {
            id,
            user,
            keep_recent,
        } => {
            commands::compact::compress(&ctx, &id, &user, keep_recent).await?;
        }
        Commands::Restore { id, user } => {
            commands::compact::restore(&ctx, &id, &user).await?;
        }
        Commands::Recount { id, user } => {
            commands::compact::recount(&ctx, &id, &user).await?;
        }
        Commands::Version => {
            println!("parley {}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Doctor => {
            commands::doctor::run(&ctx).await?;
        }
    }

    Ok(())
}
