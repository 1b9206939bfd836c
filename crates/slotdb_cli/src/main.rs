//! SlotDB CLI
//!
//! Command-line access to a SlotDB SQLite database.
//!
//! # Commands
//!
//! - `resources` - List stored kinds
//! - `one` / `list` - Read entities
//! - `create` / `update` / `destroy` - Write entities
//! - `drop` - Delete a kind entirely
//! - `usage` - Show filter and sort usage counts of a kind
//! - `unlock-all` - Release locks left behind by a crashed process

mod commands;

use clap::{Parser, Subcommand};
use slotdb_core::{Config, Driver, UnknownFieldPolicy};
use slotdb_storage::{SqliteStore, Store};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// SlotDB command-line database tools.
#[derive(Parser)]
#[command(name = "slotdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the database file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(global = true, short, long, default_value = "text")]
    format: String,

    /// Column pairs per kind
    #[arg(global = true, long, default_value_t = 64)]
    columns: u32,

    /// Bytes a value may occupy before overflowing
    #[arg(global = true, long, default_value_t = 255)]
    base_length: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List stored kinds
    Resources,

    /// Show one entity
    One {
        /// Kind name
        kind: String,
        /// Entity id
        id: String,
    },

    /// List entities of a kind
    List {
        /// Kind name
        kind: String,

        /// Filter document (JSON)
        #[arg(long)]
        filter: Option<String>,

        /// Sort terms, `-` prefix for descending (repeatable)
        #[arg(short, long)]
        sort: Vec<String>,

        /// Page number, starting at 1
        #[arg(long, default_value_t = 1)]
        page: u64,

        /// Page size
        #[arg(long)]
        size: Option<u64>,

        /// Ignore filter names the kind has never stored instead of
        /// matching nothing
        #[arg(long)]
        ignore_unknown: bool,
    },

    /// Create an entity
    Create {
        /// Kind name
        kind: String,
        /// Attributes (JSON object); `id` picks the entity id
        attributes: String,
    },

    /// Update an entity
    Update {
        /// Kind name
        kind: String,
        /// Entity id
        id: String,
        /// Attributes to write (JSON object)
        attributes: String,
    },

    /// Delete an entity
    Destroy {
        /// Kind name
        kind: String,
        /// Entity id
        id: String,
    },

    /// Delete a kind with all its entities
    Drop {
        /// Kind name
        kind: String,
    },

    /// Show usage counts of a kind
    Usage {
        /// Kind name
        kind: String,
    },

    /// Release every named lock
    UnlockAll,

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Version = cli.command {
        println!("SlotDB CLI v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let path = cli.path.ok_or("Database path required")?;
    let mut config = Config::new()
        .column_count(cli.columns)
        .value_base_length(cli.base_length)
        .usage_flush_interval(None);
    if let Commands::List {
        ignore_unknown: true,
        ..
    } = cli.command
    {
        config = config.unknown_fields(UnknownFieldPolicy::Ignore);
    }
    let store = SqliteStore::open(&path).await?;
    let driver = Driver::open(Arc::new(store) as Arc<dyn Store>, config).await?;
    let format = cli.format.as_str();

    let result = match cli.command {
        Commands::Resources => commands::kind::resources(&driver, format).await,
        Commands::One { kind, id } => commands::entity::one(&driver, &kind, &id, format).await,
        Commands::List {
            kind,
            filter,
            sort,
            page,
            size,
            ..
        } => {
            let size = size.unwrap_or(driver.config().default_page_size);
            commands::list::run(&driver, &kind, filter.as_deref(), sort, page, size, format).await
        }
        Commands::Create { kind, attributes } => {
            commands::entity::create(&driver, &kind, &attributes, format).await
        }
        Commands::Update {
            kind,
            id,
            attributes,
        } => commands::entity::update(&driver, &kind, &id, &attributes, format).await,
        Commands::Destroy { kind, id } => {
            commands::entity::destroy(&driver, &kind, &id, format).await
        }
        Commands::Drop { kind } => commands::kind::drop(&driver, &kind).await,
        Commands::Usage { kind } => commands::kind::usage(&driver, &kind, format).await,
        Commands::UnlockAll => commands::locks::unlock_all(&driver, format).await,
        Commands::Version => Ok(()),
    };

    driver.close().await?;
    result
}
