mod commands;
mod logging;
mod progress;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use commands::Context;

#[derive(Parser)]
#[command(name = "elif-migrate")]
#[command(about = "Apply, revert and inspect SQL migrations for MySQL, PostgreSQL and SQLite")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(long, short, global = true, default_value = "migrate.yaml")]
    config: PathBuf,

    /// Target database (optional when the config names exactly one)
    #[arg(long, short, global = true)]
    database: Option<String>,

    /// Show debug output, including executed SQL
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending migrations
    Up {
        /// Apply at most this many migrations
        #[arg(long, short)]
        limit: Option<usize>,
    },

    /// Revert ran migrations, most recent first
    Down {
        /// Revert at most this many migrations (all when omitted)
        #[arg(long, short)]
        limit: Option<usize>,
    },

    /// Revert every ran migration
    Reset,

    /// Create a new migration with empty up and down scripts
    Create {
        /// Migration name
        name: String,
    },

    /// List migrations
    List {
        #[arg(value_enum, default_value_t = ListKind::All)]
        kind: ListKind,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show every migration with its state
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the most recently ran migration
    Last,

    /// Print the migration that would run next
    Next,

    /// Database management
    Db {
        #[command(subcommand)]
        db_command: DbCommands,
    },

    /// Fix the ledger by hand after a failed ledger write
    Repair {
        #[command(subcommand)]
        repair_command: RepairCommands,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ListKind {
    All,
    Pending,
    Ran,
}

#[derive(Subcommand)]
enum DbCommands {
    /// Create the database if missing, then the ledger table
    Setup,

    /// Drop the database
    Drop,

    /// Report whether the database exists
    Exists,
}

#[derive(Subcommand)]
enum RepairCommands {
    /// Record a migration as ran without executing it
    MarkApplied {
        /// Migration id
        id: String,
    },

    /// Remove a migration from the ledger without executing it
    MarkReverted {
        /// Migration id
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;

    let context = Context::load(&cli.config, cli.database.as_deref())?;

    match cli.command {
        Commands::Up { limit } => commands::migrate::up(&context, limit).await?,
        Commands::Down { limit } => commands::migrate::down(&context, limit).await?,
        Commands::Reset => commands::migrate::reset(&context).await?,
        Commands::Create { name } => commands::migrate::create(&context, &name)?,
        Commands::List { kind, json } => commands::migrate::list(&context, kind, json).await?,
        Commands::Status { json } => commands::migrate::status(&context, json).await?,
        Commands::Last => commands::migrate::last(&context).await?,
        Commands::Next => commands::migrate::next(&context).await?,
        Commands::Db { db_command } => match db_command {
            DbCommands::Setup => commands::db::setup(&context).await?,
            DbCommands::Drop => commands::db::drop(&context).await?,
            DbCommands::Exists => commands::db::exists(&context).await?,
        },
        Commands::Repair { repair_command } => match repair_command {
            RepairCommands::MarkApplied { id } => {
                commands::repair::mark_applied(&context, &id).await?
            }
            RepairCommands::MarkReverted { id } => {
                commands::repair::mark_reverted(&context, &id).await?
            }
        },
    }

    Ok(())
}
