pub mod commands;
pub mod error;
pub mod output;
pub mod ux;

use crate::db;
use crate::migration::DEFAULT_LEDGER_TABLE;
pub use clap::{Parser, Subcommand, ValueEnum};


/// User-facing enum to select engine
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Engine {
    Postgres,
}

impl Engine {
    pub fn into_backend(self, conn_str: &str) -> db::EngineBackend {
        match self {
            Engine::Postgres => db::EngineBackend::Postgres(db::PostgresEngine::new(conn_str)),
        }
    }
}


#[derive(Parser)]
#[command(name = "plover", version, about = "Plover applies table migrations in numbered batches and keeps their files in a contiguous sequence.")]
pub struct Cli {
    #[arg(
        long = "db",
        help = "Database connection string. Please follow your database's recommended format, e.g.:
    postgresql://<username>:<password>@<host>:<port>/<database>\n",
        env = "DB_CONNECTION_STRING",
        hide_env_values = true
    )]
    pub db_connection_string: String,

    #[arg(
        long = "dir",
        help = "Directory containing all migrations",
        env = "MIGRATION_DIRECTORY",
    )]
    pub migration_directory: String,

    #[arg(
        long = "engine",
        value_enum,
        help = "Database engine.",
        default_value_t = Engine::Postgres,
        env = "ENGINE",
    )]
    pub engine: Engine,

    #[arg(
        long = "ledger-table",
        help = "Table recording applied migrations and their batch numbers.",
        default_value = DEFAULT_LEDGER_TABLE,
        env = "LEDGER_TABLE",
    )]
    pub ledger_table: String,

    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        help = "Set level of verbosity. [default: INFO]\n\t-v: DEBUG\n\t-vv: TRACE\n--quiet takes precedence over --verbose."
    )]
    pub verbose: u8,

    #[arg(
        short,
        long,
        action = clap::ArgAction::SetTrue,
        help = "Disable all information logs (only ERROR level logs are shown).\n--quiet takes precedence over --verbose."
    )]
    pub quiet: bool,

    #[arg(
        long,
        action = clap::ArgAction::SetTrue,
        help = "Enable JSON output format. Human readable output is disabled when this flag is set."
    )]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Parser)]
pub struct BatchArgs {
    #[arg(
        long,
        help = "Show the batch plan and skip execution.",
    )]
    pub plan: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Test connection to the database and create the ledger table if missing.")]
    Peck {},

    #[command(about = "Apply every pending migration as a new batch.")]
    Up {
        #[command(flatten)]
        args: BatchArgs,
    },
    #[command(about = "Roll back the latest batch.")]
    Down {
        #[command(flatten)]
        args: BatchArgs,
    },

    #[command(about = "Drop every table defined in the migration directory, then the ledger table.")]
    Reset {},

    #[command(about = "Delete a table's migration files and renumber the rest.
⚠️ Directories holding .sql files are reset first.")]
    Remove {
        #[arg(help = "Table whose migration files are deleted.")]
        table: String,
    },

    #[command(about = "Create the next migration file for a table.")]
    New {
        #[arg(help = "Table the new migration creates.")]
        table: String,
    },

    #[command(about = "Compile .sql migrations into checksummed .json files.")]
    Compile {
        #[arg(long = "out", help = "Directory receiving the compiled files.")]
        out: String,
    },
}

impl std::fmt::Display for Commands {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Commands::Peck { .. } => "peck",
            Commands::Up { .. } => "up",
            Commands::Down { .. } => "down",
            Commands::Reset { .. } => "reset",
            Commands::Remove { .. } => "remove",
            Commands::New { .. } => "new",
            Commands::Compile { .. } => "compile",
        };
        write!(f, "{name}")
    }
}
