use plover::cli::{self, Parser, commands, output, ux};
use plover::migration::Ledger;
use plover::PloverError;

use serde::Serialize;
use std::fmt::Display;
use std::path::{Path, PathBuf};


fn report<T: Serialize + Display>(value: T) -> Result<(String, serde_json::Value), PloverError> {
    Ok((value.to_string(), serde_json::to_value(&value)?))
}

async fn dispatch(args: cli::Cli) -> Result<(String, serde_json::Value), PloverError> {
    let directory = PathBuf::from(&args.migration_directory);
    let ledger = Ledger::new(&args.ledger_table)?;
    let mut backend = args.engine.into_backend(&args.db_connection_string);
    tracing::debug!("Using engine '{}' with ledger '{}'", backend.name(), ledger.table());

    match args.command {
        cli::Commands::Peck {} => report(commands::peck(&mut backend, &ledger).await?),
        cli::Commands::Up { args } => {
            report(commands::up(&mut backend, &ledger, &directory, args.plan).await?)
        }
        cli::Commands::Down { args } => {
            report(commands::down(&mut backend, &ledger, &directory, args.plan).await?)
        }
        cli::Commands::Reset {} => report(commands::reset(&mut backend, &ledger, &directory).await?),
        cli::Commands::Remove { table } => {
            report(commands::remove(&mut backend, &ledger, &directory, &table).await?)
        }
        cli::Commands::New { table } => report(commands::new(&directory, &table).await?),
        cli::Commands::Compile { out } => report(commands::compile(&directory, Path::new(&out)).await?),
    }
}

async fn run_command(args: cli::Cli) -> output::PloverOutput<serde_json::Value> {
    let command = args.command.to_string();

    match dispatch(args).await {
        Ok((message, data)) => output::PloverOutput::success(command, message, data),
        Err(e) => {
            tracing::error!("{e}");
            output::PloverOutput::failure(command, &e)
        }
    }
}


/// Entry point for the Plover CLI tool.
///
/// Subcommands:
/// - `peck`: Verify connectivity and provision the ledger table.
/// - `up` / `down`: Apply pending migrations as a batch, or roll back the latest batch.
/// - `reset`: Drop every table defined in the migration directory.
/// - `remove` / `new`: Maintain the contiguous file sequence.
/// - `compile`: Produce checksummed `.json` migrations.
#[tokio::main]
async fn main() {
    let args: cli::Cli = cli::Cli::parse();

    if let Err(e) = ux::setup_logging(args.verbose, args.quiet, args.json) {
        eprintln!("{}", PloverError::from(e));
        std::process::exit(1);
    }

    let json = args.json;
    let result = run_command(args).await;

    if json {
        match serde_json::to_string_pretty(&result) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("{}", PloverError::from(e)),
        }
    } else {
        ux::render_human_output(&result);
    }

    if let output::PloverStatus::Error = result.status {
        std::process::exit(1);
    }
}
