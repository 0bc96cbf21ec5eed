use crate::cli::error::{PloverError, PloverErrorKind};
use crate::db::QueryExecutor;
use crate::migration::{
    self, BatchExecutor, BatchPlanner, BatchSummary, Ledger, MigrationDirection, MigrationError,
    MigrationErrorKind, RemovalSummary, ResetSummary, SequenceManager, sql,
};
use crate::cli::ux;

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};


#[derive(Debug, Serialize)]
pub struct PeckReport {
    pub ledger_table: String,
    pub rows: usize,
    pub latest_batch: u16,
}

impl fmt::Display for PeckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Ledger '{}' holds {} row(s), latest batch {}",
            self.ledger_table, self.rows, self.latest_batch
        )
    }
}

#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub direction: MigrationDirection,
    pub batch: u16,
    pub planned: Vec<PathBuf>,
    pub summary: Option<BatchSummary>,
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.summary {
            Some(summary) => write!(f, "Batch {}: {summary}", self.batch),
            None => write!(
                f,
                "{} plan for batch {}: {} file(s), nothing executed",
                self.direction.noun(),
                self.batch,
                self.planned.len()
            ),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreatedFiles {
    pub paths: Vec<PathBuf>,
}

impl fmt::Display for CreatedFiles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.paths.as_slice() {
            [single] => write!(f, "Created {}", single.display()),
            many => write!(f, "Created {} file(s)", many.len()),
        }
    }
}


/// Ensures the database is reachable and the ledger table exists.
pub async fn peck(executor: &mut dyn QueryExecutor, ledger: &Ledger) -> Result<PeckReport, PloverError> {
    tracing::info!("Pecking database...");
    let snapshot = ledger.load(executor).await?;
    tracing::info!("Pecking successful 🐦");

    Ok(PeckReport {
        ledger_table: ledger.table().to_string(),
        rows: snapshot.rows().len(),
        latest_batch: snapshot.latest_batch(),
    })
}

/// Applies every pending migration in `directory` as one new batch.
pub async fn up(
    executor: &mut dyn QueryExecutor,
    ledger: &Ledger,
    directory: &Path,
    flag_plan: bool,
) -> Result<BatchReport, PloverError> {
    let plan = BatchPlanner::new(ledger).plan_apply(executor, directory).await?;
    ux::show_plan(MigrationDirection::Up, plan.batch, &plan.paths);

    if flag_plan {
        tracing::info!("Planning complete - no migrations executed 🐦");
        return Ok(BatchReport { direction: MigrationDirection::Up, batch: plan.batch, planned: plan.paths, summary: None })
    }

    let registry = sql::load_registry(directory).await?;
    let summary = BatchExecutor::new(&registry, ledger)
        .apply(executor, &plan.paths, plan.batch)
        .await?;
    tracing::info!("Migration completed - batch {} recorded 🐦", plan.batch);

    Ok(BatchReport { direction: MigrationDirection::Up, batch: plan.batch, planned: plan.paths, summary: Some(summary) })
}

/// Reverts the latest batch, newest migration first.
pub async fn down(
    executor: &mut dyn QueryExecutor,
    ledger: &Ledger,
    directory: &Path,
    flag_plan: bool,
) -> Result<BatchReport, PloverError> {
    let plan = BatchPlanner::new(ledger).plan_undo(executor).await?;
    ux::show_plan(MigrationDirection::Down, plan.batch, &plan.paths);

    if flag_plan {
        tracing::info!("Planning complete - no rollbacks executed 🐦");
        return Ok(BatchReport { direction: MigrationDirection::Down, batch: plan.batch, planned: plan.paths, summary: None })
    }

    let registry = sql::load_registry(directory).await?;
    let summary = BatchExecutor::new(&registry, ledger)
        .revert(executor, &plan.paths)
        .await?;
    tracing::info!("Rollback completed - batch {} forgotten 🐦", plan.batch);

    Ok(BatchReport { direction: MigrationDirection::Down, batch: plan.batch, planned: plan.paths, summary: Some(summary) })
}

/// Drops every table defined in `directory`, then the ledger table.
pub async fn reset(
    executor: &mut dyn QueryExecutor,
    ledger: &Ledger,
    directory: &Path,
) -> Result<ResetSummary, PloverError> {
    let files = migration::collect(directory, false).await?;
    if files.is_empty() {
        return Err(MigrationError::new(MigrationErrorKind::NothingToReset(directory.to_path_buf())).into())
    }

    let registry = sql::load_registry(directory).await?;
    let summary = BatchExecutor::new(&registry, ledger).reset(executor, &files).await?;

    Ok(summary)
}

/// Deletes the migration files of `table` and renumbers the remaining ones.
pub async fn remove(
    executor: &mut dyn QueryExecutor,
    ledger: &Ledger,
    directory: &Path,
    table: &str,
) -> Result<RemovalSummary, PloverError> {
    let registry = sql::load_registry(directory).await?;
    let summary = SequenceManager::new(&registry, ledger)
        .remove(executor, table, directory)
        .await?;
    tracing::info!("{summary} 🐦");

    Ok(summary)
}

fn template(table: &str) -> String {
    format!(
        "-- {}\n-- up\nCREATE TABLE {table} (\n    id SERIAL PRIMARY KEY\n);\n\n-- down\nDROP TABLE {table};\n",
        migration::class_name_for(table)
    )
}

/// Writes a new source migration for `table` with the next free sequence number.
pub async fn new(directory: &Path, table: &str) -> Result<CreatedFiles, PloverError> {
    tokio::fs::create_dir_all(directory).await.map_err(|source| PloverError {
        kind: PloverErrorKind::IoDirectoryCreate { source, path: directory.to_path_buf() },
    })?;

    let name = migration::next_file_name(table, directory).await?;
    let path = directory.join(name);

    tokio::fs::write(&path, template(table)).await.map_err(|source| PloverError {
        kind: PloverErrorKind::IoFileWrite { source, path: path.clone() },
    })?;
    tracing::info!("New migration written to {}", path.display());

    Ok(CreatedFiles { paths: vec![path] })
}

/// Compiles every source migration in `directory` into `out`.
pub async fn compile(directory: &Path, out: &Path) -> Result<CreatedFiles, PloverError> {
    let paths = sql::compile(directory, out).await?;
    tracing::info!("Compiled {} file(s) into {} 🐦", paths.len(), out.display());

    Ok(CreatedFiles { paths })
}
