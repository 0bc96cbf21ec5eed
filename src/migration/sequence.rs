use crate::db::QueryExecutor;
use crate::migration::collector;
use crate::migration::definition::Registry;
use crate::migration::error::{MigrationError, MigrationErrorKind};
use crate::migration::executor::{BatchExecutor, ResetSummary};
use crate::migration::ledger::Ledger;
use crate::migration::naming::{self, MigrationExtension, MigrationFile};

use futures_util::future::try_join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};


#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RemovalSummary {
    pub removed: Vec<PathBuf>,
    pub renamed: Vec<(PathBuf, PathBuf)>,
    pub reset: Option<ResetSummary>,
}

impl fmt::Display for RemovalSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let removed = self
            .removed
            .iter()
            .map(|path| path.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "removed {} file(s): {removed}", self.removed.len())
    }
}


pub struct SequenceManager<'a> {
    registry: &'a Registry,
    ledger: &'a Ledger,
}

impl<'a> SequenceManager<'a> {
    pub fn new(registry: &'a Registry, ledger: &'a Ledger) -> Self {
        SequenceManager { registry, ledger }
    }

    /// Deletes every file of `table` from `directory` and renumbers the rest from 1.
    ///
    /// Directories holding source files are reset first. Purely compiled directories
    /// only lose the ledger rows of the deleted files.
    pub async fn remove(
        &self,
        executor: &mut dyn QueryExecutor,
        table: &str,
        directory: &Path,
    ) -> Result<RemovalSummary, MigrationError> {
        let files = collector::collect(directory, true).await?;
        let (to_delete, remaining): (Vec<MigrationFile>, Vec<MigrationFile>) =
            files.iter().cloned().partition(|file| file.table == table);

        if to_delete.is_empty() {
            return Err(MigrationError::new(MigrationErrorKind::TableNotFound {
                table: table.to_string(),
                directory: directory.to_path_buf(),
            }))
        }

        let sources: Vec<MigrationFile> = files
            .into_iter()
            .filter(|file| file.extension == MigrationExtension::Source)
            .collect();

        let reset = if sources.is_empty() {
            self.forget_deleted(executor, &to_delete).await?;
            None
        } else {
            tracing::info!("Source migrations present, resetting before removal...");
            Some(BatchExecutor::new(self.registry, self.ledger).reset(executor, &sources).await?)
        };

        let removed: Vec<PathBuf> = to_delete.into_iter().map(|file| file.path).collect();
        try_join_all(removed.iter().map(|path| async move {
            tokio::fs::remove_file(path)
                .await
                .map_err(|e| MigrationError::io(path, e))
        }))
        .await?;
        tracing::info!("Deleted {} file(s) of table '{table}'", removed.len());

        let renamed = renumber(remaining).await?;

        Ok(RemovalSummary { removed, renamed, reset })
    }

    async fn forget_deleted(
        &self,
        executor: &mut dyn QueryExecutor,
        deleted: &[MigrationFile],
    ) -> Result<(), MigrationError> {
        let snapshot = self.ledger.load(executor).await?;
        let recorded = snapshot.paths();
        let stale: Vec<PathBuf> = deleted
            .iter()
            .filter(|file| recorded.contains(file.ledger_key().as_str()))
            .map(|file| file.path.clone())
            .collect();

        if !stale.is_empty() {
            self.ledger.forget(executor, &stale).await?;
        }
        Ok(())
    }
}


/// Renames `files` so their sequences run 1, 2, 3... in their current order.
/// Siblings sharing a sequence move together.
async fn renumber(files: Vec<MigrationFile>) -> Result<Vec<(PathBuf, PathBuf)>, MigrationError> {
    let mut groups: BTreeMap<u32, Vec<MigrationFile>> = BTreeMap::new();
    for file in files {
        groups.entry(file.sequence).or_default().push(file);
    }

    let mut upward = Vec::new();
    let mut downward = Vec::new();
    for (position, (sequence, group)) in groups.into_iter().enumerate() {
        for file in group {
            let target = file.renumbered(position);
            if target == file.path {
                continue;
            }
            if position + 1 > sequence as usize {
                upward.push((file.path, target));
            } else {
                downward.push((file.path, target));
            }
        }
    }

    // Upward moves only happen at the front, highest first, so no rename lands on a file not yet moved.
    let mut renamed = Vec::new();
    for (from, to) in upward.into_iter().rev().chain(downward) {
        tokio::fs::rename(&from, &to)
            .await
            .map_err(|e| MigrationError::io(&from, e))?;
        tracing::debug!("Renamed {from:?} -> {to:?}");
        renamed.push((from, to));
    }

    Ok(renamed)
}


/// Name the next source migration for `table` would get in `directory`.
pub async fn next_file_name(table: &str, directory: &Path) -> Result<String, MigrationError> {
    let last = collector::collect(directory, false)
        .await?
        .last()
        .map_or(0, |file| file.sequence as usize);

    let name = naming::format_name(table, last, MigrationExtension::Source);
    if naming::table_of(&name) != Some(table) {
        return Err(MigrationError::new(MigrationErrorKind::InvalidIdentifier(table.to_string())))
    }

    Ok(name)
}
