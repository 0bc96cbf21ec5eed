use crate::db::QueryExecutor;
use crate::migration::collector;
use crate::migration::error::{MigrationError, MigrationErrorKind};
use crate::migration::ledger::Ledger;

use serde::Serialize;
use std::path::{Path, PathBuf};


/// Migrations to apply under a new batch number.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ApplyPlan {
    pub batch: u16,
    pub paths: Vec<PathBuf>,
}

/// Migrations of the latest batch, in the order they must be reverted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UndoPlan {
    pub batch: u16,
    pub paths: Vec<PathBuf>,
}


pub struct BatchPlanner<'a> {
    ledger: &'a Ledger,
}

impl<'a> BatchPlanner<'a> {
    pub fn new(ledger: &'a Ledger) -> Self {
        BatchPlanner { ledger }
    }

    /// Files in `directory` not yet in the ledger, under batch `latest + 1`.
    pub async fn plan_apply(
        &self,
        executor: &mut dyn QueryExecutor,
        directory: &Path,
    ) -> Result<ApplyPlan, MigrationError> {
        let snapshot = self.ledger.load(executor).await?;
        let files = collector::collect(directory, false).await?;

        let latest = snapshot.latest_batch();
        let batch = latest
            .checked_add(1)
            .filter(|next| *next <= i16::MAX as u16)
            .ok_or_else(|| MigrationError::new(MigrationErrorKind::BatchLimit(latest)))?;

        let applied = snapshot.paths();
        let paths: Vec<PathBuf> = files
            .into_iter()
            .filter(|file| !applied.contains(file.ledger_key().as_str()))
            .map(|file| file.path)
            .collect();

        if paths.is_empty() {
            return Err(MigrationError::new(MigrationErrorKind::NothingToApply(directory.to_path_buf())))
        }
        tracing::info!("Planned {} migration(s) under batch {batch}", paths.len());

        Ok(ApplyPlan { batch, paths })
    }

    /// The latest batch's paths, newest first.
    ///
    /// Reverting in reverse order assumes that migrations applied later in a batch
    /// may depend on earlier ones. Nothing checks that assumption.
    pub async fn plan_undo(&self, executor: &mut dyn QueryExecutor) -> Result<UndoPlan, MigrationError> {
        let snapshot = self.ledger.load(executor).await?;

        let batch = snapshot.latest_batch();
        let mut paths = snapshot.paths_in_batch(batch);
        paths.reverse();

        if paths.is_empty() {
            return Err(MigrationError::new(MigrationErrorKind::NothingToUndo))
        }
        tracing::info!("Planned rollback of {} migration(s) from batch {batch}", paths.len());

        Ok(UndoPlan { batch, paths })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryEngine;
    use std::fs;

    fn setup(names: &[&str]) -> (tempfile::TempDir, Vec<PathBuf>) {
        let dir = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        let paths = names
            .iter()
            .map(|name| {
                fs::write(root.join(name), "").unwrap();
                root.join(name)
            })
            .collect();
        (dir, paths)
    }

    #[tokio::test]
    async fn first_plan_uses_batch_one() {
        let (dir, paths) = setup(&["01_generate_users_table.sql", "02_generate_profiles_table.sql"]);
        let ledger = Ledger::new("ledger").unwrap();
        let mut engine = MemoryEngine::new();

        let plan = BatchPlanner::new(&ledger).plan_apply(&mut engine, dir.path()).await.unwrap();

        assert_eq!(plan, ApplyPlan { batch: 1, paths });
    }

    #[tokio::test]
    async fn planning_is_idempotent() {
        let (dir, _) = setup(&["01_generate_users_table.sql", "02_generate_profiles_table.sql"]);
        let ledger = Ledger::new("ledger").unwrap();
        let mut engine = MemoryEngine::new();
        let planner = BatchPlanner::new(&ledger);

        let first = planner.plan_apply(&mut engine, dir.path()).await.unwrap();
        let second = planner.plan_apply(&mut engine, dir.path()).await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn pending_excludes_ledger_paths() {
        let (dir, paths) = setup(&["01_generate_users_table.sql", "02_generate_profiles_table.sql"]);
        let ledger = Ledger::new("ledger").unwrap();
        let mut engine = MemoryEngine::new();
        ledger.load(&mut engine).await.unwrap();
        ledger.record(&mut engine, &paths[..1], 1).await.unwrap();

        let plan = BatchPlanner::new(&ledger).plan_apply(&mut engine, dir.path()).await.unwrap();

        assert_eq!(plan, ApplyPlan { batch: 2, paths: paths[1..].to_vec() });
    }

    #[tokio::test]
    async fn nothing_to_apply_when_everything_is_recorded() {
        let (dir, paths) = setup(&["01_generate_users_table.sql"]);
        let ledger = Ledger::new("ledger").unwrap();
        let mut engine = MemoryEngine::new();
        ledger.load(&mut engine).await.unwrap();
        ledger.record(&mut engine, &paths, 1).await.unwrap();

        let err = BatchPlanner::new(&ledger).plan_apply(&mut engine, dir.path()).await.unwrap_err();
        assert!(matches!(err.kind, MigrationErrorKind::NothingToApply(_)));
    }

    #[tokio::test]
    async fn undo_targets_the_latest_batch_in_reverse() {
        let ledger = Ledger::new("ledger").unwrap();
        let mut engine = MemoryEngine::new();
        ledger.load(&mut engine).await.unwrap();
        let p = |name: &str| PathBuf::from(format!("/m/{name}"));
        ledger.record(&mut engine, &[p("01_a")], 1).await.unwrap();
        ledger.record(&mut engine, &[p("02_b"), p("03_c")], 2).await.unwrap();

        let plan = BatchPlanner::new(&ledger).plan_undo(&mut engine).await.unwrap();

        assert_eq!(plan, UndoPlan { batch: 2, paths: vec![p("03_c"), p("02_b")] });
    }

    #[tokio::test]
    async fn nothing_to_undo_on_an_empty_ledger() {
        let ledger = Ledger::new("ledger").unwrap();
        let mut engine = MemoryEngine::new();

        let err = BatchPlanner::new(&ledger).plan_undo(&mut engine).await.unwrap_err();
        assert!(matches!(err.kind, MigrationErrorKind::NothingToUndo));
    }
}
