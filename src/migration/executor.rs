use crate::db::QueryExecutor;
use crate::migration::definition::{Registry, ResolvedDefinition};
use crate::migration::direction::MigrationDirection;
use crate::migration::error::{MigrationError, MigrationErrorKind};
use crate::migration::ledger::Ledger;
use crate::migration::naming::MigrationFile;

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;


/// Outcome of one apply or revert call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub direction: MigrationDirection,
    pub paths: Vec<PathBuf>,
    pub total: usize,
}

impl BatchSummary {
    pub fn new(direction: MigrationDirection, paths: Vec<PathBuf>, total: usize) -> Self {
        BatchSummary { direction, paths, total }
    }

    pub fn completed(&self) -> usize {
        self.paths.len()
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} table(s) {}", self.completed(), self.total, self.direction.outcome())
    }
}


/// Outcome of a reset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResetSummary {
    pub dropped: Vec<String>,
    pub total: usize,
}

impl fmt::Display for ResetSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} table(s) dropped", self.dropped.len(), self.total)
    }
}


enum BatchState {
    Running,
    PartiallyFailed(MigrationError),
    Completed,
}

/// Progress of one apply/revert loop. Lives for a single call.
struct BatchRun {
    direction: MigrationDirection,
    total: usize,
    done: Vec<PathBuf>,
    state: BatchState,
}

impl BatchRun {
    fn new(direction: MigrationDirection, total: usize) -> Self {
        BatchRun { direction, total, done: Vec::new(), state: BatchState::Running }
    }

    async fn step(&mut self, executor: &mut dyn QueryExecutor, resolved: &ResolvedDefinition) {
        let BatchState::Running = self.state else { return };

        let found = resolved.definition.table_name();
        if found != resolved.file.table {
            self.state = BatchState::PartiallyFailed(MigrationError::new(
                MigrationErrorKind::ContractViolation {
                    path: resolved.file.path.clone(),
                    expected: resolved.file.table.clone(),
                    found: found.to_string(),
                },
            ));
            return;
        }

        tracing::info!("{} table '{}'...", self.direction.verb(), resolved.file.table);
        let outcome = match self.direction {
            MigrationDirection::Up => resolved.definition.create_table(executor).await,
            MigrationDirection::Down => resolved.definition.drop_table(executor).await,
        };

        match outcome {
            Ok(()) => self.done.push(resolved.file.path.clone()),
            Err(e) => {
                tracing::error!("{} of {:?} failed: {e:#}", self.direction.noun(), resolved.file.path);
                self.state = BatchState::PartiallyFailed(MigrationError::new(
                    MigrationErrorKind::Definition { path: resolved.file.path.clone(), source: e },
                ));
            }
        }
    }

    fn finish(&mut self) {
        if let BatchState::Running = self.state {
            self.state = BatchState::Completed;
        }
    }

    fn summary(&self) -> BatchSummary {
        BatchSummary::new(self.direction, self.done.clone(), self.total)
    }
}


pub struct BatchExecutor<'a> {
    registry: &'a Registry,
    ledger: &'a Ledger,
}

impl<'a> BatchExecutor<'a> {
    pub fn new(registry: &'a Registry, ledger: &'a Ledger) -> Self {
        BatchExecutor { registry, ledger }
    }

    /// Creates the tables for `paths` in order and records the applied ones under `batch`.
    pub async fn apply(
        &self,
        executor: &mut dyn QueryExecutor,
        paths: &[PathBuf],
        batch: u16,
    ) -> Result<BatchSummary, MigrationError> {
        self.run(executor, paths, MigrationDirection::Up, batch).await
    }

    /// Drops the tables for `paths` in order and forgets the dropped ones.
    pub async fn revert(
        &self,
        executor: &mut dyn QueryExecutor,
        paths: &[PathBuf],
    ) -> Result<BatchSummary, MigrationError> {
        self.run(executor, paths, MigrationDirection::Down, 0).await
    }

    async fn run(
        &self,
        executor: &mut dyn QueryExecutor,
        paths: &[PathBuf],
        direction: MigrationDirection,
        batch: u16,
    ) -> Result<BatchSummary, MigrationError> {
        let mut run = BatchRun::new(direction, paths.len());

        let definitions = match self.registry.resolve(paths) {
            Ok(definitions) => definitions,
            Err(e) => return Err(batch_failure(run.summary(), e)),
        };

        for resolved in &definitions {
            run.step(executor, resolved).await;
            if !matches!(run.state, BatchState::Running) {
                break;
            }
        }
        run.finish();

        // Progress is committed before any failure is surfaced.
        if !run.done.is_empty() {
            let committed = match direction {
                MigrationDirection::Up => self.ledger.record(executor, &run.done, batch).await,
                MigrationDirection::Down => self.ledger.forget(executor, &run.done).await,
            };
            if let Err(commit_error) = committed {
                if let BatchState::PartiallyFailed(cause) = &run.state {
                    tracing::error!("Batch failed before the ledger commit: {cause}");
                }
                return Err(batch_failure(run.summary(), commit_error));
            }
        }

        let summary = run.summary();
        match std::mem::replace(&mut run.state, BatchState::Completed) {
            BatchState::PartiallyFailed(cause) => Err(batch_failure(summary, cause)),
            BatchState::Running | BatchState::Completed => {
                tracing::info!("{summary}");
                Ok(summary)
            }
        }
    }

    /// Drops the table of every definition in `files`, newest first, then the ledger itself.
    /// Individual drop failures are counted as tables that did not exist.
    pub async fn reset(
        &self,
        executor: &mut dyn QueryExecutor,
        files: &[MigrationFile],
    ) -> Result<ResetSummary, MigrationError> {
        let paths: Vec<PathBuf> = files.iter().map(|file| file.path.clone()).collect();
        let definitions = self.registry.resolve(&paths)?;

        let mut dropped = Vec::new();
        for resolved in definitions.iter().rev() {
            let table = resolved.definition.table_name();
            match executor.execute(&format!("DROP TABLE {table};")).await {
                Ok(()) => dropped.push(table.to_string()),
                Err(e) => tracing::debug!("Skipping table '{table}': {e}"),
            }
        }

        if let Err(e) = self.ledger.drop_storage(executor).await {
            tracing::debug!("Skipping ledger table '{}': {e}", self.ledger.table());
        }

        let summary = ResetSummary { dropped, total: definitions.len() };
        tracing::info!("Reset: {summary}");

        Ok(summary)
    }
}


fn batch_failure(summary: BatchSummary, cause: MigrationError) -> MigrationError {
    MigrationError::new(MigrationErrorKind::Batch { summary, source: Box::new(cause) })
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryEngine, QueryExecutor};
    use crate::migration::definition::Definition;
    use crate::migration::definition::tests::TableDefinition;
    use std::sync::Arc;

    fn p(name: &str) -> PathBuf {
        PathBuf::from(format!("/m/{name}"))
    }

    fn users_profiles_posts() -> (Registry, Vec<PathBuf>) {
        let registry = Registry::new()
            .with(TableDefinition::new("users"))
            .with(TableDefinition::new("profiles"))
            .with(TableDefinition::new("posts"));
        let paths = vec![
            p("01_generate_users_table.sql"),
            p("02_generate_profiles_table.sql"),
            p("03_generate_posts_table.sql"),
        ];
        (registry, paths)
    }

    async fn setup() -> (Ledger, MemoryEngine) {
        let ledger = Ledger::new("ledger").unwrap();
        let mut engine = MemoryEngine::new();
        ledger.load(&mut engine).await.unwrap();
        (ledger, engine)
    }

    #[tokio::test]
    async fn applies_every_path_in_order() {
        let (registry, paths) = users_profiles_posts();
        let (ledger, mut engine) = setup().await;

        let summary = BatchExecutor::new(&registry, &ledger)
            .apply(&mut engine, &paths, 1)
            .await
            .unwrap();

        assert_eq!(summary.to_string(), "3/3 table(s) created");
        assert!(engine.has_table("users") && engine.has_table("profiles") && engine.has_table("posts"));
        let rows = engine.rows("ledger");
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|row| row.batch == 1));
    }

    #[tokio::test]
    async fn partial_failure_commits_only_the_applied_prefix() {
        let (registry, paths) = users_profiles_posts();
        let (ledger, mut engine) = setup().await;
        engine.fail_on("profiles");

        let err = BatchExecutor::new(&registry, &ledger)
            .apply(&mut engine, &paths, 1)
            .await
            .unwrap_err();

        assert!(err.to_string().starts_with("1/3 table(s) created: "), "{err}");
        assert_eq!(err.summary().map(BatchSummary::completed), Some(1));
        assert!(!engine.has_table("posts"));

        let rows = engine.rows("ledger");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].path, p("01_generate_users_table.sql").to_string_lossy());
    }

    #[tokio::test]
    async fn first_failure_commits_nothing() {
        let (registry, paths) = users_profiles_posts();
        let (ledger, mut engine) = setup().await;
        engine.fail_on("users");

        let err = BatchExecutor::new(&registry, &ledger)
            .apply(&mut engine, &paths, 1)
            .await
            .unwrap_err();

        assert!(err.to_string().starts_with("0/3 table(s) created: "));
        assert!(engine.rows("ledger").is_empty());
    }

    #[tokio::test]
    async fn revert_forgets_dropped_paths() {
        let (registry, paths) = users_profiles_posts();
        let (ledger, mut engine) = setup().await;
        let executor = BatchExecutor::new(&registry, &ledger);
        executor.apply(&mut engine, &paths, 1).await.unwrap();

        let reversed: Vec<PathBuf> = paths.iter().rev().cloned().collect();
        let summary = executor.revert(&mut engine, &reversed).await.unwrap();

        assert_eq!(summary.to_string(), "3/3 table(s) dropped");
        assert!(engine.rows("ledger").is_empty());
        assert!(!engine.has_table("users"));
    }

    #[tokio::test]
    async fn partial_revert_keeps_undropped_rows() {
        let (registry, paths) = users_profiles_posts();
        let (ledger, mut engine) = setup().await;
        let executor = BatchExecutor::new(&registry, &ledger);
        executor.apply(&mut engine, &paths, 1).await.unwrap();
        engine.fail_on("profiles");

        let reversed: Vec<PathBuf> = paths.iter().rev().cloned().collect();
        let err = executor.revert(&mut engine, &reversed).await.unwrap_err();

        assert!(err.to_string().starts_with("1/3 table(s) dropped: "));
        let remaining: Vec<String> = engine.rows("ledger").into_iter().map(|row| row.path).collect();
        assert_eq!(remaining.len(), 2);
        assert!(!remaining.contains(&p("03_generate_posts_table.sql").to_string_lossy().into_owned()));
    }

    #[tokio::test]
    async fn unresolvable_paths_fail_before_anything_runs() {
        let (registry, _) = users_profiles_posts();
        let (ledger, mut engine) = setup().await;

        let err = BatchExecutor::new(&registry, &ledger)
            .apply(&mut engine, &[p("01_generate_comments_table.sql")], 1)
            .await
            .unwrap_err();

        assert!(err.to_string().starts_with("0/1 table(s) created: "));
        assert!(matches!(err.root_kind(), MigrationErrorKind::Resolution(_)));
    }

    /// Reports a different table every time it is asked.
    struct Drifting(std::sync::atomic::AtomicUsize);

    #[async_trait::async_trait]
    impl Definition for Drifting {
        fn table_name(&self) -> &str {
            match self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst) {
                0 => "users",
                _ => "somewhere_else",
            }
        }

        async fn create_table(&self, _: &mut dyn QueryExecutor) -> anyhow::Result<()> {
            Ok(())
        }

        async fn drop_table(&self, _: &mut dyn QueryExecutor) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn definitions_must_stay_bound_to_their_table() {
        let mut registry = Registry::new();
        registry.register(Arc::new(Drifting(Default::default())));
        let (ledger, mut engine) = setup().await;

        let err = BatchExecutor::new(&registry, &ledger)
            .apply(&mut engine, &[p("01_generate_users_table.sql")], 1)
            .await
            .unwrap_err();

        assert!(matches!(err.root_kind(), MigrationErrorKind::ContractViolation { .. }));
        assert!(engine.rows("ledger").is_empty());
    }

    #[tokio::test]
    async fn reset_tolerates_missing_tables() {
        let (registry, paths) = users_profiles_posts();
        let (ledger, mut engine) = setup().await;
        let executor = BatchExecutor::new(&registry, &ledger);
        executor.apply(&mut engine, &paths[..2], 1).await.unwrap();

        let files: Vec<MigrationFile> = paths.iter().filter_map(|path| MigrationFile::parse(path)).collect();
        let summary = executor.reset(&mut engine, &files).await.unwrap();

        assert_eq!(summary.to_string(), "2/3 table(s) dropped");
        assert_eq!(summary.dropped, vec!["profiles", "users"]);
        assert!(engine.table_names().is_empty());
    }
}
