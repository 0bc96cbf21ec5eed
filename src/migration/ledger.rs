use crate::db::{LedgerRow, QueryExecutor};
use crate::migration::error::{MigrationError, MigrationErrorKind};

use regex::Regex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::LazyLock;


pub const DEFAULT_LEDGER_TABLE: &str = "plover_migrations";

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex")
});


/// Doubles single quotes and wraps the value in them.
fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}


/// Rows of the ledger as read by one [`Ledger::load`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LedgerSnapshot {
    rows: Vec<LedgerRow>,
}

impl LedgerSnapshot {
    pub fn new(rows: Vec<LedgerRow>) -> Self {
        LedgerSnapshot { rows }
    }

    pub fn rows(&self) -> &[LedgerRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Highest batch recorded, 0 when the ledger is empty.
    pub fn latest_batch(&self) -> u16 {
        self.rows.iter().map(|row| row.batch).max().unwrap_or(0)
    }

    pub fn paths(&self) -> HashSet<&str> {
        self.rows.iter().map(|row| row.path.as_str()).collect()
    }

    /// Paths recorded under `batch`, in insertion (`id`) order.
    pub fn paths_in_batch(&self, batch: u16) -> Vec<PathBuf> {
        let mut rows: Vec<&LedgerRow> = self.rows.iter().filter(|row| row.batch == batch).collect();
        rows.sort_by_key(|row| row.id);

        rows.into_iter().map(|row| PathBuf::from(&row.path)).collect()
    }
}


/// The persisted record of applied migrations.
#[derive(Clone, Debug)]
pub struct Ledger {
    table: String,
}

impl Ledger {
    pub fn new(table: &str) -> Result<Self, MigrationError> {
        if !IDENTIFIER.is_match(table) {
            return Err(MigrationError::new(MigrationErrorKind::InvalidIdentifier(table.to_string())))
        }
        Ok(Ledger { table: table.to_string() })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Reads every row, creating the ledger table first if it does not exist yet.
    pub async fn load(&self, executor: &mut dyn QueryExecutor) -> Result<LedgerSnapshot, MigrationError> {
        match executor.query_ledger(&format!("SELECT * FROM {};", self.table)).await {
            Ok(rows) => {
                tracing::debug!("Loaded {} ledger row(s) from '{}'", rows.len(), self.table);
                Ok(LedgerSnapshot::new(rows))
            }
            Err(e) if e.is_relation_not_found() => {
                tracing::info!("Ledger table '{}' not found, creating it...", self.table);
                self.provision(executor).await?;
                Ok(LedgerSnapshot::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn provision(&self, executor: &mut dyn QueryExecutor) -> Result<(), MigrationError> {
        executor.execute(&format!(
            "CREATE TABLE {} (\
                id SERIAL PRIMARY KEY, \
                path TEXT NOT NULL, \
                batch SMALLINT NOT NULL CHECK (batch >= 0)\
            );",
            self.table
        )).await?;

        Ok(())
    }

    /// Inserts one row per path under `batch`.
    pub async fn record(
        &self,
        executor: &mut dyn QueryExecutor,
        paths: &[PathBuf],
        batch: u16,
    ) -> Result<(), MigrationError> {
        let values = paths
            .iter()
            .map(|path| format!("({}, {batch})", quote_literal(&path.to_string_lossy())))
            .collect::<Vec<_>>()
            .join(", ");

        executor.execute(&format!("INSERT INTO {} (path, batch) VALUES {values};", self.table)).await?;
        tracing::debug!("Recorded {} path(s) under batch {batch}", paths.len());

        Ok(())
    }

    /// Deletes the rows for `paths`.
    pub async fn forget(
        &self,
        executor: &mut dyn QueryExecutor,
        paths: &[PathBuf],
    ) -> Result<(), MigrationError> {
        let literals = paths
            .iter()
            .map(|path| quote_literal(&path.to_string_lossy()))
            .collect::<Vec<_>>()
            .join(", ");

        executor.execute(&format!("DELETE FROM {} WHERE path IN ({literals});", self.table)).await?;
        tracing::debug!("Forgot {} path(s)", paths.len());

        Ok(())
    }

    /// Drops the ledger table itself.
    pub async fn drop_storage(&self, executor: &mut dyn QueryExecutor) -> Result<(), MigrationError> {
        executor.execute(&format!("DROP TABLE {};", self.table)).await?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{EngineError, EngineErrorKind, MemoryEngine};

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn rejects_unsafe_table_names() {
        assert!(Ledger::new("plover_migrations").is_ok());
        let err = Ledger::new("ledger; DROP TABLE users").unwrap_err();
        assert!(matches!(err.kind, MigrationErrorKind::InvalidIdentifier(_)));
    }

    #[test]
    fn quotes_literals() {
        assert_eq!(quote_literal("/tmp/it's"), "'/tmp/it''s'");
    }

    #[tokio::test]
    async fn load_provisions_missing_storage() {
        let ledger = Ledger::new(DEFAULT_LEDGER_TABLE).unwrap();
        let mut engine = MemoryEngine::new();

        let snapshot = ledger.load(&mut engine).await.unwrap();

        assert!(snapshot.is_empty());
        assert!(engine.has_table(DEFAULT_LEDGER_TABLE));
        assert!(engine.statements()[1].starts_with("CREATE TABLE plover_migrations"));
    }

    #[tokio::test]
    async fn other_failures_propagate() {
        let ledger = Ledger::new("ledger").unwrap();
        let mut engine = MemoryEngine::new();
        engine.fail_on("ledger");

        let err = ledger.load(&mut engine).await.unwrap_err();
        assert!(matches!(
            err.kind,
            MigrationErrorKind::Engine(EngineError { kind: EngineErrorKind::Rejected(_), .. })
        ));
        assert!(!engine.has_table("ledger"));
    }

    #[tokio::test]
    async fn records_and_forgets_paths() {
        let ledger = Ledger::new("ledger").unwrap();
        let mut engine = MemoryEngine::new();
        ledger.load(&mut engine).await.unwrap();

        ledger.record(&mut engine, &paths(&["/m/01_a"]), 1).await.unwrap();
        ledger.record(&mut engine, &paths(&["/m/02_b", "/m/03_c"]), 2).await.unwrap();

        let snapshot = ledger.load(&mut engine).await.unwrap();
        assert_eq!(snapshot.rows().len(), 3);
        assert_eq!(snapshot.latest_batch(), 2);
        assert_eq!(snapshot.paths_in_batch(2), paths(&["/m/02_b", "/m/03_c"]));

        ledger.forget(&mut engine, &paths(&["/m/01_a", "/m/03_c"])).await.unwrap();

        let snapshot = ledger.load(&mut engine).await.unwrap();
        assert_eq!(snapshot.paths(), HashSet::from(["/m/02_b"]));
    }

    #[test]
    fn batch_paths_follow_row_ids_not_read_order() {
        let row = |id, path: &str, batch| LedgerRow { id, path: path.to_string(), batch };
        let snapshot = LedgerSnapshot::new(vec![
            row(7, "/m/03_c", 2),
            row(1, "/m/01_a", 1),
            row(5, "/m/02_b", 2),
        ]);

        assert_eq!(snapshot.paths_in_batch(2), paths(&["/m/02_b", "/m/03_c"]));
    }

    #[tokio::test]
    async fn records_many_paths_in_one_statement() {
        let ledger = Ledger::new("ledger").unwrap();
        let mut engine = MemoryEngine::new();
        ledger.load(&mut engine).await.unwrap();

        ledger.record(&mut engine, &paths(&["/m/01_a", "/m/02_b"]), 3).await.unwrap();

        assert_eq!(
            engine.statements().last().map(String::as_str),
            Some("INSERT INTO ledger (path, batch) VALUES ('/m/01_a', 3), ('/m/02_b', 3)")
        );
    }

    #[tokio::test]
    async fn drop_storage_removes_the_table() {
        let ledger = Ledger::new("ledger").unwrap();
        let mut engine = MemoryEngine::new();
        ledger.load(&mut engine).await.unwrap();

        ledger.drop_storage(&mut engine).await.unwrap();
        assert!(!engine.has_table("ledger"));
    }
}
