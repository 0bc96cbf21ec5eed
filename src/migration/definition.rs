use crate::db::QueryExecutor;
use crate::migration::error::MigrationError;
use crate::migration::naming::MigrationFile;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;


/// A migration bound to exactly one table.
#[async_trait::async_trait]
pub trait Definition: Send + Sync {
    fn table_name(&self) -> &str;
    async fn create_table(&self, executor: &mut dyn QueryExecutor) -> anyhow::Result<()>;
    async fn drop_table(&self, executor: &mut dyn QueryExecutor) -> anyhow::Result<()>;
}


/// A definition together with the migration file it was resolved for.
#[derive(Clone)]
pub struct ResolvedDefinition {
    pub file: MigrationFile,
    pub definition: Arc<dyn Definition>,
}

impl ResolvedDefinition {
    pub fn path(&self) -> &Path {
        &self.file.path
    }
}


/// Maps table names to the definitions registered for them.
#[derive(Clone, Default)]
pub struct Registry {
    definitions: HashMap<String, Vec<Arc<dyn Definition>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, definition: Arc<dyn Definition>) -> &mut Self {
        let table = definition.table_name().to_string();
        tracing::trace!("Registering definition for table '{table}'");
        self.definitions.entry(table).or_default().push(definition);
        self
    }

    pub fn with(mut self, definition: impl Definition + 'static) -> Self {
        self.register(Arc::new(definition));
        self
    }

    pub fn len(&self) -> usize {
        self.definitions.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Resolves the single definition registered for the table named by `path`.
    pub fn resolve_one(&self, path: &Path) -> Result<ResolvedDefinition, MigrationError> {
        let file = MigrationFile::parse(path).ok_or_else(|| {
            MigrationError::resolution(format!("{path:?} is not a migration file"))
        })?;

        let candidates = self
            .definitions
            .get(&file.table)
            .map(Vec::as_slice)
            .unwrap_or_default();

        match candidates {
            [definition] => Ok(ResolvedDefinition { definition: Arc::clone(definition), file }),
            [] => Err(MigrationError::resolution(format!(
                "no definition registered for table '{}' ({path:?})",
                file.table
            ))),
            many => Err(MigrationError::resolution(format!(
                "{} definitions registered for table '{}' ({path:?}), expected exactly one",
                many.len(),
                file.table
            ))),
        }
    }

    /// Resolves every path, in order. An empty input is an error.
    pub fn resolve(&self, paths: &[PathBuf]) -> Result<Vec<ResolvedDefinition>, MigrationError> {
        if paths.is_empty() {
            return Err(MigrationError::resolution("no definitions"))
        }

        paths.iter().map(|path| self.resolve_one(path)).collect()
    }
}
