//! Definitions backed by migration files.
//!
//! A source file (`.sql`) holds two sections:
//!
//! ```sql
//! -- up
//! CREATE TABLE users (id SERIAL PRIMARY KEY, name TEXT NOT NULL);
//! -- down
//! DROP TABLE users;
//! ```
//!
//! `compile` turns each source file into a `.json` file with the statements already split,
//! plus a `.json.sha256` checksum that is verified when the compiled file is loaded.

use crate::db::QueryExecutor;
use crate::migration::collector;
use crate::migration::definition::{Definition, Registry};
use crate::migration::error::MigrationError;
use crate::migration::naming::{MigrationExtension, MigrationFile};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};


#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlDefinition {
    table: String,
    up: Vec<String>,
    down: Vec<String>,
}

static SECTION_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^--\s*(up|down)\s*$").expect("valid regex")
});

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Preamble,
    Up,
    Down,
}


/// Splits SQL into single statements, falling back to naive `;` splitting
/// when the parser does not understand the input.
fn split_statements(sql: &str) -> Vec<String> {
    if sql.trim().is_empty() {
        return Vec::new()
    }

    match Parser::parse_sql(&PostgreSqlDialect {}, sql) {
        Ok(statements) => statements.iter().map(|stmt| stmt.to_string()).collect(),
        Err(e) => {
            tracing::warn!("SQL parsing failed, using naive semicolon splitting: {e}");
            sql.split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        }
    }
}

fn checksum(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}


impl SqlDefinition {
    pub fn new(table: &str, up: Vec<String>, down: Vec<String>) -> Self {
        SqlDefinition { table: table.to_string(), up, down }
    }

    /// Parses `-- up` / `-- down` sections. A missing or empty down section
    /// defaults to dropping the table.
    pub fn from_source(table: &str, content: &str) -> Result<Self, MigrationError> {
        let mut section = Section::Preamble;
        let mut seen_up = false;
        let mut up = String::new();
        let mut down = String::new();

        for line in content.lines() {
            let trimmed = line.trim();
            if let Some(caps) = SECTION_MARKER.captures(trimmed) {
                if caps[1].eq_ignore_ascii_case("up") {
                    section = Section::Up;
                    seen_up = true;
                } else {
                    section = Section::Down;
                }
                continue;
            }
            if trimmed.starts_with("--") {
                continue;
            }

            match section {
                Section::Up => { up.push_str(line); up.push('\n'); }
                Section::Down => { down.push_str(line); down.push('\n'); }
                Section::Preamble => {}
            }
        }

        if !seen_up {
            return Err(MigrationError::resolution(format!(
                "migration for table '{table}' has no '-- up' section"
            )))
        }

        let mut down = split_statements(&down);
        if down.is_empty() {
            down.push(format!("DROP TABLE {table}"));
        }

        Ok(SqlDefinition::new(table, split_statements(&up), down))
    }

    /// Loads a source or compiled migration file.
    pub async fn load(path: &Path) -> Result<Self, MigrationError> {
        let file = MigrationFile::parse(path).ok_or_else(|| {
            MigrationError::resolution(format!("{path:?} is not a migration file"))
        })?;

        let content = tokio::fs::read(path).await.map_err(|e| {
            MigrationError::resolution(format!("failed to read {path:?}: {e}"))
        })?;

        match file.extension {
            MigrationExtension::Source => {
                let text = String::from_utf8(content).map_err(|e| {
                    MigrationError::resolution(format!("{path:?} is not valid UTF-8: {e}"))
                })?;
                Self::from_source(&file.table, &text)
            }
            MigrationExtension::Compiled => {
                verify_checksum(path, &content).await?;
                serde_json::from_slice(&content).map_err(|e| {
                    MigrationError::resolution(format!("failed to decode {path:?}: {e}"))
                })
            }
            MigrationExtension::CompiledMap => Err(MigrationError::resolution(format!(
                "{path:?} is a compiled artifact, not a definition"
            ))),
        }
    }

    pub fn up(&self) -> &[String] {
        &self.up
    }

    pub fn down(&self) -> &[String] {
        &self.down
    }

    async fn run(
        &self,
        executor: &mut dyn QueryExecutor,
        statements: &[String],
    ) -> anyhow::Result<()> {
        for (index, stmt) in statements.iter().enumerate() {
            executor
                .execute(stmt)
                .await
                .with_context(|| format!("statement {} of table '{}'", index + 1, self.table))?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Definition for SqlDefinition {
    fn table_name(&self) -> &str {
        &self.table
    }

    async fn create_table(&self, executor: &mut dyn QueryExecutor) -> anyhow::Result<()> {
        self.run(executor, &self.up).await
    }

    async fn drop_table(&self, executor: &mut dyn QueryExecutor) -> anyhow::Result<()> {
        self.run(executor, &self.down).await
    }
}


/// Checks a compiled file against its `.sha256` sibling, when one exists.
async fn verify_checksum(path: &Path, content: &[u8]) -> Result<(), MigrationError> {
    let sidecar = path.with_extension(MigrationExtension::CompiledMap.suffix());
    let expected = match tokio::fs::read_to_string(&sidecar).await {
        Ok(expected) => expected,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No checksum for {path:?}");
            return Ok(())
        }
        Err(e) => return Err(MigrationError::resolution(format!("failed to read {sidecar:?}: {e}"))),
    };

    let found = checksum(content);
    if expected.trim() != found {
        return Err(MigrationError::resolution(format!(
            "checksum mismatch for {path:?}: expected {}, found {found}",
            expected.trim()
        )))
    }

    Ok(())
}


/// Builds a registry with one [`SqlDefinition`] per migration file in `directory`.
pub async fn load_registry(directory: &Path) -> Result<Registry, MigrationError> {
    let mut registry = Registry::new();

    for file in collector::collect(directory, false).await? {
        let definition = SqlDefinition::load(&file.path).await?;
        registry.register(Arc::new(definition));
    }
    tracing::debug!("Registered {} definition(s) from {directory:?}", registry.len());

    Ok(registry)
}


/// Writes a compiled `.json` file and its `.json.sha256` checksum into `out_dir`
/// for every source migration in `source_dir`. Returns the written paths.
pub async fn compile(source_dir: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, MigrationError> {
    tokio::fs::create_dir_all(out_dir)
        .await
        .map_err(|e| MigrationError::io(out_dir, e))?;

    let mut written = Vec::new();
    for file in collector::collect(source_dir, false).await? {
        if file.extension != MigrationExtension::Source {
            tracing::debug!("Skipping non-source file {:?}", file.path);
            continue;
        }

        let definition = SqlDefinition::load(&file.path).await?;
        let json = serde_json::to_vec_pretty(&definition).map_err(|e| {
            MigrationError::resolution(format!("failed to encode {:?}: {e}", file.path))
        })?;

        let target = out_dir.join(file.file_name())
            .with_extension(MigrationExtension::Compiled.suffix());
        let sidecar = target.with_extension(MigrationExtension::CompiledMap.suffix());

        tokio::fs::write(&target, &json)
            .await
            .map_err(|e| MigrationError::io(&target, e))?;
        tokio::fs::write(&sidecar, checksum(&json))
            .await
            .map_err(|e| MigrationError::io(&sidecar, e))?;

        tracing::info!("Compiled {:?} -> {:?}", file.path, target);
        written.push(target);
        written.push(sidecar);
    }

    if written.is_empty() {
        tracing::warn!("No source migrations found in {source_dir:?}");
    }

    Ok(written)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryEngine;
    use crate::migration::error::MigrationErrorKind;

    const USERS: &str = "\
-- users table
-- up
CREATE TABLE users (id INT, name TEXT);
CREATE TABLE IF NOT EXISTS users_archive (id INT);
-- down
DROP TABLE users_archive;
DROP TABLE users;
";

    #[test]
    fn parses_up_and_down_sections() {
        let definition = SqlDefinition::from_source("users", USERS).unwrap();

        assert_eq!(definition.table_name(), "users");
        assert_eq!(definition.up().len(), 2);
        assert!(definition.up()[0].starts_with("CREATE TABLE users"));
        assert_eq!(definition.down(), ["DROP TABLE users_archive", "DROP TABLE users"]);
    }

    #[test]
    fn missing_down_section_drops_the_table() {
        let definition = SqlDefinition::from_source("users", "-- up\nCREATE TABLE users (id INT);").unwrap();
        assert_eq!(definition.down(), ["DROP TABLE users"]);
    }

    #[test]
    fn comments_starting_like_markers_stay_comments() {
        let source = "\
-- up
-- downgrade path lives below
CREATE TABLE users (id INT);
-- down
-- uppercase names were used before
-- update: keep this last
DROP TABLE users;
";
        let definition = SqlDefinition::from_source("users", source).unwrap();

        assert_eq!(definition.up(), ["CREATE TABLE users (id INT)"]);
        assert_eq!(definition.down(), ["DROP TABLE users"]);
    }

    #[test]
    fn markers_are_case_and_space_insensitive() {
        let definition = SqlDefinition::from_source("users", "--UP\nCREATE TABLE users (id INT);\n  --  Down  \nDROP TABLE users;").unwrap();
        assert_eq!(definition.up().len(), 1);
        assert_eq!(definition.down(), ["DROP TABLE users"]);
    }

    #[test]
    fn missing_up_section_is_rejected() {
        let err = SqlDefinition::from_source("users", "CREATE TABLE users (id INT);").unwrap_err();
        assert!(matches!(err.kind, MigrationErrorKind::Resolution(_)));
    }

    #[tokio::test]
    async fn runs_statements_against_the_executor() {
        let definition = SqlDefinition::from_source("users", USERS).unwrap();
        let mut engine = MemoryEngine::new();

        definition.create_table(&mut engine).await.unwrap();
        assert!(engine.has_table("users"));
        assert!(engine.has_table("users_archive"));

        definition.drop_table(&mut engine).await.unwrap();
        assert!(engine.table_names().is_empty());
    }

    #[tokio::test]
    async fn failing_statements_carry_context() {
        let definition = SqlDefinition::from_source("users", USERS).unwrap();
        let mut engine = MemoryEngine::new();
        engine.fail_on("users_archive");

        let err = definition.create_table(&mut engine).await.unwrap_err();
        assert!(format!("{err:#}").contains("statement 2 of table 'users'"));
    }

    #[tokio::test]
    async fn compiled_files_round_trip_and_are_verified() {
        let source = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        std::fs::write(source.path().join("01_generate_users_table.sql"), USERS).unwrap();

        let written = compile(source.path(), out.path()).await.unwrap();
        assert_eq!(written.len(), 2);

        let compiled = out.path().join("01_generate_users_table.json");
        let loaded = SqlDefinition::load(&compiled).await.unwrap();
        assert_eq!(loaded, SqlDefinition::from_source("users", USERS).unwrap());

        let registry = load_registry(out.path()).await.unwrap();
        assert_eq!(registry.len(), 1);

        std::fs::write(&compiled, b"{\"table\":\"users\",\"up\":[],\"down\":[]}").unwrap();
        let err = SqlDefinition::load(&compiled).await.unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
    }
}
