//! The `NN_generate_<table>_table.<ext>` file naming convention.

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;


const VERB: &str = "generate";
const CLASS_SUFFIX: &str = "TableGenerator";

static MIGRATION_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)_generate_([a-z][a-z0-9]*(?:_[a-z0-9]+)*)_table\.([a-z0-9]+(?:\.[a-z0-9]+)*)$")
        .expect("valid regex")
});


#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationExtension {
    /// Hand-written SQL with `-- up` / `-- down` sections.
    Source,
    /// Statement lists produced by `compile`.
    Compiled,
    /// Checksum sibling of a compiled file.
    CompiledMap,
}

impl MigrationExtension {
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Source => "sql",
            Self::Compiled => "json",
            Self::CompiledMap => "json.sha256",
        }
    }

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        [Self::Source, Self::Compiled, Self::CompiledMap]
            .into_iter()
            .find(|ext| ext.suffix() == suffix)
    }

    pub fn is_artifact(&self) -> bool {
        matches!(self, Self::CompiledMap)
    }
}

impl fmt::Display for MigrationExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.suffix())
    }
}


/// Splits a file name into (sequence, table, extension).
fn parse_name(name: &str) -> Option<(u32, &str, MigrationExtension)> {
    let caps = MIGRATION_NAME.captures(name)?;
    let sequence = caps.get(1)?.as_str().parse::<u32>().ok()?;
    let table = caps.get(2)?.as_str();
    let extension = MigrationExtension::from_suffix(caps.get(3)?.as_str())?;

    Some((sequence, table, extension))
}

/// `01_generate_users_table.sql` or `01_generate_users_table.json`.
pub fn is_source_migration_name(name: &str) -> bool {
    parse_name(name).is_some_and(|(_, _, ext)| !ext.is_artifact())
}

/// `01_generate_users_table.json.sha256`.
pub fn is_compiled_artifact_name(name: &str) -> bool {
    parse_name(name).is_some_and(|(_, _, ext)| ext.is_artifact())
}

pub fn sequence_of(name: &str) -> Option<u32> {
    parse_name(name).map(|(sequence, _, _)| sequence)
}

pub fn table_of(name: &str) -> Option<&str> {
    parse_name(name).map(|(_, table, _)| table)
}

/// Renders the file name for the migration at 0-based `position`.
/// The prefix is 1-based and zero-padded to two digits; it widens past 99.
pub fn format_name(table: &str, position: usize, extension: MigrationExtension) -> String {
    format!("{:02}_{VERB}_{table}_table.{}", position + 1, extension.suffix())
}

/// `user_profiles` -> `UserProfilesTableGenerator`
pub fn class_name_for(table: &str) -> String {
    let mut name: String = table
        .split('_')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect();
    name.push_str(CLASS_SUFFIX);
    name
}


/// A migration file on disk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MigrationFile {
    pub sequence: u32,
    pub table: String,
    pub extension: MigrationExtension,
    pub path: PathBuf,
}

impl MigrationFile {
    pub fn parse(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let (sequence, table, extension) = parse_name(name)?;

        Some(MigrationFile {
            sequence,
            table: table.to_string(),
            extension,
            path: path.to_path_buf(),
        })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// The path as stored in the ledger.
    pub fn ledger_key(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    /// The same migration renamed to 0-based `position`, in the same directory.
    pub fn renumbered(&self, position: usize) -> PathBuf {
        self.path.with_file_name(format_name(&self.table, position, self.extension))
    }
}
