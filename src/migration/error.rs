use crate::db::EngineError;
use crate::migration::BatchSummary;

use std::error::Error;
use std::fmt;
use std::path::PathBuf;


#[derive(Debug)]
#[non_exhaustive]
pub struct MigrationError {
    pub kind: MigrationErrorKind
}

impl MigrationError {
    pub fn new(kind: MigrationErrorKind) -> Self {
        MigrationError { kind }
    }

    pub(crate) fn resolution(message: impl Into<String>) -> Self {
        MigrationError { kind: MigrationErrorKind::Resolution(message.into()) }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MigrationError { kind: MigrationErrorKind::Io { path: path.into(), source } }
    }

    /// Counts carried by an executor failure, if any.
    pub fn summary(&self) -> Option<&BatchSummary> {
        match &self.kind {
            MigrationErrorKind::Batch { summary, .. } => Some(summary),
            _ => None,
        }
    }

    /// The innermost migration error kind, looking through batch failures.
    pub fn root_kind(&self) -> &MigrationErrorKind {
        match &self.kind {
            MigrationErrorKind::Batch { source, .. } => source.root_kind(),
            kind => kind,
        }
    }
}

impl fmt::Display for MigrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl Error for MigrationError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		Some(&self.kind)
	}
}

#[derive(Debug)]
pub enum MigrationErrorKind {
    Batch { summary: BatchSummary, source: Box<MigrationError> },
    BatchLimit(u16),
    ContractViolation { path: PathBuf, expected: String, found: String },
    Definition { path: PathBuf, source: anyhow::Error },
    DirectoryAccess { path: PathBuf, source: std::io::Error },
    Engine(EngineError),
    InvalidIdentifier(String),
    Io { path: PathBuf, source: std::io::Error },
    NamingViolation { directory: PathBuf, name: String },
    NothingToApply(PathBuf),
    NothingToReset(PathBuf),
    NothingToUndo,
    Resolution(String),
    TableNotFound { table: String, directory: PathBuf },
}

impl fmt::Display for MigrationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Batch { summary, source } => write!(f, "{summary}: {source}"),
            Self::BatchLimit(batch) => write!(f, "Batch number limit reached: {batch}"),
            Self::ContractViolation { path, expected, found } => write!(
                f,
                "Definition for {path:?} is bound to table '{found}', expected '{expected}'"
            ),
            Self::Definition { path, source } => write!(f, "Migration {path:?} failed: {source:#}"),
            Self::DirectoryAccess { path, .. } => write!(f, "Failed to read directory: {path:?}"),
            Self::Engine(error) => write!(f, "{}", error.kind),
            Self::InvalidIdentifier(name) => write!(f, "Invalid SQL identifier: '{name}'"),
            Self::Io { path, source } => write!(f, "I/O failure on {path:?}: {source}"),
            Self::NamingViolation { directory, name } => write!(
                f,
                "'{name}' in {directory:?} does not follow the NN_generate_<table>_table.<ext> convention"
            ),
            Self::NothingToApply(directory) => write!(f, "Nothing to apply in {directory:?}"),
            Self::NothingToReset(directory) => write!(f, "Nothing to reset in {directory:?}"),
            Self::NothingToUndo => write!(f, "Nothing to undo"),
            Self::Resolution(message) => write!(f, "Failed to resolve definition: {message}"),
            Self::TableNotFound { table, directory } => {
                write!(f, "No migration found for table '{table}' in {directory:?}")
            }
        }
    }
}

impl Error for MigrationErrorKind {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
            Self::Batch { source, .. } => Some(&**source),
			Self::Definition { source, .. } => Some(&**source),
			Self::DirectoryAccess { source, .. } => Some(source),
			Self::Engine(source) => Some(source),
			Self::Io { source, .. } => Some(source),
			_ => None,
		}
	}
}

impl From<EngineError> for MigrationError {
    fn from(error: EngineError) -> Self {
        MigrationError { kind: MigrationErrorKind::Engine(error) }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::EngineErrorKind;
    use crate::migration::MigrationDirection;
    use std::io;

    #[test]
    fn migration_error_display_formats_correctly() {
        let dir = PathBuf::from("/tmp/migrations");
        let cases: Vec<(MigrationErrorKind, &str)> = vec![
            (MigrationErrorKind::BatchLimit(32767), "limit reached"),
            (
                MigrationErrorKind::ContractViolation {
                    path: dir.join("01_generate_users_table.sql"),
                    expected: "users".into(),
                    found: "people".into(),
                },
                "bound to table 'people', expected 'users'",
            ),
            (
                MigrationErrorKind::NamingViolation { directory: dir.clone(), name: "notes.txt".into() },
                "'notes.txt'",
            ),
            (MigrationErrorKind::NothingToApply(dir.clone()), "Nothing to apply"),
            (MigrationErrorKind::NothingToReset(dir.clone()), "Nothing to reset"),
            (MigrationErrorKind::NothingToUndo, "Nothing to undo"),
            (MigrationErrorKind::Resolution("no definitions".into()), "no definitions"),
            (
                MigrationErrorKind::TableNotFound { table: "users".into(), directory: dir.clone() },
                "No migration found for table 'users'",
            ),
        ];

        for (kind, expect) in cases {
            let text = kind.to_string();
            assert!(
                text.contains(expect),
                "Expected `{}` in `{}`",
                expect,
                text
            );
        }
    }

    #[test]
    fn batch_failures_render_counts_and_cause() {
        let cause = MigrationError::from(EngineError {
            kind: EngineErrorKind::Rejected("CREATE TABLE profiles".into()),
        });
        let error = MigrationError::new(MigrationErrorKind::Batch {
            summary: BatchSummary::new(MigrationDirection::Up, vec![PathBuf::from("/a")], 2),
            source: Box::new(cause),
        });

        assert_eq!(
            error.to_string(),
            "1/2 table(s) created: Statement rejected: CREATE TABLE profiles"
        );
        assert_eq!(error.summary().map(|s| s.completed()), Some(1));
        assert!(matches!(error.root_kind(), MigrationErrorKind::Engine(_)));
    }

    #[test]
    fn io_errors_keep_their_source() {
        let error = MigrationError::io("/tmp/x", io::Error::new(io::ErrorKind::Other, "disk full"));
        let source = error.kind.source().unwrap().to_string();
        assert!(source.contains("disk full"));
    }
}
