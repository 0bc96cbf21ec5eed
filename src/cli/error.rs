use crate::db::EngineError;
use crate::migration::MigrationError;

use std::error::Error;
use std::fmt;
use std::path::PathBuf;
use tracing::subscriber::SetGlobalDefaultError;


#[derive(Debug)]
pub struct PloverError {
    pub kind: PloverErrorKind
}

impl fmt::Display for PloverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PloverError: {}", self.kind)
    }
}

impl Error for PloverError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.kind)
	}
}

#[derive(Debug)]
pub enum PloverErrorKind {
    Engine(EngineError),
    IoDirectoryCreate { source: std::io::Error, path: PathBuf },
    IoFileWrite { source: std::io::Error, path: PathBuf },
    Migration(MigrationError),
    Serialize(serde_json::Error),
    SetGlobalDefault(SetGlobalDefaultError),
}

impl fmt::Display for PloverErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Engine(error) => write!(f, "{}", error.kind),
            Self::IoDirectoryCreate { path, .. } => write!(f, "Failed to create directory: '{path:?}'"),
            Self::IoFileWrite { path, .. } => write!(f, "Failed to write to file: '{path:?}'"),
            Self::Migration(error) => write!(f, "{error}"),
            Self::Serialize(error) => write!(f, "Failed to serialize output: {error}"),
            Self::SetGlobalDefault(error) => write!(f, "Failed to set global default subscriber: {}", error),
        }
    }
}

impl Error for PloverErrorKind {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			Self::Engine(source) => Some(source),
			Self::IoDirectoryCreate { source, .. } => Some(source),
			Self::IoFileWrite { source, .. } => Some(source),
            Self::Migration(source) => Some(source),
            Self::Serialize(source) => Some(source),
            Self::SetGlobalDefault(source) => Some(source),
		}
	}
}

impl From<EngineError> for PloverError {
    fn from(error: EngineError) -> Self {
        PloverError { kind: PloverErrorKind::Engine(error) }
    }
}

impl From<MigrationError> for PloverError {
    fn from(error: MigrationError) -> Self {
        PloverError { kind: PloverErrorKind::Migration(error) }
    }
}

impl From<serde_json::Error> for PloverError {
    fn from(error: serde_json::Error) -> Self {
        PloverError { kind: PloverErrorKind::Serialize(error) }
    }
}

impl From<SetGlobalDefaultError> for PloverError {
    fn from(error: SetGlobalDefaultError) -> Self {
        PloverError { kind: PloverErrorKind::SetGlobalDefault(error) }
    }
}
