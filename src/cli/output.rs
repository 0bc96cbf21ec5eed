// {
//   "command": "up",
//   "status": "error",
//   "message": "1/3 table(s) created: ...",
//   "data": null,
//   "error": {"type": "batch", "message": "...", "completed": 1, "total": 3},
//   "timestamp": "2025-10-17T15:52:12Z"
// }
use crate::cli::error::{PloverError, PloverErrorKind};
use crate::migration::MigrationErrorKind;

use chrono::{DateTime, Utc};
use serde::Serialize;


#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PloverErrorJson {
    Batch { message: String, completed: usize, total: usize },
    Engine { message: String },
    Io { message: String },
    Migration { message: String },
    Internal { message: String },
}

impl From<&PloverError> for PloverErrorJson {
    fn from(e: &PloverError) -> Self {
        let message = e.kind.to_string();

        match &e.kind {
            PloverErrorKind::Migration(error) => match (&error.kind, error.summary()) {
                (MigrationErrorKind::Batch { .. }, Some(summary)) => Self::Batch {
                    message,
                    completed: summary.completed(),
                    total: summary.total,
                },
                (MigrationErrorKind::Engine(_), _) => Self::Engine { message },
                _ => Self::Migration { message },
            },
            PloverErrorKind::Engine(_) => Self::Engine { message },
            PloverErrorKind::IoDirectoryCreate { .. } | PloverErrorKind::IoFileWrite { .. } => {
                Self::Io { message }
            }
            PloverErrorKind::Serialize(_) | PloverErrorKind::SetGlobalDefault(_) => {
                Self::Internal { message }
            }
        }
    }
}


#[derive(Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PloverStatus {
    Success,
    Error,
}

#[derive(Debug, Serialize)]
pub struct PloverOutput<T: Serialize> {
    pub command: String,
    pub status: PloverStatus,
    pub message: String,
    pub data: Option<T>,
    pub error: Option<PloverErrorJson>,
    pub timestamp: DateTime<Utc>,
}

impl<T: Serialize> PloverOutput<T> {
    pub fn success(command: String, message: String, data: T) -> Self {
        PloverOutput {
            command,
            status: PloverStatus::Success,
            message,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(command: String, error: &PloverError) -> Self {
        PloverOutput {
            command,
            status: PloverStatus::Error,
            message: error.kind.to_string(),
            data: None,
            error: Some(PloverErrorJson::from(error)),
            timestamp: Utc::now(),
        }
    }
}
