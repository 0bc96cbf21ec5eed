use std::error::Error;
use std::fmt;


/// SQLSTATE codes reported when a statement references a table that does not exist.
/// 42P01 is Postgres' `undefined_table`, 42S02 the ODBC/ANSI equivalent.
static UNDEFINED_TABLE_SQLSTATES: phf::Set<&'static str> = phf::phf_set! {
    "42P01",
    "42S02",
};


#[derive(Debug)]
#[non_exhaustive]
pub struct EngineError {
    pub kind: EngineErrorKind
}

impl EngineError {
    /// True when the store reported that the referenced relation does not exist.
    pub fn is_relation_not_found(&self) -> bool {
        matches!(self.kind, EngineErrorKind::RelationNotFound(_))
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EngineError: {}", self.kind)
    }
}

impl Error for EngineError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		Some(&self.kind)
	}
}

#[derive(Debug)]
pub enum EngineErrorKind {
    Rejected(String),
    RelationNotFound(String),
    SQLX(sqlx::Error),
    TransactionNotStarted,
    Unsupported(String),
}

impl fmt::Display for EngineErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected(message) => write!(f, "Statement rejected: {message}"),
            Self::RelationNotFound(message) => write!(f, "Relation does not exist: {message}"),
            Self::SQLX(e) => write!(f, "{e}"),
            Self::TransactionNotStarted => write!(f, "Connection has not been established"),
            Self::Unsupported(sql) => write!(f, "Unsupported statement: '{sql}'"),
        }
    }
}

impl Error for EngineErrorKind {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			Self::SQLX(source) => Some(source),
			_ => None,
		}
	}
}

impl From<sqlx::Error> for EngineError {
    fn from(error: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_error) = &error {
            let undefined_table = db_error
                .code()
                .is_some_and(|code| UNDEFINED_TABLE_SQLSTATES.contains(&*code));
            if undefined_table {
                return EngineError {
                    kind: EngineErrorKind::RelationNotFound(db_error.message().to_string())
                }
            }
        }

        EngineError { kind: EngineErrorKind::SQLX(error) }
    }
}
