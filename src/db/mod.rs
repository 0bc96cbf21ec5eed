mod error;
mod memory;
mod postgres;

pub use error::{EngineError, EngineErrorKind};
pub use memory::MemoryEngine;
pub use postgres::PostgresEngine;

use serde::Serialize;


/// A row of the migration ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct LedgerRow {
    pub id: i32,
    pub path: String,
    #[sqlx(try_from = "i16")]
    pub batch: u16,
}


/// Raw SQL execution against a relational store.
///
/// The engine only ever reads rows back from its own ledger table,
/// so row-returning queries are typed as [`LedgerRow`].
#[async_trait::async_trait]
pub trait QueryExecutor: Send {
    async fn execute(&mut self, sql: &str) -> Result<(), EngineError>;
    async fn query_ledger(&mut self, sql: &str) -> Result<Vec<LedgerRow>, EngineError>;
}


pub enum EngineBackend {
    Postgres(PostgresEngine),
}

impl EngineBackend {
    pub fn name(&self) -> &'static str {
        match self {
            EngineBackend::Postgres(_) => "postgres",
        }
    }
}

#[async_trait::async_trait]
impl QueryExecutor for EngineBackend {
    async fn execute(&mut self, sql: &str) -> Result<(), EngineError> {
        match self {
            EngineBackend::Postgres(engine) => engine.execute(sql).await,
        }
    }

    async fn query_ledger(&mut self, sql: &str) -> Result<Vec<LedgerRow>, EngineError> {
        match self {
            EngineBackend::Postgres(engine) => engine.query_ledger(sql).await,
        }
    }
}
