use crate::db::{EngineError, LedgerRow, QueryExecutor};

use sqlx::PgPool;


pub struct PostgresEngine {
    conn_str: String,
    pool: Option<PgPool>,
}


impl PostgresEngine {
    pub fn new(conn_str: &str) -> Self {
        return PostgresEngine { conn_str: conn_str.to_string(), pool: None }
    }

    /// Connects on first use and reuses the pool afterwards.
    async fn pool(&mut self) -> Result<&PgPool, EngineError> {
        if self.pool.is_none() {
            tracing::debug!("Connecting to Postgres...");
            self.pool = Some(PgPool::connect(&self.conn_str).await?);
        }

        self.pool.as_ref().ok_or_else(|| EngineError {
            kind: crate::db::EngineErrorKind::TransactionNotStarted,
        })
    }
}


#[async_trait::async_trait]
impl QueryExecutor for PostgresEngine {
    async fn execute(&mut self, sql: &str) -> Result<(), EngineError> {
        let pool = self.pool().await?;
        tracing::trace!("Executing: {sql}");

        sqlx::raw_sql(sql)
            .execute(pool)
            .await?;

        Ok(())
    }

    async fn query_ledger(&mut self, sql: &str) -> Result<Vec<LedgerRow>, EngineError> {
        let pool = self.pool().await?;
        tracing::trace!("Querying: {sql}");

        Ok(sqlx::query_as::<_, LedgerRow>(sql)
            .fetch_all(pool)
            .await?)
    }
}
