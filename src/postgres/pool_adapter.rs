use async_trait::async_trait;
use deadpool::managed::{Object, Pool};

use super::manager::PgSessionManager;
use super::tx::PgTxConnection;
use crate::adapter::{ConnectionStats, DriverAdapter, HandleSlot, NativeHandle};
use crate::capabilities::DriverCapabilities;
use crate::config::PoolOptions;
use crate::error::DriverError;
use crate::results::QueryResult;
use crate::transaction::TxConnection;
use crate::types::{Dialect, DriverId, RowValues};

/// `pg-pool`: sessions in a deadpool pool, which tracks waiters natively.
#[derive(Debug)]
pub(crate) struct DeadpoolPgAdapter {
    driver: DriverId,
    slot: HandleSlot<Pool<PgSessionManager>>,
}

/// # Errors
/// Returns `DriverError::ConfigError` if the pool settings are rejected.
pub(crate) fn build_pool(
    manager: PgSessionManager,
    pool: &PoolOptions,
) -> Result<Pool<PgSessionManager>, DriverError> {
    if pool.min > 0 {
        tracing::debug!(min = pool.min, "pg-pool opens connections on demand; ignoring pool.min");
    }
    Pool::builder(manager)
        .max_size(pool.max.max(1) as usize)
        .wait_timeout(Some(pool.connect_timeout))
        .create_timeout(Some(pool.connect_timeout))
        .runtime(deadpool::Runtime::Tokio1)
        .build()
        .map_err(|e| DriverError::ConfigError(format!("pg-pool: {e}")))
}

impl DeadpoolPgAdapter {
    pub(crate) fn new(pool: Pool<PgSessionManager>) -> Self {
        tracing::info!(driver = %DriverId::PG_POOL, "pooled postgres adapter ready");
        Self {
            driver: DriverId::PG_POOL,
            slot: HandleSlot::new(DriverId::PG_POOL, pool),
        }
    }

    async fn acquire(&self) -> Result<Object<PgSessionManager>, DriverError> {
        let pool = self.slot.get()?;
        Ok(pool.get().await?)
    }
}

#[async_trait]
impl DriverAdapter for DeadpoolPgAdapter {
    fn driver(&self) -> &DriverId {
        &self.driver
    }

    fn dialect(&self) -> Dialect {
        Dialect::Postgresql
    }

    fn capabilities(&self) -> DriverCapabilities {
        DriverCapabilities::PG_POOL
    }

    async fn execute(&self, sql: &str, params: &[RowValues]) -> Result<QueryResult, DriverError> {
        let mut conn = self.acquire().await?;
        conn.execute(sql, params).await
    }

    async fn checkout(&self) -> Result<Box<dyn TxConnection>, DriverError> {
        let conn = self.acquire().await?;
        Ok(Box::new(PgTxConnection::new(conn)))
    }

    async fn close(&self) -> Result<(), DriverError> {
        if let Some(pool) = self.slot.take() {
            pool.close();
            tracing::info!(driver = %self.driver, "pool closed");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.slot.is_closed()
    }

    fn stats(&self) -> Option<ConnectionStats> {
        let stats = self.slot.peek().map_or_else(ConnectionStats::closed, |pool| {
            let status = pool.status();
            ConnectionStats::from_counts(
                status.size,
                usize::try_from(status.available).unwrap_or(0),
                status.waiting,
            )
        });
        Some(stats)
    }

    fn native_handle(&self) -> NativeHandle {
        self.slot.share(NativeHandle::PgPool)
    }
}
