use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bb8::{ManageConnection, Pool, PooledConnection};

use super::manager::TracingErrorSink;
use super::session::PgSession;
use super::tx::PgTxConnection;
use crate::adapter::{ConnectionStats, DriverAdapter, HandleSlot, NativeHandle};
use crate::capabilities::DriverCapabilities;
use crate::config::PoolOptions;
use crate::error::DriverError;
use crate::results::QueryResult;
use crate::transaction::TxConnection;
use crate::types::{Dialect, DriverId, RowValues};

/// Build a lazily connecting bb8 pool.
pub(crate) fn build_pool<M>(manager: M, pool: &PoolOptions, driver: &DriverId) -> Pool<M>
where
    M: ManageConnection<Error = crate::error::DriverError>,
{
    Pool::builder()
        .max_size(pool.max.max(1))
        .min_idle((pool.min > 0).then_some(pool.min.min(pool.max.max(1))))
        .idle_timeout(pool.idle_timeout)
        .max_lifetime(pool.max_lifetime)
        .connection_timeout(pool.connect_timeout)
        .error_sink(Box::new(TracingErrorSink::new(driver.clone())))
        .build_unchecked(manager)
}

/// Postgres sessions in a bb8 pool. Used by `postgres` and `neon-websocket`, which
/// differ only in how a session is opened.
pub(crate) struct PooledPgAdapter<M>
where
    M: ManageConnection<Connection = PgSession, Error = DriverError>,
{
    driver: DriverId,
    capabilities: DriverCapabilities,
    slot: HandleSlot<Pool<M>>,
    waiting: Arc<AtomicUsize>,
    wrap: fn(HandleSlot<Pool<M>>) -> NativeHandle,
}

impl<M> fmt::Debug for PooledPgAdapter<M>
where
    M: ManageConnection<Connection = PgSession, Error = DriverError>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledPgAdapter")
            .field("driver", &self.driver)
            .field("closed", &self.slot.is_closed())
            .finish_non_exhaustive()
    }
}

/// Decrements the waiting counter however the checkout ends.
struct Waiting<'a>(&'a AtomicUsize);

impl<'a> Waiting<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<M> PooledPgAdapter<M>
where
    M: ManageConnection<Connection = PgSession, Error = DriverError>,
{
    pub(crate) fn new(
        driver: DriverId,
        capabilities: DriverCapabilities,
        pool: Pool<M>,
        wrap: fn(HandleSlot<Pool<M>>) -> NativeHandle,
    ) -> Self {
        tracing::info!(driver = %driver, "pooled postgres adapter ready");
        Self {
            slot: HandleSlot::new(driver.clone(), pool),
            driver,
            capabilities,
            waiting: Arc::new(AtomicUsize::new(0)),
            wrap,
        }
    }

    async fn acquire(&self) -> Result<PooledConnection<'static, M>, DriverError> {
        let pool = self.slot.get()?;
        let _waiting = Waiting::enter(&self.waiting);
        Ok(pool.get_owned().await?)
    }
}

#[async_trait]
impl<M> DriverAdapter for PooledPgAdapter<M>
where
    M: ManageConnection<Connection = PgSession, Error = DriverError>,
{
    fn driver(&self) -> &DriverId {
        &self.driver
    }

    fn dialect(&self) -> Dialect {
        Dialect::Postgresql
    }

    fn capabilities(&self) -> DriverCapabilities {
        self.capabilities
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
        if self.slot.take().is_some() {
            tracing::info!(driver = %self.driver, "pool closed");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.slot.is_closed()
    }

    fn stats(&self) -> Option<ConnectionStats> {
        let stats = self.slot.peek().map_or_else(ConnectionStats::closed, |pool| {
            let state = pool.state();
            ConnectionStats::from_counts(
                state.connections as usize,
                state.idle_connections as usize,
                self.waiting.load(Ordering::SeqCst),
            )
        });
        Some(stats)
    }

    fn native_handle(&self) -> NativeHandle {
        self.slot.share(self.wrap)
    }
}
