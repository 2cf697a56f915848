use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mysql_async::{Conn, Pool};

use super::query::MysqlRunner;
use super::stats::Gauge;
use super::tx::MysqlTxConnection;
use crate::adapter::{ConnectionStats, DriverAdapter, HandleSlot, NativeHandle};
use crate::capabilities::DriverCapabilities;
use crate::error::DriverError;
use crate::results::QueryResult;
use crate::transaction::TxConnection;
use crate::types::{Dialect, DriverId, RowValues};

/// `mysql2`: a `mysql_async` pool.
///
/// `mysql_async` keeps its idle set private, so [`DriverAdapter::stats`] reports the
/// connections checked out through this adapter as `total`/`active`, `idle` as zero,
/// and callers still waiting for a connection as `waiting`.
#[derive(Debug)]
pub(crate) struct MysqlPoolAdapter {
    slot: HandleSlot<Pool>,
    runner: MysqlRunner,
    checkout_timeout: Duration,
    active: Arc<AtomicUsize>,
    waiting: Arc<AtomicUsize>,
}

impl MysqlPoolAdapter {
    pub(crate) fn new(pool: Pool, runner: MysqlRunner, checkout_timeout: Duration) -> Self {
        tracing::info!(driver = %DriverId::MYSQL2, "mysql pool ready");
        Self {
            slot: HandleSlot::new(DriverId::MYSQL2, pool),
            runner,
            checkout_timeout,
            active: Arc::new(AtomicUsize::new(0)),
            waiting: Arc::new(AtomicUsize::new(0)),
        }
    }

    async fn acquire(&self) -> Result<(Conn, Gauge), DriverError> {
        let pool = self.slot.get()?;
        let _waiting = Gauge::enter(&self.waiting);
        let conn = tokio::time::timeout(self.checkout_timeout, pool.get_conn())
            .await
            .map_err(|_| {
                DriverError::ConnectionError("timed out waiting for a pooled connection".into())
            })??;
        Ok((conn, Gauge::enter(&self.active)))
    }
}

#[async_trait]
impl DriverAdapter for MysqlPoolAdapter {
    fn driver(&self) -> &DriverId {
        &DriverId::MYSQL2
    }

    fn dialect(&self) -> Dialect {
        Dialect::Mysql
    }

    fn capabilities(&self) -> DriverCapabilities {
        DriverCapabilities::MYSQL2
    }

    async fn execute(&self, sql: &str, params: &[RowValues]) -> Result<QueryResult, DriverError> {
        let (mut conn, _active) = self.acquire().await?;
        self.runner.run(&mut conn, sql, params).await
    }

    async fn checkout(&self) -> Result<Box<dyn TxConnection>, DriverError> {
        let (conn, active) = self.acquire().await?;
        Ok(Box::new(MysqlTxConnection::new(conn, self.runner.clone(), active)))
    }

    async fn close(&self) -> Result<(), DriverError> {
        if let Some(pool) = self.slot.take() {
            pool.disconnect().await?;
            tracing::info!(driver = %DriverId::MYSQL2, "mysql pool closed");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.slot.is_closed()
    }

    fn stats(&self) -> Option<ConnectionStats> {
        if self.slot.is_closed() {
            return Some(ConnectionStats::closed());
        }
        Some(ConnectionStats::from_counts(
            self.active.load(Ordering::SeqCst),
            0,
            self.waiting.load(Ordering::SeqCst),
        ))
    }

    fn native_handle(&self) -> NativeHandle {
        self.slot.share(NativeHandle::MysqlPool)
    }
}
