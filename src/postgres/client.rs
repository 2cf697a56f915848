use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::session::PgSession;
use super::tx::PgTxConnection;
use crate::adapter::{DriverAdapter, HandleSlot, NativeHandle};
use crate::capabilities::DriverCapabilities;
use crate::error::DriverError;
use crate::results::QueryResult;
use crate::transaction::TxConnection;
use crate::types::{Dialect, DriverId, RowValues};

/// `pg`: one dedicated session. Statements queue on the session's mutex, and a
/// transaction holds the mutex until it finishes.
#[derive(Debug)]
pub(crate) struct PgClientAdapter {
    driver: DriverId,
    slot: HandleSlot<Arc<Mutex<PgSession>>>,
}

impl PgClientAdapter {
    pub(crate) fn new(session: PgSession) -> Self {
        tracing::info!(driver = %DriverId::PG, session = session.id(), "postgres client connected");
        Self {
            driver: DriverId::PG,
            slot: HandleSlot::new(DriverId::PG, Arc::new(Mutex::new(session))),
        }
    }
}

#[async_trait]
impl DriverAdapter for PgClientAdapter {
    fn driver(&self) -> &DriverId {
        &self.driver
    }

    fn dialect(&self) -> Dialect {
        Dialect::Postgresql
    }

    fn capabilities(&self) -> DriverCapabilities {
        DriverCapabilities::PG
    }

    async fn execute(&self, sql: &str, params: &[RowValues]) -> Result<QueryResult, DriverError> {
        let session = self.slot.get()?;
        let mut guard = session.lock().await;
        guard.execute(sql, params).await
    }

    async fn checkout(&self) -> Result<Box<dyn TxConnection>, DriverError> {
        let session = self.slot.get()?;
        let guard = session.lock_owned().await;
        Ok(Box::new(PgTxConnection::new(guard)))
    }

    async fn close(&self) -> Result<(), DriverError> {
        if self.slot.take().is_some() {
            tracing::info!(driver = %self.driver, "postgres client closed");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.slot.is_closed()
    }

    fn native_handle(&self) -> NativeHandle {
        self.slot.share(NativeHandle::PgClient)
    }
}
