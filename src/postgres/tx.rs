use std::ops::DerefMut;

use async_trait::async_trait;
use tokio::runtime::Handle;

use super::session::PgSession;
use crate::error::DriverError;
use crate::results::QueryResult;
use crate::transaction::TxConnection;
use crate::types::RowValues;

/// A session reserved for one transaction: a pooled connection or the single
/// client's mutex guard.
pub(crate) struct PgTxConnection<C>
where
    C: DerefMut<Target = PgSession> + Send + 'static,
{
    conn: Option<C>,
    id: u64,
    /// True while a transaction is open and must be rolled back if dropped.
    needs_rollback: bool,
}

impl<C> PgTxConnection<C>
where
    C: DerefMut<Target = PgSession> + Send + 'static,
{
    pub(crate) fn new(conn: C) -> Self {
        let id = conn.id();
        Self {
            conn: Some(conn),
            id,
            needs_rollback: false,
        }
    }

    fn session(&mut self) -> Result<&mut PgSession, DriverError> {
        self.conn
            .as_deref_mut()
            .ok_or_else(|| DriverError::ConnectionClosed("transaction connection released".into()))
    }
}

#[async_trait]
impl<C> TxConnection for PgTxConnection<C>
where
    C: DerefMut<Target = PgSession> + Send + 'static,
{
    fn connection_id(&self) -> u64 {
        self.id
    }

    async fn execute(&mut self, sql: &str, params: &[RowValues]) -> Result<QueryResult, DriverError> {
        self.session()?.execute(sql, params).await
    }

    async fn simple(&mut self, sql: &str) -> Result<(), DriverError> {
        self.session()?.simple(sql).await
    }

    fn set_in_transaction(&mut self, open: bool) {
        self.needs_rollback = open;
    }
}

impl<C> Drop for PgTxConnection<C>
where
    C: DerefMut<Target = PgSession> + Send + 'static,
{
    fn drop(&mut self) {
        if self.needs_rollback
            && let Some(mut conn) = self.conn.take()
            && let Ok(handle) = Handle::try_current()
        {
            handle.spawn(async move {
                if let Err(err) = conn.simple("ROLLBACK").await {
                    tracing::warn!(session = conn.id(), error = %err, "rollback of abandoned transaction failed");
                }
            });
        }
    }
}
