use async_trait::async_trait;
use mysql_async::Conn;
use mysql_async::prelude::Queryable;
use tokio::runtime::Handle;

use super::query::MysqlRunner;
use super::stats::Gauge;
use crate::error::DriverError;
use crate::results::QueryResult;
use crate::transaction::TxConnection;
use crate::types::RowValues;

/// A pooled connection reserved for one transaction.
pub(crate) struct MysqlTxConnection {
    conn: Option<Conn>,
    id: u64,
    runner: MysqlRunner,
    needs_rollback: bool,
    _active: Gauge,
}

impl MysqlTxConnection {
    pub(crate) fn new(conn: Conn, runner: MysqlRunner, active: Gauge) -> Self {
        Self {
            id: u64::from(conn.id()),
            conn: Some(conn),
            runner,
            needs_rollback: false,
            _active: active,
        }
    }
}

fn released() -> DriverError {
    DriverError::ConnectionClosed("transaction connection released".into())
}

#[async_trait]
impl TxConnection for MysqlTxConnection {
    fn connection_id(&self) -> u64 {
        self.id
    }

    async fn execute(&mut self, sql: &str, params: &[RowValues]) -> Result<QueryResult, DriverError> {
        let conn = self.conn.as_mut().ok_or_else(released)?;
        self.runner.run(conn, sql, params).await
    }

    async fn simple(&mut self, sql: &str) -> Result<(), DriverError> {
        let conn = self.conn.as_mut().ok_or_else(released)?;
        self.runner.simple(conn, sql).await
    }

    fn set_in_transaction(&mut self, open: bool) {
        self.needs_rollback = open;
    }
}

impl Drop for MysqlTxConnection {
    fn drop(&mut self) {
        if self.needs_rollback
            && let Some(mut conn) = self.conn.take()
            && let Ok(handle) = Handle::try_current()
        {
            let id = self.id;
            handle.spawn(async move {
                if let Err(err) = conn.query_drop("ROLLBACK").await {
                    tracing::warn!(connection = id, error = %err, "rollback of abandoned transaction failed");
                }
            });
        }
    }
}
