//! The contract every backend implements.

use std::fmt;

use async_trait::async_trait;

use crate::capabilities::DriverCapabilities;
use crate::dialect::{DialectFormatter, RenderedSql, SqlTemplate, formatter_for};
use crate::error::DriverError;
use crate::results::QueryResult;
use crate::transaction::{AdapterExt, TxConnection};
use crate::types::{Dialect, DriverId, RowValues};

mod native;
mod slot;
mod stats;

pub use native::NativeHandle;
pub use slot::HandleSlot;
pub use stats::ConnectionStats;

/// One statement of an [`DriverAdapter::execute_batch`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchStatement {
    pub sql: String,
    pub params: Vec<RowValues>,
}

impl BatchStatement {
    #[must_use]
    pub fn new(sql: impl Into<String>, params: Vec<RowValues>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

impl From<RenderedSql> for BatchStatement {
    fn from(rendered: RenderedSql) -> Self {
        Self {
            sql: rendered.sql,
            params: rendered.params,
        }
    }
}

impl From<&str> for BatchStatement {
    fn from(sql: &str) -> Self {
        Self::new(sql, Vec::new())
    }
}

/// Uniform driver contract.
///
/// An adapter exclusively owns one native handle from construction until
/// [`DriverAdapter::close`]. After close every operation fails with
/// [`DriverError::ConnectionClosed`] without touching the network, and a second close
/// is a no-op. Transactions are provided on top of [`DriverAdapter::checkout`] by
/// [`AdapterExt`].
#[async_trait]
pub trait DriverAdapter: Send + Sync + fmt::Debug {
    fn driver(&self) -> &DriverId;

    fn dialect(&self) -> Dialect;

    fn capabilities(&self) -> DriverCapabilities;

    fn formatter(&self) -> &'static dyn DialectFormatter {
        formatter_for(self.dialect())
    }

    /// Run one statement. Transport failures pass through unchanged; nothing is retried.
    ///
    /// # Errors
    /// Returns `DriverError::ConnectionClosed` after close, otherwise whatever the
    /// backend reports.
    async fn execute(&self, sql: &str, params: &[RowValues]) -> Result<QueryResult, DriverError>;

    /// Render `template` with this adapter's dialect and run it.
    ///
    /// # Errors
    /// Same as [`DriverAdapter::execute`].
    async fn execute_sql(&self, template: &SqlTemplate) -> Result<QueryResult, DriverError> {
        let rendered = self.formatter().render(template);
        self.execute(&rendered.sql, &rendered.params).await
    }

    /// Run several statements atomically, returning one result per statement.
    ///
    /// The default runs them inside one transaction on a dedicated connection.
    ///
    /// # Errors
    /// Returns `DriverError::CapabilityError` when the driver supports neither batches
    /// nor transactions; otherwise the first failing statement's error after the
    /// whole batch was rolled back.
    async fn execute_batch(
        &self,
        statements: &[BatchStatement],
    ) -> Result<Vec<QueryResult>, DriverError> {
        let caps = self.capabilities();
        if !caps.batch_queries || !caps.transactions {
            return Err(DriverError::CapabilityError(format!(
                "driver {} does not support atomic batches",
                self.driver()
            )));
        }
        let statements = statements.to_vec();
        self.transaction(move |tx| {
            Box::pin(async move {
                let mut results = Vec::with_capacity(statements.len());
                for statement in &statements {
                    results.push(tx.execute(&statement.sql, &statement.params).await?);
                }
                Ok::<_, DriverError>(results)
            })
        })
        .await
    }

    /// A connection reserved for one transaction.
    ///
    /// Drivers without transactions keep the default, which refuses.
    ///
    /// # Errors
    /// Returns `DriverError::CapabilityError` by default, or the pool/transport error
    /// raised while checking a connection out.
    async fn checkout(&self) -> Result<Box<dyn TxConnection>, DriverError> {
        Err(DriverError::no_transactions(self.driver()))
    }

    /// `SELECT 1`; any failure, including a closed adapter, is reported as `false`.
    async fn ping(&self) -> bool {
        if self.is_closed() {
            return false;
        }
        match self.execute("SELECT 1", &[]).await {
            Ok(_) => true,
            Err(err) => {
                tracing::debug!(driver = %self.driver(), error = %err, "ping failed");
                false
            }
        }
    }

    /// Tear down the native handle. Idempotent.
    ///
    /// # Errors
    /// Returns the backend's error if shutting the handle down fails; the adapter is
    /// closed either way.
    async fn close(&self) -> Result<(), DriverError>;

    fn is_closed(&self) -> bool;

    /// Pool snapshot, `None` for drivers without a pool.
    fn stats(&self) -> Option<ConnectionStats> {
        None
    }

    /// The backend client, passed through untouched. [`NativeHandle::Closed`] after close.
    fn native_handle(&self) -> NativeHandle;
}
