//! Transactions over a dedicated connection, with savepoints for nesting.

use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::adapter::DriverAdapter;
use crate::error::DriverError;
use crate::results::QueryResult;
use crate::types::RowValues;

mod context;
mod options;

pub use context::TransactionContext;
pub use options::{AccessMode, IsolationLevel, TransactionOptions};

/// A connection checked out for the duration of one transaction.
///
/// Implementations roll back on drop while [`TxConnection::set_in_transaction`] says a
/// transaction is open, so a transaction abandoned mid-flight never reaches the pool
/// still open.
#[async_trait]
pub trait TxConnection: Send {
    /// Identity of the underlying physical connection.
    fn connection_id(&self) -> u64;

    /// Run one statement on this connection.
    ///
    /// # Errors
    /// Returns the backend's error unchanged.
    async fn execute(&mut self, sql: &str, params: &[RowValues]) -> Result<QueryResult, DriverError>;

    /// Run a parameterless control statement (`BEGIN`, `SAVEPOINT`, ...).
    ///
    /// # Errors
    /// Returns the backend's error unchanged.
    async fn simple(&mut self, sql: &str) -> Result<(), DriverError>;

    /// Armed before `BEGIN` is sent; cleared once `COMMIT` or `ROLLBACK` succeeded.
    fn set_in_transaction(&mut self, open: bool);
}

/// Callback-scoped transactions for every adapter.
///
/// ```rust,no_run
/// use db_switchboard::prelude::*;
///
/// # async fn demo(db: &Database) -> Result<(), DriverError> {
/// let inserted = db
///     .transaction(|tx| {
///         Box::pin(async move {
///             let params = [RowValues::Text("start".into())];
///             let result = tx
///                 .execute("INSERT INTO audit (msg) VALUES ($1)", &params)
///                 .await?;
///             Ok::<_, DriverError>(result.row_count)
///         })
///     })
///     .await?;
/// assert_eq!(inserted, 1);
/// # Ok(())
/// # }
/// ```
pub trait AdapterExt: DriverAdapter {
    /// Run `f` inside a transaction with default options.
    ///
    /// # Errors
    /// Returns `DriverError::CapabilityError` (converted into `E`) without running a
    /// statement when the driver has no transactions; otherwise the callback's error
    /// after rolling back, or the error raised by `BEGIN`/`COMMIT`.
    fn transaction<'a, F, T, E>(&'a self, f: F) -> impl Future<Output = Result<T, E>> + Send + 'a
    where
        F: for<'c> FnOnce(&'c mut TransactionContext<'_>) -> BoxFuture<'c, Result<T, E>>
            + Send
            + 'a,
        T: Send + 'a,
        E: From<DriverError> + fmt::Display + Send + 'a,
    {
        run_transaction(self, TransactionOptions::default(), f)
    }

    /// [`AdapterExt::transaction`] with an explicit isolation level, access mode and
    /// deferrability.
    ///
    /// # Errors
    /// Same as [`AdapterExt::transaction`].
    fn transaction_with<'a, F, T, E>(
        &'a self,
        options: TransactionOptions,
        f: F,
    ) -> impl Future<Output = Result<T, E>> + Send + 'a
    where
        F: for<'c> FnOnce(&'c mut TransactionContext<'_>) -> BoxFuture<'c, Result<T, E>>
            + Send
            + 'a,
        T: Send + 'a,
        E: From<DriverError> + fmt::Display + Send + 'a,
    {
        run_transaction(self, options, f)
    }
}

impl<A: DriverAdapter + ?Sized> AdapterExt for A {}

async fn run_transaction<A, F, T, E>(adapter: &A, options: TransactionOptions, f: F) -> Result<T, E>
where
    A: DriverAdapter + ?Sized,
    F: for<'c> FnOnce(&'c mut TransactionContext<'_>) -> BoxFuture<'c, Result<T, E>> + Send,
    T: Send,
    E: From<DriverError> + fmt::Display + Send,
{
    if !adapter.capabilities().transactions {
        return Err(DriverError::no_transactions(adapter.driver()).into());
    }

    let formatter = adapter.formatter();
    let mut conn = adapter.checkout().await?;
    // Armed before BEGIN so a future dropped mid-BEGIN still rolls back.
    conn.set_in_transaction(true);
    for statement in formatter.begin_statements(&options) {
        conn.simple(&statement).await?;
    }
    tracing::debug!(
        driver = %adapter.driver(),
        connection = conn.connection_id(),
        "transaction started"
    );

    let outcome = {
        let mut ctx = TransactionContext::root(&mut conn, formatter, adapter.driver().clone());
        f(&mut ctx).await
    };

    match outcome {
        Ok(value) => {
            conn.simple(formatter.commit_statement()).await?;
            conn.set_in_transaction(false);
            Ok(value)
        }
        Err(err) => {
            match conn.simple(formatter.rollback_statement()).await {
                Ok(()) => conn.set_in_transaction(false),
                Err(rollback) => {
                    let rollback = DriverError::RollbackFailed {
                        source: Box::new(rollback),
                    };
                    tracing::error!(
                        driver = %adapter.driver(),
                        error = %rollback,
                        original = %err,
                        "transaction rollback failed"
                    );
                }
            }
            Err(err)
        }
    }
}
