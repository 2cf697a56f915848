use std::fmt;

use futures_util::future::BoxFuture;

use super::TxConnection;
use crate::dialect::{DialectFormatter, SqlTemplate};
use crate::error::DriverError;
use crate::results::QueryResult;
use crate::types::{Dialect, DriverId, RowValues};

/// Handle given to a transaction callback, bound to the transaction's connection.
///
/// Savepoint names are derived from the context's position in the nesting tree:
/// `sp_1`, `sp_2` at the top, `sp_2_1` inside `sp_2`. Each context counts its own
/// children, so a savepoint created after a sibling was rolled back never reuses a
/// live name.
pub struct TransactionContext<'t> {
    conn: &'t mut Box<dyn TxConnection>,
    formatter: &'static dyn DialectFormatter,
    driver: DriverId,
    depth: usize,
    prefix: String,
    children: u32,
}

impl<'t> TransactionContext<'t> {
    pub(super) fn root(
        conn: &'t mut Box<dyn TxConnection>,
        formatter: &'static dyn DialectFormatter,
        driver: DriverId,
    ) -> Self {
        Self {
            conn,
            formatter,
            driver,
            depth: 0,
            prefix: "sp".to_string(),
            children: 0,
        }
    }

    /// Run a statement on the transaction's connection.
    ///
    /// # Errors
    /// Returns the backend's error; the transaction is left for the caller's error path
    /// to roll back.
    pub async fn execute(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<QueryResult, DriverError> {
        self.conn.execute(sql, params).await
    }

    /// Render `template` for this transaction's dialect and run it.
    ///
    /// # Errors
    /// Same as [`TransactionContext::execute`].
    pub async fn execute_sql(&mut self, template: &SqlTemplate) -> Result<QueryResult, DriverError> {
        let rendered = self.formatter.render(template);
        self.conn.execute(&rendered.sql, &rendered.params).await
    }

    /// Run `f` inside a savepoint one level deeper.
    ///
    /// On success the savepoint is released; on error it is rolled back to and the
    /// error is returned. There is no depth limit.
    ///
    /// # Errors
    /// Returns the callback's error, or the error raised by `SAVEPOINT`/`RELEASE`.
    pub async fn savepoint<F, T, E>(&mut self, f: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut TransactionContext<'_>) -> BoxFuture<'c, Result<T, E>> + Send,
        T: Send,
        E: From<DriverError> + fmt::Display + Send,
    {
        self.children += 1;
        let name = format!("{}_{}", self.prefix, self.children);
        self.conn.simple(&self.formatter.savepoint(&name)).await?;

        let outcome = {
            let mut nested = TransactionContext {
                conn: &mut *self.conn,
                formatter: self.formatter,
                driver: self.driver.clone(),
                depth: self.depth + 1,
                prefix: name.clone(),
                children: 0,
            };
            f(&mut nested).await
        };

        match outcome {
            Ok(value) => {
                self.conn
                    .simple(&self.formatter.release_savepoint(&name))
                    .await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = self
                    .conn
                    .simple(&self.formatter.rollback_to_savepoint(&name))
                    .await
                {
                    tracing::error!(
                        driver = %self.driver,
                        savepoint = %name,
                        error = %rollback,
                        original = %err,
                        "rollback to savepoint failed"
                    );
                }
                Err(err)
            }
        }
    }

    /// Alias of [`TransactionContext::savepoint`].
    ///
    /// # Errors
    /// Same as [`TransactionContext::savepoint`].
    pub async fn transaction<F, T, E>(&mut self, f: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut TransactionContext<'_>) -> BoxFuture<'c, Result<T, E>> + Send,
        T: Send,
        E: From<DriverError> + fmt::Display + Send,
    {
        self.savepoint(f).await
    }

    /// Nesting level: 0 for the transaction itself, 1 inside its first savepoint, ...
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Name of this context's savepoint, `None` at the top level.
    #[must_use]
    pub fn savepoint_name(&self) -> Option<&str> {
        (self.depth > 0).then_some(self.prefix.as_str())
    }

    #[must_use]
    pub fn connection_id(&self) -> u64 {
        self.conn.connection_id()
    }

    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.formatter.dialect()
    }

    #[must_use]
    pub fn driver(&self) -> &DriverId {
        &self.driver
    }
}

impl fmt::Debug for TransactionContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("driver", &self.driver)
            .field("connection", &self.conn.connection_id())
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}
