use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use super::QueryLayer;
use crate::adapter::{BatchStatement, ConnectionStats, DriverAdapter, NativeHandle};
use crate::capabilities::DriverCapabilities;
use crate::detect::DriverRecommendation;
use crate::dialect::SqlTemplate;
use crate::error::DriverError;
use crate::results::QueryResult;
use crate::transaction::{AdapterExt, TransactionContext, TransactionOptions};
use crate::types::{Dialect, DriverId, RowValues};

/// An adapter paired with the query layer bound to its native handle.
///
/// Cloning is cheap and every clone shares the same adapter, so closing one clone
/// closes them all.
pub struct Database<Q = NativeHandle> {
    adapter: Arc<dyn DriverAdapter>,
    query: Q,
    recommendation: Option<DriverRecommendation>,
}

impl<Q: Clone> Clone for Database<Q> {
    fn clone(&self) -> Self {
        Self {
            adapter: Arc::clone(&self.adapter),
            query: self.query.clone(),
            recommendation: self.recommendation.clone(),
        }
    }
}

impl<Q> fmt::Debug for Database<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("adapter", &self.adapter)
            .field("recommendation", &self.recommendation)
            .finish_non_exhaustive()
    }
}

impl<Q: QueryLayer> Database<Q> {
    /// Wrap an adapter built outside the factory.
    #[must_use]
    pub fn from_adapter(adapter: Arc<dyn DriverAdapter>) -> Self {
        let query = Q::bind(adapter.native_handle(), adapter.dialect());
        Self::new(adapter, query, None)
    }
}

impl<Q> Database<Q> {
    pub(crate) fn new(
        adapter: Arc<dyn DriverAdapter>,
        query: Q,
        recommendation: Option<DriverRecommendation>,
    ) -> Self {
        Self {
            adapter,
            query,
            recommendation,
        }
    }

    /// The query layer bound at creation.
    ///
    /// Built-in handles share the adapter's slot, so after [`Database::close`] the bound
    /// handle reports closed and hands out no pool or client.
    pub fn query(&self) -> &Q {
        &self.query
    }

    pub fn adapter(&self) -> &Arc<dyn DriverAdapter> {
        &self.adapter
    }

    /// The recommendation that chose the driver, `None` when the driver was given
    /// explicitly.
    pub fn recommendation(&self) -> Option<&DriverRecommendation> {
        self.recommendation.as_ref()
    }

    pub fn driver(&self) -> &DriverId {
        self.adapter.driver()
    }

    pub fn dialect(&self) -> Dialect {
        self.adapter.dialect()
    }

    pub fn capabilities(&self) -> DriverCapabilities {
        self.adapter.capabilities()
    }

    /// # Errors
    /// See [`DriverAdapter::execute`].
    pub async fn execute(&self, sql: &str, params: &[RowValues]) -> Result<QueryResult, DriverError> {
        self.adapter.execute(sql, params).await
    }

    /// # Errors
    /// See [`DriverAdapter::execute_sql`].
    pub async fn execute_sql(&self, template: &SqlTemplate) -> Result<QueryResult, DriverError> {
        self.adapter.execute_sql(template).await
    }

    /// # Errors
    /// See [`DriverAdapter::execute_batch`].
    pub async fn execute_batch(
        &self,
        statements: &[BatchStatement],
    ) -> Result<Vec<QueryResult>, DriverError> {
        self.adapter.execute_batch(statements).await
    }

    /// Run `f` inside a transaction on a dedicated connection.
    ///
    /// # Errors
    /// See [`AdapterExt::transaction`].
    pub fn transaction<'a, F, T, E>(&'a self, f: F) -> impl Future<Output = Result<T, E>> + Send + 'a
    where
        F: for<'c> FnOnce(&'c mut TransactionContext<'_>) -> BoxFuture<'c, Result<T, E>>
            + Send
            + 'a,
        T: Send + 'a,
        E: From<DriverError> + fmt::Display + Send + 'a,
    {
        self.adapter.as_ref().transaction(f)
    }

    /// # Errors
    /// See [`AdapterExt::transaction_with`].
    pub fn transaction_with<'a, F, T, E>(
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
        self.adapter.as_ref().transaction_with(options, f)
    }

    pub async fn ping(&self) -> bool {
        self.adapter.ping().await
    }

    /// # Errors
    /// See [`DriverAdapter::close`].
    pub async fn close(&self) -> Result<(), DriverError> {
        self.adapter.close().await
    }

    pub fn is_closed(&self) -> bool {
        self.adapter.is_closed()
    }

    pub fn stats(&self) -> Option<ConnectionStats> {
        self.adapter.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MemoryAdapter;

    #[test]
    fn delegates_to_the_adapter() -> Result<(), Box<dyn std::error::Error>> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(async {
            let memory = MemoryAdapter::new(DriverId::new("memory"), Dialect::Mysql);
            let db: Database = Database::from_adapter(Arc::new(memory.clone()));
            assert_eq!(db.dialect(), Dialect::Mysql);
            assert!(db.recommendation().is_none());
            assert!(db.query().downcast_custom::<MemoryAdapter>().is_some());

            let template = SqlTemplate::new("SELECT ").param(5_i64);
            let result = db.execute_sql(&template).await?;
            assert_eq!(result.row_count, 1);
            assert_eq!(memory.sql_log(), vec!["SELECT ?"]);

            assert!(db.ping().await);
            db.clone().close().await?;
            assert!(db.is_closed());
            assert!(!db.ping().await);
            Ok(())
        })
    }
}
