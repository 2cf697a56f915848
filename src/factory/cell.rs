use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;

use super::Database;
use crate::adapter::NativeHandle;
use crate::error::DriverError;

/// An explicitly owned slot for one shared [`Database`].
///
/// Keep it wherever the application keeps its state (a `static` holding a
/// `DatabaseCell`, an axum `State`, a struct field). Concurrent [`DatabaseCell::get_or_init`]
/// calls build the database once.
#[derive(Debug)]
pub struct DatabaseCell<Q = NativeHandle> {
    inner: Mutex<Option<Arc<Database<Q>>>>,
}

impl<Q> Default for DatabaseCell<Q> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Q> DatabaseCell<Q> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: Mutex::const_new(None),
        }
    }

    /// Store `db`.
    ///
    /// # Errors
    /// Returns `DriverError::ConfigError` when the cell already holds a database.
    pub async fn init(&self, db: Database<Q>) -> Result<Arc<Database<Q>>, DriverError> {
        let mut slot = self.inner.lock().await;
        if slot.is_some() {
            return Err(DriverError::ConfigError(
                "database cell is already initialized".into(),
            ));
        }
        let db = Arc::new(db);
        *slot = Some(Arc::clone(&db));
        Ok(db)
    }

    pub async fn get(&self) -> Option<Arc<Database<Q>>> {
        self.inner.lock().await.clone()
    }

    /// The stored database, building it with `init` when empty.
    ///
    /// # Errors
    /// Returns `init`'s error and leaves the cell empty.
    pub async fn get_or_init<F, Fut>(&self, init: F) -> Result<Arc<Database<Q>>, DriverError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Database<Q>, DriverError>>,
    {
        let mut slot = self.inner.lock().await;
        if let Some(db) = slot.as_ref() {
            return Ok(Arc::clone(db));
        }
        let db = Arc::new(init().await?);
        *slot = Some(Arc::clone(&db));
        Ok(db)
    }

    /// Empty the cell and close the database it held.
    ///
    /// # Errors
    /// Returns the close error; the cell is empty either way.
    pub async fn reset(&self) -> Result<(), DriverError> {
        let taken = self.inner.lock().await.take();
        match taken {
            Some(db) => db.close().await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::test_utils::MemoryAdapter;
    use crate::types::{Dialect, DriverId};

    fn memory() -> Database {
        Database::from_adapter(Arc::new(MemoryAdapter::new(
            DriverId::new("memory"),
            Dialect::Postgresql,
        )))
    }

    #[test]
    fn initializes_once() -> Result<(), Box<dyn std::error::Error>> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(async {
            let cell: DatabaseCell = DatabaseCell::new();
            assert!(cell.get().await.is_none());
            let calls = AtomicUsize::new(0);
            let first = cell
                .get_or_init(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(memory())
                })
                .await?;
            let second = cell
                .get_or_init(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(memory())
                })
                .await?;
            assert!(Arc::ptr_eq(&first, &second));
            assert_eq!(calls.load(Ordering::SeqCst), 1);
            assert!(matches!(
                cell.init(memory()).await,
                Err(DriverError::ConfigError(_))
            ));

            cell.reset().await?;
            assert!(first.is_closed());
            assert!(cell.get().await.is_none());
            cell.init(memory()).await?;
            assert!(cell.get().await.is_some());
            Ok(())
        })
    }

    #[test]
    fn failed_init_leaves_cell_empty() -> Result<(), Box<dyn std::error::Error>> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(async {
            let cell: DatabaseCell = DatabaseCell::new();
            let err = cell
                .get_or_init(|| async { Err(DriverError::ConfigError("no url".into())) })
                .await
                .unwrap_err();
            assert!(matches!(err, DriverError::ConfigError(_)));
            assert!(cell.get().await.is_none());
            Ok(())
        })
    }
}
