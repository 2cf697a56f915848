use std::future::Future;
use std::time::Duration;

use bb8::{ErrorSink, ManageConnection};
use deadpool::managed::{Manager, Metrics, RecycleError, RecycleResult};

use super::session::{PgConnectOptions, PgSession, connect};
use crate::error::DriverError;
use crate::types::DriverId;

/// bb8 manager for socket sessions.
#[derive(Debug)]
pub struct PgManager {
    options: PgConnectOptions,
}

impl PgManager {
    pub(crate) fn new(options: PgConnectOptions) -> Self {
        Self { options }
    }
}

impl ManageConnection for PgManager {
    type Connection = PgSession;
    type Error = DriverError;

    #[allow(clippy::manual_async_fn)]
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send {
        let options = self.options.clone();
        async move { connect(&options).await }
    }

    #[allow(clippy::manual_async_fn)]
    fn is_valid(
        &self,
        conn: &mut Self::Connection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        async move {
            conn.client().simple_query("SELECT 1").await?;
            Ok(())
        }
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.is_closed()
    }
}

/// deadpool manager for socket sessions; recycling enforces idle timeout and lifetime.
#[derive(Debug)]
pub struct PgSessionManager {
    options: PgConnectOptions,
    idle_timeout: Option<Duration>,
    max_lifetime: Option<Duration>,
}

impl PgSessionManager {
    pub(crate) fn new(
        options: PgConnectOptions,
        idle_timeout: Option<Duration>,
        max_lifetime: Option<Duration>,
    ) -> Self {
        Self {
            options,
            idle_timeout,
            max_lifetime,
        }
    }
}

impl Manager for PgSessionManager {
    type Type = PgSession;
    type Error = DriverError;

    #[allow(clippy::manual_async_fn)]
    fn create(&self) -> impl Future<Output = Result<PgSession, DriverError>> + Send {
        async move { connect(&self.options).await }
    }

    #[allow(clippy::manual_async_fn)]
    fn recycle(
        &self,
        conn: &mut PgSession,
        metrics: &Metrics,
    ) -> impl Future<Output = RecycleResult<DriverError>> + Send {
        let verdict = if conn.is_closed() {
            Err(RecycleError::Message("connection closed".into()))
        } else if self.max_lifetime.is_some_and(|max| metrics.age() > max) {
            Err(RecycleError::Message("connection exceeded its max lifetime".into()))
        } else if self.idle_timeout.is_some_and(|idle| metrics.last_used() > idle) {
            Err(RecycleError::Message("connection idle for too long".into()))
        } else {
            Ok(())
        };
        if verdict.is_err() {
            tracing::debug!(session = conn.id(), "discarding pooled postgres session");
        }
        async move { verdict }
    }
}

/// Logs bb8 background connection errors instead of surfacing them to callers.
#[derive(Debug, Clone)]
pub(crate) struct TracingErrorSink {
    driver: DriverId,
}

impl TracingErrorSink {
    pub(crate) fn new(driver: DriverId) -> Self {
        Self { driver }
    }
}

impl ErrorSink<DriverError> for TracingErrorSink {
    fn sink(&self, error: DriverError) {
        tracing::warn!(driver = %self.driver, error = %error, "background connection error");
    }

    fn boxed_clone(&self) -> Box<dyn ErrorSink<DriverError>> {
        Box::new(self.clone())
    }
}
