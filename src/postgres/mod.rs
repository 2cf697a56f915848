// Postgres family built on tokio-postgres:
// - session: connection options, TLS, one protocol session with its statement cache
// - params / query: RowValues <-> Postgres type conversion
// - manager: bb8 and deadpool connection managers
// - tx: a session reserved for one transaction, rolled back if abandoned
// - pooled / pool_adapter / client: the `postgres`, `pg-pool` and `pg` adapters

mod client;
mod manager;
mod params;
mod pool_adapter;
mod pooled;
pub(crate) mod query;
pub(crate) mod session;
mod tx;

use std::sync::Arc;

use crate::adapter::{DriverAdapter, NativeHandle};
use crate::capabilities::DriverCapabilities;
use crate::config::DriverConfig;
use crate::error::DriverError;
use crate::types::DriverId;

pub use manager::{PgManager, PgSessionManager};
pub(crate) use pooled::{PooledPgAdapter, build_pool as build_bb8_pool};
pub use session::PgSession;

/// `postgres`: bb8 pool of socket sessions. Connections open on first use.
///
/// # Errors
/// Returns `DriverError::ConfigError` for an unusable URL.
#[allow(clippy::unused_async)]
pub(crate) async fn create_postgres(config: DriverConfig) -> Result<Arc<dyn DriverAdapter>, DriverError> {
    let options = session::PgConnectOptions::from_driver_config(&config)?;
    let pool = build_bb8_pool(
        PgManager::new(options),
        &config.pool_or_default(),
        &DriverId::POSTGRES,
    );
    Ok(Arc::new(PooledPgAdapter::new(
        DriverId::POSTGRES,
        DriverCapabilities::POSTGRES,
        pool,
        NativeHandle::PostgresPool,
    )))
}

/// `pg-pool`: deadpool pool of socket sessions.
///
/// # Errors
/// Returns `DriverError::ConfigError` for an unusable URL or pool settings.
#[allow(clippy::unused_async)]
pub(crate) async fn create_pg_pool(config: DriverConfig) -> Result<Arc<dyn DriverAdapter>, DriverError> {
    let options = session::PgConnectOptions::from_driver_config(&config)?;
    let pool_options = config.pool_or_default();
    let manager = PgSessionManager::new(
        options,
        pool_options.idle_timeout,
        pool_options.max_lifetime,
    );
    let pool = pool_adapter::build_pool(manager, &pool_options)?;
    Ok(Arc::new(pool_adapter::DeadpoolPgAdapter::new(pool)))
}

/// `pg`: one session, connected before this returns.
///
/// # Errors
/// Returns the connect error when the server is unreachable.
pub(crate) async fn create_pg(config: DriverConfig) -> Result<Arc<dyn DriverAdapter>, DriverError> {
    let options = session::PgConnectOptions::from_driver_config(&config)?;
    let session = session::connect(&options).await?;
    Ok(Arc::new(client::PgClientAdapter::new(session)))
}
