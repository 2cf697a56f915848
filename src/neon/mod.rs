// Neon-style serverless Postgres:
// - protocol / http: the stateless SQL-over-HTTPS transport (`neon-http`)
// - websocket: Postgres protocol tunnelled through a WebSocket (`neon-websocket`)

#[cfg(feature = "neon-http")]
mod http;
#[cfg(feature = "neon-http")]
mod protocol;
#[cfg(feature = "neon-websocket")]
mod websocket;

#[cfg(feature = "neon-http")]
pub use http::NeonHttpClient;
#[cfg(feature = "neon-websocket")]
pub use websocket::NeonWsManager;

#[cfg(any(feature = "neon-http", feature = "neon-websocket"))]
use std::sync::Arc;

#[cfg(any(feature = "neon-http", feature = "neon-websocket"))]
use crate::{adapter::DriverAdapter, config::DriverConfig, error::DriverError};

/// `neon-http`: no network traffic until the first statement.
///
/// # Errors
/// Returns `DriverError::ConfigError` when no endpoint can be derived from the URL.
#[cfg(feature = "neon-http")]
#[allow(clippy::unused_async)]
pub(crate) async fn create_neon_http(config: DriverConfig) -> Result<Arc<dyn DriverAdapter>, DriverError> {
    let client = NeonHttpClient::from_driver_config(&config)?;
    Ok(Arc::new(http::NeonHttpAdapter::new(client)))
}

/// `neon-websocket`: a lazily connecting bb8 pool of tunnelled sessions.
///
/// # Errors
/// Returns `DriverError::ConfigError` for an unusable URL or endpoint.
#[cfg(feature = "neon-websocket")]
#[allow(clippy::unused_async)]
pub(crate) async fn create_neon_websocket(
    config: DriverConfig,
) -> Result<Arc<dyn DriverAdapter>, DriverError> {
    use crate::adapter::NativeHandle;
    use crate::capabilities::DriverCapabilities;
    use crate::postgres::{PooledPgAdapter, build_bb8_pool};
    use crate::types::DriverId;

    let manager = NeonWsManager::from_driver_config(&config)?;
    tracing::debug!(endpoint = manager.endpoint(), "neon websocket endpoint");
    let pool = build_bb8_pool(manager, &config.pool_or_default(), &DriverId::NEON_WEBSOCKET);
    Ok(Arc::new(PooledPgAdapter::new(
        DriverId::NEON_WEBSOCKET,
        DriverCapabilities::NEON_WEBSOCKET,
        pool,
        NativeHandle::NeonWebsocketPool,
    )))
}
