// PlanetScale-style serverless MySQL over HTTPS.

mod client;
mod protocol;

use std::sync::Arc;

pub use client::PlanetscaleClient;

use crate::adapter::DriverAdapter;
use crate::config::DriverConfig;
use crate::error::DriverError;

/// `planetscale`: no network traffic until the first statement.
///
/// # Errors
/// Returns `DriverError::ConfigError` when the URL has no host.
#[allow(clippy::unused_async)]
pub(crate) async fn create_planetscale(config: DriverConfig) -> Result<Arc<dyn DriverAdapter>, DriverError> {
    let client = PlanetscaleClient::from_driver_config(&config)?;
    Ok(Arc::new(client::PlanetscaleAdapter::new(client)))
}
