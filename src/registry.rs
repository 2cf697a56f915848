//! Driver identifiers mapped to their dialect, capabilities and constructor.
//!
//! Built-in drivers are compiled in behind cargo features. A built-in whose feature is
//! disabled stays registered so it can be described and probed, but constructing it
//! fails with [`DriverError::DriverUnavailable`] naming the feature to enable.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::adapter::DriverAdapter;
use crate::capabilities::{BUILTIN_DRIVERS, DriverCapabilities, builtin_profile};
use crate::config::DriverConfig;
use crate::error::DriverError;
use crate::types::{Dialect, DriverId};

/// Future returned by a driver constructor.
pub type AdapterFuture = BoxFuture<'static, Result<Arc<dyn DriverAdapter>, DriverError>>;

/// Constructor of one driver's adapter.
pub type DriverFactory = Arc<dyn Fn(DriverConfig) -> AdapterFuture + Send + Sync>;

/// Wrap an async constructor as a [`DriverFactory`].
pub fn driver_factory<F, Fut>(create: F) -> DriverFactory
where
    F: Fn(DriverConfig) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Arc<dyn DriverAdapter>, DriverError>> + Send + 'static,
{
    Arc::new(move |config| Box::pin(create(config)))
}

/// Factory of a built-in driver, `None` when its feature is compiled out.
macro_rules! feature_factory {
    ($feature:literal, $create:path) => {{
        #[cfg(feature = $feature)]
        let factory: Option<DriverFactory> = Some(driver_factory($create));
        #[cfg(not(feature = $feature))]
        let factory: Option<DriverFactory> = None;
        factory
    }};
}

#[derive(Clone)]
pub struct DriverEntry {
    pub id: DriverId,
    pub dialect: Dialect,
    pub capabilities: DriverCapabilities,
    /// Backend crate the driver is built on.
    pub package: &'static str,
    /// Cargo feature that compiles the driver in; `None` for custom drivers.
    pub feature: Option<&'static str>,
    /// Built-ins outside the default feature set.
    pub optional: bool,
    factory: Option<DriverFactory>,
}

impl fmt::Debug for DriverEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverEntry")
            .field("id", &self.id)
            .field("dialect", &self.dialect)
            .field("package", &self.package)
            .field("feature", &self.feature)
            .field("available", &self.is_available())
            .finish_non_exhaustive()
    }
}

impl DriverEntry {
    /// A driver registered at runtime.
    #[must_use]
    pub fn custom(
        id: DriverId,
        dialect: Dialect,
        capabilities: DriverCapabilities,
        factory: DriverFactory,
    ) -> Self {
        Self {
            id,
            dialect,
            capabilities,
            package: "custom",
            feature: None,
            optional: false,
            factory: Some(factory),
        }
    }

    /// Whether the constructor is compiled in.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.factory.is_some()
    }

    /// Build the adapter.
    ///
    /// # Errors
    /// Returns `DriverError::DriverUnavailable` when the driver's feature is disabled,
    /// otherwise whatever the constructor returns.
    pub async fn create(&self, config: DriverConfig) -> Result<Arc<dyn DriverAdapter>, DriverError> {
        match &self.factory {
            Some(factory) => factory(config).await,
            None => Err(DriverError::DriverUnavailable {
                driver: self.id.to_string(),
                feature: self.feature.unwrap_or(self.package).to_string(),
            }),
        }
    }
}

fn builtin(id: &DriverId) -> Option<DriverEntry> {
    let (dialect, capabilities) = builtin_profile(id)?;
    let (package, feature, optional, factory) = match id.as_str() {
        "neon-http" => (
            "reqwest",
            "neon-http",
            false,
            feature_factory!("neon-http", crate::neon::create_neon_http),
        ),
        "neon-websocket" => (
            "async-tungstenite",
            "neon-websocket",
            true,
            feature_factory!("neon-websocket", crate::neon::create_neon_websocket),
        ),
        "postgres" => (
            "tokio-postgres",
            "postgres",
            false,
            feature_factory!("postgres", crate::postgres::create_postgres),
        ),
        "pg" => (
            "tokio-postgres",
            "postgres",
            false,
            feature_factory!("postgres", crate::postgres::create_pg),
        ),
        "pg-pool" => (
            "deadpool",
            "postgres",
            false,
            feature_factory!("postgres", crate::postgres::create_pg_pool),
        ),
        "planetscale" => (
            "reqwest",
            "planetscale",
            true,
            feature_factory!("planetscale", crate::planetscale::create_planetscale),
        ),
        "mysql2" => (
            "mysql_async",
            "mysql",
            true,
            feature_factory!("mysql", crate::mysql::create_mysql2),
        ),
        _ => return None,
    };
    Some(DriverEntry {
        id: id.clone(),
        dialect,
        capabilities,
        package,
        feature: Some(feature),
        optional,
        factory,
    })
}

/// Registered drivers, in registration order.
#[derive(Debug, Clone)]
pub struct DriverRegistry {
    entries: Vec<DriverEntry>,
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl DriverRegistry {
    /// A registry without any driver.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Every built-in driver, available or not.
    #[must_use]
    pub fn with_builtins() -> Self {
        Self {
            entries: BUILTIN_DRIVERS.iter().filter_map(builtin).collect(),
        }
    }

    /// Add `entry`, replacing and returning a previous entry with the same id.
    pub fn register_driver(&mut self, entry: DriverEntry) -> Option<DriverEntry> {
        tracing::debug!(driver = %entry.id, package = entry.package, "registering driver");
        match self.entries.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => Some(std::mem::replace(existing, entry)),
            None => {
                self.entries.push(entry);
                None
            }
        }
    }

    #[must_use]
    pub fn get(&self, id: &DriverId) -> Option<&DriverEntry> {
        self.entries.iter().find(|e| &e.id == id)
    }

    /// Registered identifiers.
    #[must_use]
    pub fn drivers(&self) -> Vec<DriverId> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }

    /// Registered and compiled in.
    #[must_use]
    pub fn is_driver_available(&self, id: &DriverId) -> bool {
        self.get(id).is_some_and(DriverEntry::is_available)
    }

    /// Build the adapter for `id`.
    ///
    /// # Errors
    /// Returns `DriverError::UnknownDriver` for an unregistered id,
    /// `DriverError::DriverUnavailable` for a compiled-out built-in, otherwise the
    /// constructor's error.
    pub async fn create_driver_adapter(
        &self,
        id: &DriverId,
        config: DriverConfig,
    ) -> Result<Arc<dyn DriverAdapter>, DriverError> {
        let entry = self
            .get(id)
            .ok_or_else(|| DriverError::UnknownDriver(id.to_string()))?;
        entry.create(config).await
    }
}
