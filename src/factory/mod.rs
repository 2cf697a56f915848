//! Assembles an adapter from options and the environment.
//!
//! [`DatabaseFactory::create`] resolves the connection URL, picks a driver (explicit,
//! `DATABASE_DRIVER`, or the recommender), projects the options onto that driver,
//! builds the adapter through the registry and binds the query layer to its native
//! handle.

use std::sync::Arc;

use crate::adapter::NativeHandle;
use crate::config::{ConfigDefaults, DatabaseOptions, SslMode, build_driver_config};
use crate::detect::{
    DriverRecommendation, RuntimeEnvironment, detect_environment, parse_connection_url, recommend,
};
use crate::env::{DATABASE_DRIVER_VAR, DATABASE_URL_VARS, EnvSource, ProcessEnv};
use crate::error::DriverError;
use crate::registry::{DriverEntry, DriverRegistry};
use crate::types::{Dialect, DriverId};

mod cell;
mod clients;
mod database;

pub use cell::DatabaseCell;
pub use clients::{DbClients, DbClientsOptions};
pub use database::Database;

/// The layer callers build queries with, bound once to the adapter's native handle.
pub trait QueryLayer: Send + Sync + Sized + 'static {
    fn bind(handle: NativeHandle, dialect: Dialect) -> Self;
}

impl QueryLayer for NativeHandle {
    fn bind(handle: NativeHandle, _dialect: Dialect) -> Self {
        handle
    }
}

/// A driver choice and the recommendation behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverChoice {
    pub driver: DriverId,
    /// `None` when the driver was given in the options.
    pub recommendation: Option<DriverRecommendation>,
}

/// Registry plus the environment the factory reads.
#[derive(Clone)]
pub struct DatabaseFactory {
    registry: Arc<DriverRegistry>,
    env: Arc<dyn EnvSource>,
}

impl std::fmt::Debug for DatabaseFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseFactory")
            .field("drivers", &self.registry.drivers())
            .finish_non_exhaustive()
    }
}

impl Default for DatabaseFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl DatabaseFactory {
    /// Built-in drivers and the process environment.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Arc::new(DriverRegistry::with_builtins()),
            env: Arc::new(ProcessEnv),
        }
    }

    #[must_use]
    pub fn with_registry(mut self, registry: DriverRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    #[must_use]
    pub fn with_env(mut self, env: impl EnvSource + 'static) -> Self {
        self.env = Arc::new(env);
        self
    }

    /// Add a driver to this factory's registry.
    pub fn register_driver(&mut self, entry: DriverEntry) -> Option<DriverEntry> {
        Arc::make_mut(&mut self.registry).register_driver(entry)
    }

    #[must_use]
    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    pub(crate) fn env(&self) -> &dyn EnvSource {
        self.env.as_ref()
    }

    /// The connection URL: the option, else the first set of [`DATABASE_URL_VARS`].
    ///
    /// # Errors
    /// Returns `DriverError::ConfigError` when no source has a URL.
    pub fn resolve_url(&self, options: &DatabaseOptions) -> Result<String, DriverError> {
        if let Some(url) = options.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            return Ok(url.to_string());
        }
        self.env
            .first_of(&DATABASE_URL_VARS)
            .map(|(key, url)| {
                tracing::debug!(source = key, "connection URL taken from environment");
                url
            })
            .ok_or_else(|| {
                DriverError::ConfigError(format!(
                    "no connection URL: pass one in the options or set one of {}",
                    DATABASE_URL_VARS.join(", ")
                ))
            })
    }

    /// Decide which driver serves `url`.
    ///
    /// # Errors
    /// Returns `DriverError::UnknownDriver` when the options name an unregistered driver.
    pub fn resolve_driver(
        &self,
        options: &DatabaseOptions,
        url: &str,
    ) -> Result<DriverChoice, DriverError> {
        let runtime = detect_environment(self.env.as_ref());
        let mut choice = match &options.driver {
            Some(driver) => {
                if self.registry.get(driver).is_none() {
                    return Err(DriverError::UnknownDriver(driver.to_string()));
                }
                DriverChoice {
                    driver: driver.clone(),
                    recommendation: None,
                }
            }
            None => {
                let recommendation = self.recommend(url, &runtime);
                DriverChoice {
                    driver: recommendation.recommended_driver.clone(),
                    recommendation: Some(recommendation),
                }
            }
        };
        if options.full_transaction_support {
            choice.driver = self.transactional(choice.driver);
        }
        Ok(choice)
    }

    fn recommend(&self, url: &str, runtime: &RuntimeEnvironment) -> DriverRecommendation {
        let overridden = self.env.var(DATABASE_DRIVER_VAR).map(DriverId::new).filter(|id| {
            let known = self.registry.get(id).is_some();
            if !known {
                tracing::warn!(driver = %id, "ignoring unknown driver in {DATABASE_DRIVER_VAR}");
            }
            known
        });
        let (info, parse_error) = match parse_connection_url(url) {
            Ok(info) => (Some(info), None),
            Err(err) => (None, Some(err.to_string())),
        };
        let mut recommendation = recommend(info.as_ref(), runtime, overridden, true);
        recommendation.warnings.extend(parse_error);

        if !self.registry.is_driver_available(&recommendation.recommended_driver)
            && let Some(fallback) = recommendation
                .alternatives
                .iter()
                .find(|id| self.registry.is_driver_available(id))
                .cloned()
        {
            recommendation.warnings.push(format!(
                "{} is not compiled in; using {fallback}",
                recommendation.recommended_driver
            ));
            recommendation.recommended_driver = fallback;
        }

        tracing::debug!(
            driver = %recommendation.recommended_driver,
            reason = %recommendation.reason,
            "driver recommended"
        );
        for warning in &recommendation.warnings {
            tracing::warn!(driver = %recommendation.recommended_driver, "{warning}");
        }
        recommendation
    }

    /// Swap a driver without transactions for its transactional sibling when that
    /// sibling is available.
    fn transactional(&self, driver: DriverId) -> DriverId {
        let has_transactions = self
            .registry
            .get(&driver)
            .is_some_and(|entry| entry.capabilities.transactions);
        if has_transactions {
            return driver;
        }
        let sibling = match driver.as_str() {
            "neon-http" => DriverId::NEON_WEBSOCKET,
            "planetscale" => DriverId::MYSQL2,
            _ => return driver,
        };
        if self.registry.is_driver_available(&sibling) {
            tracing::info!(from = %driver, to = %sibling, "upgrading driver for transaction support");
            sibling
        } else {
            tracing::warn!(
                driver = %driver,
                sibling = %sibling,
                "full transaction support requested but the transactional driver is not available"
            );
            driver
        }
    }

    /// Build a [`Database`] from `options` and the environment.
    ///
    /// # Errors
    /// Returns `DriverError::ConfigError` without a URL, `DriverError::UnknownDriver`
    /// for an unregistered driver, `DriverError::DriverUnavailable` for a compiled-out
    /// one, otherwise the driver's connection error.
    pub async fn create<Q: QueryLayer>(
        &self,
        options: DatabaseOptions,
    ) -> Result<Database<Q>, DriverError> {
        let url = self.resolve_url(&options)?;
        let choice = self.resolve_driver(&options, &url)?;
        let runtime = detect_environment(self.env.as_ref());

        let mut defaults = ConfigDefaults::from_env(self.env.as_ref(), runtime.is_production);
        defaults.url_ssl = parse_connection_url(&url)
            .ok()
            .and_then(|info| info.ssl_mode)
            .and_then(|mode| SslMode::from_url_value(&mode));
        let config = build_driver_config(&options, &choice.driver, &url, &defaults);

        let adapter = self
            .registry
            .create_driver_adapter(&choice.driver, config)
            .await?;
        tracing::info!(
            driver = %adapter.driver(),
            dialect = %adapter.dialect(),
            "database adapter created"
        );
        let query = Q::bind(adapter.native_handle(), adapter.dialect());
        Ok(Database::new(adapter, query, choice.recommendation))
    }

    /// Build the three privilege tiers.
    ///
    /// # Errors
    /// Same as [`DatabaseFactory::create`] for any tier that has a URL.
    pub async fn create_db_clients<Q: QueryLayer>(
        &self,
        options: DbClientsOptions,
    ) -> Result<DbClients<Q>, DriverError> {
        clients::create(self, options).await
    }
}

/// [`DatabaseFactory::create`] with the built-in drivers and the process environment.
///
/// # Errors
/// See [`DatabaseFactory::create`].
pub async fn create_database(options: DatabaseOptions) -> Result<Database, DriverError> {
    DatabaseFactory::new().create(options).await
}

/// [`DatabaseFactory::create_db_clients`] with the built-in drivers and the process
/// environment.
///
/// # Errors
/// See [`DatabaseFactory::create`].
pub async fn create_db_clients(options: DbClientsOptions) -> Result<DbClients, DriverError> {
    DatabaseFactory::new().create_db_clients(options).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::DriverCapabilities;
    use crate::env::MapEnv;
    use crate::registry::driver_factory;
    use crate::test_utils::MemoryAdapter;

    fn memory_entry(id: &str, capabilities: DriverCapabilities) -> DriverEntry {
        DriverEntry::custom(
            DriverId::new(id),
            Dialect::Postgresql,
            capabilities,
            driver_factory(move |config: crate::config::DriverConfig| async move {
                Ok(Arc::new(
                    MemoryAdapter::new(config.driver, Dialect::Postgresql).with_capabilities(capabilities),
                ) as Arc<dyn crate::adapter::DriverAdapter>)
            }),
        )
    }

    #[test]
    fn url_option_beats_environment() {
        let factory = DatabaseFactory::new().with_env(
            MapEnv::new()
                .with("POSTGRES_URL", "postgres://second")
                .with("NEON_DATABASE_URL", "postgres://third"),
        );
        let explicit = DatabaseOptions::new().url("postgres://first");
        assert_eq!(factory.resolve_url(&explicit).unwrap(), "postgres://first");
        assert_eq!(
            factory.resolve_url(&DatabaseOptions::new()).unwrap(),
            "postgres://second"
        );
    }

    #[test]
    fn missing_url_names_the_variables() {
        let factory = DatabaseFactory::new().with_env(MapEnv::new());
        let err = factory.resolve_url(&DatabaseOptions::new()).unwrap_err();
        assert!(matches!(err, DriverError::ConfigError(_)));
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn unregistered_option_driver_is_rejected() {
        let factory = DatabaseFactory::new().with_env(MapEnv::new());
        let options = DatabaseOptions::new().driver("nope");
        assert!(matches!(
            factory.resolve_driver(&options, "postgres://h/db"),
            Err(DriverError::UnknownDriver(_))
        ));
    }

    #[test]
    fn unknown_env_override_is_ignored() {
        let factory = DatabaseFactory::new().with_env(MapEnv::new().with(DATABASE_DRIVER_VAR, "nope"));
        let choice = factory
            .resolve_driver(&DatabaseOptions::new(), "postgres://localhost/app")
            .unwrap();
        assert_ne!(choice.driver, DriverId::new("nope"));
        assert!(choice.recommendation.is_some());
    }

    #[test]
    fn known_env_override_wins() {
        let factory = DatabaseFactory::new().with_env(MapEnv::new().with(DATABASE_DRIVER_VAR, "pg"));
        let choice = factory
            .resolve_driver(&DatabaseOptions::new(), "postgres://localhost/app")
            .unwrap();
        assert_eq!(choice.driver, DriverId::PG);
    }

    #[test]
    fn full_transaction_support_upgrades_to_available_sibling() {
        let mut factory = DatabaseFactory::new().with_env(MapEnv::new());
        factory.register_driver(memory_entry("neon-websocket", DriverCapabilities::NEON_WEBSOCKET));
        let options = DatabaseOptions::new()
            .driver(DriverId::NEON_HTTP)
            .full_transaction_support(true);
        let choice = factory.resolve_driver(&options, "postgres://x.neon.tech/db").unwrap();
        assert_eq!(choice.driver, DriverId::NEON_WEBSOCKET);

        let mut without = DatabaseFactory::new().with_registry(DriverRegistry::empty());
        without.register_driver(memory_entry("neon-http", DriverCapabilities::NEON_HTTP));
        let choice = without.resolve_driver(&options, "postgres://x.neon.tech/db").unwrap();
        assert_eq!(choice.driver, DriverId::NEON_HTTP);
    }

    #[test]
    fn creates_a_registered_custom_driver() -> Result<(), Box<dyn std::error::Error>> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(async {
            let mut factory = DatabaseFactory::new()
                .with_env(MapEnv::new().with("DATABASE_URL", "memory://local"));
            factory.register_driver(memory_entry("memory", DriverCapabilities::POSTGRES));
            let db: Database = factory
                .create(DatabaseOptions::new().driver("memory"))
                .await?;
            assert_eq!(db.driver(), &DriverId::new("memory"));
            assert!(db.recommendation().is_none());
            assert!(db.ping().await);
            db.close().await?;
            Ok(())
        })
    }
}
