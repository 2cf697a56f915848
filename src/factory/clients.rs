use std::future::Future;

use super::{Database, DatabaseFactory, QueryLayer};
use crate::adapter::NativeHandle;
use crate::config::{DatabaseOptions, PoolOptions};
use crate::env::{ADMIN_DATABASE_URL_VAR, PRIVILEGED_DATABASE_URL_VAR};
use crate::error::DriverError;

/// Options for [`DbClients`]: the regular tier's options plus the extra tiers' URLs.
///
/// Privileged and admin tiers inherit everything from `base` except the URL and,
/// when given, the pool.
#[derive(Debug, Clone, Default)]
pub struct DbClientsOptions {
    pub base: DatabaseOptions,
    /// Falls back to `DATABASE_PRIVILEGED_URL`.
    pub privileged_url: Option<String>,
    /// Falls back to `DATABASE_ADMIN_URL`.
    pub admin_url: Option<String>,
    pub privileged_pool: Option<PoolOptions>,
    pub admin_pool: Option<PoolOptions>,
}

impl DbClientsOptions {
    #[must_use]
    pub fn new(base: DatabaseOptions) -> Self {
        Self {
            base,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn privileged_url(mut self, url: impl Into<String>) -> Self {
        self.privileged_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn admin_url(mut self, url: impl Into<String>) -> Self {
        self.admin_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn privileged_pool(mut self, pool: PoolOptions) -> Self {
        self.privileged_pool = Some(pool);
        self
    }

    #[must_use]
    pub fn admin_pool(mut self, pool: PoolOptions) -> Self {
        self.admin_pool = Some(pool);
        self
    }
}

/// Three databases by privilege: `db` is subject to row-level security,
/// `privileged_db` bypasses it, `admin_db` can change the schema.
#[derive(Debug)]
pub struct DbClients<Q = NativeHandle> {
    pub db: Database<Q>,
    pub privileged_db: Option<Database<Q>>,
    pub admin_db: Option<Database<Q>>,
}

impl<Q> DbClients<Q> {
    #[must_use]
    pub fn is_privileged_db_available(&self) -> bool {
        self.privileged_db.is_some()
    }

    #[must_use]
    pub fn is_admin_db_available(&self) -> bool {
        self.admin_db.is_some()
    }

    /// Run `f` against the privileged tier.
    ///
    /// # Errors
    /// Returns `DriverError::ConfigError` naming `DATABASE_PRIVILEGED_URL` when the tier
    /// was not configured, otherwise `f`'s error.
    pub async fn with_privileged_db<'a, F, Fut, T>(&'a self, f: F) -> Result<T, DriverError>
    where
        F: FnOnce(&'a Database<Q>) -> Fut,
        Fut: Future<Output = Result<T, DriverError>>,
    {
        let db = self
            .privileged_db
            .as_ref()
            .ok_or_else(|| missing_tier("privileged", PRIVILEGED_DATABASE_URL_VAR))?;
        f(db).await
    }

    /// Run `f` against the admin tier.
    ///
    /// # Errors
    /// Returns `DriverError::ConfigError` naming `DATABASE_ADMIN_URL` when the tier was
    /// not configured, otherwise `f`'s error.
    pub async fn with_admin_db<'a, F, Fut, T>(&'a self, f: F) -> Result<T, DriverError>
    where
        F: FnOnce(&'a Database<Q>) -> Fut,
        Fut: Future<Output = Result<T, DriverError>>,
    {
        let db = self
            .admin_db
            .as_ref()
            .ok_or_else(|| missing_tier("admin", ADMIN_DATABASE_URL_VAR))?;
        f(db).await
    }

    /// Close every tier concurrently.
    ///
    /// # Errors
    /// Returns the first tier's close error; all tiers are closed regardless.
    pub async fn close_all(&self) -> Result<(), DriverError> {
        let (db, privileged, admin) = futures_util::future::join3(
            self.db.close(),
            close_tier(self.privileged_db.as_ref()),
            close_tier(self.admin_db.as_ref()),
        )
        .await;
        db.and(privileged).and(admin)
    }
}

fn missing_tier(tier: &str, var: &str) -> DriverError {
    DriverError::ConfigError(format!("{tier} database is not configured; set {var}"))
}

async fn close_tier<Q>(db: Option<&Database<Q>>) -> Result<(), DriverError> {
    match db {
        Some(db) => db.close().await,
        None => Ok(()),
    }
}

fn tier_options(
    base: &DatabaseOptions,
    url: String,
    pool: Option<PoolOptions>,
) -> DatabaseOptions {
    let mut options = base.clone().url(url);
    if let Some(pool) = pool {
        options = options.pool(pool);
    }
    options
}

pub(super) async fn create<Q: QueryLayer>(
    factory: &DatabaseFactory,
    options: DbClientsOptions,
) -> Result<DbClients<Q>, DriverError> {
    let privileged_url = options
        .privileged_url
        .clone()
        .or_else(|| factory.env().var(PRIVILEGED_DATABASE_URL_VAR));
    let admin_url = options
        .admin_url
        .clone()
        .or_else(|| factory.env().var(ADMIN_DATABASE_URL_VAR));

    let db = factory.create::<Q>(options.base.clone()).await?;
    let mut clients = DbClients {
        db,
        privileged_db: None,
        admin_db: None,
    };

    if let Some(url) = privileged_url {
        let tier = tier_options(&options.base, url, options.privileged_pool.clone());
        match factory.create::<Q>(tier).await {
            Ok(db) => clients.privileged_db = Some(db),
            Err(err) => return Err(abandon(clients, err).await),
        }
    } else {
        tracing::debug!("no privileged database configured");
    }

    if let Some(url) = admin_url {
        let tier = tier_options(&options.base, url, options.admin_pool.clone());
        match factory.create::<Q>(tier).await {
            Ok(db) => clients.admin_db = Some(db),
            Err(err) => return Err(abandon(clients, err).await),
        }
    } else {
        tracing::debug!("no admin database configured");
    }

    Ok(clients)
}

/// Close the tiers built so far and hand back the error that stopped construction.
async fn abandon<Q>(clients: DbClients<Q>, err: DriverError) -> DriverError {
    if let Err(close) = clients.close_all().await {
        tracing::warn!(error = %close, "closing partially built clients failed");
    }
    err
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::capabilities::DriverCapabilities;
    use crate::env::MapEnv;
    use crate::registry::{DriverEntry, DriverRegistry, driver_factory};
    use crate::test_utils::MemoryAdapter;
    use crate::types::{Dialect, DriverId};

    fn factory(env: MapEnv) -> DatabaseFactory {
        let mut registry = DriverRegistry::empty();
        registry.register_driver(DriverEntry::custom(
            DriverId::new("memory"),
            Dialect::Postgresql,
            DriverCapabilities::POSTGRES,
            driver_factory(|config: crate::config::DriverConfig| async move {
                Ok(Arc::new(MemoryAdapter::new(config.driver, Dialect::Postgresql))
                    as Arc<dyn crate::adapter::DriverAdapter>)
            }),
        ));
        DatabaseFactory::new().with_registry(registry).with_env(env)
    }

    #[test]
    fn missing_tiers_are_none() -> Result<(), Box<dyn std::error::Error>> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(async {
            let options = DbClientsOptions::new(DatabaseOptions::new().url("memory://app").driver("memory"));
            let clients: DbClients = factory(MapEnv::new()).create_db_clients(options).await?;
            assert!(!clients.is_privileged_db_available());
            assert!(!clients.is_admin_db_available());

            let err = clients
                .with_privileged_db(|db| async move { db.execute("SELECT 1", &[]).await })
                .await
                .unwrap_err();
            assert!(err.to_string().contains("DATABASE_PRIVILEGED_URL"));
            let err = clients.with_admin_db(|_| async { Ok(()) }).await.unwrap_err();
            assert!(err.to_string().contains("DATABASE_ADMIN_URL"));

            clients.close_all().await?;
            assert!(clients.db.is_closed());
            Ok(())
        })
    }

    #[test]
    fn tiers_come_from_environment() -> Result<(), Box<dyn std::error::Error>> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(async {
            let env = MapEnv::new()
                .with(PRIVILEGED_DATABASE_URL_VAR, "memory://privileged")
                .with(ADMIN_DATABASE_URL_VAR, "memory://admin");
            let options = DbClientsOptions::new(DatabaseOptions::new().url("memory://app").driver("memory"));
            let clients: DbClients = factory(env).create_db_clients(options).await?;
            assert!(clients.is_privileged_db_available());
            assert!(clients.is_admin_db_available());

            let rows = clients
                .with_admin_db(|db| async move { db.execute("SELECT 1", &[]).await })
                .await?;
            assert_eq!(rows.row_count, 1);

            clients.close_all().await?;
            clients.close_all().await?;
            assert!(clients.admin_db.as_ref().is_some_and(Database::is_closed));
            assert!(clients.privileged_db.as_ref().is_some_and(Database::is_closed));
            Ok(())
        })
    }
}
