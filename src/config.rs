//! Generic options and their per-driver projection.

use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;
use serde::Serialize;

use crate::env::{DATABASE_DEBUG_VAR, DATABASE_POOL_SIZE_VAR, EnvSource};
use crate::logging::QueryLogger;
use crate::types::DriverId;

/// Default maximum pool size when neither the options nor the environment set one.
pub const DEFAULT_POOL_MAX: u32 = 10;

/// TLS requirement for socket drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    /// Plain TCP
    Disable,
    /// TLS if the server offers it, without certificate verification
    Prefer,
    /// TLS required, without certificate verification
    Require,
    /// TLS required with certificate and hostname verification
    VerifyFull,
}

impl SslMode {
    /// Parse the `sslmode` / `ssl-mode` spellings used in connection URLs.
    #[must_use]
    pub fn from_url_value(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().replace('_', "-").as_str() {
            "disable" | "disabled" | "false" | "0" => Some(SslMode::Disable),
            "allow" | "prefer" | "preferred" => Some(SslMode::Prefer),
            "require" | "required" | "true" | "1" => Some(SslMode::Require),
            "verify-ca" | "verify-full" | "verify-identity" => Some(SslMode::VerifyFull),
            _ => None,
        }
    }

    /// Explicit mode, else the URL's mode, else `Require` in production and `Disable`
    /// everywhere else.
    #[must_use]
    pub fn resolve(explicit: Option<SslMode>, from_url: Option<SslMode>, is_production: bool) -> Self {
        explicit.or(from_url).unwrap_or(if is_production {
            SslMode::Require
        } else {
            SslMode::Disable
        })
    }
}

/// Pool sizing and connection lifetimes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOptions {
    pub max: u32,
    pub min: u32,
    pub idle_timeout: Option<Duration>,
    pub max_lifetime: Option<Duration>,
    pub connect_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max: DEFAULT_POOL_MAX,
            min: 0,
            idle_timeout: Some(Duration::from_secs(30)),
            max_lifetime: Some(Duration::from_secs(30 * 60)),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl PoolOptions {
    #[must_use]
    pub fn with_max(mut self, max: u32) -> Self {
        self.max = max.max(1);
        self
    }

    #[must_use]
    pub fn with_min(mut self, min: u32) -> Self {
        self.min = min;
        self
    }

    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// Options accepted by [`crate::factory::create_database`].
///
/// Every field is optional; the URL only has to be resolvable from some source.
/// ```rust
/// use db_switchboard::prelude::*;
///
/// let options = DatabaseOptions::new()
///     .url("postgres://app@localhost/app")
///     .driver(DriverId::PG_POOL)
///     .pool(PoolOptions::default().with_max(4))
///     .application_name("billing");
/// # let _ = options;
/// ```
#[derive(Debug, Clone, Default)]
pub struct DatabaseOptions {
    pub driver: Option<DriverId>,
    pub url: Option<String>,
    pub pool: Option<PoolOptions>,
    pub ssl: Option<SslMode>,
    pub debug: Option<bool>,
    pub logger: Option<Arc<dyn QueryLogger>>,
    pub prepare: Option<bool>,
    pub application_name: Option<String>,
    pub statement_timeout: Option<Duration>,
    pub query_timeout: Option<Duration>,
    /// Override of the HTTP/WebSocket endpoint serverless drivers talk to.
    pub endpoint: Option<String>,
    /// Prefer a transactional sibling over a stateless driver.
    pub full_transaction_support: bool,
}

impl DatabaseOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn driver(mut self, driver: impl Into<DriverId>) -> Self {
        self.driver = Some(driver.into());
        self
    }

    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    #[must_use]
    pub fn pool(mut self, pool: PoolOptions) -> Self {
        self.pool = Some(pool);
        self
    }

    #[must_use]
    pub fn ssl(mut self, ssl: SslMode) -> Self {
        self.ssl = Some(ssl);
        self
    }

    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = Some(debug);
        self
    }

    #[must_use]
    pub fn logger(mut self, logger: Arc<dyn QueryLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    #[must_use]
    pub fn prepare(mut self, prepare: bool) -> Self {
        self.prepare = Some(prepare);
        self
    }

    #[must_use]
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    #[must_use]
    pub fn full_transaction_support(mut self, enabled: bool) -> Self {
        self.full_transaction_support = enabled;
        self
    }
}

/// Environment-derived defaults applied while building a [`DriverConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDefaults {
    pub pool_max: Option<u32>,
    pub debug: bool,
    pub is_production: bool,
    /// `sslmode` found in the connection URL.
    pub url_ssl: Option<SslMode>,
}

impl ConfigDefaults {
    #[must_use]
    pub fn from_env(env: &dyn EnvSource, is_production: bool) -> Self {
        let pool_max = env.var(DATABASE_POOL_SIZE_VAR).and_then(|raw| {
            raw.trim().parse::<u32>().map_err(|_| {
                tracing::warn!(value = %raw, "ignoring non-numeric {DATABASE_POOL_SIZE_VAR}");
            }).ok()
        });
        Self {
            pool_max,
            debug: env.flag(DATABASE_DEBUG_VAR),
            is_production,
            url_ssl: None,
        }
    }
}

/// Configuration handed to a driver factory.
///
/// Fields the chosen driver has no use for are `None`.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub driver: DriverId,
    pub url: String,
    pub ssl: Option<SslMode>,
    pub debug: bool,
    pub logger: Option<Arc<dyn QueryLogger>>,
    pub pool: Option<PoolOptions>,
    pub statement_timeout: Option<Duration>,
    pub query_timeout: Option<Duration>,
    pub prepare: Option<bool>,
    pub application_name: Option<String>,
    pub endpoint: Option<String>,
}

impl DriverConfig {
    /// A config with every optional setting unset.
    #[must_use]
    pub fn new(driver: DriverId, url: impl Into<String>) -> Self {
        Self {
            driver,
            url: url.into(),
            ssl: None,
            debug: false,
            logger: None,
            pool: None,
            statement_timeout: None,
            query_timeout: None,
            prepare: None,
            application_name: None,
            endpoint: None,
        }
    }

    /// Pool options, falling back to defaults for drivers that were handed none.
    #[must_use]
    pub fn pool_or_default(&self) -> PoolOptions {
        self.pool.clone().unwrap_or_default()
    }
}

#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy)]
struct Accepts {
    pool: bool,
    ssl: bool,
    statement_timeout: bool,
    prepare: bool,
    application_name: bool,
    endpoint: bool,
}

impl Accepts {
    const ALL: Self = Self {
        pool: true,
        ssl: true,
        statement_timeout: true,
        prepare: true,
        application_name: true,
        endpoint: true,
    };

    fn for_driver(driver: &DriverId) -> Self {
        match driver.as_str() {
            "neon-http" => Self {
                pool: false,
                ssl: false,
                statement_timeout: false,
                prepare: false,
                application_name: false,
                endpoint: true,
            },
            "neon-websocket" => Self {
                ssl: false,
                ..Self::ALL
            },
            "postgres" | "pg-pool" => Self {
                endpoint: false,
                ..Self::ALL
            },
            "pg" => Self {
                pool: false,
                endpoint: false,
                ..Self::ALL
            },
            "planetscale" => Self {
                pool: false,
                ssl: false,
                statement_timeout: false,
                prepare: false,
                application_name: false,
                endpoint: true,
            },
            "mysql2" => Self {
                pool: true,
                ssl: true,
                statement_timeout: false,
                prepare: false,
                application_name: false,
                endpoint: false,
            },
            _ => Self::ALL,
        }
    }
}

/// Project generic options onto one driver.
///
/// Pure: the result depends only on the arguments. Options the driver does not use are
/// dropped and reported at debug level; that is never an error because the generic
/// options are a superset of every driver's.
#[must_use]
pub fn build_driver_config(
    options: &DatabaseOptions,
    driver: &DriverId,
    url: &str,
    defaults: &ConfigDefaults,
) -> DriverConfig {
    let accepts = Accepts::for_driver(driver);
    let mut dropped: Vec<&'static str> = Vec::new();

    let pool = if accepts.pool {
        let mut pool = options.pool.clone().unwrap_or_default();
        if options.pool.is_none() {
            if let Some(max) = defaults.pool_max {
                pool = pool.with_max(max);
            }
        }
        Some(pool)
    } else {
        if options.pool.is_some() {
            dropped.push("pool");
        }
        None
    };

    let ssl = if accepts.ssl {
        Some(SslMode::resolve(options.ssl, defaults.url_ssl, defaults.is_production))
    } else {
        if options.ssl.is_some() {
            dropped.push("ssl");
        }
        None
    };

    let statement_timeout = keep(
        accepts.statement_timeout,
        options.statement_timeout,
        "statement_timeout",
        &mut dropped,
    );
    let prepare = keep(accepts.prepare, options.prepare, "prepare", &mut dropped);
    let application_name = keep(
        accepts.application_name,
        options.application_name.clone(),
        "application_name",
        &mut dropped,
    );
    let endpoint = keep(accepts.endpoint, options.endpoint.clone(), "endpoint", &mut dropped);

    if !dropped.is_empty() {
        tracing::debug!(driver = %driver, ?dropped, "options not used by this driver");
    }

    DriverConfig {
        driver: driver.clone(),
        url: url.to_string(),
        ssl,
        debug: options.debug.unwrap_or(defaults.debug),
        logger: options.logger.clone(),
        pool,
        statement_timeout,
        query_timeout: options.query_timeout,
        prepare,
        application_name,
        endpoint,
    }
}

fn keep<T>(accepted: bool, value: Option<T>, name: &'static str, dropped: &mut Vec<&'static str>) -> Option<T> {
    if accepted {
        value
    } else {
        if value.is_some() {
            dropped.push(name);
        }
        None
    }
}
