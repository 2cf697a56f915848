use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use postgres_native_tls::MakeTlsConnector;
use tokio_postgres::{Client, Statement};

use super::params::as_refs;
use super::query::build_result;
use crate::config::{DriverConfig, SslMode};
use crate::error::DriverError;
use crate::logging::QueryLog;
use crate::results::QueryResult;
use crate::types::RowValues;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Query parameters `tokio-postgres` understands; everything else is stripped.
const CONFIG_KEYS: [&str; 15] = [
    "user",
    "password",
    "dbname",
    "options",
    "application_name",
    "host",
    "hostaddr",
    "port",
    "connect_timeout",
    "tcp_user_timeout",
    "keepalives",
    "keepalives_idle",
    "target_session_attrs",
    "channel_binding",
    "load_balance_hosts",
];

/// Everything needed to open a session, shared by every connection of a pool.
#[derive(Clone)]
pub(crate) struct PgConnectOptions {
    pub(crate) config: tokio_postgres::Config,
    pub(crate) ssl: SslMode,
    tls: MakeTlsConnector,
    prepare: bool,
    query_timeout: Option<Duration>,
    log: QueryLog,
}

impl fmt::Debug for PgConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgConnectOptions")
            .field("hosts", &self.config.get_hosts())
            .field("dbname", &self.config.get_dbname())
            .field("user", &self.config.get_user())
            .field("ssl", &self.ssl)
            .field("prepare", &self.prepare)
            .finish_non_exhaustive()
    }
}

impl PgConnectOptions {
    /// Translate a driver config into `tokio-postgres` settings.
    ///
    /// # Errors
    /// Returns `DriverError::ConfigError` for an unparsable URL and
    /// `DriverError::TlsError` if the TLS connector cannot be built.
    pub(crate) fn from_driver_config(cfg: &DriverConfig) -> Result<Self, DriverError> {
        let (mut config, url_ssl) = parse_config(&cfg.url)?;
        let ssl = cfg.ssl.or(url_ssl).unwrap_or(SslMode::Disable);
        config.ssl_mode(match ssl {
            SslMode::Disable => tokio_postgres::config::SslMode::Disable,
            SslMode::Prefer => tokio_postgres::config::SslMode::Prefer,
            SslMode::Require | SslMode::VerifyFull => tokio_postgres::config::SslMode::Require,
        });
        if let Some(name) = &cfg.application_name {
            config.application_name(name);
        }
        if let Some(limit) = cfg.statement_timeout {
            let setting = format!("-c statement_timeout={}", limit.as_millis());
            let options = match config.get_options() {
                Some(existing) if !existing.is_empty() => format!("{existing} {setting}"),
                _ => setting,
            };
            config.options(&options);
        }
        if config.get_connect_timeout().is_none() {
            config.connect_timeout(cfg.pool_or_default().connect_timeout);
        }
        Ok(Self {
            config,
            ssl,
            tls: tls_connector(ssl)?,
            prepare: cfg.prepare.unwrap_or(true),
            query_timeout: cfg.query_timeout,
            log: QueryLog::from_config(cfg),
        })
    }
}

fn tls_connector(ssl: SslMode) -> Result<MakeTlsConnector, DriverError> {
    let mut builder = native_tls::TlsConnector::builder();
    if !matches!(ssl, SslMode::VerifyFull) {
        builder
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true);
    }
    Ok(MakeTlsConnector::new(builder.build()?))
}

/// Parse a connection URL, stripping parameters `tokio-postgres` would reject.
///
/// Returns the `sslmode` found in the URL separately because `verify-full` has no
/// `tokio-postgres` equivalent.
pub(crate) fn parse_config(
    raw: &str,
) -> Result<(tokio_postgres::Config, Option<SslMode>), DriverError> {
    let mut url = url::Url::parse(raw)
        .map_err(|e| DriverError::ConfigError(format!("invalid connection URL: {e}")))?;
    let mut ssl = None;
    let mut kept = Vec::new();
    let mut dropped = Vec::new();
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "sslmode" | "ssl" => ssl = SslMode::from_url_value(&value),
            known if CONFIG_KEYS.contains(&known) => {
                kept.push((key.into_owned(), value.into_owned()));
            }
            _ => dropped.push(key.into_owned()),
        }
    }
    if !dropped.is_empty() {
        tracing::debug!(?dropped, "ignoring connection URL parameters");
    }
    // tokio-postgres percent-decodes values but does not treat `+` as a space.
    let query = kept
        .iter()
        .map(|(k, v)| format!("{k}={}", utf8_percent_encode(v, NON_ALPHANUMERIC)))
        .collect::<Vec<_>>()
        .join("&");
    url.set_query((!query.is_empty()).then_some(query.as_str()));
    let config = url.as_str().parse::<tokio_postgres::Config>()?;
    Ok((config, ssl))
}

/// One Postgres protocol session plus its statement cache.
pub struct PgSession {
    client: Client,
    id: u64,
    prepare: bool,
    statements: HashMap<String, Statement>,
    query_timeout: Option<Duration>,
    log: QueryLog,
}

impl fmt::Debug for PgSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgSession")
            .field("id", &self.id)
            .field("cached_statements", &self.statements.len())
            .finish_non_exhaustive()
    }
}

/// Open a socket session, TLS as configured.
///
/// # Errors
/// Returns the connect error from `tokio-postgres`.
pub(crate) async fn connect(options: &PgConnectOptions) -> Result<PgSession, DriverError> {
    let (client, connection) = options.config.connect(options.tls.clone()).await?;
    Ok(PgSession::spawn(client, connection, options))
}

impl PgSession {
    /// Wrap a connected client and drive its connection on a background task.
    pub(crate) fn spawn<F>(client: Client, connection: F, options: &PgConnectOptions) -> Self
    where
        F: Future<Output = Result<(), tokio_postgres::Error>> + Send + 'static,
    {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                tracing::warn!(session = id, error = %err, "postgres connection ended with an error");
            }
        });
        tracing::debug!(session = id, "postgres session opened");
        Self {
            client,
            id,
            prepare: options.prepare,
            statements: HashMap::new(),
            query_timeout: options.query_timeout,
            log: options.log.clone(),
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.client.is_closed()
    }

    /// Run one statement, bounded by the query timeout.
    ///
    /// # Errors
    /// Returns `DriverError::Timeout` when the timeout elapses, otherwise the
    /// `tokio-postgres` error.
    pub(crate) async fn execute(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<QueryResult, DriverError> {
        self.log.statement(sql, params);
        match self.query_timeout {
            Some(limit) => tokio::time::timeout(limit, self.run(sql, params))
                .await
                .map_err(|_| DriverError::Timeout(limit))?,
            None => self.run(sql, params).await,
        }
    }

    /// Run a parameterless control statement.
    ///
    /// # Errors
    /// Returns the `tokio-postgres` error.
    pub(crate) async fn simple(&mut self, sql: &str) -> Result<(), DriverError> {
        self.log.statement(sql, &[]);
        self.client.batch_execute(sql).await?;
        Ok(())
    }

    async fn run(&mut self, sql: &str, params: &[RowValues]) -> Result<QueryResult, DriverError> {
        let statement = self.statement(sql).await?;
        let refs = as_refs(params);
        if statement.columns().is_empty() {
            let affected = self.client.execute(&statement, &refs).await?;
            Ok(QueryResult::affected(affected))
        } else {
            let rows = self.client.query(&statement, &refs).await?;
            build_result(&statement, &rows)
        }
    }

    async fn statement(&mut self, sql: &str) -> Result<Statement, DriverError> {
        if !self.prepare {
            return Ok(self.client.prepare(sql).await?);
        }
        if let Some(statement) = self.statements.get(sql) {
            return Ok(statement.clone());
        }
        let statement = self.client.prepare(sql).await?;
        self.statements.insert(sql.to_string(), statement.clone());
        Ok(statement)
    }
}
