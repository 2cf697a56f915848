use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::percent_decode_str;

use super::protocol::{ExecuteRequest, ExecuteResponse, http_error};
use crate::adapter::{DriverAdapter, HandleSlot, NativeHandle};
use crate::capabilities::DriverCapabilities;
use crate::config::DriverConfig;
use crate::dialect::inline_params;
use crate::error::DriverError;
use crate::logging::QueryLog;
use crate::results::QueryResult;
use crate::types::{Dialect, DriverId, RowValues};

const EXECUTE_PATH: &str = "/psdb.v1alpha1.Database/Execute";

/// Stateless client for the `Execute` RPC. Parameters are inlined client-side because
/// the RPC takes a single SQL string.
#[derive(Clone)]
pub struct PlanetscaleClient {
    http: reqwest::Client,
    endpoint: String,
    username: String,
    password: String,
    query_timeout: Option<Duration>,
    log: QueryLog,
}

impl fmt::Debug for PlanetscaleClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanetscaleClient")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

fn decoded(raw: &str) -> Result<String, DriverError> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(std::borrow::Cow::into_owned)
        .map_err(|e| DriverError::ConfigError(format!("connection URL is not valid UTF-8: {e}")))
}

impl PlanetscaleClient {
    pub(crate) fn from_driver_config(config: &DriverConfig) -> Result<Self, DriverError> {
        let url = url::Url::parse(&config.url)
            .map_err(|e| DriverError::ConfigError(format!("invalid connection URL: {e}")))?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| DriverError::ConfigError("connection URL has no host".into()))?;
        let endpoint = match config.endpoint.as_deref() {
            Some(base) => format!("{}{EXECUTE_PATH}", base.trim_end_matches('/')),
            None => format!("https://{host}{EXECUTE_PATH}"),
        };
        let http = reqwest::Client::builder()
            .connect_timeout(config.pool_or_default().connect_timeout)
            .build()?;
        Ok(Self {
            http,
            endpoint,
            username: decoded(url.username())?,
            password: decoded(url.password().unwrap_or_default())?,
            query_timeout: config.query_timeout,
            log: QueryLog::from_config(config),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Inline `params` into `sql` and run it.
    ///
    /// # Errors
    /// Returns `DriverError::ParameterError` when placeholders and parameters disagree,
    /// `DriverError::ServerError` for a rejected statement and `DriverError::Timeout`
    /// when the query timeout elapses.
    pub async fn execute(&self, sql: &str, params: &[RowValues]) -> Result<QueryResult, DriverError> {
        self.log.statement(sql, params);
        let query = if params.is_empty() {
            sql.to_string()
        } else {
            inline_params(sql, params, Dialect::Mysql)?
        };
        let request = async {
            let response = self
                .http
                .post(&self.endpoint)
                .basic_auth(&self.username, Some(&self.password))
                .json(&ExecuteRequest {
                    query: &query,
                    session: None,
                })
                .send()
                .await?;
            let status = response.status();
            let text = response.text().await?;
            if !status.is_success() {
                return Err(http_error(status.as_u16(), &text));
            }
            let body: ExecuteResponse = serde_json::from_str(&text)
                .map_err(|e| DriverError::ProtocolError(format!("unexpected response body: {e}")))?;
            if let Some(err) = body.error {
                return Err(err.into());
            }
            match body.result {
                Some(result) => result.into_result(),
                None => Ok(QueryResult::affected(0)),
            }
        };
        match self.query_timeout {
            Some(limit) => tokio::time::timeout(limit, request)
                .await
                .map_err(|_| DriverError::Timeout(limit))?,
            None => request.await,
        }
    }
}

/// `planetscale`: one HTTP request per statement; no transactions and no batches.
#[derive(Debug)]
pub(crate) struct PlanetscaleAdapter {
    slot: HandleSlot<PlanetscaleClient>,
}

impl PlanetscaleAdapter {
    pub(crate) fn new(client: PlanetscaleClient) -> Self {
        tracing::info!(endpoint = %client.endpoint, "planetscale adapter ready");
        Self {
            slot: HandleSlot::new(DriverId::PLANETSCALE, client),
        }
    }
}

#[async_trait]
impl DriverAdapter for PlanetscaleAdapter {
    fn driver(&self) -> &DriverId {
        &DriverId::PLANETSCALE
    }

    fn dialect(&self) -> Dialect {
        Dialect::Mysql
    }

    fn capabilities(&self) -> DriverCapabilities {
        DriverCapabilities::PLANETSCALE
    }

    async fn execute(&self, sql: &str, params: &[RowValues]) -> Result<QueryResult, DriverError> {
        self.slot.get()?.execute(sql, params).await
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.slot.take();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.slot.is_closed()
    }

    fn native_handle(&self) -> NativeHandle {
        self.slot.share(NativeHandle::Planetscale)
    }
}
