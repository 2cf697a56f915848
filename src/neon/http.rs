use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::protocol::{
    ARRAY_MODE_HEADER, BatchRequest, BatchResponse, CONNECTION_STRING_HEADER, QueryRequest,
    QueryResponse, RAW_TEXT_HEADER, server_error,
};
use crate::adapter::{BatchStatement, DriverAdapter, HandleSlot, NativeHandle};
use crate::capabilities::DriverCapabilities;
use crate::config::DriverConfig;
use crate::error::DriverError;
use crate::logging::QueryLog;
use crate::results::QueryResult;
use crate::types::{Dialect, DriverId, RowValues};

/// Stateless SQL-over-HTTPS client. Every call is one independent request.
#[derive(Clone)]
pub struct NeonHttpClient {
    http: reqwest::Client,
    endpoint: String,
    query_timeout: Option<Duration>,
    log: QueryLog,
}

impl fmt::Debug for NeonHttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NeonHttpClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

/// `https://{host}/sql` for the URL's host unless an endpoint was configured.
pub(crate) fn sql_endpoint(url: &str, endpoint: Option<&str>) -> Result<String, DriverError> {
    if let Some(endpoint) = endpoint {
        return Ok(endpoint.to_string());
    }
    let parsed = url::Url::parse(url)
        .map_err(|e| DriverError::ConfigError(format!("invalid connection URL: {e}")))?;
    let host = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| DriverError::ConfigError("connection URL has no host".into()))?;
    Ok(format!("https://{host}/sql"))
}

impl NeonHttpClient {
    pub(crate) fn from_driver_config(config: &DriverConfig) -> Result<Self, DriverError> {
        let endpoint = sql_endpoint(&config.url, config.endpoint.as_deref())?;
        let mut headers = HeaderMap::new();
        headers.insert(
            CONNECTION_STRING_HEADER,
            HeaderValue::from_str(&config.url)
                .map_err(|e| DriverError::ConfigError(format!("connection URL is not a valid header: {e}")))?,
        );
        headers.insert(RAW_TEXT_HEADER, HeaderValue::from_static("true"));
        headers.insert(ARRAY_MODE_HEADER, HeaderValue::from_static("true"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(config.pool_or_default().connect_timeout)
            .build()?;
        Ok(Self {
            http,
            endpoint,
            query_timeout: config.query_timeout,
            log: QueryLog::from_config(config),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Run one statement.
    ///
    /// # Errors
    /// Returns `DriverError::ServerError` for a rejected statement, `DriverError::HttpError`
    /// for transport failures and `DriverError::Timeout` when the query timeout elapses.
    pub async fn query(&self, sql: &str, params: &[RowValues]) -> Result<QueryResult, DriverError> {
        self.log.statement(sql, params);
        let response: QueryResponse = self.post(&QueryRequest::new(sql, params)).await?;
        Ok(response.into_result())
    }

    /// Run statements as one implicit transaction on the server.
    ///
    /// # Errors
    /// Same as [`NeonHttpClient::query`]; nothing is applied when any statement fails.
    pub async fn batch(&self, statements: &[BatchStatement]) -> Result<Vec<QueryResult>, DriverError> {
        let queries = statements
            .iter()
            .map(|s| {
                self.log.statement(&s.sql, &s.params);
                QueryRequest::new(&s.sql, &s.params)
            })
            .collect();
        let response: BatchResponse = self.post(&BatchRequest { queries }).await?;
        if response.results.len() != statements.len() {
            return Err(DriverError::ProtocolError(format!(
                "batch of {} statements returned {} results",
                statements.len(),
                response.results.len()
            )));
        }
        Ok(response
            .results
            .into_iter()
            .map(QueryResponse::into_result)
            .collect())
    }

    async fn post<B: Serialize + Sync, R: DeserializeOwned>(&self, body: &B) -> Result<R, DriverError> {
        let request = async {
            let response = self.http.post(&self.endpoint).json(body).send().await?;
            let status = response.status();
            let text = response.text().await?;
            if !status.is_success() {
                return Err(server_error(status.as_u16(), &text));
            }
            serde_json::from_str::<R>(&text)
                .map_err(|e| DriverError::ProtocolError(format!("unexpected response body: {e}")))
        };
        match self.query_timeout {
            Some(limit) => tokio::time::timeout(limit, request)
                .await
                .map_err(|_| DriverError::Timeout(limit))?,
            None => request.await,
        }
    }
}

/// `neon-http`: no connections to hold, so no pool, no stats and no transactions.
#[derive(Debug)]
pub(crate) struct NeonHttpAdapter {
    slot: HandleSlot<NeonHttpClient>,
}

impl NeonHttpAdapter {
    pub(crate) fn new(client: NeonHttpClient) -> Self {
        tracing::info!(endpoint = %client.endpoint, "neon-http adapter ready");
        Self {
            slot: HandleSlot::new(DriverId::NEON_HTTP, client),
        }
    }
}

#[async_trait]
impl DriverAdapter for NeonHttpAdapter {
    fn driver(&self) -> &DriverId {
        &DriverId::NEON_HTTP
    }

    fn dialect(&self) -> Dialect {
        Dialect::Postgresql
    }

    fn capabilities(&self) -> DriverCapabilities {
        DriverCapabilities::NEON_HTTP
    }

    async fn execute(&self, sql: &str, params: &[RowValues]) -> Result<QueryResult, DriverError> {
        self.slot.get()?.query(sql, params).await
    }

    /// One HTTP request carrying every statement; the server applies them atomically.
    async fn execute_batch(
        &self,
        statements: &[BatchStatement],
    ) -> Result<Vec<QueryResult>, DriverError> {
        let client = self.slot.get()?;
        if statements.is_empty() {
            return Ok(Vec::new());
        }
        client.batch(statements).await
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.slot.take();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.slot.is_closed()
    }

    fn native_handle(&self) -> NativeHandle {
        self.slot.share(NativeHandle::NeonHttp)
    }
}
