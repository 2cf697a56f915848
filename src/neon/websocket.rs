use std::future::Future;

use bb8::ManageConnection;
use tokio_postgres::NoTls;
use tokio_util::compat::FuturesAsyncReadCompatExt;
use ws_stream_tungstenite::WsStream;

use crate::config::{DriverConfig, SslMode};
use crate::error::DriverError;
use crate::postgres::PgSession;
use crate::postgres::session::PgConnectOptions;

/// `wss://{host}/v2` for the URL's host unless a WebSocket endpoint was configured.
pub(crate) fn websocket_endpoint(url: &str, endpoint: Option<&str>) -> Result<String, DriverError> {
    if let Some(endpoint) = endpoint {
        if endpoint.starts_with("wss://") || endpoint.starts_with("ws://") {
            return Ok(endpoint.to_string());
        }
        return Err(DriverError::ConfigError(format!(
            "websocket endpoint must use ws:// or wss://, got `{endpoint}`"
        )));
    }
    let parsed = url::Url::parse(url)
        .map_err(|e| DriverError::ConfigError(format!("invalid connection URL: {e}")))?;
    let host = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| DriverError::ConfigError("connection URL has no host".into()))?;
    Ok(format!("wss://{host}/v2"))
}

/// bb8 manager opening Postgres protocol sessions tunnelled through a WebSocket.
///
/// The WebSocket itself is TLS-protected, so the tunnelled session runs without TLS.
#[derive(Debug)]
pub struct NeonWsManager {
    endpoint: String,
    options: PgConnectOptions,
}

impl NeonWsManager {
    pub(crate) fn from_driver_config(config: &DriverConfig) -> Result<Self, DriverError> {
        let endpoint = websocket_endpoint(&config.url, config.endpoint.as_deref())?;
        let mut options = PgConnectOptions::from_driver_config(config)?;
        // An SSLRequest inside the tunnel would fail against `NoTls`.
        options.config.ssl_mode(tokio_postgres::config::SslMode::Disable);
        options.ssl = SslMode::Disable;
        Ok(Self { endpoint, options })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

async fn open_session(endpoint: String, options: PgConnectOptions) -> Result<PgSession, DriverError> {
    let (socket, _) = async_tungstenite::tokio::connect_async(endpoint.as_str()).await?;
    let stream = WsStream::new(socket).compat();
    let (client, connection) = options.config.connect_raw(stream, NoTls).await?;
    tracing::debug!(endpoint = %endpoint, "websocket session established");
    Ok(PgSession::spawn(client, connection, &options))
}

impl ManageConnection for NeonWsManager {
    type Connection = PgSession;
    type Error = DriverError;

    #[allow(clippy::manual_async_fn)]
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send {
        open_session(self.endpoint.clone(), self.options.clone())
    }

    #[allow(clippy::manual_async_fn)]
    fn is_valid(
        &self,
        conn: &mut Self::Connection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        async move {
            conn.client().simple_query("SELECT 1").await?;
            Ok(())
        }
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.is_closed()
    }
}
