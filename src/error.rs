use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Every failure surfaced by an adapter, the registry or the factory.
///
/// Backend errors pass through untouched in the transparent variants; use
/// [`DriverError::kind`] to branch on the coarse category instead of matching variants.
#[derive(Debug, Error)]
pub enum DriverError {
    #[cfg(feature = "postgres")]
    #[error(transparent)]
    PostgresError(#[from] tokio_postgres::Error),

    #[cfg(feature = "postgres")]
    #[error(transparent)]
    TlsError(#[from] native_tls::Error),

    #[cfg(feature = "mysql")]
    #[error(transparent)]
    MysqlError(#[from] mysql_async::Error),

    #[cfg(any(feature = "neon-http", feature = "planetscale"))]
    #[error(transparent)]
    HttpError(#[from] reqwest::Error),

    #[cfg(feature = "neon-websocket")]
    #[error(transparent)]
    WebSocketError(#[from] async_tungstenite::tungstenite::Error),

    #[error("Database error{}: {message}", code.as_deref().map(|c| format!(" [{c}]")).unwrap_or_default())]
    ServerError {
        message: String,
        code: Option<String>,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unknown driver `{0}`; it is not registered")]
    UnknownDriver(String),

    #[error("Driver `{driver}` is not available; enable the `{feature}` feature of db-switchboard")]
    DriverUnavailable { driver: String, feature: String },

    #[error("Capability error: {0}")]
    CapabilityError(String),

    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Query timed out after {0:?}")]
    Timeout(Duration),

    #[error("Parameter conversion error: {0}")]
    ParameterError(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Rollback failed: {source}")]
    RollbackFailed {
        #[source]
        source: Box<DriverError>,
    },
}

/// Coarse classification of [`DriverError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No resolvable URL, an unknown driver, or an unusable option.
    Configuration,
    /// The backend cannot do what was asked (e.g. transactions over HTTP).
    Capability,
    /// The adapter was closed before the call.
    ConnectionClosed,
    /// Network, protocol or server-side failure.
    Transport,
    /// A cleanup statement failed after the original error.
    RollbackFailure,
    /// The driver is not compiled into this build.
    Unavailable,
    /// A parameter could not be converted for the backend.
    Parameter,
}

impl DriverError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigError(_) | Self::UnknownDriver(_) => ErrorKind::Configuration,
            Self::DriverUnavailable { .. } => ErrorKind::Unavailable,
            Self::CapabilityError(_) => ErrorKind::Capability,
            Self::ConnectionClosed(_) => ErrorKind::ConnectionClosed,
            Self::ParameterError(_) => ErrorKind::Parameter,
            Self::RollbackFailed { .. } => ErrorKind::RollbackFailure,
            _ => ErrorKind::Transport,
        }
    }

    pub(crate) fn closed(driver: impl fmt::Display) -> Self {
        Self::ConnectionClosed(format!("the `{driver}` adapter has been closed"))
    }

    pub(crate) fn no_transactions(driver: impl fmt::Display) -> Self {
        Self::CapabilityError(format!(
            "the `{driver}` driver does not support transactions; \
             statements were not executed"
        ))
    }
}

#[cfg(feature = "postgres")]
impl From<bb8::RunError<DriverError>> for DriverError {
    fn from(err: bb8::RunError<DriverError>) -> Self {
        match err {
            bb8::RunError::User(err) => err,
            bb8::RunError::TimedOut => {
                DriverError::ConnectionError("timed out waiting for a pooled connection".into())
            }
        }
    }
}

#[cfg(feature = "postgres")]
impl From<deadpool::managed::PoolError<DriverError>> for DriverError {
    fn from(err: deadpool::managed::PoolError<DriverError>) -> Self {
        match err {
            deadpool::managed::PoolError::Backend(err) => err,
            deadpool::managed::PoolError::Closed => {
                DriverError::ConnectionClosed("the connection pool has been closed".into())
            }
            other => DriverError::ConnectionError(format!("postgres pool error: {other}")),
        }
    }
}
