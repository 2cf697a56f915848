use std::fmt;
use std::sync::Arc;

use crate::config::DriverConfig;
use crate::types::{DriverId, RowValues};

/// Receives every statement an adapter sends, before it is sent.
pub trait QueryLogger: Send + Sync + fmt::Debug {
    fn log_query(&self, driver: &DriverId, sql: &str, params: &[RowValues]);
}

/// Forwards statements to `tracing` at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingQueryLogger;

impl QueryLogger for TracingQueryLogger {
    fn log_query(&self, driver: &DriverId, sql: &str, params: &[RowValues]) {
        tracing::debug!(driver = %driver, params = params.len(), "{sql}");
    }
}

/// Per-adapter statement logging resolved from `debug` + `logger`.
#[derive(Debug, Clone)]
pub(crate) struct QueryLog {
    driver: DriverId,
    logger: Option<Arc<dyn QueryLogger>>,
}

impl QueryLog {
    pub(crate) fn from_config(config: &DriverConfig) -> Self {
        let logger = match (&config.logger, config.debug) {
            (Some(logger), _) => Some(Arc::clone(logger)),
            (None, true) => Some(Arc::new(TracingQueryLogger) as Arc<dyn QueryLogger>),
            (None, false) => None,
        };
        Self {
            driver: config.driver.clone(),
            logger,
        }
    }

    pub(crate) fn statement(&self, sql: &str, params: &[RowValues]) {
        if let Some(logger) = &self.logger {
            logger.log_query(&self.driver, sql, params);
        }
    }
}
