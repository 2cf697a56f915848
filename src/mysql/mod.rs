// MySQL family on mysql_async:
// - options: URL and pool settings
// - convert: RowValues <-> mysql_async::Value
// - query: statement execution and result buffering
// - tx / stats / adapter: the `mysql2` pooled adapter

mod adapter;
mod convert;
mod options;
mod query;
mod stats;
mod tx;

use std::sync::Arc;

use crate::adapter::DriverAdapter;
use crate::config::DriverConfig;
use crate::error::DriverError;
use crate::logging::QueryLog;

/// `mysql2`: a lazily connecting pool.
///
/// # Errors
/// Returns `DriverError::ConfigError` for an unusable URL.
#[allow(clippy::unused_async)]
pub(crate) async fn create_mysql2(config: DriverConfig) -> Result<Arc<dyn DriverAdapter>, DriverError> {
    let (opts, checkout_timeout) = options::opts_from_config(&config)?;
    let runner = query::MysqlRunner {
        log: QueryLog::from_config(&config),
        query_timeout: config.query_timeout,
    };
    let pool = mysql_async::Pool::new(opts);
    Ok(Arc::new(adapter::MysqlPoolAdapter::new(pool, runner, checkout_timeout)))
}
