//! Convenient imports for common functionality.
//!
//! ```rust
//! use db_switchboard::prelude::*;
//! ```

pub use crate::adapter::{BatchStatement, ConnectionStats, DriverAdapter, HandleSlot, NativeHandle};
pub use crate::capabilities::DriverCapabilities;
pub use crate::config::{DatabaseOptions, DriverConfig, PoolOptions, SslMode};
pub use crate::detect::{DriverRecommendation, RuntimeEnvironment, recommend_driver};
pub use crate::dialect::{DialectFormatter, SqlTemplate, formatter_for, inline_params};
pub use crate::env::{EnvSource, MapEnv, ProcessEnv};
pub use crate::error::{DriverError, ErrorKind};
pub use crate::factory::{
    Database, DatabaseCell, DatabaseFactory, DbClients, DbClientsOptions, QueryLayer,
    create_database, create_db_clients,
};
pub use crate::logging::{QueryLogger, TracingQueryLogger};
pub use crate::registry::{DriverEntry, DriverRegistry, driver_factory};
pub use crate::results::{FieldInfo, QueryResult, Row};
pub use crate::transaction::{
    AccessMode, AdapterExt, IsolationLevel, TransactionContext, TransactionOptions,
};
pub use crate::types::{Dialect, DriverId, RowValues};
