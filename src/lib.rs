//! One async API over several Postgres and MySQL drivers.
//!
//! A [`factory::Database`] wraps a [`adapter::DriverAdapter`] chosen from the connection
//! URL and the runtime environment, or named explicitly. Every adapter speaks the same
//! contract: run a statement, run a batch, run a transaction with unbounded savepoints,
//! close, report pool statistics, and hand out its native client untouched.
//!
//! ```rust,no_run
//! use db_switchboard::prelude::*;
//!
//! # async fn demo() -> Result<(), DriverError> {
//! let db = create_database(DatabaseOptions::new().url("postgres://app@localhost/app")).await?;
//! let rows = db
//!     .execute("SELECT id FROM users WHERE email = $1", &[RowValues::from("a@b.c")])
//!     .await?;
//! println!("{} rows via {}", rows.row_count, db.driver());
//! db.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod capabilities;
pub mod config;
pub mod detect;
pub mod dialect;
pub mod env;
pub mod error;
pub mod factory;
pub mod logging;
pub mod prelude;
pub mod registry;
pub mod results;
pub mod transaction;
pub mod types;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(any(feature = "neon-http", feature = "neon-websocket"))]
pub mod neon;

#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(feature = "planetscale")]
pub mod planetscale;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use adapter::{BatchStatement, ConnectionStats, DriverAdapter, HandleSlot, NativeHandle};
pub use capabilities::DriverCapabilities;
pub use config::{DatabaseOptions, DriverConfig, PoolOptions, SslMode};
pub use error::DriverError;
pub use factory::{
    Database, DatabaseCell, DatabaseFactory, DbClients, DbClientsOptions, QueryLayer,
    create_database, create_db_clients,
};
pub use registry::DriverRegistry;
pub use types::{Dialect, DriverId, RowValues};
