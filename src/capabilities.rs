//! What each backend can actually do.
//!
//! These flags are consulted before an operation is attempted: a `false`
//! `transactions` flag means [`crate::transaction::AdapterExt::transaction`] rejects
//! without running a single statement, and a `false` `batch_queries` flag means
//! [`crate::adapter::DriverAdapter::execute_batch`] rejects the same way.

use serde::Serialize;

use crate::types::{Dialect, DriverId};

/// Largest number of bind parameters a single Postgres or `MySQL` statement accepts.
pub const MAX_BIND_PARAMETERS: u32 = 65_535;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)]
pub struct DriverCapabilities {
    pub transactions: bool,
    pub nested_transactions: bool,
    pub prepared_statements: bool,
    pub connection_pooling: bool,
    pub serverless: bool,
    /// No built-in adapter streams rows; results are always buffered.
    pub streaming: bool,
    pub batch_queries: bool,
    pub returning: bool,
    pub max_parameters: Option<u32>,
}

impl DriverCapabilities {
    pub const NEON_HTTP: Self = Self {
        transactions: false,
        nested_transactions: false,
        prepared_statements: false,
        connection_pooling: false,
        serverless: true,
        streaming: false,
        batch_queries: true,
        returning: true,
        max_parameters: Some(MAX_BIND_PARAMETERS),
    };

    pub const NEON_WEBSOCKET: Self = Self {
        transactions: true,
        nested_transactions: true,
        prepared_statements: true,
        connection_pooling: true,
        serverless: true,
        streaming: false,
        batch_queries: true,
        returning: true,
        max_parameters: Some(MAX_BIND_PARAMETERS),
    };

    pub const POSTGRES: Self = Self {
        transactions: true,
        nested_transactions: true,
        prepared_statements: true,
        connection_pooling: true,
        serverless: false,
        streaming: false,
        batch_queries: true,
        returning: true,
        max_parameters: Some(MAX_BIND_PARAMETERS),
    };

    pub const PG: Self = Self {
        connection_pooling: false,
        ..Self::POSTGRES
    };

    pub const PG_POOL: Self = Self::POSTGRES;

    pub const PLANETSCALE: Self = Self {
        transactions: false,
        nested_transactions: false,
        prepared_statements: false,
        connection_pooling: false,
        serverless: true,
        streaming: false,
        batch_queries: false,
        returning: false,
        max_parameters: None,
    };

    pub const MYSQL2: Self = Self {
        transactions: true,
        nested_transactions: true,
        prepared_statements: true,
        connection_pooling: true,
        serverless: false,
        streaming: false,
        batch_queries: true,
        returning: false,
        max_parameters: Some(MAX_BIND_PARAMETERS),
    };

    /// Capabilities of a built-in driver, `None` for custom identifiers.
    #[must_use]
    pub fn builtin(driver: &DriverId) -> Option<Self> {
        builtin_profile(driver).map(|(_, caps)| caps)
    }
}

/// Dialect and capabilities of a built-in driver.
#[must_use]
pub fn builtin_profile(driver: &DriverId) -> Option<(Dialect, DriverCapabilities)> {
    let profile = match driver.as_str() {
        "neon-http" => (Dialect::Postgresql, DriverCapabilities::NEON_HTTP),
        "neon-websocket" => (Dialect::Postgresql, DriverCapabilities::NEON_WEBSOCKET),
        "postgres" => (Dialect::Postgresql, DriverCapabilities::POSTGRES),
        "pg" => (Dialect::Postgresql, DriverCapabilities::PG),
        "pg-pool" => (Dialect::Postgresql, DriverCapabilities::PG_POOL),
        "planetscale" => (Dialect::Mysql, DriverCapabilities::PLANETSCALE),
        "mysql2" => (Dialect::Mysql, DriverCapabilities::MYSQL2),
        _ => return None,
    };
    Some(profile)
}

/// All built-in driver identifiers, in registry order.
pub const BUILTIN_DRIVERS: [DriverId; 7] = [
    DriverId::NEON_HTTP,
    DriverId::NEON_WEBSOCKET,
    DriverId::POSTGRES,
    DriverId::PG,
    DriverId::PG_POOL,
    DriverId::PLANETSCALE,
    DriverId::MYSQL2,
];
