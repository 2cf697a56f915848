use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::DriverError;
use crate::types::Dialect;

/// Port PgBouncer-style transaction poolers conventionally listen on.
pub const POOLER_PORT: u16 = 6543;

/// A connection URL broken into parts, plus provider hints from the host name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)]
pub struct ConnectionUrlInfo {
    /// `None` for schemes other than `postgres`, `postgresql` and `mysql`.
    pub dialect: Option<Dialect>,
    pub host: String,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub username: Option<String>,
    pub params: BTreeMap<String, String>,
    pub ssl_mode: Option<String>,
    pub is_neon: bool,
    pub is_planetscale: bool,
    pub is_rds: bool,
    pub has_pooler: bool,
}

/// Parse `url` and derive provider hints.
///
/// # Errors
/// Returns `DriverError::ConfigError` when `url` is not a URL.
pub fn parse_connection_url(url: &str) -> Result<ConnectionUrlInfo, DriverError> {
    let parsed = url::Url::parse(url)
        .map_err(|e| DriverError::ConfigError(format!("invalid connection URL: {e}")))?;
    let dialect = match parsed.scheme() {
        "postgres" | "postgresql" => Some(Dialect::Postgresql),
        "mysql" => Some(Dialect::Mysql),
        _ => None,
    };
    let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();
    let params: BTreeMap<String, String> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let ssl_mode = ["sslmode", "ssl-mode", "ssl_mode", "ssl"]
        .iter()
        .find_map(|key| params.get(*key).cloned());
    let database = Some(parsed.path().trim_start_matches('/'))
        .filter(|db| !db.is_empty())
        .map(str::to_string);
    let username = Some(parsed.username())
        .filter(|u| !u.is_empty())
        .map(str::to_string);

    let has_pooler = host.contains("pooler")
        || host.contains("pgbouncer")
        || params
            .get("pgbouncer")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
        || parsed.port() == Some(POOLER_PORT);

    Ok(ConnectionUrlInfo {
        dialect,
        is_neon: host.contains("neon.tech"),
        is_planetscale: host.contains("psdb.cloud") || host.contains("planetscale"),
        is_rds: host.contains("rds.amazonaws.com") || host.contains("database.azure.com"),
        has_pooler,
        port: parsed.port(),
        host,
        database,
        username,
        params,
        ssl_mode,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neon_pooler_url() {
        let info = parse_connection_url(
            "postgresql://alice@ep-green-1-pooler.us-east-2.aws.neon.tech/neondb?sslmode=require",
        )
        .unwrap();
        assert_eq!(info.dialect, Some(Dialect::Postgresql));
        assert!(info.is_neon);
        assert!(info.has_pooler);
        assert_eq!(info.ssl_mode.as_deref(), Some("require"));
        assert_eq!(info.database.as_deref(), Some("neondb"));
        assert_eq!(info.username.as_deref(), Some("alice"));
    }

    #[test]
    fn provider_hints() {
        let ps = parse_connection_url("mysql://u:p@aws.connect.psdb.cloud/app").unwrap();
        assert_eq!(ps.dialect, Some(Dialect::Mysql));
        assert!(ps.is_planetscale && !ps.is_neon);

        let rds = parse_connection_url("postgres://u@app.abc.eu-west-1.rds.amazonaws.com:5432/app").unwrap();
        assert!(rds.is_rds && !rds.has_pooler);
        assert_eq!(rds.port, Some(5432));

        let supabase = parse_connection_url("postgres://u@db.example.com:6543/postgres").unwrap();
        assert!(supabase.has_pooler);

        let bouncer = parse_connection_url("postgres://u@db/app?pgbouncer=true").unwrap();
        assert!(bouncer.has_pooler);
    }

    #[test]
    fn unknown_scheme_has_no_dialect() {
        let info = parse_connection_url("sqlite://local.db").unwrap();
        assert_eq!(info.dialect, None);
        assert!(parse_connection_url("::nope").is_err());
    }
}
