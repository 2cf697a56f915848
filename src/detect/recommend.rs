use serde::Serialize;

use super::environment::{RuntimeEnvironment, detect_environment};
use super::url::{ConnectionUrlInfo, parse_connection_url};
use crate::env::{DATABASE_DRIVER_VAR, EnvSource};
use crate::types::{Dialect, DriverId};

/// The recommender's answer. Warnings are advisory and never fail anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverRecommendation {
    pub recommended_driver: DriverId,
    pub reason: String,
    pub alternatives: Vec<DriverId>,
    pub warnings: Vec<String>,
}

impl DriverRecommendation {
    fn new(driver: DriverId, reason: impl Into<String>) -> Self {
        Self {
            recommended_driver: driver,
            reason: reason.into(),
            alternatives: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn alternatives(mut self, alternatives: impl IntoIterator<Item = DriverId>) -> Self {
        self.alternatives.extend(alternatives);
        self
    }

    fn warn(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// Recommend a driver for `url` in the environment described by `env`, honouring the
/// `DATABASE_DRIVER` override.
#[must_use]
pub fn recommend_driver(url: Option<&str>, env: &dyn EnvSource) -> DriverRecommendation {
    let runtime = detect_environment(env);
    let overridden = env.var(DATABASE_DRIVER_VAR).map(DriverId::new);
    let (info, parse_warning) = match url.map(parse_connection_url) {
        Some(Ok(info)) => (Some(info), None),
        Some(Err(err)) => (None, Some(err.to_string())),
        None => (None, None),
    };
    let recommendation = recommend(info.as_ref(), &runtime, overridden, url.is_some());
    match parse_warning {
        Some(warning) => recommendation.warn(warning),
        None => recommendation,
    }
}

/// The decision table. Rules are evaluated in order and the first match wins.
///
/// `url_given` distinguishes an unparsable URL (fallback rule) from no URL at all.
#[must_use]
pub fn recommend(
    info: Option<&ConnectionUrlInfo>,
    env: &RuntimeEnvironment,
    overridden: Option<DriverId>,
    url_given: bool,
) -> DriverRecommendation {
    // 1. explicit override
    if let Some(driver) = overridden {
        return DriverRecommendation::new(
            driver,
            format!("explicit override via {DATABASE_DRIVER_VAR} environment variable"),
        );
    }

    if let Some(info) = info
        && let Some(rec) = recommend_for_url(info, env)
    {
        return rec;
    }

    if url_given {
        // 11. fallback
        return DriverRecommendation::new(
            DriverId::POSTGRES,
            "default socket driver for PostgreSQL-compatible databases",
        )
        .alternatives([DriverId::PG_POOL, DriverId::PG]);
    }

    // 12. ultimate fallback
    let rec = DriverRecommendation::new(
        DriverId::POSTGRES,
        "no connection URL to inspect; using the default socket driver",
    )
    .alternatives([DriverId::PG_POOL]);
    if env.is_production {
        rec.warn("no connection URL was found in production; set DATABASE_URL")
    } else {
        rec
    }
}

fn recommend_for_url(info: &ConnectionUrlInfo, env: &RuntimeEnvironment) -> Option<DriverRecommendation> {
    let mysql = info.dialect == Some(Dialect::Mysql);
    let postgres = info.dialect != Some(Dialect::Mysql);

    // 2. serverless MySQL provider
    if info.is_planetscale && info.dialect != Some(Dialect::Postgresql) {
        return Some(
            DriverRecommendation::new(
                DriverId::PLANETSCALE,
                "PlanetScale host detected; the HTTP driver needs no socket",
            )
            .alternatives([DriverId::MYSQL2])
            .warn("the planetscale driver does not support transactions; use mysql2 if you need them"),
        );
    }

    // 3. generic MySQL
    if mysql {
        return Some(if env.is_serverless {
            DriverRecommendation::new(
                DriverId::PLANETSCALE,
                "MySQL in a serverless environment; using the stateless HTTP driver",
            )
            .alternatives([DriverId::MYSQL2])
            .warn("the planetscale driver only works with PlanetScale-compatible HTTP endpoints")
        } else {
            DriverRecommendation::new(DriverId::MYSQL2, "MySQL in a long-running process")
                .alternatives([DriverId::PLANETSCALE])
        });
    }

    if info.is_neon {
        // 4. Neon on the edge
        if env.is_serverless && env.is_edge {
            return Some(
                DriverRecommendation::new(
                    DriverId::NEON_HTTP,
                    "Neon host in an edge runtime; only HTTP is available",
                )
                .alternatives([DriverId::NEON_WEBSOCKET])
                .warn("neon-http does not support interactive transactions; transaction() will fail"),
            );
        }
        // 5. Neon in serverless functions
        if env.is_serverless {
            return Some(
                DriverRecommendation::new(
                    DriverId::NEON_HTTP,
                    "Neon host in a serverless function; HTTP has the lowest connection overhead",
                )
                .alternatives([DriverId::NEON_WEBSOCKET, DriverId::POSTGRES])
                .warn("neon-http does not support interactive transactions")
                .warn("use neon-websocket (or full_transaction_support) if you need transactions"),
            );
        }
        // 6. Neon from a long-running process
        return Some(
            DriverRecommendation::new(
                DriverId::POSTGRES,
                "Neon host from a long-running process; a socket pool is fastest",
            )
            .alternatives([DriverId::NEON_WEBSOCKET, DriverId::PG_POOL]),
        );
    }

    let generic_serverless = postgres && env.is_serverless && !info.is_rds;
    // 7. generic Postgres on the edge
    if generic_serverless && env.is_edge {
        return Some(
            DriverRecommendation::new(
                DriverId::NEON_HTTP,
                "edge runtime without sockets; only an HTTP driver can connect",
            )
            .alternatives([DriverId::NEON_WEBSOCKET])
            .warn("the host does not look like Neon; neon-http requires a Neon-compatible SQL-over-HTTP endpoint")
            .warn("neon-http does not support interactive transactions; transaction() will fail"),
        );
    }
    // 8. generic Postgres in serverless functions
    if generic_serverless {
        return Some(
            DriverRecommendation::new(
                DriverId::POSTGRES,
                "PostgreSQL in a serverless function",
            )
            .alternatives([DriverId::PG, DriverId::PG_POOL])
            .warn("keep pool.max small in serverless functions; every instance opens its own pool")
            .warn("consider a connection pooler in front of the database"),
        );
    }

    // 9. managed RDS-like host
    if info.is_rds {
        let rec = DriverRecommendation::new(
            DriverId::PG_POOL,
            "managed database host; a pool with full statistics suits long-lived servers",
        )
        .alternatives([DriverId::POSTGRES]);
        return Some(if env.is_edge {
            rec.warn("edge runtimes cannot open sockets to managed databases; route through a proxy")
        } else {
            rec
        });
    }

    // 10. behind a pooler
    if info.has_pooler {
        return Some(
            DriverRecommendation::new(DriverId::POSTGRES, "connection pooler detected")
                .alternatives([DriverId::PG_POOL])
                .warn("transaction-mode poolers break prepared statements; set prepare to false"),
        );
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MapEnv;

    fn rec(url: Option<&str>, env: &MapEnv) -> DriverRecommendation {
        recommend_driver(url, env)
    }

    const NEON: &str = "postgres://u:p@ep-a-1.us-east-2.aws.neon.tech/db";
    const RDS: &str = "postgres://u:p@app.c9.us-east-1.rds.amazonaws.com/db";

    #[test]
    fn neon_on_edge_uses_http_with_warnings() {
        let env = MapEnv::new().with("VERCEL", "1").with("NEXT_RUNTIME", "edge");
        let r = rec(Some(NEON), &env);
        assert_eq!(r.recommended_driver, DriverId::NEON_HTTP);
        assert!(!r.warnings.is_empty());
    }

    #[test]
    fn rds_uses_pg_pool_everywhere() {
        for env in [
            MapEnv::new(),
            MapEnv::new().with("AWS_LAMBDA_FUNCTION_NAME", "fn"),
            MapEnv::new().with("EDGE_RUNTIME", "1"),
            MapEnv::new().with("RENDER", "true"),
        ] {
            assert_eq!(rec(Some(RDS), &env).recommended_driver, DriverId::PG_POOL);
        }
        let edge = rec(Some(RDS), &MapEnv::new().with("EDGE_RUNTIME", "1"));
        assert!(!edge.warnings.is_empty());
    }

    #[test]
    fn env_override_wins() {
        let env = MapEnv::new().with("DATABASE_DRIVER", "postgres");
        for url in [Some(NEON), Some(RDS), Some("mysql://x@h/db"), None] {
            let r = rec(url, &env);
            assert_eq!(r.recommended_driver, DriverId::POSTGRES);
            assert!(r.reason.contains("override"));
            assert!(r.alternatives.is_empty());
        }
    }

    #[test]
    fn neon_by_environment() {
        let lambda = rec(Some(NEON), &MapEnv::new().with("AWS_LAMBDA_FUNCTION_NAME", "fn"));
        assert_eq!(lambda.recommended_driver, DriverId::NEON_HTTP);
        assert!(lambda.alternatives.contains(&DriverId::NEON_WEBSOCKET));
        assert_eq!(lambda.warnings.len(), 2);

        let server = rec(Some(NEON), &MapEnv::new());
        assert_eq!(server.recommended_driver, DriverId::POSTGRES);
        assert_eq!(server.alternatives, vec![DriverId::NEON_WEBSOCKET, DriverId::PG_POOL]);
        assert!(server.warnings.is_empty());
    }

    #[test]
    fn mysql_rules() {
        let ps = rec(Some("mysql://u:p@aws.connect.psdb.cloud/app"), &MapEnv::new());
        assert_eq!(ps.recommended_driver, DriverId::PLANETSCALE);
        assert_eq!(ps.alternatives, vec![DriverId::MYSQL2]);

        let local = rec(Some("mysql://root@localhost/app"), &MapEnv::new());
        assert_eq!(local.recommended_driver, DriverId::MYSQL2);

        let lambda = rec(
            Some("mysql://root@db.internal/app"),
            &MapEnv::new().with("AWS_LAMBDA_FUNCTION_NAME", "fn"),
        );
        assert_eq!(lambda.recommended_driver, DriverId::PLANETSCALE);
    }

    #[test]
    fn generic_postgres_rules() {
        let edge = rec(Some("postgres://u@db.example.com/app"), &MapEnv::new().with("EDGE_RUNTIME", "1"));
        assert_eq!(edge.recommended_driver, DriverId::NEON_HTTP);
        assert!(edge.warnings.len() >= 2);

        let lambda = rec(
            Some("postgres://u@db.example.com/app"),
            &MapEnv::new().with("NETLIFY", "true"),
        );
        assert_eq!(lambda.recommended_driver, DriverId::POSTGRES);
        assert!(!lambda.warnings.is_empty());

        let pooled = rec(Some("postgres://u@db.example.com:6543/app"), &MapEnv::new());
        assert_eq!(pooled.recommended_driver, DriverId::POSTGRES);
        assert!(pooled.warnings[0].contains("prepare"));

        let plain = rec(Some("postgres://u@localhost/app"), &MapEnv::new());
        assert_eq!(plain.recommended_driver, DriverId::POSTGRES);
        assert!(plain.warnings.is_empty());
    }

    #[test]
    fn missing_url() {
        let dev = rec(None, &MapEnv::new());
        assert_eq!(dev.recommended_driver, DriverId::POSTGRES);
        assert!(dev.warnings.is_empty());

        let prod = rec(None, &MapEnv::new().with("APP_ENV", "production"));
        assert_eq!(prod.recommended_driver, DriverId::POSTGRES);
        assert_eq!(prod.warnings.len(), 1);

        let garbage = rec(Some("::nope"), &MapEnv::new());
        assert_eq!(garbage.recommended_driver, DriverId::POSTGRES);
        assert_eq!(garbage.warnings.len(), 1);
    }
}
