use serde::Serialize;

use crate::env::EnvSource;

/// Platform markers read by [`detect_environment`].
pub const VERCEL_VAR: &str = "VERCEL";
pub const VERCEL_ENV_VAR: &str = "VERCEL_ENV";
pub const LAMBDA_VARS: [&str; 2] = ["AWS_LAMBDA_FUNCTION_NAME", "AWS_EXECUTION_ENV"];
pub const NEXT_RUNTIME_VAR: &str = "NEXT_RUNTIME";
pub const EDGE_RUNTIME_VAR: &str = "EDGE_RUNTIME";
pub const CLOUDFLARE_VARS: [&str; 2] = ["CF_PAGES", "CLOUDFLARE_WORKERS"];
pub const NETLIFY_VAR: &str = "NETLIFY";
pub const RAILWAY_VAR: &str = "RAILWAY_ENVIRONMENT";
pub const RENDER_VAR: &str = "RENDER";
pub const FLY_VAR: &str = "FLY_APP_NAME";
pub const ENVIRONMENT_NAME_VARS: [&str; 2] = ["APP_ENV", "ENVIRONMENT"];

/// Where the process runs, as far as the environment tells.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)]
pub struct RuntimeEnvironment {
    pub is_vercel: bool,
    pub is_lambda: bool,
    pub is_edge: bool,
    pub is_cloudflare: bool,
    pub is_netlify: bool,
    pub is_railway: bool,
    pub is_render: bool,
    pub is_fly: bool,
    /// Short-lived per-request execution. Railway, Render and Fly run long-lived
    /// containers and do not count.
    pub is_serverless: bool,
    /// Raw sockets are available (not a wasm32 target).
    pub is_native: bool,
    pub is_development: bool,
    pub is_production: bool,
    /// Value of `APP_ENV` / `ENVIRONMENT`, lowercased.
    pub environment_name: Option<String>,
}

/// Classify the host from `env`.
#[must_use]
pub fn detect_environment(env: &dyn EnvSource) -> RuntimeEnvironment {
    let wasm = cfg!(target_arch = "wasm32");
    let is_vercel = env.var(VERCEL_VAR).is_some();
    let is_lambda = LAMBDA_VARS.iter().any(|key| env.var(key).is_some());
    let is_edge = wasm
        || env
            .var(NEXT_RUNTIME_VAR)
            .is_some_and(|v| v.eq_ignore_ascii_case("edge"))
        || env.var(EDGE_RUNTIME_VAR).is_some();
    let is_cloudflare = wasm || CLOUDFLARE_VARS.iter().any(|key| env.var(key).is_some());
    let is_netlify = env.var(NETLIFY_VAR).is_some();

    let environment_name = env
        .first_of(&ENVIRONMENT_NAME_VARS)
        .map(|(_, name)| name.trim().to_ascii_lowercase());
    let is_production = environment_name.as_deref() == Some("production")
        || env
            .var(VERCEL_ENV_VAR)
            .is_some_and(|v| v.eq_ignore_ascii_case("production"));
    let is_development = !is_production
        && matches!(
            environment_name.as_deref(),
            None | Some("development" | "dev" | "local")
        );

    RuntimeEnvironment {
        is_vercel,
        is_lambda,
        is_edge,
        is_cloudflare,
        is_netlify,
        is_railway: env.var(RAILWAY_VAR).is_some(),
        is_render: env.var(RENDER_VAR).is_some(),
        is_fly: env.var(FLY_VAR).is_some(),
        is_serverless: is_vercel || is_lambda || is_edge || is_cloudflare || is_netlify,
        is_native: !wasm,
        is_development,
        is_production,
        environment_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MapEnv;

    #[test]
    fn empty_environment_is_local_development() {
        let env = detect_environment(&MapEnv::new());
        assert!(!env.is_serverless);
        assert!(env.is_native);
        assert!(env.is_development);
        assert!(!env.is_production);
    }

    #[test]
    fn vercel_edge_production() {
        let env = detect_environment(
            &MapEnv::new()
                .with("VERCEL", "1")
                .with("NEXT_RUNTIME", "edge")
                .with("VERCEL_ENV", "production"),
        );
        assert!(env.is_vercel && env.is_edge && env.is_serverless);
        assert!(env.is_production);
        assert!(!env.is_development);
    }

    #[test]
    fn containers_are_not_serverless() {
        let env = detect_environment(
            &MapEnv::new()
                .with("FLY_APP_NAME", "api")
                .with("APP_ENV", "staging"),
        );
        assert!(env.is_fly);
        assert!(!env.is_serverless);
        assert!(!env.is_development);
        assert!(!env.is_production);
        assert_eq!(env.environment_name.as_deref(), Some("staging"));
    }

    #[test]
    fn lambda_is_detected_from_execution_env() {
        let env = detect_environment(&MapEnv::new().with("AWS_EXECUTION_ENV", "AWS_Lambda_nodejs20.x"));
        assert!(env.is_lambda && env.is_serverless);
    }
}
