use std::fmt::Display;
use std::str::FromStr;

use apex_core::types::DbId;

use crate::auth::jwt::JwtConfig;

/// HTTP server settings. Generation can take a minute or more, so the
/// request timeout is generous.
///
/// The pipeline itself reads [`apex_agent::config::AgentConfig`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    pub request_timeout_secs: u64,
    /// The only user allowed to call the admin agent routes.
    pub owner_user_id: DbId,
    pub jwt: JwtConfig,
}

impl ServerConfig {
    /// | Env Var                | Default                 |
    /// |------------------------|-------------------------|
    /// | `HOST`                 | `0.0.0.0`               |
    /// | `PORT`                 | `3000`                  |
    /// | `CORS_ORIGINS`         | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS` | `120`                   |
    /// | `ADMIN_OWNER_ID`       | required                |
    ///
    /// # Panics
    ///
    /// Panics on a missing `ADMIN_OWNER_ID` or any value that fails to parse.
    pub fn from_env() -> Self {
        let owner_user_id = match std::env::var("ADMIN_OWNER_ID") {
            Ok(raw) => parse_or_panic("ADMIN_OWNER_ID", &raw),
            Err(_) => panic!("ADMIN_OWNER_ID must be set to the owner's user id"),
        };

        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env_or("PORT", 3000),
            cors_origins: split_origins(
                &std::env::var("CORS_ORIGINS").unwrap_or_else(|_| "http://localhost:5173".into()),
            ),
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 120),
            owner_user_id,
            jwt: JwtConfig::from_env(),
        }
    }
}

fn env_or<T>(name: &str, default: T) -> T
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(name) {
        Ok(raw) => parse_or_panic(name, &raw),
        Err(_) => default,
    }
}

fn parse_or_panic<T>(name: &str, raw: &str) -> T
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim()
        .parse()
        .unwrap_or_else(|e| panic!("{name} has invalid value '{raw}': {e}"))
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
