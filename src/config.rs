use std::env;

use thiserror::Error;

/// AppConfig
///
/// Holds the application's entire configuration state. Immutable once loaded and pulled
/// into handlers through `FromRef`, like the other parts of the unified `AppState`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Runtime environment marker. Controls the dev auth bypass and log format.
    pub env: Env,
    /// Postgres connection string. `None` in local runs selects the in-memory store.
    pub db_url: Option<String>,
    /// Shared secret used to validate incoming HS256 JWTs.
    pub jwt_secret: String,
    /// Expected `aud` claim, when the identity provider sets one.
    pub jwt_audience: Option<String>,
    /// Base URL of the identity provider used by registration.
    pub auth_provider_url: Option<String>,
    /// API key sent to the identity provider.
    pub auth_provider_key: Option<String>,
    /// Socket address the HTTP server binds to.
    pub bind_addr: String,
    /// How many times a course write is re-applied after losing a version race.
    pub write_retry_limit: u32,
}

/// Env
///
/// Switches between development conveniences (in-memory store, `x-user-id` bypass,
/// pretty logs) and hardened production behavior.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set in production")]
    MissingVar(&'static str),

    #[error("{var} has an invalid value `{value}`")]
    InvalidVar { var: &'static str, value: String },
}

const LOCAL_JWT_SECRET: &str = "super-secure-test-secret-value-local";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_WRITE_RETRY_LIMIT: u32 = 3;

impl Default for AppConfig {
    /// Safe, non-panicking values for test state setup.
    fn default() -> Self {
        Self {
            env: Env::Local,
            db_url: None,
            jwt_secret: LOCAL_JWT_SECRET.to_string(),
            jwt_audience: None,
            auth_provider_url: None,
            auth_provider_key: None,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            write_retry_limit: DEFAULT_WRITE_RETRY_LIMIT,
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads the configuration from environment variables. Production fails fast: every
    /// secret and infrastructure endpoint must be set explicitly, and the first missing one
    /// is reported by name.
    pub fn load() -> Result<Self, ConfigError> {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        let write_retry_limit = match env::var("WRITE_RETRY_LIMIT") {
            Ok(raw) => match raw.parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidVar {
                        var: "WRITE_RETRY_LIMIT",
                        value: raw,
                    });
                }
            },
            Err(_) => DEFAULT_WRITE_RETRY_LIMIT,
        };

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
        let jwt_audience = env::var("JWT_AUDIENCE").ok();

        match env {
            Env::Local => Ok(Self {
                env,
                db_url: env::var("DATABASE_URL").ok(),
                jwt_secret: env::var("JWT_SECRET").unwrap_or_else(|_| LOCAL_JWT_SECRET.to_string()),
                jwt_audience,
                auth_provider_url: env::var("AUTH_PROVIDER_URL").ok(),
                auth_provider_key: env::var("AUTH_PROVIDER_KEY").ok(),
                bind_addr,
                write_retry_limit,
            }),
            Env::Production => Ok(Self {
                env,
                db_url: Some(required("DATABASE_URL")?),
                jwt_secret: required("JWT_SECRET")?,
                jwt_audience,
                auth_provider_url: Some(required("AUTH_PROVIDER_URL")?),
                auth_provider_key: Some(required("AUTH_PROVIDER_KEY")?),
                bind_addr,
                write_retry_limit,
            }),
        }
    }
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    env::var(var).map_err(|_| ConfigError::MissingVar(var))
}
