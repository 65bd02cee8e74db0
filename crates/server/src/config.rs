//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `DEPOT_DATABASE_URL` - `PostgreSQL` connection string (falls back to
//!   `DATABASE_URL`; not needed when `DEPOT_STORE=memory`)
//! - `DEPOT_BASE_URL` - Public URL used to build reset links
//!
//! ## Optional
//! - `DEPOT_STORE` - `postgres` or `memory` (default: postgres)
//! - `DEPOT_HOST` - Bind address (default: 127.0.0.1)
//! - `DEPOT_PORT` - Listen port (default: 3000)
//! - `DEPOT_ENV` - `production` or `development` (default: production).
//!   Development drops the `Secure` cookie flag and logs reset links.
//! - `DEPOT_RATE_LIMIT_MAX` - Requests per client per window (default: 100)
//! - `DEPOT_RATE_LIMIT_WINDOW_SECS` - Window length (default: 60)
//! - `DEPOT_STORE_TIMEOUT_MS` - Deadline for each store operation (default: 5000)
//! - `DEPOT_TRUST_PROXY_HEADERS` - Take the client address from proxy
//!   headers (default: false)
//! - `DEPOT_ARGON2_MEMORY_KIB` - Argon2id memory cost (default: 19456)
//! - `DEPOT_ARGON2_ITERATIONS` - Argon2id time cost (default: 2)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment tag

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Which store backs the server.
#[derive(Debug, Clone)]
pub enum StoreBackend {
    Postgres { database_url: SecretString },
    Memory,
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    #[must_use]
    pub const fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "local" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

/// Fixed-window rate limit settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
        }
    }
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashingConfig {
    pub memory_kib: u32,
    pub iterations: u32,
}

impl HashingConfig {
    /// The cheapest parameters argon2 accepts. Only for tests.
    #[must_use]
    pub const fn minimal() -> Self {
        Self {
            memory_kib: 8,
            iterations: 1,
        }
    }
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Backing store (the Postgres URL contains a password)
    pub store: StoreBackend,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL
    pub base_url: Url,
    pub environment: Environment,
    pub rate_limit: RateLimitConfig,
    /// Deadline applied to every store operation
    pub store_timeout: Duration,
    /// Whether proxy headers identify the client
    pub trust_proxy_headers: bool,
    pub hashing: HashingConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    pub sentry_environment: Option<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Vars(&lookup);

        let store = match env.get_or_default("DEPOT_STORE", "postgres").as_str() {
            "memory" => StoreBackend::Memory,
            "postgres" => StoreBackend::Postgres {
                database_url: env.database_url("DEPOT_DATABASE_URL")?,
            },
            other => {
                return Err(ConfigError::InvalidEnvVar(
                    "DEPOT_STORE".to_string(),
                    format!("expected 'postgres' or 'memory', got '{other}'"),
                ));
            }
        };

        let base_url = env.required("DEPOT_BASE_URL")?;
        let base_url = Url::parse(&base_url)
            .map_err(|e| ConfigError::InvalidEnvVar("DEPOT_BASE_URL".to_string(), e.to_string()))?;

        Ok(Self {
            store,
            host: env.parsed("DEPOT_HOST", "127.0.0.1")?,
            port: env.parsed("DEPOT_PORT", "3000")?,
            base_url,
            environment: env.parsed("DEPOT_ENV", "production")?,
            rate_limit: RateLimitConfig {
                max_requests: env.positive("DEPOT_RATE_LIMIT_MAX", "100")?,
                window: Duration::from_secs(env.positive("DEPOT_RATE_LIMIT_WINDOW_SECS", "60")?),
            },
            store_timeout: Duration::from_millis(env.positive("DEPOT_STORE_TIMEOUT_MS", "5000")?),
            trust_proxy_headers: env.parsed("DEPOT_TRUST_PROXY_HEADERS", "false")?,
            hashing: HashingConfig {
                memory_kib: env.parsed(
                    "DEPOT_ARGON2_MEMORY_KIB",
                    &argon2::Params::DEFAULT_M_COST.to_string(),
                )?,
                iterations: env.parsed(
                    "DEPOT_ARGON2_ITERATIONS",
                    &argon2::Params::DEFAULT_T_COST.to_string(),
                )?,
            },
            sentry_dsn: env.optional("SENTRY_DSN"),
            sentry_environment: env.optional("SENTRY_ENVIRONMENT"),
        })
    }

    /// A development configuration backed by the in-memory store.
    #[must_use]
    pub fn in_memory(base_url: Url) -> Self {
        Self {
            store: StoreBackend::Memory,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 3000,
            base_url,
            environment: Environment::Development,
            rate_limit: RateLimitConfig::default(),
            store_timeout: Duration::from_secs(5),
            trust_proxy_headers: false,
            hashing: HashingConfig::default(),
            sentry_dsn: None,
            sentry_environment: None,
        }
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies must carry the `Secure` flag.
    #[must_use]
    pub const fn secure_cookies(&self) -> bool {
        !self.environment.is_development()
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

struct Vars<'a, F>(&'a F);

impl<F: Fn(&str) -> Option<String>> Vars<'_, F> {
    /// Get an optional variable, treating an empty value as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    /// Get a required variable.
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    /// Get a variable with a default value.
    fn get_or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    /// Parse a variable, falling back to `default` when unset.
    fn parsed<T>(&self, key: &str, default: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get_or_default(key, default)
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    }

    /// Like [`Self::parsed`], but zero is rejected.
    fn positive<T>(&self, key: &str, default: &str) -> Result<T, ConfigError>
    where
        T: FromStr + Default + PartialEq,
        T::Err: std::fmt::Display,
    {
        let value: T = self.parsed(key, default)?;
        if value == T::default() {
            return Err(ConfigError::InvalidEnvVar(
                key.to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        Ok(value)
    }

    /// Get database URL with fallback to generic `DATABASE_URL` (used by Fly.io postgres attach).
    fn database_url(&self, primary_key: &str) -> Result<SecretString, ConfigError> {
        self.optional(primary_key)
            .or_else(|| self.optional("DATABASE_URL"))
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingEnvVar(primary_key.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[
            ("DEPOT_DATABASE_URL", "postgres://u:p@localhost/depot"),
            ("DEPOT_BASE_URL", "https://depot.example"),
        ])
        .unwrap();

        assert_eq!(config.port, 3000);
        assert_eq!(config.rate_limit, RateLimitConfig::default());
        assert_eq!(config.store_timeout, Duration::from_millis(5000));
        assert_eq!(config.environment, Environment::Production);
        assert!(config.secure_cookies());
        assert!(!config.trust_proxy_headers);
        assert_eq!(config.hashing, HashingConfig::default());
    }

    #[test]
    fn test_database_url_fallback() {
        let config = load(&[
            ("DATABASE_URL", "postgres://fly/depot"),
            ("DEPOT_BASE_URL", "https://depot.example"),
        ])
        .unwrap();

        match config.store {
            StoreBackend::Postgres { database_url } => {
                assert_eq!(database_url.expose_secret(), "postgres://fly/depot");
            }
            StoreBackend::Memory => panic!("expected postgres"),
        }
    }

    #[test]
    fn test_memory_store_needs_no_database() {
        let config = load(&[
            ("DEPOT_STORE", "memory"),
            ("DEPOT_BASE_URL", "http://localhost:3000"),
            ("DEPOT_ENV", "development"),
        ])
        .unwrap();

        assert!(matches!(config.store, StoreBackend::Memory));
        assert!(!config.secure_cookies());
    }

    #[test]
    fn test_missing_and_invalid() {
        assert!(matches!(
            load(&[("DEPOT_STORE", "memory")]),
            Err(ConfigError::MissingEnvVar(key)) if key == "DEPOT_BASE_URL"
        ));
        assert!(matches!(
            load(&[("DEPOT_BASE_URL", "https://depot.example")]),
            Err(ConfigError::MissingEnvVar(key)) if key == "DEPOT_DATABASE_URL"
        ));
        assert!(matches!(
            load(&[
                ("DEPOT_STORE", "memory"),
                ("DEPOT_BASE_URL", "https://depot.example"),
                ("DEPOT_RATE_LIMIT_MAX", "lots"),
            ]),
            Err(ConfigError::InvalidEnvVar(key, _)) if key == "DEPOT_RATE_LIMIT_MAX"
        ));
        assert!(matches!(
            load(&[("DEPOT_STORE", "redis"), ("DEPOT_BASE_URL", "https://d.example")]),
            Err(ConfigError::InvalidEnvVar(key, _)) if key == "DEPOT_STORE"
        ));
    }

    #[test]
    fn test_zero_limits_are_rejected() {
        for key in [
            "DEPOT_RATE_LIMIT_MAX",
            "DEPOT_RATE_LIMIT_WINDOW_SECS",
            "DEPOT_STORE_TIMEOUT_MS",
        ] {
            let result = load(&[
                ("DEPOT_STORE", "memory"),
                ("DEPOT_BASE_URL", "https://depot.example"),
                (key, "0"),
            ]);
            assert!(
                matches!(&result, Err(ConfigError::InvalidEnvVar(k, _)) if k == key),
                "{key}=0 should be rejected"
            );
        }

        let config = load(&[
            ("DEPOT_STORE", "memory"),
            ("DEPOT_BASE_URL", "https://depot.example"),
            ("DEPOT_RATE_LIMIT_MAX", "1"),
            ("DEPOT_RATE_LIMIT_WINDOW_SECS", "1"),
            ("DEPOT_STORE_TIMEOUT_MS", "1"),
        ])
        .unwrap();
        assert_eq!(config.rate_limit.max_requests, 1);
        assert_eq!(config.store_timeout, Duration::from_millis(1));
    }

    #[test]
    fn test_debug_redacts_database_url() {
        let config = load(&[
            ("DEPOT_DATABASE_URL", "postgres://user:hunter2@db/depot"),
            ("DEPOT_BASE_URL", "https://depot.example"),
        ])
        .unwrap();

        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
