//! Application configuration from environment variables.
//!
//! Load configuration using `Config::from_env()` after calling
//! `dotenvy::dotenv()`. Missing required variables are errors so that startup
//! can log and exit instead of limping along half-configured.

use std::time::Duration;

/// Default HTTP listen port.
const DEFAULT_PORT: u16 = 8080;

/// Default access token lifetime (24 hours).
const DEFAULT_TOKEN_TTL_HOURS: i64 = 24;

/// Default remote key-set cache lifetime (10 minutes).
const DEFAULT_KEYSET_TTL_SECS: u64 = 600;

/// Default staleness budget for serving a previously fetched key set while
/// the endpoint is unreachable (1 hour).
const DEFAULT_KEYSET_STALE_SECS: u64 = 3_600;

/// Default timeout for a single key-set fetch (5 seconds).
const DEFAULT_KEYSET_FETCH_TIMEOUT_SECS: u64 = 5;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,

    #[error("JWT_SECRET environment variable not set (required in local auth mode)")]
    MissingSecret,

    #[error("KEYSET_URL environment variable not set (required in federated auth mode)")]
    MissingKeySetUrl,

    #[error("AUTH_MODE must be 'local' or 'federated', got '{0}'")]
    InvalidAuthMode(String),

    #[error("{0} is not a valid value for {1}")]
    InvalidValue(String, &'static str),
}

/// Trust model for bearer-token verification, fixed at startup.
#[derive(Debug, Clone)]
pub enum AuthMode {
    /// Tokens are minted and verified locally with a shared secret, and
    /// recorded in the sessions table for revocation.
    Local {
        secret: String,
        issuer: String,
        token_ttl_hours: i64,
    },
    /// Tokens are issued by a third party and verified against its published
    /// key set.
    Federated {
        keyset_url: String,
        keyset_ttl: Duration,
        keyset_stale_budget: Duration,
        fetch_timeout: Duration,
        /// When set, the token's `iss` claim must match.
        issuer: Option<String>,
    },
}

impl AuthMode {
    /// Human-readable label for startup logging.
    pub fn label(&self) -> &'static str {
        match self {
            AuthMode::Local { .. } => "local",
            AuthMode::Federated { .. } => "federated",
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection URL
    pub database_url: String,
    /// HTTP listen port
    pub port: u16,
    /// Token trust model
    pub auth: AuthMode,
    /// Interval between expired-session sweeps
    pub sweep_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Call `dotenvy::dotenv()` before this to load from a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::MissingDatabaseUrl)?;

        let port = match lookup("PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| ConfigError::InvalidValue(raw, "PORT"))?,
            None => DEFAULT_PORT,
        };

        let mode = lookup("AUTH_MODE").unwrap_or_else(|| "local".to_string());
        let auth = match mode.as_str() {
            "local" => AuthMode::Local {
                secret: lookup("JWT_SECRET").ok_or(ConfigError::MissingSecret)?,
                issuer: lookup("JWT_ISSUER").unwrap_or_else(|| "inkpost".to_string()),
                token_ttl_hours: parse_or(
                    lookup("TOKEN_TTL_HOURS"),
                    DEFAULT_TOKEN_TTL_HOURS,
                    "TOKEN_TTL_HOURS",
                )?,
            },
            "federated" => AuthMode::Federated {
                keyset_url: lookup("KEYSET_URL").ok_or(ConfigError::MissingKeySetUrl)?,
                keyset_ttl: Duration::from_secs(parse_or(
                    lookup("KEYSET_TTL_SECS"),
                    DEFAULT_KEYSET_TTL_SECS,
                    "KEYSET_TTL_SECS",
                )?),
                keyset_stale_budget: Duration::from_secs(parse_or(
                    lookup("KEYSET_STALE_SECS"),
                    DEFAULT_KEYSET_STALE_SECS,
                    "KEYSET_STALE_SECS",
                )?),
                fetch_timeout: Duration::from_secs(DEFAULT_KEYSET_FETCH_TIMEOUT_SECS),
                issuer: lookup("JWT_ISSUER"),
            },
            other => return Err(ConfigError::InvalidAuthMode(other.to_string())),
        };

        let sweep_interval = Duration::from_secs(parse_or(
            lookup("SWEEP_INTERVAL_SECS"),
            3_600,
            "SWEEP_INTERVAL_SECS",
        )?);

        Ok(Self {
            database_url,
            port,
            auth,
            sweep_interval,
        })
    }

    /// Socket address string for the HTTP listener.
    pub fn listen_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

fn parse_or<T: std::str::FromStr>(
    raw: Option<String>,
    default: T,
    key: &'static str,
) -> Result<T, ConfigError> {
    match raw {
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue(raw, key)),
        None => Ok(default),
    }
}
