use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use zeroize::Zeroizing;

/// Rate-limit settings for one route class.
#[derive(Clone, Copy, Debug)]
pub struct RateLimitClass {
    /// Window length in seconds.
    pub window_seconds: i64,
    /// Maximum requests allowed per window.
    pub max_requests: i64,
}

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// The URL of the Redis server.
    pub redis_url: String,
    /// The port the HTTP server listens on.
    pub port: u16,
    /// Session time-to-live in seconds. Each successful lookup slides the
    /// expiry forward by this amount.
    pub session_ttl_seconds: i64,
    /// Maximum live sessions per user before LRU eviction kicks in.
    pub max_sessions_per_user: usize,
    /// Secret used to derive the token-encryption key. When absent an
    /// ephemeral key is generated at startup.
    pub token_encryption_secret: Option<Zeroizing<String>>,
    /// Secret used to verify bearer tokens (HS256).
    pub jwt_secret: Zeroizing<String>,
    /// General route-class rate limit (window 60s, cap 100 by default).
    pub rate_limit_general: RateLimitClass,
    /// Auth route-class rate limit (window 900s, cap 10 by default).
    pub rate_limit_auth: RateLimitClass,
    /// Redis connection timeout in milliseconds.
    pub redis_connect_timeout_ms: u64,
    /// Redis per-operation response timeout in milliseconds.
    pub redis_response_timeout_ms: u64,
    /// Cap on the reconnect backoff delay in milliseconds.
    pub redis_retry_max_delay_ms: u64,
}

/// Reads an environment variable, falling back to `default` when unset and
/// failing when set but unparseable.
fn env_or<T: FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Invalid {}", name)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let jwt_secret = env::var("JWT_SECRET")
            .context("JWT_SECRET must be set (generate with: openssl rand -hex 32)")?;
        if jwt_secret.trim().is_empty() {
            anyhow::bail!("JWT_SECRET must not be empty");
        }

        let token_encryption_secret = env::var("TOKEN_ENCRYPTION_SECRET")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(Zeroizing::new);

        let session_ttl_seconds = env_or("SESSION_TTL_SECONDS", 604_800i64)?;
        if session_ttl_seconds <= 0 {
            anyhow::bail!("SESSION_TTL_SECONDS must be positive");
        }

        let max_sessions_per_user = env_or("MAX_SESSIONS_PER_USER", 5usize)?;
        if max_sessions_per_user == 0 {
            anyhow::bail!("MAX_SESSIONS_PER_USER must be at least 1");
        }

        Ok(Self {
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            port: env_or("PORT", 4000u16)?,
            session_ttl_seconds,
            max_sessions_per_user,
            token_encryption_secret,
            jwt_secret: Zeroizing::new(jwt_secret),
            rate_limit_general: RateLimitClass {
                window_seconds: env_or("RATE_LIMIT_WINDOW_SECONDS", 60i64)?,
                max_requests: env_or("RATE_LIMIT_MAX_REQUESTS", 100i64)?,
            },
            rate_limit_auth: RateLimitClass {
                window_seconds: env_or("AUTH_RATE_LIMIT_WINDOW_SECONDS", 900i64)?,
                max_requests: env_or("AUTH_RATE_LIMIT_MAX_REQUESTS", 10i64)?,
            },
            redis_connect_timeout_ms: env_or("REDIS_CONNECT_TIMEOUT_MS", 2000u64)?,
            redis_response_timeout_ms: env_or("REDIS_RESPONSE_TIMEOUT_MS", 2000u64)?,
            redis_retry_max_delay_ms: env_or("REDIS_RETRY_MAX_DELAY_MS", 30_000u64)?,
        })
    }
}
