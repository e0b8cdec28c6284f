//! Identity configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Optional
//! - `PORTAL_DATABASE_URL` - `PostgreSQL` connection string for the profile
//!   store (falls back to `DATABASE_URL`)
//! - `PORTAL_PROFILE_RETRY_ATTEMPTS` - Retries after a profile `NotFound`
//!   following sign-in (default: 3)
//! - `PORTAL_PROFILE_RETRY_DELAY_MS` - Delay between those retries (default: 250)
//! - `PORTAL_CONNECT_TIMEOUT_SECS` - How long `connect` waits for the cache to
//!   resolve the signed-in user (default: 10)
//! - `PORTAL_AUTH_PERSISTENCE` - `local`, `session` or `none` (default: local)

use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

use asso_portal_core::Persistence;

const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 250;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Bounded retry applied when a profile is not found right after sign-in.
///
/// Only `NotFound` is retried; any other fetch failure is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first `NotFound`.
    pub attempts: u32,
    /// Delay before each extra attempt.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Never retry.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            attempts: 0,
            delay: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RETRY_ATTEMPTS,
            delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }
}

/// Identity subsystem configuration.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// `PostgreSQL` profile store URL (contains password)
    pub database_url: Option<SecretString>,
    /// Profile `NotFound` retry policy
    pub retry: RetryPolicy,
    /// Upper bound on waiting for the cache after sign-in
    pub connect_timeout: Duration,
    /// Persistence mode requested before signing in
    pub persistence: Persistence,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            retry: RetryPolicy::default(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            persistence: Persistence::Local,
        }
    }
}

impl IdentityConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if a value is present but cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let database_url = lookup("PORTAL_DATABASE_URL")
            .or_else(|| lookup("DATABASE_URL"))
            .map(SecretString::from);

        let attempts = parse_or(&lookup, "PORTAL_PROFILE_RETRY_ATTEMPTS", defaults.retry.attempts)?;
        let delay_ms = parse_or(
            &lookup,
            "PORTAL_PROFILE_RETRY_DELAY_MS",
            DEFAULT_RETRY_DELAY_MS,
        )?;
        let timeout_secs = parse_or(
            &lookup,
            "PORTAL_CONNECT_TIMEOUT_SECS",
            DEFAULT_CONNECT_TIMEOUT_SECS,
        )?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "PORTAL_CONNECT_TIMEOUT_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        let persistence = lookup("PORTAL_AUTH_PERSISTENCE")
            .map(|value| {
                value.parse::<Persistence>().map_err(|e| {
                    ConfigError::InvalidEnvVar("PORTAL_AUTH_PERSISTENCE".to_string(), e)
                })
            })
            .transpose()?
            .unwrap_or(defaults.persistence);

        Ok(Self {
            database_url,
            retry: RetryPolicy {
                attempts,
                delay: Duration::from_millis(delay_ms),
            },
            connect_timeout: Duration::from_secs(timeout_secs),
            persistence,
        })
    }

    /// The database URL, required by commands that talk to `PostgreSQL`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if no URL was configured.
    pub fn require_database_url(&self) -> Result<&SecretString, ConfigError> {
        self.database_url
            .as_ref()
            .ok_or_else(|| ConfigError::MissingEnvVar("PORTAL_DATABASE_URL".to_string()))
    }
}

/// Parse an optional value, falling back to `default` when unset.
fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key).map_or(Ok(default), |value| {
        value
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_set() {
        let config = IdentityConfig::from_lookup(lookup(&[])).unwrap();
        assert!(config.database_url.is_none());
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.persistence, Persistence::Local);
    }

    #[test]
    fn test_database_url_falls_back_to_generic_var() {
        let config =
            IdentityConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://db/portal")]))
                .unwrap();
        assert_eq!(
            config.require_database_url().unwrap().expose_secret(),
            "postgres://db/portal"
        );
    }

    #[test]
    fn test_parses_overrides() {
        let config = IdentityConfig::from_lookup(lookup(&[
            ("PORTAL_PROFILE_RETRY_ATTEMPTS", "5"),
            ("PORTAL_PROFILE_RETRY_DELAY_MS", "40"),
            ("PORTAL_CONNECT_TIMEOUT_SECS", "2"),
            ("PORTAL_AUTH_PERSISTENCE", "session"),
        ]))
        .unwrap();
        assert_eq!(config.retry.attempts, 5);
        assert_eq!(config.retry.delay, Duration::from_millis(40));
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.persistence, Persistence::Session);
    }

    #[test]
    fn test_invalid_values_are_reported() {
        let err = IdentityConfig::from_lookup(lookup(&[("PORTAL_PROFILE_RETRY_ATTEMPTS", "-1")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(key, _) if key == "PORTAL_PROFILE_RETRY_ATTEMPTS"));

        let err = IdentityConfig::from_lookup(lookup(&[("PORTAL_CONNECT_TIMEOUT_SECS", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(_, _)));

        let err = IdentityConfig::from_lookup(lookup(&[("PORTAL_AUTH_PERSISTENCE", "forever")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(_, _)));
    }

    #[test]
    fn test_missing_database_url() {
        let config = IdentityConfig::default();
        assert!(matches!(
            config.require_database_url(),
            Err(ConfigError::MissingEnvVar(_))
        ));
    }

    #[test]
    fn test_debug_redacts_database_url() {
        let config = IdentityConfig::from_lookup(lookup(&[(
            "PORTAL_DATABASE_URL",
            "postgres://portal:hunter2@db/portal",
        )]))
        .unwrap();
        let debug_output = format!("{config:?}");
        assert!(!debug_output.contains("hunter2"));
    }
}
