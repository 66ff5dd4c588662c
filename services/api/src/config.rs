//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::str::FromStr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Which `RecordsRepository` implementation backs the service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres { database_url: String },
    Memory,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub storage: StorageBackend,
    pub log_level: Level,
    pub cors_origin: String,
    /// Display name used in outgoing mail.
    pub site_name: String,
    /// Absolute base URL used to build activation links.
    pub public_base_url: String,
    pub default_from_email: String,
    /// When set, admin self-registration must present this code.
    pub admin_registration_code: Option<String>,
    pub make_admin_superuser_on_registration: bool,
    pub allow_email_role_fallback: bool,
    pub session_ttl_days: i64,
    pub activation_ttl_hours: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 3000)),
            storage: StorageBackend::Memory,
            log_level: Level::INFO,
            cors_origin: "http://localhost:3000".to_string(),
            site_name: "ETU Results".to_string(),
            public_base_url: "http://localhost:3000".to_string(),
            default_from_email: "no-reply@example.com".to_string(),
            admin_registration_code: None,
            make_admin_superuser_on_registration: false,
            allow_email_role_fallback: true,
            session_ttl_days: 30,
            activation_ttl_hours: 72,
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        let defaults = Config::default();

        // --- Load Server and Storage Settings ---
        let bind_address = parse_var("BIND_ADDRESS", defaults.bind_address)?;

        let storage = match std::env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "postgres".to_string())
            .to_lowercase()
            .as_str()
        {
            "postgres" => StorageBackend::Postgres {
                database_url: std::env::var("DATABASE_URL")
                    .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?,
            },
            "memory" => StorageBackend::Memory,
            other => {
                return Err(ConfigError::InvalidValue(
                    "STORAGE_BACKEND".to_string(),
                    format!("'{}' is not one of postgres, memory", other),
                ))
            }
        };

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin = std::env::var("CORS_ORIGIN").unwrap_or(defaults.cors_origin);

        // --- Load Site and Mail Settings ---
        let site_name = std::env::var("SITE_NAME").unwrap_or(defaults.site_name);
        let public_base_url = std::env::var("PUBLIC_BASE_URL")
            .unwrap_or(defaults.public_base_url)
            .trim_end_matches('/')
            .to_string();
        let default_from_email =
            std::env::var("DEFAULT_FROM_EMAIL").unwrap_or(defaults.default_from_email);

        // --- Load Registration and Role Policy ---
        let admin_registration_code = std::env::var("ADMIN_REGISTRATION_CODE")
            .ok()
            .filter(|code| !code.is_empty());
        let make_admin_superuser_on_registration = parse_var(
            "MAKE_ADMIN_SUPERUSER_ON_REGISTRATION",
            defaults.make_admin_superuser_on_registration,
        )?;
        let allow_email_role_fallback =
            parse_var("ALLOW_EMAIL_ROLE_FALLBACK", defaults.allow_email_role_fallback)?;
        let session_ttl_days = parse_var("SESSION_TTL_DAYS", defaults.session_ttl_days)?;
        let activation_ttl_hours =
            parse_var("ACTIVATION_TTL_HOURS", defaults.activation_ttl_hours)?;

        Ok(Self {
            bind_address,
            storage,
            log_level,
            cors_origin,
            site_name,
            public_base_url,
            default_from_email,
            admin_registration_code,
            make_admin_superuser_on_registration,
            allow_email_role_fallback,
            session_ttl_days,
            activation_ttl_hours,
        })
    }
}

/// Reads an optional variable, falling back to `default` when it is unset.
fn parse_var<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}
