//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    /// Base URL of the hosted backend, e.g. `https://abc.supabase.co`.
    pub supabase_url: String,
    pub supabase_anon_key: String,
    /// Used for storage writes when present; falls back to the anon key.
    pub supabase_service_key: Option<String>,
    pub storage_bucket: String,
    /// Where sign-up confirmation emails send the user back to.
    pub site_url: String,
    pub cors_origin: String,
    /// Staged upload batches older than this are discarded.
    pub pending_upload_ttl: Duration,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Server and Database ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = required("DATABASE_URL")?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Hosted Backend ---
        let supabase_url = required("SUPABASE_URL")?.trim_end_matches('/').to_string();
        if !supabase_url.starts_with("http://") && !supabase_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "SUPABASE_URL".to_string(),
                format!("'{}' is not an http(s) URL", supabase_url),
            ));
        }
        let supabase_anon_key = required("SUPABASE_ANON_KEY")?;
        let supabase_service_key = std::env::var("SUPABASE_SERVICE_KEY")
            .ok()
            .filter(|k| !k.is_empty());
        let storage_bucket =
            std::env::var("STORAGE_BUCKET").unwrap_or_else(|_| "documents".to_string());

        // --- Browser-facing ---
        let site_url =
            std::env::var("SITE_URL").unwrap_or_else(|_| "http://localhost:5173/".to_string());
        let cors_origin =
            std::env::var("CORS_ORIGIN").unwrap_or_else(|_| "http://localhost:5173".to_string());

        // --- Uploads ---
        let ttl_str =
            std::env::var("PENDING_UPLOAD_TTL_SECS").unwrap_or_else(|_| "3600".to_string());
        let pending_upload_ttl = ttl_str
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| {
                ConfigError::InvalidValue("PENDING_UPLOAD_TTL_SECS".to_string(), e.to_string())
            })?;

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            supabase_url,
            supabase_anon_key,
            supabase_service_key,
            storage_bucket,
            site_url,
            cors_origin,
            pending_upload_ttl,
        })
    }
}

fn required(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()))
}
