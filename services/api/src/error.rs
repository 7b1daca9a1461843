//! services/api/src/error.rs
//!
//! Startup failures of the `nexus-api` binary. Request handlers report their
//! own errors as status codes and never reach this type.

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The Postgres pool could not connect.
    #[error("Database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The shared client for the auth and storage endpoints could not be built.
    #[error("HTTP client setup failed: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Invalid CORS origin '{0}'")]
    CorsOrigin(String),

    /// Binding the listener or serving failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
