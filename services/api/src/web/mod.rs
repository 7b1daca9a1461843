pub mod auth;
pub mod contact;
pub mod documents;
pub mod finance;
pub mod middleware;
pub mod rest;
pub mod state;

use axum::http::StatusCode;
use nexus_core::ports::PortError;
use tracing::error;

// Re-export what the binaries need to build the web server.
pub use middleware::{require_admin, require_auth};
pub use rest::{router, ApiDoc};

/// Maps a port failure onto a status code and a client-safe message. Internal
/// details are logged, not returned.
pub(crate) fn port_failure(context: &str, e: PortError) -> (StatusCode, String) {
    match e {
        PortError::NotFound(what) => (StatusCode::NOT_FOUND, what),
        PortError::Unauthorized | PortError::InvalidCredentials => {
            (StatusCode::UNAUTHORIZED, context.to_string())
        }
        PortError::Unavailable(detail) => {
            error!("{}: backend unavailable: {}", context, detail);
            (StatusCode::SERVICE_UNAVAILABLE, context.to_string())
        }
        PortError::Unexpected(detail) => {
            error!("{}: {}", context, detail);
            (StatusCode::INTERNAL_SERVER_ERROR, context.to_string())
        }
    }
}
