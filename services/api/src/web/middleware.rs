//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.
//!
//! Each request resolves its own session state from the bearer token (or the
//! `session` cookie) and runs it through the same guard policies the browser
//! uses. A redirect to the login page becomes 401, a redirect home becomes 403.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use nexus_core::domain::Identity;
use nexus_core::guards::{self, GuardDecision, GuardPolicy, LOGIN_PATH};
use nexus_core::session::SessionState;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::web::state::AppState;

pub const SESSION_COOKIE: &str = "session";

/// The caller of a guarded route, inserted into request extensions.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub identity: Identity,
    pub is_admin: bool,
    pub access_token: String,
}

/// Reads the access token from `Authorization: Bearer` or the session cookie.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())?
        .split(';')
        .find_map(|c| c.trim().strip_prefix("session="))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Resolves the session state for one request. Never `Loading`: the role check
/// is awaited before returning.
pub async fn resolve_session(state: &AppState, headers: &HeaderMap) -> (SessionState, Option<String>) {
    let Some(token) = extract_token(headers) else {
        return (SessionState::Anonymous, None);
    };
    let identity = match state.identity.get_user(&token).await {
        Ok(identity) => identity,
        Err(e) => {
            debug!("Access token rejected: {}", e);
            return (SessionState::Anonymous, None);
        }
    };
    let is_admin = state.roles.is_admin(identity.id).await;
    (SessionState::Authenticated { identity, is_admin }, Some(token))
}

fn enforce(policy: GuardPolicy, session: &SessionState) -> Result<(), StatusCode> {
    match guards::evaluate(policy, session) {
        GuardDecision::Render => Ok(()),
        GuardDecision::Redirect(LOGIN_PATH) => Err(StatusCode::UNAUTHORIZED),
        GuardDecision::Redirect(_) => Err(StatusCode::FORBIDDEN),
        GuardDecision::RenderNothing | GuardDecision::ShowLoading => {
            warn!(?policy, "Guard evaluated against an unsettled session");
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

async fn guarded(
    policy: GuardPolicy,
    state: &AppState,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let (session, token) = resolve_session(state, req.headers()).await;
    enforce(policy, &session)?;

    if let (SessionState::Authenticated { identity, is_admin }, Some(access_token)) = (session, token) {
        req.extensions_mut().insert(CurrentUser {
            identity,
            is_admin,
            access_token,
        });
    }
    Ok(next.run(req).await)
}

/// Requires a signed-in user. Inserts [`CurrentUser`] for the handler.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    guarded(GuardPolicy::Authenticated, &state, req, next).await
}

/// Requires a signed-in user holding the `admin` role. The role is checked on
/// every request, so a revoked role takes effect immediately.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    guarded(GuardPolicy::AdminOnly, &state, req, next).await
}
