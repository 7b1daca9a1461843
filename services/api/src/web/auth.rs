//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for sign-up, login, admin login, token refresh,
//! logout, and the current-session probe used by the browser on startup.

use axum::{
    extract::{Extension, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use nexus_core::domain::Session;
use nexus_core::ports::{PortError, SignUpOptions};
use nexus_core::session::SessionState;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::middleware::{extract_token, resolve_session, CurrentUser, SESSION_COOKIE};
use crate::web::port_failure;
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub is_admin: bool,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl AuthResponse {
    fn new(session: &Session, is_admin: bool) -> Self {
        Self {
            user_id: session.identity.id,
            email: session.identity.email.clone(),
            full_name: session.identity.full_name.clone(),
            is_admin,
            access_token: session.access_token.clone(),
            refresh_token: session.refresh_token.clone(),
            expires_at: session.expires_at,
        }
    }
}

/// The settled session state as the browser sees it.
#[derive(Serialize, ToSchema)]
pub struct SessionResponse {
    pub authenticated: bool,
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub is_admin: bool,
}

//=========================================================================================
// Cookie Helpers
//=========================================================================================

fn session_cookie(session: &Session) -> String {
    let max_age = (session.expires_at - Utc::now()).num_seconds().max(0);
    format!(
        "{}={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE, session.access_token, max_age
    )
}

fn cleared_cookie() -> String {
    format!("{}=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0", SESSION_COOKIE)
}

fn signed_in(session: &Session, is_admin: bool) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::SET_COOKIE, session_cookie(session))],
        Json(AuthResponse::new(session, is_admin)),
    )
}

fn login_failure(e: PortError) -> (StatusCode, String) {
    match e {
        PortError::InvalidCredentials => (
            StatusCode::UNAUTHORIZED,
            "Ugyldige legitimationsoplysninger".to_string(),
        ),
        other => port_failure("Login failed", other),
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/signup - Register a new account with the hosted auth service
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created; a confirmation email has been sent", body = MessageResponse),
        (status = 400, description = "Invalid request"),
        (status = 503, description = "Auth service unavailable")
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Email og adgangskode er påkrævet".to_string()));
    }

    let options = SignUpOptions {
        redirect_to: Some(state.config.site_url.clone()),
        full_name: req.full_name.filter(|n| !n.trim().is_empty()),
    };
    state
        .identity
        .sign_up(req.email.trim(), &req.password, options)
        .await
        .map_err(|e| port_failure("Sign-up failed", e))?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "Tjek din email for at bekræfte din konto".to_string(),
        }),
    ))
}

/// POST /auth/login - Sign in with email and password
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 503, description = "Auth service unavailable")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let session = state
        .identity
        .sign_in_with_password(req.email.trim(), &req.password)
        .await
        .map_err(login_failure)?;
    let is_admin = state.roles.is_admin(session.identity.id).await;
    info!(user_id = %session.identity.id, is_admin, "User signed in");
    Ok(signed_in(&session, is_admin))
}

/// POST /auth/admin/login - Sign in and require the admin role
///
/// A user without the role is signed out again before the response is sent.
#[utoipa::path(
    post,
    path = "/auth/admin/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Admin login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Not an admin"),
        (status = 500, description = "Role check failed")
    )
)]
pub async fn admin_login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let session = state
        .identity
        .sign_in_with_password(req.email.trim(), &req.password)
        .await
        .map_err(login_failure)?;
    let user_id = session.identity.id;

    match state.roles.check_admin(user_id).await {
        Ok(true) => {
            info!(%user_id, "Admin signed in");
            Ok(signed_in(&session, true))
        }
        Ok(false) => {
            warn!(%user_id, "Admin login refused: missing admin role");
            revoke(&state, &session).await;
            Err((StatusCode::FORBIDDEN, "Du har ikke adminrettigheder".to_string()))
        }
        Err(e) => {
            error!(%user_id, "Admin role check failed: {}", e);
            revoke(&state, &session).await;
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Fejl ved tjek af admin-rolle".to_string(),
            ))
        }
    }
}

async fn revoke(state: &AppState, session: &Session) {
    if let Err(e) = state.identity.sign_out(&session.access_token).await {
        warn!(user_id = %session.identity.id, "Failed to revoke refused session: {}", e);
    }
}

/// POST /auth/refresh - Exchange a refresh token for a new session
#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Session refreshed", body = AuthResponse),
        (status = 401, description = "Refresh token rejected")
    )
)]
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let session = state
        .identity
        .refresh_session(&req.refresh_token)
        .await
        .map_err(|e| port_failure("Refresh failed", e))?;
    let is_admin = state.roles.is_admin(session.identity.id).await;
    Ok(signed_in(&session, is_admin))
}

/// POST /auth/logout - Revoke the session and clear the cookie
///
/// The cookie is cleared even when revocation fails.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout completed", body = MessageResponse)
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let message = match extract_token(&headers) {
        Some(token) => match state.identity.sign_out(&token).await {
            Ok(()) => "Logout succesfuld",
            Err(e) => {
                warn!("Token revocation failed during logout: {}", e);
                "Fejl ved logout"
            }
        },
        None => "Logout succesfuld",
    };

    (
        StatusCode::OK,
        [(header::SET_COOKIE, cleared_cookie())],
        Json(MessageResponse {
            message: message.to_string(),
        }),
    )
}

/// GET /auth/session - The caller's settled session state
#[utoipa::path(
    get,
    path = "/auth/session",
    responses(
        (status = 200, description = "Current session state", body = SessionResponse)
    )
)]
pub async fn session_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Json<SessionResponse> {
    let (session, _) = resolve_session(&state, &headers).await;
    let response = match session {
        SessionState::Authenticated { identity, is_admin } => SessionResponse {
            authenticated: true,
            user_id: Some(identity.id),
            email: identity.email,
            full_name: identity.full_name,
            is_admin,
        },
        _ => SessionResponse {
            authenticated: false,
            user_id: None,
            email: None,
            full_name: None,
            is_admin: false,
        },
    };
    Json(response)
}

/// GET /auth/me - The signed-in caller's profile
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "The caller's profile", body = SessionResponse),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn me_handler(Extension(user): Extension<CurrentUser>) -> Json<SessionResponse> {
    Json(SessionResponse {
        authenticated: true,
        user_id: Some(user.identity.id),
        email: user.identity.email,
        full_name: user.identity.full_name,
        is_admin: user.is_admin,
    })
}
