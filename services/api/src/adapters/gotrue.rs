//! services/api/src/adapters/gotrue.rs
//!
//! The identity adapter: a concrete `IdentityProvider` that talks to the hosted
//! backend's GoTrue auth endpoints (`/auth/v1/...`) over HTTP.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use nexus_core::domain::{Identity, Session};
use nexus_core::ports::{IdentityProvider, PortError, PortResult, SignUpOptions};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Deserialize)]
struct UserMetadata {
    full_name: Option<String>,
}

#[derive(Deserialize)]
struct UserRecord {
    id: Uuid,
    email: Option<String>,
    user_metadata: Option<UserMetadata>,
}

impl UserRecord {
    fn to_domain(self) -> Identity {
        Identity {
            id: self.id,
            email: self.email,
            full_name: self.user_metadata.and_then(|m| m.full_name),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    user: UserRecord,
}

impl TokenResponse {
    fn to_domain(self) -> Session {
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: Utc::now() + Duration::seconds(self.expires_in),
            identity: self.user.to_domain(),
        }
    }
}

//=========================================================================================
// The Adapter
//=========================================================================================

pub struct GoTrueAdapter {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl GoTrueAdapter {
    /// `project_url` is the backend's base URL without a trailing slash.
    pub fn new(client: Client, project_url: &str, anon_key: String) -> Self {
        Self {
            client,
            base_url: format!("{}/auth/v1", project_url),
            anon_key,
        }
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .header("apikey", &self.anon_key)
    }

    async fn token(&self, grant_type: &str, body: serde_json::Value) -> PortResult<Session> {
        let response = self
            .post("/token")
            .query(&[("grant_type", grant_type)])
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(format!("Malformed token response: {}", e)))?;
        Ok(token.to_domain())
    }
}

fn transport_error(e: reqwest::Error) -> PortError {
    warn!("Auth service request failed: {}", e);
    PortError::Unavailable(e.to_string())
}

/// Maps the auth service's error statuses onto port errors.
async fn check_status(response: Response) -> PortResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    debug!(%status, "Auth service rejected request: {}", body);
    Err(match status {
        StatusCode::BAD_REQUEST if body.contains("invalid_grant") || body.contains("Invalid login") => {
            PortError::InvalidCredentials
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PortError::Unauthorized,
        StatusCode::NOT_FOUND => PortError::NotFound(body),
        s if s.is_server_error() => PortError::Unavailable(format!("{}: {}", s, body)),
        s => PortError::Unexpected(format!("{}: {}", s, body)),
    })
}

#[async_trait]
impl IdentityProvider for GoTrueAdapter {
    async fn sign_up(&self, email: &str, password: &str, options: SignUpOptions) -> PortResult<()> {
        let mut request = self.post("/signup").json(&json!({
            "email": email,
            "password": password,
            "data": { "full_name": options.full_name },
        }));
        if let Some(redirect_to) = &options.redirect_to {
            request = request.query(&[("redirect_to", redirect_to)]);
        }
        let response = request.send().await.map_err(transport_error)?;
        check_status(response).await?;
        Ok(())
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> PortResult<Session> {
        self.token("password", json!({ "email": email, "password": password }))
            .await
    }

    async fn refresh_session(&self, refresh_token: &str) -> PortResult<Session> {
        self.token("refresh_token", json!({ "refresh_token": refresh_token }))
            .await
    }

    async fn sign_out(&self, access_token: &str) -> PortResult<()> {
        let response = self
            .post("/logout")
            .query(&[("scope", "global")])
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await?;
        Ok(())
    }

    async fn get_user(&self, access_token: &str) -> PortResult<Identity> {
        let response = self
            .client
            .get(format!("{}/user", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;
        let user: UserRecord = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(format!("Malformed user response: {}", e)))?;
        Ok(user.to_domain())
    }
}
