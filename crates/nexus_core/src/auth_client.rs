//! crates/nexus_core/src/auth_client.rs
//!
//! A client-side [`AuthService`] on top of a stateless [`IdentityProvider`].
//!
//! It keeps the current session in memory for the lifetime of the process (no
//! persistence), refreshes it when it is about to expire, and broadcasts every
//! change to subscribers. Refreshes are serialized: refresh tokens rotate, so a
//! second concurrent refresh with the same token would be rejected.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use futures::stream;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

use crate::domain::Session;
use crate::ports::{AuthEventStream, AuthService, IdentityProvider, PortResult, SignUpOptions};

/// Sessions this close to expiry are refreshed on read.
const REFRESH_MARGIN_SECS: i64 = 60;

/// Turns a broadcast receiver into an auth-state-changed stream. Lagged
/// receivers skip ahead rather than ending the stream.
pub fn auth_event_stream(rx: broadcast::Receiver<Option<Session>>) -> AuthEventStream {
    Box::pin(stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => return Some((event, rx)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Auth event subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }))
}

pub struct AuthClient {
    provider: Arc<dyn IdentityProvider>,
    cache: Mutex<Option<Session>>,
    events: broadcast::Sender<Option<Session>>,
    refresh_lock: AsyncMutex<()>,
}

impl AuthClient {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            provider,
            cache: Mutex::new(None),
            events,
            refresh_lock: AsyncMutex::new(()),
        }
    }

    fn needs_refresh(session: &Session) -> bool {
        session.is_expired_at(Utc::now() + Duration::seconds(REFRESH_MARGIN_SECS))
    }

    /// Swaps the cached session only if it is still the one issued for
    /// `refresh_token`. Returns `false` when a sign-in or sign-out got there first.
    fn replace_if_current(&self, refresh_token: &str, session: Option<Session>) -> bool {
        {
            let mut cache = self.cache.lock();
            if cache.as_ref().map(|s| s.refresh_token.as_str()) != Some(refresh_token) {
                return false;
            }
            *cache = session.clone();
        }
        let _ = self.events.send(session);
        true
    }

    fn replace(&self, session: Option<Session>) {
        *self.cache.lock() = session.clone();
        // No subscribers is fine.
        let _ = self.events.send(session);
    }
}

#[async_trait]
impl AuthService for AuthClient {
    async fn get_session(&self) -> PortResult<Option<Session>> {
        match self.cache.lock().as_ref() {
            None => return Ok(None),
            Some(cached) if !Self::needs_refresh(cached) => return Ok(Some(cached.clone())),
            Some(_) => {}
        }

        let _refreshing = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited.
        let Some(cached) = self.cache.lock().clone() else {
            return Ok(None);
        };
        if !Self::needs_refresh(&cached) {
            return Ok(Some(cached));
        }

        debug!(user_id = %cached.identity.id, "Refreshing session close to expiry");
        match self.provider.refresh_session(&cached.refresh_token).await {
            Ok(session) => {
                if self.replace_if_current(&cached.refresh_token, Some(session.clone())) {
                    Ok(Some(session))
                } else {
                    debug!("Session changed during refresh, discarding refreshed tokens");
                    Ok(self.cache.lock().clone())
                }
            }
            Err(e) => {
                if self.replace_if_current(&cached.refresh_token, None) {
                    warn!("Session refresh failed, dropping session: {}", e);
                    Err(e)
                } else {
                    debug!("Session refresh failed after the session was replaced: {}", e);
                    Ok(self.cache.lock().clone())
                }
            }
        }
    }

    async fn sign_up(&self, email: &str, password: &str, options: SignUpOptions) -> PortResult<()> {
        self.provider.sign_up(email, password, options).await
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> PortResult<Session> {
        let session = self.provider.sign_in_with_password(email, password).await?;
        info!(user_id = %session.identity.id, "Session issued");
        self.replace(Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> PortResult<()> {
        let current = self.cache.lock().take();
        let result = match &current {
            Some(session) => self.provider.sign_out(&session.access_token).await,
            None => Ok(()),
        };
        // The local session goes away even if revocation failed.
        self.replace(None);
        result
    }

    fn subscribe(&self) -> AuthEventStream {
        auth_event_stream(self.events.subscribe())
    }
}
