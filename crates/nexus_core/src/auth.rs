//! crates/nexus_core/src/auth.rs
//!
//! Sign-up, sign-in (visitor and admin), and sign-out. Each action wraps one call
//! to the auth service, reports failures as a notification, and updates the
//! session store on success.

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::domain::Identity;
use crate::ports::{Notification, Notifier, PortError, SignUpOptions};
use crate::session::SessionStore;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    Backend(#[from] PortError),
    #[error("Access denied: admin privileges required")]
    AccessDenied,
    #[error("Role check failed: {0}")]
    RoleCheck(PortError),
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Cheap to clone; clones share the sign-out guard.
#[derive(Clone)]
pub struct AuthActions {
    inner: Arc<Inner>,
}

struct Inner {
    store: SessionStore,
    notifier: Arc<dyn Notifier>,
    /// Sent with sign-up so the confirmation email links back to the site.
    redirect_to: Option<String>,
    sign_out_in_flight: Mutex<Option<Shared<BoxFuture<'static, ()>>>>,
}

impl AuthActions {
    pub fn new(
        store: SessionStore,
        notifier: Arc<dyn Notifier>,
        redirect_to: Option<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                notifier,
                redirect_to,
                sign_out_in_flight: Mutex::new(None),
            }),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.inner.store
    }

    /// Requests a new account. The user is not signed in until they confirm by email.
    pub async fn sign_up(&self, email: &str, password: &str, full_name: &str) -> AuthResult<()> {
        let options = SignUpOptions {
            redirect_to: self.inner.redirect_to.clone(),
            full_name: Some(full_name.to_string()),
        };
        match self.inner.store.auth().sign_up(email, password, options).await {
            Ok(()) => {
                info!("Sign-up requested");
                self.notify(Notification::info(
                    "Registrering gennemført",
                    "Tjek din email for at bekræfte din konto.",
                ));
                Ok(())
            }
            Err(e) => {
                error!("Sign-up failed: {}", e);
                self.notify(Notification::error("Fejl ved registrering", e.to_string()));
                Err(e.into())
            }
        }
    }

    /// Authenticates a visitor. On failure the store is left untouched.
    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<()> {
        match self
            .inner
            .store
            .auth()
            .sign_in_with_password(email, password)
            .await
        {
            Ok(session) => {
                info!(user_id = %session.identity.id, "Signed in");
                self.inner.store.on_change(Some(session));
                Ok(())
            }
            Err(e) => {
                error!("Sign-in failed: {}", e);
                self.notify(Notification::error("Fejl ved login", e.to_string()));
                Err(e.into())
            }
        }
    }

    /// Authenticates and then requires the `admin` role.
    ///
    /// Unlike [`AuthActions::sign_in`], a non-admin (or a failed role lookup) is
    /// signed out again, so the store ends up anonymous.
    pub async fn sign_in_admin(&self, email: &str, password: &str) -> AuthResult<Identity> {
        let store = &self.inner.store;
        let session = match store.auth().sign_in_with_password(email, password).await {
            Ok(session) => session,
            Err(e) => {
                error!("Admin sign-in failed: {}", e);
                let description = match e {
                    PortError::InvalidCredentials => "Ugyldige legitimationsoplysninger".to_string(),
                    ref other => other.to_string(),
                };
                self.notify(Notification::error("Admin login fejl", description));
                return Err(e.into());
            }
        };

        let identity = session.identity.clone();
        match store.roles().check_admin(identity.id).await {
            Ok(true) => {
                info!(user_id = %identity.id, "Admin signed in");
                store.set_authenticated(session, true);
                self.notify(Notification::info(
                    "Admin login succesfuld",
                    "Du er nu logget ind som administrator",
                ));
                Ok(identity)
            }
            Ok(false) => {
                warn!(user_id = %identity.id, "Admin sign-in by a non-admin, revoking session");
                self.revoke().await;
                self.notify(Notification::error(
                    "Adgang nægtet",
                    "Du har ikke adminrettigheder",
                ));
                Err(AuthError::AccessDenied)
            }
            Err(e) => {
                error!(user_id = %identity.id, "Role check after admin sign-in failed: {}", e);
                self.notify(Notification::error(
                    "Admin login fejl",
                    "Fejl ved tjek af admin-rolle",
                ));
                self.revoke().await;
                Err(AuthError::RoleCheck(e))
            }
        }
    }

    /// Signs out. Concurrent calls share one in-flight request.
    ///
    /// The store is cleared once the backend call settles, even when it fails.
    pub async fn sign_out(&self) {
        let in_flight = {
            let mut slot = self.inner.sign_out_in_flight.lock();
            match slot.as_ref() {
                Some(in_flight) => {
                    debug!("Sign-out already in flight, joining it");
                    in_flight.clone()
                }
                None => {
                    let inner = self.inner.clone();
                    let fut = async move { inner.run_sign_out().await }.boxed().shared();
                    *slot = Some(fut.clone());
                    fut
                }
            }
        };
        in_flight.await
    }

    /// Revokes a session without the user-facing sign-out notifications.
    async fn revoke(&self) {
        if let Err(e) = self.inner.store.auth().sign_out().await {
            warn!("Failed to revoke session: {}", e);
        }
        self.inner.store.clear();
    }

    fn notify(&self, notification: Notification) {
        self.inner.notifier.notify(notification);
    }
}

impl Inner {
    async fn run_sign_out(self: Arc<Self>) {
        self.store.set_signing_out(true);
        let result = self.store.auth().sign_out().await;
        self.store.clear();

        match result {
            Ok(()) => {
                info!("Signed out");
                self.notifier.notify(Notification::info(
                    "Logout succesfuld",
                    "Du er nu logget ud",
                ));
            }
            Err(e) => {
                error!("Sign-out failed, clearing local session anyway: {}", e);
                self.notifier
                    .notify(Notification::error("Fejl ved logout", e.to_string()));
            }
        }

        self.store.set_signing_out(false);
        *self.sign_out_in_flight.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::RoleResolver;
    use crate::session::{SessionState, SessionStoreOptions};
    use crate::testing::{FakeAuth, InMemoryDatabase, RecordingNotifier};
    use std::time::Duration;

    struct Harness {
        auth: Arc<FakeAuth>,
        db: Arc<InMemoryDatabase>,
        notifier: Arc<RecordingNotifier>,
        actions: AuthActions,
    }

    fn harness() -> Harness {
        let auth = Arc::new(FakeAuth::default());
        let db = Arc::new(InMemoryDatabase::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let store = SessionStore::new(
            auth.clone(),
            RoleResolver::new(db.clone()),
            SessionStoreOptions::default(),
        );
        let actions = AuthActions::new(
            store,
            notifier.clone(),
            Some("https://nordstack.dk/".to_string()),
        );
        Harness {
            auth,
            db,
            notifier,
            actions,
        }
    }

    #[tokio::test]
    async fn sign_up_does_not_authenticate() {
        let h = harness();
        h.actions
            .sign_up("ny@example.dk", "hemmelig", "Ny Kunde")
            .await
            .unwrap();

        assert_eq!(h.actions.store().state(), SessionState::Uninitialized);
        assert_eq!(h.notifier.titles(), vec!["Registrering gennemført"]);
    }

    #[tokio::test]
    async fn duplicate_sign_up_notifies_error() {
        let h = harness();
        h.auth.add_account("ny@example.dk", "pw");
        let result = h.actions.sign_up("ny@example.dk", "pw", "Ny").await;

        assert!(matches!(result, Err(AuthError::Backend(_))));
        assert_eq!(h.notifier.titles(), vec!["Fejl ved registrering"]);
    }

    #[tokio::test]
    async fn invalid_credentials_leave_store_unchanged() {
        let h = harness();
        let identity = h.auth.add_account("kunde@example.dk", "rigtig");
        let store = h.actions.store().clone();
        store.initialize().await;
        h.actions.sign_in("kunde@example.dk", "rigtig").await.unwrap();
        let before = store.state();
        assert_eq!(before.identity(), Some(&identity));
        tokio::time::sleep(Duration::from_millis(20)).await;

        let result = h.actions.sign_in("kunde@example.dk", "forkert").await;
        assert!(matches!(
            result,
            Err(AuthError::Backend(PortError::InvalidCredentials))
        ));
        assert_eq!(store.state(), before);
        assert!(h.notifier.titles().contains(&"Fejl ved login".to_string()));
        store.teardown();
    }

    #[tokio::test]
    async fn admin_sign_in_confirms_role() {
        let h = harness();
        let identity = h.auth.add_account("admin@nordstack.dk", "pw");
        h.db.grant_admin(identity.id);

        let signed_in = h
            .actions
            .sign_in_admin("admin@nordstack.dk", "pw")
            .await
            .unwrap();
        assert_eq!(signed_in, identity);
        assert!(h.actions.store().state().is_admin());
        assert_eq!(h.auth.sign_out_calls(), 0);
    }

    #[tokio::test]
    async fn admin_sign_in_by_non_admin_ends_anonymous() {
        let h = harness();
        h.auth.add_account("kunde@example.dk", "pw");

        let result = h.actions.sign_in_admin("kunde@example.dk", "pw").await;
        assert!(matches!(result, Err(AuthError::AccessDenied)));
        assert_eq!(h.actions.store().state(), SessionState::Anonymous);
        assert_eq!(h.auth.sign_out_calls(), 1);
        assert_eq!(h.notifier.titles(), vec!["Adgang nægtet"]);
    }

    #[tokio::test]
    async fn admin_sign_in_with_failing_role_lookup_ends_anonymous() {
        let h = harness();
        let identity = h.auth.add_account("admin@nordstack.dk", "pw");
        h.db.grant_admin(identity.id);
        h.db.fail_role_lookups(true);

        let result = h.actions.sign_in_admin("admin@nordstack.dk", "pw").await;
        assert!(matches!(result, Err(AuthError::RoleCheck(_))));
        assert_eq!(h.actions.store().state(), SessionState::Anonymous);
        assert_eq!(h.auth.sign_out_calls(), 1);
    }

    #[tokio::test]
    async fn admin_sign_in_with_subscription_running_settles_anonymous() {
        let h = harness();
        h.auth.add_account("kunde@example.dk", "pw");
        let store = h.actions.store().clone();
        store.initialize().await;

        let _ = h.actions.sign_in_admin("kunde@example.dk", "pw").await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.state(), SessionState::Anonymous);
        store.teardown();
    }

    #[tokio::test]
    async fn concurrent_sign_outs_make_one_backend_call() {
        let h = harness();
        h.auth.add_account("kunde@example.dk", "pw");
        h.actions.sign_in("kunde@example.dk", "pw").await.unwrap();
        h.auth.delay_sign_out(Duration::from_millis(50));

        let first = h.actions.clone();
        let second = h.actions.clone();
        tokio::join!(first.sign_out(), second.sign_out());

        assert_eq!(h.auth.sign_out_calls(), 1);
        assert_eq!(h.actions.store().state(), SessionState::Anonymous);
        assert!(!h.actions.store().snapshot().signing_out);

        // The guard is released once the call settles.
        h.actions.sign_out().await;
        assert_eq!(h.auth.sign_out_calls(), 2);
    }

    #[tokio::test]
    async fn sign_out_reports_signing_out_while_in_flight() {
        let h = harness();
        h.auth.delay_sign_out(Duration::from_millis(50));
        let mut rx = h.actions.store().subscribe();

        let actions = h.actions.clone();
        let task = tokio::spawn(async move { actions.sign_out().await });
        let snapshot = rx.wait_for(|s| s.signing_out).await.unwrap().clone();
        assert!(snapshot.signing_out);

        task.await.unwrap();
        assert!(!h.actions.store().snapshot().signing_out);
    }

    #[tokio::test]
    async fn failed_sign_out_still_clears_identity() {
        let h = harness();
        h.auth.add_account("kunde@example.dk", "pw");
        h.actions.sign_in("kunde@example.dk", "pw").await.unwrap();
        h.auth.fail_sign_out(true);

        h.actions.sign_out().await;
        assert_eq!(h.actions.store().state(), SessionState::Anonymous);
        assert_eq!(h.notifier.titles().last().map(String::as_str), Some("Fejl ved logout"));
    }
}
